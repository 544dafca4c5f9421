use chrono::Utc;
use color_eyre::{
    Report, Result,
    eyre::{Context as _, OptionExt as _},
};
use itertools::Itertools;
use poise::{ApplicationContext, command, serenity_prelude::*};
use tracing::info;

use super::reply;
use crate::{
    clock::{DEFAULT_FORMAT, find_timezone},
    database,
    types::{Clock, Data},
    util::is_valid_strftime,
};

/// Voice channels that show the time in a timezone.
#[command(
    slash_command,
    guild_only,
    subcommands("create", "list", "remove", "clear_all"),
    subcommand_required,
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn clock(_ctx: ApplicationContext<'_, Data, Report>) -> Result<()> {
    Ok(())
}

/// Create a voice channel showing the time in a timezone.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn create(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "An IANA timezone, e.g. Europe/Berlin"] timezone: String,

    #[description = "A strftime format, defaults to \"%A, %I:%M %p (%Z)\""]
    #[max_length = 100]
    format: Option<String>,
) -> Result<()> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("clock used outside of a guild")?;

    let Some(timezone) = find_timezone(&timezone) else {
        return reply(
            ctx,
            format!(
                "Couldn't find the timezone `{timezone}`. Look for it in \
                 <https://en.wikipedia.org/wiki/List_of_tz_database_time_zones>"
            ),
        )
        .await;
    };

    let format = format.unwrap_or_else(|| DEFAULT_FORMAT.into());
    if !is_valid_strftime(&format) {
        return reply(
            ctx,
            format!("`{format}` is not a valid format. See <https://strftime.org> for help."),
        )
        .await;
    }

    let channel = guild_id
        .create_channel(
            ctx.serenity_context,
            CreateChannel::new(timezone.name()).kind(ChannelType::Voice),
        )
        .await
        .wrap_err("failed to create clock channel")?;

    let clock = Clock {
        guild_id,
        channel_id: channel.id,
        timezone,
        format,
    };
    database::insert_clock(&ctx.data.pool, &clock).await?;

    // show the time right away instead of waiting for the next cycle
    channel
        .id
        .edit(
            ctx.serenity_context,
            EditChannel::new().name(clock.render(Utc::now())),
        )
        .await
        .wrap_err("failed to name clock channel")?;

    info!("Created clock {} for {}", channel.id, timezone.name());

    reply(
        ctx,
        format!(
            "Created {} with the **{}** timezone.",
            channel.id.mention(),
            timezone.name()
        ),
    )
    .await
}

/// List the clocks of this server.
#[command(slash_command, guild_only)]
async fn list(ctx: ApplicationContext<'_, Data, Report>) -> Result<()> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("clock used outside of a guild")?;
    let clocks = database::fetch_clocks(&ctx.data.pool, Some(guild_id)).await?;

    if clocks.is_empty() {
        return reply(ctx, "This server has no clocks.").await;
    }

    let lines = clocks
        .iter()
        .map(|clock| {
            format!(
                "{} - **{}** - `{}`",
                clock.channel_id.mention(),
                clock.timezone.name(),
                clock.format
            )
        })
        .join("\n");

    reply(ctx, lines).await
}

/// Stop updating a clock channel.
#[command(slash_command, guild_only)]
async fn remove(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "The clock channel"]
    #[channel_types("Voice")]
    channel: GuildChannel,
) -> Result<()> {
    if database::remove_clock(&ctx.data.pool, channel.id).await? {
        info!("Removed clock {}", channel.id);
        reply(ctx, format!("{} is no longer a clock.", channel.id.mention())).await
    } else {
        reply(ctx, format!("{} is not a clock.", channel.id.mention())).await
    }
}

/// Remove every clock of every server.
#[command(slash_command, rename = "clear-all", owners_only)]
async fn clear_all(ctx: ApplicationContext<'_, Data, Report>) -> Result<()> {
    let removed = database::clear_clocks(&ctx.data.pool).await?;
    info!("Cleared {removed} clocks");
    reply(ctx, format!("Removed {removed} clocks.")).await
}
