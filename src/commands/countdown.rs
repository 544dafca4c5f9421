use chrono::Utc;
use color_eyre::{
    Report, Result,
    eyre::{Context as _, OptionExt as _},
};
use poise::{ApplicationContext, command, serenity_prelude::*};

use super::{reply, respond};
use crate::{
    countdown::{self, Draft},
    types::Data,
    util::parse_end_time,
};

const END_TIME_HELP: &str = "e.g. `2d`, `in 3 hours`, `tomorrow`, `next thursday at 3pm`";

/// Start a countdown.
#[command(
    slash_command,
    guild_only,
    default_member_permissions = "ADMINISTRATOR",
    required_permissions = "ADMINISTRATOR"
)]
pub async fn countdown(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "The channel to run the countdown in"]
    #[channel_types("Text", "News")]
    channel: GuildChannel,
) -> Result<()> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("countdown used outside of a guild")?;

    let response = ctx
        .interaction
        .quick_modal(
            ctx.serenity_context,
            CreateQuickModal::new("Start a countdown")
                .field(
                    CreateInputText::new(InputTextStyle::Short, "Title", "")
                        .placeholder("What is counted down to")
                        .max_length(256),
                )
                .field(
                    CreateInputText::new(InputTextStyle::Paragraph, "Ending message", "")
                        .placeholder("Sent in the channel when the countdown ends")
                        .max_length(2000)
                        .required(false),
                )
                .field(
                    CreateInputText::new(InputTextStyle::Short, "Ends", "")
                        .placeholder("A date or an offset in UTC, like `2d` or `tomorrow`")
                        .max_length(100),
                )
                .timeout(ctx.data.config.form_timeout),
        )
        .await?;

    let Some(response) = response else {
        return Ok(());
    };

    let [title, ending_message, ends] = response.inputs.as_slice() else {
        return respond(
            ctx.serenity_context,
            &response.interaction,
            "There was an error processing your submission.",
        )
        .await;
    };

    let end_time = match parse_end_time(ends, Utc::now()) {
        Ok(end_time) => end_time,
        Err(e) => {
            return respond(
                ctx.serenity_context,
                &response.interaction,
                format!("Invalid end time: {e}. Try something like {END_TIME_HELP}."),
            )
            .await;
        }
    };

    let draft = Draft {
        guild_id,
        channel_id: channel.id,
        author_id: ctx.interaction.user.id,
        title: title.trim().to_string(),
        ending_message: ending_message.trim().to_string(),
        end_time,
    };

    if let Err(e) = countdown::start(ctx.serenity_context, ctx.data, draft).await {
        respond(
            ctx.serenity_context,
            &response.interaction,
            "There was an error starting the countdown.",
        )
        .await?;
        return Err(e);
    }

    respond(
        ctx.serenity_context,
        &response.interaction,
        format!("Started the countdown in {}!", channel.id.mention()),
    )
    .await
}

/// Countdown settings.
#[command(
    slash_command,
    subcommands("interval"),
    subcommand_required,
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn countdownset(_ctx: ApplicationContext<'_, Data, Report>) -> Result<()> {
    Ok(())
}

/// Show or set how often countdowns are refreshed.
#[command(slash_command, owners_only)]
async fn interval(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "Seconds between refreshes, at least 5"] seconds: Option<u64>,
) -> Result<()> {
    let Some(seconds) = seconds else {
        let current = ctx.data.countdown_interval().as_secs();
        return reply(ctx, format!("The current interval is {current} seconds.")).await;
    };

    let seconds = ctx
        .data
        .set_countdown_interval(seconds)
        .await
        .wrap_err("failed to set countdown interval")?;

    reply(ctx, format!("Set the interval to {seconds} seconds.")).await
}
