use chrono::Utc;
use color_eyre::{
    Report, Result,
    eyre::{Context as _, OptionExt as _},
};
use itertools::Itertools;
use poise::{ApplicationContext, CreateReply, command, serenity_prelude::*};
use tracing::info;

use super::{reply, resolve_roles, respond};
use crate::{
    giveaway::{Draft, END_TIME_GRACE, end as end_giveaway, start as start_giveaway},
    types::{Data, GiveawayDefaults},
    util::{is_valid_strftime, parse_end_time, parse_message_reference},
};

const SUBMISSION_ERROR: &str = "There was an error processing your submission.";

fn clamp_winners(winners: i64) -> u32 {
    winners.clamp(1, u32::MAX.into()) as u32
}

/// A join-days requirement, or none when fewer than one day is required.
fn join_days_requirement(days: i64) -> Option<u32> {
    (days >= 1).then(|| days.min(u32::MAX.into()) as u32)
}

fn role_list(roles: &[RoleId]) -> String {
    if roles.is_empty() {
        "None".into()
    } else {
        roles.iter().map(|role| role.mention().to_string()).join(", ")
    }
}

/// What a giveaway form asked for. Values with a guild default aren't asked.
struct Form {
    interaction: ModalInteraction,
    item: String,
    winners: Option<String>,
    ending_message: Option<String>,
    ends: String,
}

async fn ask_form(
    ctx: ApplicationContext<'_, Data, Report>,
    ask_winners: bool,
    ask_ending_message: bool,
) -> Result<Option<Form>> {
    let mut modal = CreateQuickModal::new("Start a giveaway").field(
        CreateInputText::new(InputTextStyle::Short, "Item", "")
            .placeholder("What is being given away")
            .max_length(256),
    );

    if ask_winners {
        modal = modal.field(
            CreateInputText::new(InputTextStyle::Short, "Winners", "")
                .placeholder("How many winners there will be")
                .max_length(10),
        );
    }

    if ask_ending_message {
        modal = modal.field(
            CreateInputText::new(InputTextStyle::Paragraph, "Ending message", "")
                .placeholder("Sent with the winners when the giveaway ends")
                .max_length(1000)
                .required(false),
        );
    }

    modal = modal
        .field(
            CreateInputText::new(InputTextStyle::Short, "Ends", "")
                .placeholder("A date or an offset in UTC, like `2d` or `tomorrow`")
                .max_length(100),
        )
        .timeout(ctx.data.config.form_timeout);

    let Some(response) = ctx
        .interaction
        .quick_modal(ctx.serenity_context, modal)
        .await?
    else {
        return Ok(None);
    };

    let mut inputs = response.inputs.into_iter();
    let item = inputs.next().unwrap_or_default();
    let winners = ask_winners.then(|| inputs.next().unwrap_or_default());
    let ending_message = ask_ending_message.then(|| inputs.next().unwrap_or_default());
    let ends = inputs.next().unwrap_or_default();

    Ok(Some(Form {
        interaction: response.interaction,
        item,
        winners,
        ending_message,
        ends,
    }))
}

/// Everything about a giveaway that isn't asked in the form.
struct Settings {
    guild_id: GuildId,
    channel_id: ChannelId,
    author_id: UserId,
    winners: Option<u32>,
    ending_message: Option<String>,
    roles: Vec<RoleId>,
    join_days: Option<i64>,
}

/// Validates a submitted form and starts the giveaway.
async fn submit(
    ctx: ApplicationContext<'_, Data, Report>,
    settings: Settings,
    form: Form,
) -> Result<()> {
    let mut notices = Vec::new();

    let winners = match (settings.winners, form.winners.as_deref()) {
        (Some(winners), _) => winners,
        (None, Some(input)) => match input.trim().parse::<i64>() {
            Ok(winners) if winners < 1 => {
                notices.push("The number of winners can't be less than 1, so it was set to 1.");
                1
            }
            Ok(winners) => clamp_winners(winners),
            Err(_) => {
                return respond(
                    ctx.serenity_context,
                    &form.interaction,
                    "The number of winners must be a number.",
                )
                .await;
            }
        },
        (None, None) => 1,
    };

    let join_days = settings.join_days.and_then(|days| {
        let requirement = join_days_requirement(days);
        if requirement.is_none() {
            notices.push("The days in server can't be less than 1, so there is no such requirement.");
        }
        requirement
    });

    let now = Utc::now();
    let end_time = match parse_end_time(&form.ends, now) {
        Ok(end_time) => end_time + END_TIME_GRACE,
        Err(e) => {
            return respond(
                ctx.serenity_context,
                &form.interaction,
                format!("Invalid end time: {e}."),
            )
            .await;
        }
    };

    let draft = Draft {
        guild_id: settings.guild_id,
        channel_id: settings.channel_id,
        author_id: settings.author_id,
        item: form.item.trim().to_string(),
        ending_message: settings
            .ending_message
            .or(form.ending_message)
            .unwrap_or_default()
            .trim()
            .to_string(),
        end_time,
        winners,
        roles: settings.roles,
        join_days,
    };

    if let Err(e) = start_giveaway(ctx.serenity_context, ctx.data, draft).await {
        respond(ctx.serenity_context, &form.interaction, SUBMISSION_ERROR).await?;
        return Err(e);
    }

    let mut content = format!(
        "Successfully created the giveaway in {}!",
        settings.channel_id.mention()
    );
    for notice in notices {
        content.push('\n');
        content.push_str(notice);
    }

    respond(ctx.serenity_context, &form.interaction, content).await
}

/// Giveaways with reaction entries.
#[command(
    slash_command,
    guild_only,
    subcommands("make", "quick", "end", "config"),
    subcommand_required,
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn giveaway(_ctx: ApplicationContext<'_, Data, Report>) -> Result<()> {
    Ok(())
}

/// Start a giveaway.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn make(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "The channel to run the giveaway in, defaults to this one"]
    #[channel_types("Text", "News")]
    channel: Option<GuildChannel>,

    #[description = "Who is giving the item away, defaults to you"] host: Option<User>,

    #[description = "Roles required to enter, separated by commas"] roles: Option<String>,

    #[description = "Days an entrant must have been in this server"] join_days: Option<i64>,
) -> Result<()> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("giveaway used outside of a guild")?;

    let roles = match roles {
        Some(roles) => match resolve_roles(ctx.serenity_context, guild_id, &roles) {
            Ok(roles) => roles,
            Err(token) => return reply(ctx, format!("Couldn't find the role `{token}`.")).await,
        },
        None => Vec::new(),
    };

    let settings = Settings {
        guild_id,
        channel_id: channel.map_or(ctx.interaction.channel_id, |channel| channel.id),
        author_id: host.map_or(ctx.interaction.user.id, |host| host.id),
        winners: None,
        ending_message: None,
        roles,
        join_days,
    };

    let Some(form) = ask_form(ctx, true, true).await? else {
        return Ok(());
    };

    submit(ctx, settings, form).await
}

/// Start a giveaway using this server's giveaway config.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn quick(ctx: ApplicationContext<'_, Data, Report>) -> Result<()> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("giveaway used outside of a guild")?;
    let defaults = ctx.data.giveaway_defaults(guild_id).await?;

    let settings = Settings {
        guild_id,
        channel_id: defaults.channel_id.unwrap_or(ctx.interaction.channel_id),
        author_id: defaults.author_id.unwrap_or(ctx.interaction.user.id),
        winners: defaults.winners,
        ending_message: defaults.ending_message,
        roles: defaults.roles,
        join_days: defaults.join_days.map(i64::from),
    };

    let Some(form) = ask_form(
        ctx,
        settings.winners.is_none(),
        settings.ending_message.is_none(),
    )
    .await?
    else {
        return Ok(());
    };

    submit(ctx, settings, form).await
}

/// End a running giveaway early.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn end(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "A link to the giveaway message, or its ID"] message: String,
) -> Result<()> {
    let Some(message_id) = parse_message_reference(&message) else {
        return reply(ctx, "That is not a message link or ID.").await;
    };

    let giveaway = {
        let mut giveaways = ctx.data.giveaways.lock().await;
        let in_guild = giveaways
            .get(message_id)
            .is_some_and(|giveaway| Some(giveaway.guild_id) == ctx.interaction.guild_id);

        if in_guild {
            giveaways.remove(message_id)
        } else {
            None
        }
    };

    let Some(giveaway) = giveaway else {
        return reply(ctx, "That giveaway isn't running.").await;
    };

    // collecting the entrants can take longer than the response window
    poise::Context::Application(ctx).defer_ephemeral().await?;

    info!("Ending giveaway {message_id} early");
    end_giveaway(ctx.serenity_context, ctx.data, &giveaway).await?;

    reply(ctx, "Ended that giveaway!").await
}

/// The defaults used by quick giveaways.
#[command(
    slash_command,
    guild_only,
    subcommands("show", "channel", "host", "days", "ending", "roles", "winners"),
    subcommand_required
)]
async fn config(_ctx: ApplicationContext<'_, Data, Report>) -> Result<()> {
    Ok(())
}

async fn update_defaults(
    ctx: ApplicationContext<'_, Data, Report>,
    update: impl FnOnce(&mut GiveawayDefaults),
) -> Result<GiveawayDefaults> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("giveaway used outside of a guild")?;
    ctx.data
        .update_giveaway_defaults(guild_id, update)
        .await
        .wrap_err("failed to update giveaway defaults")
}

/// Show the current config.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn show(ctx: ApplicationContext<'_, Data, Report>) -> Result<()> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("giveaway used outside of a guild")?;
    let defaults = ctx.data.giveaway_defaults(guild_id).await?;

    fn or_none<T: ToString>(value: Option<T>) -> String {
        value.map_or_else(|| "None".into(), |value| value.to_string())
    }

    let description = format!(
        "Host: {}\nChannel: {}\nWinners: {}\nJoin Days: {}\nRoles: {}\nEnding Message: {}\nDatetime Format: {}",
        or_none(defaults.author_id.map(|user| user.mention())),
        or_none(defaults.channel_id.map(|channel| channel.mention())),
        or_none(defaults.winners),
        or_none(defaults.join_days),
        role_list(&defaults.roles),
        or_none(defaults.ending_message),
        or_none(defaults.datetime_format),
    );

    poise::Context::Application(ctx)
        .send(
            CreateReply::default()
                .embed(
                    CreateEmbed::new()
                        .title("Giveaway config")
                        .description(description),
                )
                .ephemeral(true),
        )
        .await?;

    Ok(())
}

/// Set the default channel.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn channel(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "Leave empty to reset"]
    #[channel_types("Text", "News")]
    channel: Option<GuildChannel>,
) -> Result<()> {
    let channel_id = channel.map(|channel| channel.id);
    update_defaults(ctx, |defaults| defaults.channel_id = channel_id).await?;

    match channel_id {
        Some(channel_id) => reply(ctx, format!("Set the default channel to {}.", channel_id.mention())).await,
        None => reply(ctx, "Reset the default channel.").await,
    }
}

/// Set the default host.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn host(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "Leave empty to reset"] user: Option<User>,
) -> Result<()> {
    let author_id = user.map(|user| user.id);
    update_defaults(ctx, |defaults| defaults.author_id = author_id).await?;

    match author_id {
        Some(author_id) => reply(ctx, format!("Set the default host to {}.", author_id.mention())).await,
        None => reply(ctx, "Reset the default host.").await,
    }
}

/// Set the default days an entrant must have been in this server.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn days(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "Leave empty or below 1 to reset"] days: Option<i64>,
) -> Result<()> {
    let join_days = days.and_then(join_days_requirement);
    update_defaults(ctx, |defaults| defaults.join_days = join_days).await?;

    match join_days {
        Some(days) => reply(ctx, format!("Set the default days in server to {days}.")).await,
        None => reply(ctx, "Reset the default days in server.").await,
    }
}

/// Set the default ending message.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn ending(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "Leave empty to reset"]
    #[max_length = 1000]
    message: Option<String>,
) -> Result<()> {
    let message = message.filter(|message| !message.trim().is_empty());
    update_defaults(ctx, |defaults| defaults.ending_message = message.clone()).await?;

    match message {
        Some(message) => reply(ctx, format!("Set the default ending message to {message}")).await,
        None => reply(ctx, "Reset the default ending message.").await,
    }
}

/// Set the default roles required to enter.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn roles(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "Roles separated by commas, leave empty to reset"] roles: Option<String>,
) -> Result<()> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("giveaway used outside of a guild")?;

    let roles = match roles {
        Some(roles) => match resolve_roles(ctx.serenity_context, guild_id, &roles) {
            Ok(roles) => roles,
            Err(token) => return reply(ctx, format!("Couldn't find the role `{token}`.")).await,
        },
        None => Vec::new(),
    };

    let defaults = update_defaults(ctx, |defaults| defaults.roles = roles).await?;

    reply(
        ctx,
        format!("Set the default required roles to {}.", role_list(&defaults.roles)),
    )
    .await
}

/// Set the default number of winners.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn winners(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "Leave empty to reset"] winners: Option<i64>,
) -> Result<()> {
    let winners = winners.map(clamp_winners);
    update_defaults(ctx, |defaults| defaults.winners = winners).await?;

    match winners {
        Some(winners) => reply(ctx, format!("Set the default winners to {winners}.")).await,
        None => reply(ctx, "Reset the default winners.").await,
    }
}

/// Giveaway settings.
#[command(
    slash_command,
    guild_only,
    subcommands("interval", "file", "datetime"),
    subcommand_required,
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn giveawayset(_ctx: ApplicationContext<'_, Data, Report>) -> Result<()> {
    Ok(())
}

/// Show or set how often giveaways are refreshed.
#[command(slash_command, owners_only)]
async fn interval(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "Seconds between refreshes, at least 5"] seconds: Option<u64>,
) -> Result<()> {
    let Some(seconds) = seconds else {
        let current = ctx.data.giveaway_interval().as_secs();
        return reply(ctx, format!("The current interval is {current} seconds.")).await;
    };

    let seconds = ctx
        .data
        .set_giveaway_interval(seconds)
        .await
        .wrap_err("failed to set giveaway interval")?;

    reply(ctx, format!("Set the interval to {seconds} seconds.")).await
}

/// Set how many winners are mentioned before they are sent as a file.
#[command(slash_command, owners_only)]
async fn file(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "Between 1 and 50, defaults to 20"] threshold: Option<u64>,
) -> Result<()> {
    let threshold = ctx
        .data
        .set_file_threshold(threshold.unwrap_or(crate::types::DEFAULT_FILE_THRESHOLD))
        .await
        .wrap_err("failed to set file threshold")?;

    reply(ctx, format!("Set the file threshold to {threshold}.")).await
}

/// Set the date format of giveaway footers.
#[command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn datetime(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "A strftime format like \"%I:%M:%S%p %d/%m/%Y\", leave empty to use timestamps"]
    #[max_length = 100]
    format: Option<String>,
) -> Result<()> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("giveaway used outside of a guild")?;

    if let Some(format) = &format
        && !is_valid_strftime(format)
    {
        return reply(
            ctx,
            format!("`{format}` is not a valid format. See <https://strftime.org> for help."),
        )
        .await;
    }

    ctx.data
        .update_giveaway_defaults(guild_id, |defaults| {
            defaults.datetime_format = format.clone()
        })
        .await
        .wrap_err("failed to set datetime format")?;

    match format {
        Some(format) => {
            let example = Utc::now().format(&format);
            reply(
                ctx,
                format!("Set the datetime format to `{format}`.\nRight now it looks like {example}"),
            )
            .await
        }
        None => reply(ctx, "Giveaways now show timestamps.").await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winners_are_at_least_one() {
        assert_eq!(clamp_winners(-3), 1);
        assert_eq!(clamp_winners(0), 1);
        assert_eq!(clamp_winners(4), 4);
    }

    #[test]
    fn join_days_below_one_mean_no_requirement() {
        assert_eq!(join_days_requirement(0), None);
        assert_eq!(join_days_requirement(-1), None);
        assert_eq!(join_days_requirement(14), Some(14));
    }

    #[test]
    fn role_lists() {
        assert_eq!(role_list(&[]), "None");
        assert_eq!(
            role_list(&[RoleId::new(1), RoleId::new(2)]),
            "<@&1>, <@&2>"
        );
    }
}
