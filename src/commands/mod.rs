mod clock;
mod countdown;
mod giveaway;
mod watch2gether;

use color_eyre::{Report, Result, eyre::Context as _};
use poise::{ApplicationContext, Command, serenity_prelude::*};

use crate::{types::Data, util::parse_role_token};

/// Answers a submitted modal with an ephemeral message.
async fn respond(ctx: &Context, interaction: &ModalInteraction, content: impl Into<String>) -> Result<()> {
    interaction
        .create_response(
            ctx,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await
        .wrap_err("failed to send response")
}

/// Sends an ephemeral reply to a slash command.
async fn reply(ctx: ApplicationContext<'_, Data, Report>, content: impl Into<String>) -> Result<()> {
    poise::Context::Application(ctx)
        .send(poise::CreateReply::default().content(content).ephemeral(true))
        .await
        .wrap_err("failed to send reply")?;
    Ok(())
}

/// Resolves a list of role mentions, ids or names separated by commas or spaces.
///
/// Returns the first token that matches no role as the error.
fn resolve_roles(ctx: &Context, guild_id: GuildId, input: &str) -> Result<Vec<RoleId>, String> {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return Err(input.to_string());
    };

    let mut roles = Vec::new();

    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
    {
        let role = parse_role_token(token)
            .filter(|role| guild.roles.contains_key(role))
            .or_else(|| {
                guild
                    .roles
                    .values()
                    .find(|role| role.name.eq_ignore_ascii_case(token))
                    .map(|role| role.id)
            })
            .ok_or_else(|| token.to_string())?;

        if !roles.contains(&role) {
            roles.push(role);
        }
    }

    Ok(roles)
}

pub fn get() -> Vec<Command<Data, Report>> {
    vec![
        clock::clock(),
        countdown::countdown(),
        countdown::countdownset(),
        giveaway::giveaway(),
        giveaway::giveawayset(),
        watch2gether::watch2gether(),
    ]
}
