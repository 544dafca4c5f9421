use color_eyre::{Result, eyre::Report};
use poise::{FrameworkContext, FrameworkError, serenity_prelude::*};
use tracing::{error, info};

use crate::{giveaway, types::Data};

pub async fn event_handler(
    ctx: &Context,
    event: &FullEvent,
    _framework: FrameworkContext<'_, Data, Report>,
    data: &Data,
) -> Result<()> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!("Connected as {}", data_about_bot.user.name);
        }
        FullEvent::ReactionAdd { add_reaction } => {
            if let Err(e) = giveaway::enforce_entry(ctx, data, add_reaction).await {
                error!(
                    "Failed to check giveaway entry on {}: {e:#}",
                    add_reaction.message_id
                );
            }
        }
        _ => {}
    }

    Ok(())
}

pub async fn error_handler(err: FrameworkError<'_, Data, Report>) {
    match err {
        FrameworkError::Setup { error, .. } => error!("Setup error: {error:#}"),
        FrameworkError::EventHandler { error, .. } => error!("Event handler error: {error:#}"),
        FrameworkError::Command { error, ctx, .. } => {
            error!("Command error in /{}: {error:#}", ctx.command().qualified_name);

            // the interaction may already be answered, in which case this is a follow-up
            if let Err(e) = ctx
                .send(
                    poise::CreateReply::default()
                        .content("There was an error processing your command.")
                        .ephemeral(true),
                )
                .await
            {
                error!("Failed to report command error: {e:#}");
            }
        }
        FrameworkError::CommandPanic {
            payload: Some(payload),
            ..
        } => error!("Command panic: {payload}"),
        FrameworkError::ArgumentParse { error, .. } => error!("Argument parse error: {error:#}"),
        FrameworkError::CommandStructureMismatch { description, .. } => {
            error!("Command structure mismatch: {description}")
        }
        FrameworkError::CommandCheckFailed {
            error: Some(error), ..
        } => error!("Command check failed: {error:#}"),
        FrameworkError::NotAnOwner { ctx, .. } => {
            if let Err(e) = ctx
                .send(
                    poise::CreateReply::default()
                        .content("Only the bot owner can use this command.")
                        .ephemeral(true),
                )
                .await
            {
                error!("Failed to report owner check: {e:#}");
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Failed to handle framework error: {e:#}");
            }
        }
    }
}
