use chrono::Utc;
use color_eyre::{
    Report, Result,
    eyre::{Context as _, OptionExt as _},
};
use itertools::Itertools;
use poise::{ApplicationContext, CreateReply, command, serenity_prelude::*};

use super::reply;
use crate::{
    types::Data,
    watch2gether::{create_room, running_rooms, save_room},
};

const CREATE: &str = "watch2gether:create";
const CANCEL: &str = "watch2gether:cancel";

/// Create a Watch2Gether room.
#[command(slash_command, guild_only)]
pub async fn watch2gether(
    ctx: ApplicationContext<'_, Data, Report>,

    #[description = "A video to open the room with"] link: Option<String>,
) -> Result<()> {
    let guild_id = ctx.interaction.guild_id.ok_or_eyre("watch2gether used outside of a guild")?;
    let config = &ctx.data.config;

    let Some(api_key) = config.watch2gether_api_key() else {
        return reply(
            ctx,
            "The Watch2Gether API key has not been set. \
             Set `watch2gether-api-key` in the bot's config.toml.",
        )
        .await;
    };

    let rooms = running_rooms(&ctx.data.pool, guild_id, Utc::now(), config.room_lifetime).await?;
    let poise_ctx = poise::Context::Application(ctx);

    if rooms.is_empty() {
        poise_ctx.defer().await?;
    } else {
        let description = rooms
            .iter()
            .map(|room| {
                format!(
                    "[Room URL]({}) (Created by {})",
                    room.room_url,
                    room.author_id.mention()
                )
            })
            .join("\n");

        let handle = poise_ctx
            .send(
                CreateReply::default()
                    .embed(
                        CreateEmbed::new()
                            .title("Currently running rooms:")
                            .description(description)
                            .footer(CreateEmbedFooter::new(
                                "Click on any of the URLs above to enter the room.",
                            )),
                    )
                    .components(vec![CreateActionRow::Buttons(vec![
                        CreateButton::new(CREATE)
                            .label("Create new room")
                            .emoji('➕')
                            .style(ButtonStyle::Success),
                        CreateButton::new(CANCEL)
                            .label("Cancel")
                            .emoji('✖')
                            .style(ButtonStyle::Secondary),
                    ])]),
            )
            .await?;

        let message = handle.message().await?;
        let interaction = message
            .await_component_interaction(ctx.serenity_context)
            .author_id(ctx.interaction.user.id)
            .timeout(config.form_timeout)
            .await;

        let Some(interaction) = interaction else {
            handle
                .edit(
                    poise_ctx,
                    CreateReply::default().content("Timed out!").components(Vec::new()),
                )
                .await?;
            return Ok(());
        };

        // keep the room list but drop the buttons
        let update = CreateInteractionResponseMessage::new().components(Vec::new());

        if interaction.data.custom_id != CREATE {
            interaction
                .create_response(
                    ctx.serenity_context,
                    CreateInteractionResponse::UpdateMessage(update.content("Aborted!")),
                )
                .await
                .wrap_err("failed to send response")?;
            return Ok(());
        }

        interaction
            .create_response(
                ctx.serenity_context,
                CreateInteractionResponse::UpdateMessage(update),
            )
            .await
            .wrap_err("failed to send response")?;
    }

    let room_key = create_room(
        &ctx.data.http_client,
        &config.watch2gether_url,
        api_key,
        link.as_deref(),
    )
    .await?;
    let url = save_room(
        &ctx.data.pool,
        guild_id,
        ctx.interaction.user.id,
        &config.watch2gether_url,
        &room_key,
    )
    .await?;

    poise_ctx
        .send(CreateReply::default().content(format!(
            "New Watch2Gether room created! You can access it through this link: {url}"
        )))
        .await?;

    Ok(())
}
