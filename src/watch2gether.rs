use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::{Result, eyre::Context as _};
use poise::serenity_prelude::{GuildId, UserId};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::{database, types::Room};

#[derive(Deserialize)]
struct CreatedRoom {
    streamkey: String,
}

/// The URL of a room.
pub fn room_url(base_url: &str, room_key: &str) -> String {
    format!("{}/rooms/{room_key}", base_url.trim_end_matches('/'))
}

/// Whether a room is older than `lifetime`.
pub fn is_expired(room: &Room, now: DateTime<Utc>, lifetime: Duration) -> bool {
    TimeDelta::from_std(lifetime).is_ok_and(|lifetime| now - room.created_at > lifetime)
}

/// Creates a room, optionally already playing `share`, and returns its key.
pub async fn create_room(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    share: Option<&str>,
) -> Result<String> {
    let room = client
        .post(format!("{}/rooms/create.json", base_url.trim_end_matches('/')))
        .form(&[("api_key", api_key), ("share", share.unwrap_or_default())])
        .send()
        .await
        .wrap_err("failed to reach Watch2Gether")?
        .error_for_status()
        .wrap_err("Watch2Gether refused to create a room")?
        .json::<CreatedRoom>()
        .await
        .wrap_err("failed to read the Watch2Gether response")?;

    Ok(room.streamkey)
}

/// Fetches the rooms of a guild that are still running, deleting expired ones.
pub async fn running_rooms(
    pool: &SqlitePool,
    guild_id: GuildId,
    now: DateTime<Utc>,
    lifetime: Duration,
) -> Result<Vec<Room>> {
    let mut running = Vec::new();

    for room in database::fetch_rooms(pool, guild_id).await? {
        if is_expired(&room, now, lifetime) {
            database::remove_room(pool, room.id).await?;
        } else {
            running.push(room);
        }
    }

    Ok(running)
}

/// Stores a newly created room.
pub async fn save_room(
    pool: &SqlitePool,
    guild_id: GuildId,
    author_id: UserId,
    base_url: &str,
    room_key: &str,
) -> Result<String> {
    let url = room_url(base_url, room_key);
    database::insert_room(pool, guild_id, room_key, &url, author_id, Utc::now()).await?;
    info!("Created Watch2Gether room {room_key} in guild {guild_id}");
    Ok(url)
}
