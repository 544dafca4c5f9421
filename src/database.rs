use std::{path::Path, str::FromStr};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use futures::StreamExt;
use itertools::Itertools;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use sqlx::{Executor, FromRow, SqlitePool, query, query_as, sqlite::SqliteConnectOptions};
use tracing::warn;

use crate::types::{Clock, Countdown, Giveaway, GiveawayDefaults, Room};

/// Connects to the database, creating it if it doesn't exist.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }

    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true),
    )
    .await
    .wrap_err_with(|| format!("failed to connect to {}", path.display()))?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// Creates the tables if they don't exist.
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    let mut stream = pool.execute_many(query(include_str!("../assets/create-tables.sql")));

    while let Some(result) = stream.next().await {
        result.wrap_err("failed to create table")?;
    }

    Ok(())
}

fn join_roles(roles: &[RoleId]) -> String {
    roles.iter().map(|id| id.to_string()).join(",")
}

fn split_roles(roles: &str) -> Result<Vec<RoleId>> {
    roles
        .split_terminator(',')
        .map(|id| {
            id.parse::<u64>()
                .ok()
                .filter(|id| *id != 0)
                .map(RoleId::new)
                .ok_or(eyre!("invalid role id `{id}`"))
        })
        .collect()
}

/// Fetches a global setting.
pub async fn fetch_setting(pool: &SqlitePool, key: &str) -> Result<Option<i64>> {
    query_as::<_, (i64,)>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map(|row| row.map(|(value,)| value))
        .wrap_err_with(|| format!("failed to fetch setting {key}"))
}

/// Sets a global setting.
pub async fn set_setting(pool: &SqlitePool, key: &str, value: i64) -> Result<()> {
    query(
        "INSERT INTO settings (key, value)
         VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("failed to set setting {key}"))?;

    Ok(())
}

#[derive(FromRow)]
struct ClockRow {
    channel_id: i64,
    guild_id: i64,
    timezone: String,
    time_format: String,
}

impl TryFrom<ClockRow> for Clock {
    type Error = color_eyre::Report;

    fn try_from(row: ClockRow) -> Result<Clock> {
        Ok(Clock {
            guild_id: GuildId::new(row.guild_id as u64),
            channel_id: ChannelId::new(row.channel_id as u64),
            timezone: Tz::from_str(&row.timezone)
                .map_err(|e| eyre!("invalid timezone {}: {e}", row.timezone))?,
            format: row.time_format,
        })
    }
}

/// Adds a clock, replacing any clock on the same channel.
pub async fn insert_clock(pool: &SqlitePool, clock: &Clock) -> Result<()> {
    query(
        "INSERT OR REPLACE INTO clocks (channel_id, guild_id, timezone, time_format)
         VALUES (?, ?, ?, ?)",
    )
    .bind(clock.channel_id.get() as i64)
    .bind(clock.guild_id.get() as i64)
    .bind(clock.timezone.name())
    .bind(&clock.format)
    .execute(pool)
    .await
    .wrap_err("failed to insert clock")?;

    Ok(())
}

/// Fetches all clocks, optionally only those of one guild.
///
/// Rows that can't be read are skipped.
pub async fn fetch_clocks(pool: &SqlitePool, guild_id: Option<GuildId>) -> Result<Vec<Clock>> {
    let rows = match guild_id {
        Some(guild_id) => {
            query_as::<_, ClockRow>(
                "SELECT channel_id, guild_id, timezone, time_format
                 FROM clocks
                 WHERE guild_id = ?",
            )
            .bind(guild_id.get() as i64)
            .fetch_all(pool)
            .await
        }
        None => {
            query_as::<_, ClockRow>(
                "SELECT channel_id, guild_id, timezone, time_format
                 FROM clocks",
            )
            .fetch_all(pool)
            .await
        }
    }
    .wrap_err("failed to fetch clocks")?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let channel_id = row.channel_id;
            Clock::try_from(row)
                .inspect_err(|e| warn!("Skipping clock {channel_id}: {e:#}"))
                .ok()
        })
        .collect())
}

/// Removes the clock on the given channel, returning whether one existed.
pub async fn remove_clock(pool: &SqlitePool, channel_id: ChannelId) -> Result<bool> {
    Ok(query("DELETE FROM clocks WHERE channel_id = ?")
        .bind(channel_id.get() as i64)
        .execute(pool)
        .await
        .wrap_err("failed to remove clock")?
        .rows_affected()
        > 0)
}

/// Removes every clock and returns how many there were.
pub async fn clear_clocks(pool: &SqlitePool) -> Result<u64> {
    Ok(query("DELETE FROM clocks")
        .execute(pool)
        .await
        .wrap_err("failed to clear clocks")?
        .rows_affected())
}

#[derive(FromRow)]
struct CountdownRow {
    message_id: i64,
    guild_id: i64,
    channel_id: i64,
    author_id: i64,
    title: String,
    ending_message: String,
    end_time: DateTime<Utc>,
}

/// Adds a new countdown to the database.
pub async fn insert_countdown(pool: &SqlitePool, countdown: &Countdown) -> Result<()> {
    query(
        "INSERT INTO countdowns (message_id, guild_id, channel_id, author_id, title, ending_message, end_time)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(countdown.message_id.get() as i64)
    .bind(countdown.guild_id.get() as i64)
    .bind(countdown.channel_id.get() as i64)
    .bind(countdown.author_id.get() as i64)
    .bind(&countdown.title)
    .bind(&countdown.ending_message)
    .bind(countdown.end_time)
    .execute(pool)
    .await
    .wrap_err("failed to insert countdown")?;

    Ok(())
}

/// Fetches all countdowns from the database.
pub async fn fetch_countdowns(pool: &SqlitePool) -> Result<Vec<Countdown>> {
    Ok(query_as::<_, CountdownRow>(
        "SELECT message_id, guild_id, channel_id, author_id, title, ending_message, end_time
         FROM countdowns
         ORDER BY end_time",
    )
    .fetch_all(pool)
    .await
    .wrap_err("failed to fetch countdowns")?
    .into_iter()
    .map(|row| Countdown {
        guild_id: GuildId::new(row.guild_id as u64),
        channel_id: ChannelId::new(row.channel_id as u64),
        message_id: MessageId::new(row.message_id as u64),
        author_id: UserId::new(row.author_id as u64),
        title: row.title,
        ending_message: row.ending_message,
        end_time: row.end_time,
        rendered: Default::default(),
    })
    .collect())
}

/// Removes the countdown displayed in the given message.
pub async fn remove_countdown(pool: &SqlitePool, message_id: MessageId) -> Result<()> {
    query("DELETE FROM countdowns WHERE message_id = ?")
        .bind(message_id.get() as i64)
        .execute(pool)
        .await
        .wrap_err("failed to remove countdown")?;

    Ok(())
}

#[derive(FromRow)]
struct GiveawayRow {
    message_id: i64,
    guild_id: i64,
    channel_id: i64,
    author_id: i64,
    item: String,
    ending_message: String,
    end_time: DateTime<Utc>,
    winners: i64,
    roles: String,
    join_days: Option<i64>,
}

/// Adds a new giveaway to the database.
pub async fn insert_giveaway(pool: &SqlitePool, giveaway: &Giveaway) -> Result<()> {
    query(
        "INSERT INTO giveaways (message_id, guild_id, channel_id, author_id, item, ending_message, end_time, winners, roles, join_days)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(giveaway.message_id.get() as i64)
    .bind(giveaway.guild_id.get() as i64)
    .bind(giveaway.channel_id.get() as i64)
    .bind(giveaway.author_id.get() as i64)
    .bind(&giveaway.item)
    .bind(&giveaway.ending_message)
    .bind(giveaway.end_time)
    .bind(giveaway.winners as i64)
    .bind(join_roles(&giveaway.roles))
    .bind(giveaway.join_days.map(i64::from))
    .execute(pool)
    .await
    .wrap_err("failed to insert giveaway")?;

    Ok(())
}

/// Fetches all giveaways from the database.
pub async fn fetch_giveaways(pool: &SqlitePool) -> Result<Vec<Giveaway>> {
    query_as::<_, GiveawayRow>(
        "SELECT message_id, guild_id, channel_id, author_id, item, ending_message, end_time, winners, roles, join_days
         FROM giveaways
         ORDER BY end_time",
    )
    .fetch_all(pool)
    .await
    .wrap_err("failed to fetch giveaways")?
    .into_iter()
    .map(|row| {
        Ok(Giveaway {
            guild_id: GuildId::new(row.guild_id as u64),
            channel_id: ChannelId::new(row.channel_id as u64),
            message_id: MessageId::new(row.message_id as u64),
            author_id: UserId::new(row.author_id as u64),
            item: row.item,
            ending_message: row.ending_message,
            end_time: row.end_time,
            winners: row.winners.max(1) as u32,
            roles: split_roles(&row.roles)?,
            join_days: row.join_days.map(|days| days as u32),
            rendered: Default::default(),
        })
    })
    .collect()
}

/// Removes the giveaway displayed in the given message.
pub async fn remove_giveaway(pool: &SqlitePool, message_id: MessageId) -> Result<()> {
    query("DELETE FROM giveaways WHERE message_id = ?")
        .bind(message_id.get() as i64)
        .execute(pool)
        .await
        .wrap_err("failed to remove giveaway")?;

    Ok(())
}

#[derive(FromRow)]
struct GiveawayDefaultsRow {
    channel_id: Option<i64>,
    author_id: Option<i64>,
    ending_message: Option<String>,
    winners: Option<i64>,
    roles: String,
    join_days: Option<i64>,
    datetime_format: Option<String>,
}

/// Fetches the giveaway defaults of a guild, or empty defaults if none were set.
pub async fn fetch_giveaway_defaults(
    pool: &SqlitePool,
    guild_id: GuildId,
) -> Result<GiveawayDefaults> {
    let Some(row) = query_as::<_, GiveawayDefaultsRow>(
        "SELECT channel_id, author_id, ending_message, winners, roles, join_days, datetime_format
         FROM giveaway_defaults
         WHERE guild_id = ?",
    )
    .bind(guild_id.get() as i64)
    .fetch_optional(pool)
    .await
    .wrap_err("failed to fetch giveaway defaults")?
    else {
        return Ok(GiveawayDefaults::default());
    };

    Ok(GiveawayDefaults {
        channel_id: row.channel_id.map(|id| ChannelId::new(id as u64)),
        author_id: row.author_id.map(|id| UserId::new(id as u64)),
        ending_message: row.ending_message,
        winners: row.winners.map(|winners| winners.max(1) as u32),
        roles: split_roles(&row.roles)?,
        join_days: row.join_days.map(|days| days as u32),
        datetime_format: row.datetime_format,
    })
}

/// Stores the giveaway defaults of a guild.
pub async fn save_giveaway_defaults(
    pool: &SqlitePool,
    guild_id: GuildId,
    defaults: &GiveawayDefaults,
) -> Result<()> {
    query(
        "INSERT OR REPLACE INTO giveaway_defaults (guild_id, channel_id, author_id, ending_message, winners, roles, join_days, datetime_format)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(guild_id.get() as i64)
    .bind(defaults.channel_id.map(|id| id.get() as i64))
    .bind(defaults.author_id.map(|id| id.get() as i64))
    .bind(&defaults.ending_message)
    .bind(defaults.winners.map(i64::from))
    .bind(join_roles(&defaults.roles))
    .bind(defaults.join_days.map(i64::from))
    .bind(&defaults.datetime_format)
    .execute(pool)
    .await
    .wrap_err("failed to save giveaway defaults")?;

    Ok(())
}

#[derive(FromRow)]
struct RoomRow {
    id: i64,
    guild_id: i64,
    room_key: String,
    room_url: String,
    author_id: i64,
    created_at: DateTime<Utc>,
}

/// Adds a new Watch2Gether room and returns its ID.
pub async fn insert_room(
    pool: &SqlitePool,
    guild_id: GuildId,
    room_key: &str,
    room_url: &str,
    author_id: UserId,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    Ok(query(
        "INSERT INTO rooms (guild_id, room_key, room_url, author_id, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(guild_id.get() as i64)
    .bind(room_key)
    .bind(room_url)
    .bind(author_id.get() as i64)
    .bind(created_at)
    .execute(pool)
    .await
    .wrap_err("failed to insert room")?
    .last_insert_rowid())
}

/// Fetches the rooms of a guild, oldest first.
pub async fn fetch_rooms(pool: &SqlitePool, guild_id: GuildId) -> Result<Vec<Room>> {
    Ok(query_as::<_, RoomRow>(
        "SELECT id, guild_id, room_key, room_url, author_id, created_at
         FROM rooms
         WHERE guild_id = ?
         ORDER BY created_at",
    )
    .bind(guild_id.get() as i64)
    .fetch_all(pool)
    .await
    .wrap_err("failed to fetch rooms")?
    .into_iter()
    .map(|row| Room {
        id: row.id,
        guild_id: GuildId::new(row.guild_id as u64),
        room_key: row.room_key,
        room_url: row.room_url,
        author_id: UserId::new(row.author_id as u64),
        created_at: row.created_at,
    })
    .collect())
}

/// Removes the room with the given ID.
pub async fn remove_room(pool: &SqlitePool, room_id: i64) -> Result<()> {
    query("DELETE FROM rooms WHERE id = ?")
        .bind(room_id)
        .execute(pool)
        .await
        .wrap_err("failed to remove room")?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    create_tables(&pool).await.unwrap();
    pool
}
