use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use color_eyre::{Result, eyre::Context as _};
use poise::serenity_prelude::*;
use sqlx::sqlite::SqlitePool;
use tokio::sync::Mutex;

use crate::{config::Config, database, lifecycle::Registry, lifecycle::Rendered};

/// The smallest allowed refresh interval of countdowns and giveaways, in seconds.
pub const MIN_INTERVAL: u64 = 5;

/// The default winners file threshold.
pub const DEFAULT_FILE_THRESHOLD: u64 = 20;

/// The largest allowed winners file threshold.
pub const MAX_FILE_THRESHOLD: u64 = 50;

const COUNTDOWN_INTERVAL: &str = "countdown-interval";
const GIVEAWAY_INTERVAL: &str = "giveaway-interval";
const FILE_THRESHOLD: &str = "file-threshold";

pub fn clamp_interval(seconds: u64) -> u64 {
    seconds.max(MIN_INTERVAL)
}

pub fn clamp_file_threshold(threshold: u64) -> u64 {
    threshold.clamp(1, MAX_FILE_THRESHOLD)
}

async fn load_setting(pool: &SqlitePool, key: &str, default: u64) -> Result<u64> {
    Ok(database::fetch_setting(pool, key)
        .await?
        .map_or(default, |value| value.max(0) as u64))
}

#[derive(Clone)]
pub struct Data {
    pub pool: SqlitePool,
    pub config: Config,
    pub http_client: reqwest::Client,
    pub countdowns: Arc<Mutex<Registry<Countdown>>>, // shared between the commands and the refresh loop
    pub giveaways: Arc<Mutex<Registry<Giveaway>>>,
    countdown_interval: Arc<AtomicU64>,
    giveaway_interval: Arc<AtomicU64>,
    file_threshold: Arc<AtomicU64>,
}

impl Data {
    /// Loads the global settings. The registries start empty and are filled once the client is ready.
    pub async fn new(pool: SqlitePool, config: Config) -> Result<Data> {
        let countdown_interval =
            clamp_interval(load_setting(&pool, COUNTDOWN_INTERVAL, MIN_INTERVAL).await?);
        let giveaway_interval =
            clamp_interval(load_setting(&pool, GIVEAWAY_INTERVAL, MIN_INTERVAL).await?);
        let file_threshold = clamp_file_threshold(
            load_setting(&pool, FILE_THRESHOLD, DEFAULT_FILE_THRESHOLD).await?,
        );

        Ok(Data {
            pool,
            config,
            http_client: reqwest::Client::new(),
            countdowns: Arc::new(Mutex::new(Registry::new())),
            giveaways: Arc::new(Mutex::new(Registry::new())),
            countdown_interval: Arc::new(AtomicU64::new(countdown_interval)),
            giveaway_interval: Arc::new(AtomicU64::new(giveaway_interval)),
            file_threshold: Arc::new(AtomicU64::new(file_threshold)),
        })
    }

    /// How often running countdowns are refreshed.
    pub fn countdown_interval(&self) -> Duration {
        Duration::from_secs(self.countdown_interval.load(Ordering::Relaxed))
    }

    /// Sets the countdown refresh interval and returns the value that was stored.
    pub async fn set_countdown_interval(&self, seconds: u64) -> Result<u64> {
        let seconds = clamp_interval(seconds);
        database::set_setting(&self.pool, COUNTDOWN_INTERVAL, seconds as i64)
            .await
            .wrap_err("failed to store countdown interval")?;
        self.countdown_interval.store(seconds, Ordering::Relaxed);
        Ok(seconds)
    }

    /// How often running giveaways are refreshed.
    pub fn giveaway_interval(&self) -> Duration {
        Duration::from_secs(self.giveaway_interval.load(Ordering::Relaxed))
    }

    /// Sets the giveaway refresh interval and returns the value that was stored.
    pub async fn set_giveaway_interval(&self, seconds: u64) -> Result<u64> {
        let seconds = clamp_interval(seconds);
        database::set_setting(&self.pool, GIVEAWAY_INTERVAL, seconds as i64)
            .await
            .wrap_err("failed to store giveaway interval")?;
        self.giveaway_interval.store(seconds, Ordering::Relaxed);
        Ok(seconds)
    }

    /// The number of winners above which they are sent as a file instead of mentions.
    pub fn file_threshold(&self) -> usize {
        self.file_threshold.load(Ordering::Relaxed) as usize
    }

    pub async fn set_file_threshold(&self, threshold: u64) -> Result<u64> {
        let threshold = clamp_file_threshold(threshold);
        database::set_setting(&self.pool, FILE_THRESHOLD, threshold as i64)
            .await
            .wrap_err("failed to store file threshold")?;
        self.file_threshold.store(threshold, Ordering::Relaxed);
        Ok(threshold)
    }

    /// Fetches the giveaway defaults of a guild.
    pub async fn giveaway_defaults(&self, guild_id: GuildId) -> Result<GiveawayDefaults> {
        database::fetch_giveaway_defaults(&self.pool, guild_id).await
    }

    /// Modifies and stores the giveaway defaults of a guild.
    pub async fn update_giveaway_defaults(
        &self,
        guild_id: GuildId,
        update: impl FnOnce(&mut GiveawayDefaults),
    ) -> Result<GiveawayDefaults> {
        let mut defaults = self.giveaway_defaults(guild_id).await?;
        update(&mut defaults);
        database::save_giveaway_defaults(&self.pool, guild_id, &defaults).await?;
        Ok(defaults)
    }
}

/// A voice channel whose name shows the current time in a timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct Clock {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub timezone: Tz,
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub title: String,
    pub ending_message: String,
    pub end_time: DateTime<Utc>,
    pub rendered: Rendered,
}

#[derive(Debug, Clone)]
pub struct Giveaway {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    /// The host of the giveaway.
    pub author_id: UserId,
    /// What is being given away.
    pub item: String,
    pub ending_message: String,
    pub end_time: DateTime<Utc>,
    /// The number of winners, at least 1.
    pub winners: u32,
    /// Roles an entrant must all have.
    pub roles: Vec<RoleId>,
    /// Days an entrant must have been in the guild.
    pub join_days: Option<u32>,
    pub rendered: Rendered,
}

/// The per-guild values used by quick giveaways.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GiveawayDefaults {
    pub channel_id: Option<ChannelId>,
    pub author_id: Option<UserId>,
    pub ending_message: Option<String>,
    pub winners: Option<u32>,
    pub roles: Vec<RoleId>,
    pub join_days: Option<u32>,
    /// A strftime format for giveaway footers. Discord timestamps are used when unset.
    pub datetime_format: Option<String>,
}

/// A Watch2Gether room created through the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: i64,
    pub guild_id: GuildId,
    pub room_key: String,
    pub room_url: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_pool;
    use figment::{
        Figment,
        providers::{Format, Toml},
    };

    fn config() -> Config {
        Figment::new()
            .merge(Toml::string(""))
            .extract()
            .unwrap()
    }

    #[test]
    fn clamps() {
        assert_eq!(clamp_interval(1), 5);
        assert_eq!(clamp_interval(30), 30);
        assert_eq!(clamp_file_threshold(0), 1);
        assert_eq!(clamp_file_threshold(20), 20);
        assert_eq!(clamp_file_threshold(500), 50);
    }

    #[tokio::test]
    async fn settings_default_and_persist() {
        let pool = memory_pool().await;
        let data = Data::new(pool.clone(), config()).await.unwrap();

        assert_eq!(data.countdown_interval(), Duration::from_secs(5));
        assert_eq!(data.giveaway_interval(), Duration::from_secs(5));
        assert_eq!(data.file_threshold(), 20);

        assert_eq!(data.set_countdown_interval(2).await.unwrap(), 5);
        assert_eq!(data.set_giveaway_interval(30).await.unwrap(), 30);
        assert_eq!(data.set_file_threshold(99).await.unwrap(), 50);

        let reloaded = Data::new(pool, config()).await.unwrap();
        assert_eq!(reloaded.giveaway_interval(), Duration::from_secs(30));
        assert_eq!(reloaded.file_threshold(), 50);
    }

    #[tokio::test]
    async fn giveaway_defaults_update_in_place() {
        let data = Data::new(memory_pool().await, config()).await.unwrap();
        let guild = GuildId::new(1);

        data.update_giveaway_defaults(guild, |defaults| defaults.winners = Some(3))
            .await
            .unwrap();
        let defaults = data
            .update_giveaway_defaults(guild, |defaults| defaults.join_days = Some(7))
            .await
            .unwrap();

        assert_eq!(defaults.winners, Some(3));
        assert_eq!(defaults.join_days, Some(7));
        assert_eq!(data.giveaway_defaults(guild).await.unwrap(), defaults);
    }
}
