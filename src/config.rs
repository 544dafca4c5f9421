use std::{fs, path::PathBuf, time::Duration};

use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use figment::{
    Figment,
    providers::{Format, Toml},
};
use poise::serenity_prelude::*;
use serde::Deserialize;

use crate::util::deserialize_duration;

/// The configuration for the bot.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The guild to register commands in.
    ///
    /// Commands are registered globally when this is not set.
    #[serde(rename = "guild-id", default)]
    pub guild: Option<GuildId>,

    /// The path to the SQLite database.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// The form timeout duration in seconds.
    ///
    /// If a form or confirmation is not answered within this duration, it will be cancelled.
    #[serde(rename = "form-timeout", default = "default_form_timeout")]
    #[serde(deserialize_with = "deserialize_duration")]
    pub form_timeout: Duration,

    /// How often clock channels are renamed, in seconds.
    #[serde(rename = "clock-interval", default = "default_clock_interval")]
    #[serde(deserialize_with = "deserialize_duration")]
    pub clock_interval: Duration,

    /// How long a Watch2Gether room is considered running, in seconds.
    #[serde(rename = "room-lifetime", default = "default_room_lifetime")]
    #[serde(deserialize_with = "deserialize_duration")]
    pub room_lifetime: Duration,

    #[serde(rename = "watch2gether-api-key", default)]
    pub watch2gether_api_key: Option<String>,

    /// The base URL of the Watch2Gether site.
    #[serde(rename = "watch2gether-url", default = "default_watch2gether_url")]
    pub watch2gether_url: String,
}

fn default_database() -> PathBuf {
    PathBuf::from("./data/database.sqlite")
}

fn default_form_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_clock_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_room_lifetime() -> Duration {
    Duration::from_secs(12 * 60 * 60)
}

fn default_watch2gether_url() -> String {
    "https://w2g.tv".into()
}

impl Config {
    pub fn load() -> Result<Config> {
        if !fs::exists("config.toml").wrap_err("failed to check if config.toml exists")? {
            fs::write("config.toml", include_str!("../assets/default-config.toml"))
                .wrap_err("failed to write config.toml")?;
            return Err(eyre!("config.toml not found, created default config"));
        }

        Config::extract(Figment::new().merge(Toml::file_exact("config.toml")))
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config = figment
            .extract::<Config>()
            .wrap_err("failed to load config")?;

        if config.clock_interval.is_zero() {
            return Err(eyre!("clock-interval must be greater than zero"));
        }

        Ok(config)
    }

    /// Returns the Watch2Gether API key, ignoring an empty one.
    pub fn watch2gether_api_key(&self) -> Option<&str> {
        self.watch2gether_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Config> {
        Config::extract(Figment::new().merge(Toml::string(toml)))
    }

    #[test]
    fn bundled_default_config_parses() {
        let config = parse(include_str!("../assets/default-config.toml")).unwrap();

        assert_eq!(config.guild, None);
        assert_eq!(config.form_timeout, Duration::from_secs(60));
        assert_eq!(config.clock_interval, Duration::from_secs(300));
        assert_eq!(config.room_lifetime, Duration::from_secs(43200));
        assert_eq!(config.watch2gether_api_key(), None);
        assert_eq!(config.watch2gether_url, "https://w2g.tv");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("").unwrap();

        assert_eq!(config.database, PathBuf::from("./data/database.sqlite"));
        assert_eq!(config.form_timeout, Duration::from_secs(60));
    }

    #[test]
    fn overrides_are_read() {
        let config = parse(
            r#"
            guild-id = 1234
            form-timeout = 30
            watch2gether-api-key = "  secret "
            "#,
        )
        .unwrap();

        assert_eq!(config.guild, Some(GuildId::new(1234)));
        assert_eq!(config.form_timeout, Duration::from_secs(30));
        assert_eq!(config.watch2gether_api_key(), Some("secret"));
    }

    #[test]
    fn zero_clock_interval_is_rejected() {
        assert!(parse("clock-interval = 0").is_err());
    }
}
