use chrono::{DateTime, Utc};
use chrono_tz::{TZ_VARIANTS, Tz};
use color_eyre::Result;
use poise::serenity_prelude::*;
use tokio::time::interval;
use tracing::{debug, error, warn};

use crate::{
    database,
    types::{Clock, Data},
    util::{is_not_found, is_valid_strftime},
};

pub const DEFAULT_FORMAT: &str = "%A, %I:%M %p (%Z)";

/// Discord rejects longer channel names.
const MAX_NAME_LENGTH: usize = 100;

/// Finds a timezone by its IANA name, ignoring case.
pub fn find_timezone(name: &str) -> Option<Tz> {
    let name = name.trim();
    TZ_VARIANTS
        .iter()
        .find(|tz| tz.name().eq_ignore_ascii_case(name))
        .copied()
}

impl Clock {
    /// The channel name showing `now` in the clock's timezone.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let format = if is_valid_strftime(&self.format) {
            self.format.as_str()
        } else {
            DEFAULT_FORMAT
        };

        now.with_timezone(&self.timezone)
            .format(format)
            .to_string()
            .chars()
            .take(MAX_NAME_LENGTH)
            .collect()
    }
}

/// Renames every clock channel, dropping clocks whose channel was deleted.
async fn update_clocks(ctx: &Context, data: &Data) -> Result<()> {
    let now = Utc::now();

    for clock in database::fetch_clocks(&data.pool, None).await? {
        let name = clock.render(now);

        match clock
            .channel_id
            .edit(ctx, EditChannel::new().name(&name))
            .await
        {
            Ok(_) => debug!("Renamed clock {} to {name}", clock.channel_id),
            Err(e) if is_not_found(&e) => {
                warn!("Clock channel {} is gone, dropping it", clock.channel_id);
                database::remove_clock(&data.pool, clock.channel_id).await?;
            }
            Err(e) => error!("Failed to rename clock {}: {e:#}", clock.channel_id),
        }
    }

    Ok(())
}

/// An infinite loop that keeps clock channel names up to date.
pub async fn run(ctx: Context, data: Data) {
    let mut interval = interval(data.config.clock_interval);

    loop {
        interval.tick().await;

        if let Err(e) = update_clocks(&ctx, &data).await {
            error!("Failed to update clocks: {e:#}");
        }
    }
}
