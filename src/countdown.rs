use chrono::{DateTime, Utc};
use color_eyre::{Result, eyre::Context as _};
use poise::serenity_prelude::*;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    database,
    lifecycle::{EditOutcome, Pass, Rendered, Timed},
    types::{Countdown, Data},
    util::{is_not_found, time_remaining},
};

const STARTED: &str = "🎉 New Countdown Started! 🎉";
const ENDED: &str = "❗ Countdown Ended! ❗";

const SPACER: &str = "\u{200b}";

impl Timed for Countdown {
    fn message_id(&self) -> MessageId {
        self.message_id
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    fn rendered_mut(&mut self) -> &mut Rendered {
        &mut self.rendered
    }
}

/// What a countdown message shows at a point in time.
#[derive(Debug, PartialEq, Eq)]
enum View {
    Running { remaining: String },
    Ended,
}

impl View {
    fn at(end_time: DateTime<Utc>, now: DateTime<Utc>) -> View {
        if end_time <= now {
            View::Ended
        } else {
            View::Running {
                remaining: time_remaining(end_time, now),
            }
        }
    }

    fn remaining(self) -> Option<String> {
        match self {
            View::Running { remaining } => Some(remaining),
            View::Ended => None,
        }
    }
}

fn render(title: &str, end_time: DateTime<Utc>, now: DateTime<Utc>) -> (&'static str, CreateEmbed) {
    let embed = CreateEmbed::new()
        .title(title)
        .timestamp(end_time)
        .field(SPACER, SPACER, true);

    match View::at(end_time, now) {
        View::Running { remaining } => (
            STARTED,
            embed
                .color(0x00ff00)
                .field("Time Remaining:", remaining, true)
                .footer(CreateEmbedFooter::new("Ends at")),
        ),
        View::Ended => (
            ENDED,
            embed
                .color(0xff0000)
                .footer(CreateEmbedFooter::new("Ended at")),
        ),
    }
}

impl Countdown {
    fn view(&self, now: DateTime<Utc>) -> View {
        View::at(self.end_time, now)
    }

    fn message(&self, now: DateTime<Utc>) -> (&'static str, CreateEmbed) {
        render(&self.title, self.end_time, now)
    }

    fn edit(&self, now: DateTime<Utc>) -> EditMessage {
        let (content, embed) = self.message(now);
        EditMessage::new().content(content).embed(embed)
    }
}

/// A countdown that hasn't been posted yet.
pub struct Draft {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub title: String,
    pub ending_message: String,
    pub end_time: DateTime<Utc>,
}

/// Posts a new countdown, stores it and starts refreshing it.
pub async fn start(ctx: &Context, data: &Data, draft: Draft) -> Result<Countdown> {
    let now = Utc::now();

    let (content, embed) = render(&draft.title, draft.end_time, now);
    let message = draft
        .channel_id
        .send_message(ctx, CreateMessage::new().content(content).embed(embed))
        .await
        .wrap_err("failed to send countdown message")?;

    let mut countdown = Countdown {
        guild_id: draft.guild_id,
        channel_id: draft.channel_id,
        message_id: message.id,
        author_id: draft.author_id,
        title: draft.title,
        ending_message: draft.ending_message,
        end_time: draft.end_time,
        rendered: Rendered::default(),
    };

    if let View::Running { remaining } = countdown.view(now) {
        countdown.rendered.update(remaining);
    }

    database::insert_countdown(&data.pool, &countdown).await?;
    data.countdowns.lock().await.insert(countdown.clone());

    info!(
        "Started countdown {} in channel {}",
        countdown.message_id, countdown.channel_id
    );

    Ok(countdown)
}

/// Drops the record, announces the ending message and marks the display as ended.
async fn end(ctx: &Context, data: &Data, countdown: &Countdown) -> Result<()> {
    database::remove_countdown(&data.pool, countdown.message_id).await?;

    if !countdown.ending_message.trim().is_empty() {
        countdown
            .channel_id
            .send_message(ctx, CreateMessage::new().content(&countdown.ending_message))
            .await
            .wrap_err("failed to send ending message")?;
    }

    countdown
        .channel_id
        .edit_message(ctx, countdown.message_id, countdown.edit(Utc::now()))
        .await
        .wrap_err("failed to edit countdown message")?;

    info!("Ended countdown {}", countdown.message_id);

    Ok(())
}

/// Re-renders running countdowns and ends expired ones.
async fn tick(ctx: &Context, data: &Data) {
    let now = Utc::now();
    let Pass { expired, stale } = data
        .countdowns
        .lock()
        .await
        .plan(now, |countdown, now| countdown.view(now).remaining());

    let mut outcomes = Vec::with_capacity(stale.len());
    for countdown in &stale {
        let result = countdown
            .channel_id
            .edit_message(ctx, countdown.message_id, countdown.edit(now))
            .await;

        if let Err(e) = &result
            && !is_not_found(e)
        {
            error!("Failed to update countdown {}: {e:#}", countdown.message_id);
        }
        outcomes.push((countdown.message_id, EditOutcome::of(&result)));
    }

    let gone = data.countdowns.lock().await.settle(outcomes);
    for countdown in gone {
        warn!("Countdown message {} is gone, dropping it", countdown.message_id);
        if let Err(e) = database::remove_countdown(&data.pool, countdown.message_id).await {
            error!("Failed to remove countdown {}: {e:#}", countdown.message_id);
        }
    }

    for countdown in expired {
        if let Err(e) = end(ctx, data, &countdown).await {
            error!("Failed to end countdown {}: {e:#}", countdown.message_id);
        }
    }
}

/// Loads stored countdowns whose message still exists into the registry.
///
/// Countdowns that ended while the bot was offline are ended on the next tick.
async fn restore(ctx: &Context, data: &Data) -> Result<()> {
    let records = database::fetch_countdowns(&data.pool).await?;
    let mut restored = 0;

    for countdown in records {
        match countdown
            .channel_id
            .message(ctx, countdown.message_id)
            .await
        {
            Err(e) if is_not_found(&e) => {
                warn!("Countdown message {} is gone, dropping it", countdown.message_id);
                database::remove_countdown(&data.pool, countdown.message_id).await?;
                continue;
            }
            Err(e) => warn!(
                "Failed to fetch countdown message {}: {e:#}",
                countdown.message_id
            ),
            Ok(_) => {}
        }

        data.countdowns.lock().await.insert(countdown);
        restored += 1;
    }

    info!("Restored {restored} countdowns");

    Ok(())
}

/// An infinite loop that keeps countdown messages up to date.
pub async fn run(ctx: Context, data: Data) {
    if let Err(e) = restore(&ctx, &data).await {
        error!("Failed to restore countdowns: {e:#}");
    }

    loop {
        tick(&ctx, &data).await;
        // re-read every time so interval changes apply on the next tick
        sleep(data.countdown_interval()).await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::{database::memory_pool, lifecycle::Registry};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn countdown(end_time: DateTime<Utc>) -> Countdown {
        Countdown {
            guild_id: GuildId::new(1),
            channel_id: ChannelId::new(2),
            message_id: MessageId::new(3),
            author_id: UserId::new(4),
            title: "New year".into(),
            ending_message: "Happy new year!".into(),
            end_time,
            rendered: Rendered::default(),
        }
    }

    #[test]
    fn running_display_shows_remaining_time() {
        let countdown = countdown(now() + TimeDelta::hours(2) + TimeDelta::seconds(10));

        assert_eq!(
            countdown.view(now()),
            View::Running {
                remaining: "2 hours".into()
            }
        );
        assert_eq!(
            countdown.view(countdown.end_time - TimeDelta::seconds(30)),
            View::Running {
                remaining: "30 seconds".into()
            }
        );
        assert_eq!(countdown.message(now()).0, STARTED);
    }

    #[test]
    fn display_ends_at_end_time() {
        let countdown = countdown(now());

        assert!(countdown.has_ended(now()));
        assert_eq!(countdown.view(now()), View::Ended);
        assert_eq!(countdown.message(now()).0, ENDED);
    }

    #[test]
    fn unchanged_display_is_not_rendered_twice() {
        let mut countdown = countdown(now() + TimeDelta::days(1) + TimeDelta::seconds(30));

        let View::Running { remaining } = countdown.view(now()) else {
            panic!("countdown should be running");
        };
        assert!(countdown.rendered.update(remaining));

        let View::Running { remaining } = countdown.view(now() + TimeDelta::seconds(5))
        else {
            panic!("countdown should be running");
        };
        assert!(!countdown.rendered.update(remaining));
    }

    #[test]
    fn ended_countdowns_are_not_re_rendered() {
        let mut registry = Registry::new();
        registry.insert(countdown(now() + TimeDelta::hours(1)));

        let pass = registry.plan(now() + TimeDelta::hours(2), |c, now| c.view(now).remaining());
        assert_eq!(pass.expired.len(), 1);
        assert!(pass.stale.is_empty());
    }

    #[tokio::test]
    async fn countdown_expired_while_offline_ends_on_first_pass() {
        let pool = memory_pool().await;
        database::insert_countdown(&pool, &countdown(now() - TimeDelta::minutes(30)))
            .await
            .unwrap();

        let mut registry = Registry::new();
        for countdown in database::fetch_countdowns(&pool).await.unwrap() {
            registry.insert(countdown);
        }

        let pass = registry.plan(now(), |c, now| c.view(now).remaining());
        assert_eq!(pass.expired.len(), 1);
        assert_eq!(pass.expired[0].message_id, MessageId::new(3));
        assert!(registry.is_empty());
    }
}
