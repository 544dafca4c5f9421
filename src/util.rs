use std::time::Duration;

use chrono::{
    DateTime, TimeDelta, Utc,
    format::{Item, StrftimeItems},
};
use chrono_english::Dialect;
use color_eyre::{
    Result,
    eyre::{Context as _, eyre},
};
use itertools::Itertools;
use poise::serenity_prelude::{MessageId, RoleId};
use serde::{Deserialize, Deserializer};

pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Duration::from_secs(u64::deserialize(deserializer)?))
}

/// Joins items in a human readable way, e.g. `a, b and c`.
pub fn human_join(items: &[String], last: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [rest @ .., tail] => format!("{} {last} {tail}", rest.iter().join(", ")),
    }
}

/// Formats the time between `now` and `end`, e.g. `2 days, 3 hours and 4 minutes`.
///
/// Times in the past get an ` ago` suffix.
pub fn human_timedelta(end: DateTime<Utc>, now: DateTime<Utc>, ignore_seconds: bool) -> String {
    let (delta, suffix) = if end >= now {
        (end - now, "")
    } else {
        (now - end, " ago")
    };

    let units = [
        (delta.num_days(), "day"),
        (delta.num_hours() % 24, "hour"),
        (delta.num_minutes() % 60, "minute"),
        (
            if ignore_seconds {
                0
            } else {
                delta.num_seconds() % 60
            },
            "second",
        ),
    ];

    let parts = units
        .into_iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| match amount {
            1 => format!("1 {unit}"),
            _ => format!("{amount} {unit}s"),
        })
        .collect::<Vec<_>>();

    if parts.is_empty() {
        "now".into()
    } else {
        format!("{}{suffix}", human_join(&parts, "and"))
    }
}

/// Formats the time remaining until `end`, omitting seconds while more than a minute is left.
pub fn time_remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> String {
    human_timedelta(end, now, end - now > TimeDelta::seconds(60))
}

/// Parses a human friendly end time.
///
/// Accepts durations like `2d`, `in 90min` and dates like `tomorrow`, `next thursday at 3pm`
/// or `2030-01-15`. Times are in UTC and must be in the future.
pub fn parse_end_time(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let time = input.strip_prefix("in ").unwrap_or(input).trim();

    if time.is_empty() {
        return Err(eyre!("no time was given"));
    }

    let end_time = match humantime::parse_duration(time) {
        Ok(duration) => {
            let duration = TimeDelta::from_std(duration).wrap_err("that duration is too long")?;
            now.checked_add_signed(duration)
                .ok_or(eyre!("that duration is too long"))?
        }
        Err(_) => chrono_english::parse_date_string(time, now, Dialect::Us)
            .map_err(|e| eyre!("couldn't understand `{input}` as a time: {e}"))?,
    };

    if end_time <= now {
        return Err(eyre!("that time is in the past"));
    }

    Ok(end_time)
}

/// Returns whether `format` is a non-empty strftime format chrono can render.
pub fn is_valid_strftime(format: &str) -> bool {
    !format.is_empty() && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

fn parse_id(text: &str) -> Option<u64> {
    text.parse().ok().filter(|id| *id != 0)
}

/// Parses a role mention (`<@&id>`) or a raw role ID.
pub fn parse_role_token(token: &str) -> Option<RoleId> {
    let token = token.trim();
    let id = token
        .strip_prefix("<@&")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(token);

    parse_id(id).map(RoleId::new)
}

/// Parses a message link, a `channel-message` ID pair, or a raw message ID.
pub fn parse_message_reference(input: &str) -> Option<MessageId> {
    let input = input.trim().trim_start_matches('<').trim_end_matches('>');

    let id = if input.contains("/channels/") {
        input.trim_end_matches('/').rsplit('/').next()?
    } else if let Some((_, message)) = input.split_once('-') {
        message
    } else {
        input
    };

    parse_id(id).map(MessageId::new)
}

/// Returns whether a Discord request failed because the target no longer exists.
pub fn is_not_found(error: &serenity::Error) -> bool {
    match error {
        serenity::Error::Http(error) => error
            .status_code()
            .is_some_and(|status| status.as_u16() == 404),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn human_join_variants() {
        assert_eq!(human_join(&[], "and"), "");
        assert_eq!(human_join(&strings(&["a"]), "and"), "a");
        assert_eq!(human_join(&strings(&["a", "b"]), "and"), "a and b");
        assert_eq!(human_join(&strings(&["a", "b", "c"]), "or"), "a, b or c");
    }

    #[test]
    fn timedelta_lists_units() {
        let end = now() + TimeDelta::days(2) + TimeDelta::hours(3) + TimeDelta::minutes(4);
        assert_eq!(
            human_timedelta(end, now(), false),
            "2 days, 3 hours and 4 minutes"
        );

        let end = now() + TimeDelta::hours(1) + TimeDelta::seconds(1);
        assert_eq!(human_timedelta(end, now(), false), "1 hour and 1 second");
    }

    #[test]
    fn timedelta_ignores_seconds() {
        let end = now() + TimeDelta::minutes(5) + TimeDelta::seconds(30);
        assert_eq!(human_timedelta(end, now(), true), "5 minutes");
        assert_eq!(time_remaining(end, now()), "5 minutes");

        let end = now() + TimeDelta::seconds(42);
        assert_eq!(time_remaining(end, now()), "42 seconds");
    }

    #[test]
    fn timedelta_past_and_present() {
        assert_eq!(human_timedelta(now(), now(), false), "now");
        assert_eq!(
            human_timedelta(now() - TimeDelta::minutes(3), now(), false),
            "3 minutes ago"
        );
    }

    #[test]
    fn end_time_from_durations() {
        assert_eq!(
            parse_end_time("2d", now()).unwrap(),
            now() + TimeDelta::days(2)
        );
        assert_eq!(
            parse_end_time("in 90min", now()).unwrap(),
            now() + TimeDelta::minutes(90)
        );
    }

    #[test]
    fn end_time_from_dates() {
        let end = parse_end_time("2030-01-15", now()).unwrap();
        assert_eq!((end.year(), end.month(), end.day()), (2030, 1, 15));
    }

    #[test]
    fn end_time_rejects_past_and_garbage() {
        assert!(parse_end_time("2001-01-01", now()).is_err());
        assert!(parse_end_time("", now()).is_err());
        assert!(parse_end_time("whenever you feel like it", now()).is_err());
    }

    #[test]
    fn strftime_validation() {
        assert!(is_valid_strftime("%A, %I:%M %p (%Z)"));
        assert!(is_valid_strftime("%I:%M:%S%p %d/%m/%Y"));
        assert!(!is_valid_strftime("%Q"));
        assert!(!is_valid_strftime(""));
    }

    #[test]
    fn role_tokens() {
        assert_eq!(parse_role_token("<@&123>"), Some(RoleId::new(123)));
        assert_eq!(parse_role_token(" 456 "), Some(RoleId::new(456)));
        assert_eq!(parse_role_token("<@123>"), None);
        assert_eq!(parse_role_token("0"), None);
        assert_eq!(parse_role_token("moderators"), None);
    }

    #[test]
    fn message_references() {
        let expected = Some(MessageId::new(789));
        assert_eq!(
            parse_message_reference("https://discord.com/channels/123/456/789"),
            expected
        );
        assert_eq!(
            parse_message_reference("https://discordapp.com/channels/123/456/789/"),
            expected
        );
        assert_eq!(parse_message_reference("456-789"), expected);
        assert_eq!(parse_message_reference("789"), expected);
        assert_eq!(parse_message_reference("not a message"), None);
    }
}
