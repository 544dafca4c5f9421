//! The in-memory registry of running timed events.
//!
//! Countdowns and giveaways share the same lifecycle: they are displayed in a message, re-rendered
//! periodically while running, and ended once their end time has passed. The registry only tracks
//! what is running; persistence is handled by the database module.

use chrono::{DateTime, Utc};
use poise::serenity_prelude::MessageId;

use crate::util::is_not_found;

/// An event that is displayed in a message and ends at a fixed time.
pub trait Timed {
    /// The message the event is displayed in. Unique per event.
    fn message_id(&self) -> MessageId;

    fn end_time(&self) -> DateTime<Utc>;

    fn rendered_mut(&mut self) -> &mut Rendered;

    fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time() <= now
    }
}

/// How editing an event's message went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Edited,
    /// The message is gone, so the event can't be displayed anymore.
    NotFound,
    /// The edit failed for another reason and is retried on the next pass.
    Failed,
}

impl EditOutcome {
    pub fn of<T>(result: &Result<T, serenity::Error>) -> EditOutcome {
        match result {
            Ok(_) => EditOutcome::Edited,
            Err(e) if is_not_found(e) => EditOutcome::NotFound,
            Err(_) => EditOutcome::Failed,
        }
    }
}

/// The work of one refresh pass, planned while holding the registry lock.
#[derive(Debug)]
pub struct Pass<T> {
    /// Events that have ended and must be finished.
    pub expired: Vec<T>,
    /// Copies of running events whose display changed.
    pub stale: Vec<T>,
}

/// The running events of one kind, in insertion order.
#[derive(Debug)]
pub struct Registry<T> {
    events: Vec<T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Registry { events: Vec::new() }
    }
}

impl<T: Timed> Registry<T> {
    pub fn new() -> Registry<T> {
        Registry::default()
    }

    /// Adds an event, replacing any event displayed in the same message.
    pub fn insert(&mut self, event: T) {
        match self
            .events
            .iter_mut()
            .find(|running| running.message_id() == event.message_id())
        {
            Some(running) => *running = event,
            None => self.events.push(event),
        }
    }

    pub fn get(&self, message_id: MessageId) -> Option<&T> {
        self.events
            .iter()
            .find(|event| event.message_id() == message_id)
    }

    pub fn get_mut(&mut self, message_id: MessageId) -> Option<&mut T> {
        self.events
            .iter_mut()
            .find(|event| event.message_id() == message_id)
    }

    pub fn remove(&mut self, message_id: MessageId) -> Option<T> {
        let index = self
            .events
            .iter()
            .position(|event| event.message_id() == message_id)?;

        Some(self.events.remove(index))
    }

    /// Removes and returns every event that has ended by `now`.
    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<T> {
        let (expired, running) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|event| event.has_ended(now));

        self.events = running;
        expired
    }

    /// Takes the expired events and marks running events whose display key changed as rendered.
    ///
    /// `display` returns the key of what an event shows at `now`, or `None` when it shows nothing
    /// that needs refreshing.
    pub fn plan(
        &mut self,
        now: DateTime<Utc>,
        display: impl Fn(&T, DateTime<Utc>) -> Option<String>,
    ) -> Pass<T>
    where
        T: Clone,
    {
        let expired = self.take_expired(now);
        let mut stale = Vec::new();

        for event in &mut self.events {
            if let Some(key) = display(event, now)
                && event.rendered_mut().update(key)
            {
                stale.push(event.clone());
            }
        }

        Pass { expired, stale }
    }

    /// Applies the outcomes of a pass's edits, returning the events whose message is gone.
    ///
    /// Gone events are removed. Failed edits are forgotten so the next pass retries them.
    pub fn settle(
        &mut self,
        outcomes: impl IntoIterator<Item = (MessageId, EditOutcome)>,
    ) -> Vec<T> {
        let mut gone = Vec::new();

        for (message_id, outcome) in outcomes {
            match outcome {
                EditOutcome::Edited => {}
                EditOutcome::NotFound => gone.extend(self.remove(message_id)),
                EditOutcome::Failed => {
                    if let Some(event) = self.get_mut(message_id) {
                        event.rendered_mut().reset();
                    }
                }
            }
        }

        gone
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.events.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.events.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Remembers what an event's message last showed, so unchanged displays are not edited again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered(Option<String>);

impl Rendered {
    /// Records `key` as displayed and returns whether it differs from the previous display.
    pub fn update(&mut self, key: String) -> bool {
        if self.0.as_ref() == Some(&key) {
            false
        } else {
            self.0 = Some(key);
            true
        }
    }

    /// Forgets the last display, forcing the next update to report a change.
    pub fn reset(&mut self) {
        self.0 = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Event {
        message_id: MessageId,
        end_time: DateTime<Utc>,
        rendered: Rendered,
    }

    impl Timed for Event {
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

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn event(id: u64, minutes: i64) -> Event {
        Event {
            message_id: MessageId::new(id),
            end_time: now() + TimeDelta::minutes(minutes),
            rendered: Rendered::default(),
        }
    }

    /// Shows the remaining whole minutes.
    fn minutes_left(event: &Event, now: DateTime<Utc>) -> Option<String> {
        Some((event.end_time - now).num_minutes().to_string())
    }

    fn ids(events: &[Event]) -> Vec<u64> {
        events.iter().map(|e| e.message_id.get()).collect()
    }

    #[test]
    fn insert_replaces_same_message() {
        let mut registry = Registry::new();
        registry.insert(event(1, 5));
        registry.insert(event(2, 5));
        registry.insert(event(1, 10));

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get(MessageId::new(1)).unwrap().end_time,
            now() + TimeDelta::minutes(10)
        );
    }

    #[test]
    fn remove_returns_event() {
        let mut registry = Registry::new();
        registry.insert(event(1, 5));

        assert_eq!(registry.remove(MessageId::new(1)), Some(event(1, 5)));
        assert_eq!(registry.remove(MessageId::new(1)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn take_expired_splits_running_from_ended() {
        let mut registry = Registry::new();
        registry.insert(event(1, -5));
        registry.insert(event(2, 5));
        registry.insert(event(3, 0));
        registry.insert(event(4, 1));

        let expired = registry.take_expired(now());

        assert_eq!(expired, vec![event(1, -5), event(3, 0)]);
        assert_eq!(
            registry.iter().map(|e| e.message_id.get()).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert!(registry.take_expired(now()).is_empty());
    }

    #[test]
    fn rendered_only_reports_changes() {
        let mut rendered = Rendered::default();

        assert!(rendered.update("5 minutes".into()));
        assert!(!rendered.update("5 minutes".into()));
        assert!(rendered.update("4 minutes".into()));

        rendered.reset();
        assert!(rendered.update("4 minutes".into()));
    }

    #[test]
    fn plan_ends_expired_and_edits_changed_displays() {
        let mut registry = Registry::new();
        registry.insert(event(1, -5));
        registry.insert(event(2, 5));
        registry.insert(event(3, 10));

        let pass = registry.plan(now(), minutes_left);
        assert_eq!(ids(&pass.expired), vec![1]);
        assert_eq!(ids(&pass.stale), vec![2, 3]);

        // nothing changed within the same minute
        let pass = registry.plan(now() + TimeDelta::seconds(20), minutes_left);
        assert!(pass.expired.is_empty());
        assert!(pass.stale.is_empty());

        let pass = registry.plan(now() + TimeDelta::minutes(1), minutes_left);
        assert_eq!(ids(&pass.stale), vec![2, 3]);
    }

    #[test]
    fn plan_skips_events_without_display() {
        let mut registry = Registry::new();
        registry.insert(event(1, 5));

        let pass = registry.plan(now(), |_, _| None);
        assert!(pass.stale.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn settle_drops_gone_messages() {
        let mut registry = Registry::new();
        registry.insert(event(1, 5));
        registry.insert(event(2, 5));
        registry.plan(now(), minutes_left);

        let gone = registry.settle([
            (MessageId::new(1), EditOutcome::NotFound),
            (MessageId::new(2), EditOutcome::Edited),
        ]);

        assert_eq!(ids(&gone), vec![1]);
        assert_eq!(ids(&registry.iter().cloned().collect::<Vec<_>>()), vec![2]);
    }

    #[test]
    fn settle_retries_failed_edits() {
        let mut registry = Registry::new();
        registry.insert(event(1, 5));
        registry.insert(event(2, 5));
        registry.plan(now(), minutes_left);

        let gone = registry.settle([
            (MessageId::new(1), EditOutcome::Failed),
            (MessageId::new(2), EditOutcome::Edited),
        ]);
        assert!(gone.is_empty());

        let pass = registry.plan(now(), minutes_left);
        assert_eq!(ids(&pass.stale), vec![1]);
    }

    #[test]
    fn settle_ignores_events_removed_meanwhile() {
        let mut registry = Registry::new();
        registry.insert(event(1, 5));
        registry.plan(now(), minutes_left);
        registry.remove(MessageId::new(1));

        let gone = registry.settle([(MessageId::new(1), EditOutcome::NotFound)]);
        assert!(gone.is_empty());
    }

    #[test]
    fn edit_outcomes() {
        assert_eq!(EditOutcome::of(&Ok::<_, serenity::Error>(())), EditOutcome::Edited);
        assert_eq!(
            EditOutcome::of(&Err::<(), _>(serenity::Error::Other("boom"))),
            EditOutcome::Failed
        );
    }
}
