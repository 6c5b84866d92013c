#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Topic-keyed publish/subscribe registry.
//!
//! The hub stores subscriber handles rather than callbacks. Publishing hands
//! every subscriber of a topic to a caller-provided delivery closure, in the
//! subscribers' own `Ord` order, before `publish` returns. Owners that need a
//! deterministic wake-up order encode it in the subscriber type.

use std::collections::{BTreeMap, BTreeSet};

/// Registry of subscribers keyed by topic.
#[derive(Clone, Debug)]
pub struct ObserverHub<T, S> {
    topics: BTreeMap<T, BTreeSet<S>>,
    recipients: Vec<S>,
}

impl<T, S> Default for ObserverHub<T, S> {
    fn default() -> Self {
        Self {
            topics: BTreeMap::new(),
            recipients: Vec::new(),
        }
    }
}

impl<T, S> ObserverHub<T, S>
where
    T: Ord + Copy,
    S: Ord + Copy,
{
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscriber` for `topic`.
    ///
    /// Returns `false` when the subscriber was already registered.
    pub fn subscribe(&mut self, topic: T, subscriber: S) -> bool {
        self.topics.entry(topic).or_default().insert(subscriber)
    }

    /// Removes `subscriber` from `topic`.
    ///
    /// Returns `false` when the subscriber was not registered.
    pub fn unsubscribe(&mut self, topic: T, subscriber: S) -> bool {
        let Some(subscribers) = self.topics.get_mut(&topic) else {
            return false;
        };
        let removed = subscribers.remove(&subscriber);
        if subscribers.is_empty() {
            let _ = self.topics.remove(&topic);
        }
        removed
    }

    /// Removes `subscriber` from every topic and reports how many registrations were dropped.
    pub fn unsubscribe_all(&mut self, subscriber: S) -> usize {
        let mut removed = 0;
        for subscribers in self.topics.values_mut() {
            if subscribers.remove(&subscriber) {
                removed += 1;
            }
        }
        self.topics.retain(|_, subscribers| !subscribers.is_empty());
        removed
    }

    /// Number of subscribers registered for `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: T) -> usize {
        self.topics.get(&topic).map_or(0, BTreeSet::len)
    }

    /// Iterator over the subscribers of `topic` in delivery order.
    pub fn subscribers(&self, topic: T) -> impl Iterator<Item = S> + '_ {
        self.topics
            .get(&topic)
            .into_iter()
            .flat_map(|subscribers| subscribers.iter().copied())
    }

    /// Delivers `event` to every subscriber of `topic` and returns the recipient count.
    ///
    /// The recipient list is captured before the first delivery, so the
    /// closure always observes the registrations that existed when the
    /// event was published.
    pub fn publish<E, F>(&mut self, topic: T, event: &E, mut deliver: F) -> usize
    where
        F: FnMut(S, &E),
    {
        let mut recipients = std::mem::take(&mut self.recipients);
        recipients.clear();
        recipients.extend(self.subscribers(topic));

        for subscriber in &recipients {
            deliver(*subscriber, event);
        }

        let delivered = recipients.len();
        recipients.clear();
        self.recipients = recipients;
        delivered
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.topics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ObserverHub;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
    enum Topic {
        Changed,
        Released,
    }

    #[test]
    fn delivers_in_subscriber_order() {
        let mut hub = ObserverHub::new();
        assert!(hub.subscribe(Topic::Changed, 30_u32));
        assert!(hub.subscribe(Topic::Changed, 10));
        assert!(hub.subscribe(Topic::Changed, 20));

        let mut seen = Vec::new();
        let delivered = hub.publish(Topic::Changed, &"lane 0", |subscriber, event| {
            seen.push((subscriber, *event));
        });

        assert_eq!(delivered, 3);
        assert_eq!(seen, vec![(10, "lane 0"), (20, "lane 0"), (30, "lane 0")]);
    }

    #[test]
    fn duplicate_subscription_is_ignored() {
        let mut hub = ObserverHub::new();
        assert!(hub.subscribe(Topic::Changed, 1_u32));
        assert!(!hub.subscribe(Topic::Changed, 1));
        assert_eq!(hub.subscriber_count(Topic::Changed), 1);
    }

    #[test]
    fn topics_are_isolated() {
        let mut hub = ObserverHub::new();
        let _ = hub.subscribe(Topic::Changed, 1_u32);
        let _ = hub.subscribe(Topic::Released, 2);

        let mut seen = Vec::new();
        let _ = hub.publish(Topic::Released, &(), |subscriber, _| seen.push(subscriber));

        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn unsubscribe_all_stops_every_delivery() {
        let mut hub = ObserverHub::new();
        let _ = hub.subscribe(Topic::Changed, 1_u32);
        let _ = hub.subscribe(Topic::Released, 1);
        let _ = hub.subscribe(Topic::Released, 2);

        assert_eq!(hub.unsubscribe_all(1), 2);
        assert_eq!(hub.subscribers(Topic::Released).collect::<Vec<_>>(), vec![2]);
        assert_eq!(hub.subscriber_count(Topic::Changed), 0);

        let mut seen = Vec::new();
        let _ = hub.publish(Topic::Released, &(), |subscriber, _| seen.push(subscriber));
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn unsubscribe_reports_missing_registration() {
        let mut hub: ObserverHub<Topic, u32> = ObserverHub::new();
        assert!(!hub.unsubscribe(Topic::Changed, 4));
        let _ = hub.subscribe(Topic::Changed, 4);
        assert!(hub.unsubscribe(Topic::Changed, 4));
        assert_eq!(hub.subscribers(Topic::Changed).count(), 0);
    }

    #[test]
    fn publishing_without_subscribers_delivers_nothing() {
        let mut hub: ObserverHub<Topic, u32> = ObserverHub::new();
        let delivered = hub.publish(Topic::Changed, &(), |_, _| panic!("no subscribers"));
        assert_eq!(delivered, 0);
    }
}
