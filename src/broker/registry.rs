//! Subscription registry
//!
//! Two indexes are kept in lockstep:
//! - forward: topic name -> `Topic` (subscriber id -> one-shot flag)
//! - reverse: subscriber id -> set of topic names
//!
//! A subscriber appears under a topic iff that topic appears in the
//! subscriber's reverse entry. Empty topics and subscribers with no topics are
//! removed eagerly, so `topic_count`/`subscriber_count` only count live state.
//!
//! The registry has no synchronization of its own; the dispatcher task is its
//! only owner.

use std::collections::{HashMap, HashSet};

use crate::broker::subscriber::SubscriberId;
use crate::broker::topic::Topic;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    topics: HashMap<String, Topic>,
    subscriptions: HashMap<SubscriberId, HashSet<String>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `id` under `topic`. Automatically creates the topic if it
    /// doesn't exist. Registering an existing pair again replaces its flag.
    pub(crate) fn add(&mut self, topic: &str, id: SubscriberId, once: bool) {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(Topic::new)
            .subscribe(id, once);
        self.subscriptions
            .entry(id)
            .or_default()
            .insert(topic.to_string());
    }

    /// Removes `id` from every topic it is registered under and returns those
    /// topics. Unknown ids yield an empty list.
    pub(crate) fn remove(&mut self, id: &SubscriberId) -> Vec<String> {
        let Some(topics) = self.subscriptions.remove(id) else {
            return Vec::new();
        };

        let mut left = Vec::with_capacity(topics.len());
        for name in topics {
            self.detach(&name, id);
            left.push(name);
        }
        left
    }

    /// Removes a single `(topic, id)` pair.
    ///
    /// Returns `true` when `id` is no longer registered under any topic
    /// (including when it was never known), which tells the caller the
    /// subscription's channel can be closed.
    pub(crate) fn remove_topic(&mut self, topic: &str, id: &SubscriberId) -> bool {
        let Some(topics) = self.subscriptions.get_mut(id) else {
            return true;
        };

        let removed = topics.remove(topic);
        let empty = topics.is_empty();

        if removed {
            self.detach(topic, id);
        }
        if empty {
            self.subscriptions.remove(id);
        }
        empty
    }

    /// Removes the pair only if it was registered as one-shot. Returns `true`
    /// when this left `id` without any topic.
    pub(crate) fn remove_once(&mut self, topic: &str, id: &SubscriberId) -> bool {
        let once = self
            .topics
            .get(topic)
            .map(|t| t.is_once(id))
            .unwrap_or(false);

        once && self.remove_topic(topic, id)
    }

    /// Snapshot of the subscribers of `topic` with their one-shot flags.
    pub(crate) fn subscribers_of(&self, topic: &str) -> Vec<(SubscriberId, bool)> {
        self.topics
            .get(topic)
            .map(|t| t.subscribers.iter().map(|(id, once)| (*id, *once)).collect())
            .unwrap_or_default()
    }

    /// Drops `topic` entirely. Returns the subscribers that are left with no
    /// topics as a result.
    pub(crate) fn close_topic(&mut self, topic: &str) -> Vec<SubscriberId> {
        let Some(removed) = self.topics.remove(topic) else {
            return Vec::new();
        };

        let mut orphaned = Vec::new();
        for id in removed.subscribers.into_keys() {
            if let Some(topics) = self.subscriptions.get_mut(&id) {
                topics.remove(topic);
                if topics.is_empty() {
                    self.subscriptions.remove(&id);
                    orphaned.push(id);
                }
            }
        }
        orphaned
    }

    #[cfg(test)]
    pub(crate) fn topics_of(&self, id: &SubscriberId) -> Vec<String> {
        self.subscriptions
            .get(id)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn contains(&self, id: &SubscriberId) -> bool {
        self.subscriptions.contains_key(id)
    }

    pub(crate) fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Removes every entry, returning the ids that were registered.
    pub(crate) fn clear(&mut self) -> Vec<SubscriberId> {
        self.topics.clear();
        self.subscriptions.drain().map(|(id, _)| id).collect()
    }

    fn detach(&mut self, topic: &str, id: &SubscriberId) {
        if let Some(t) = self.topics.get_mut(topic) {
            t.unsubscribe(id);
            if t.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    /// Checks forward/reverse symmetry. Used by tests.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let forward_ok = self.topics.iter().all(|(name, topic)| {
            !topic.is_empty()
                && topic.subscribers.keys().all(|id| {
                    self.subscriptions
                        .get(id)
                        .is_some_and(|topics| topics.contains(name))
                })
        });
        let reverse_ok = self.subscriptions.iter().all(|(id, topics)| {
            !topics.is_empty()
                && topics.iter().all(|name| {
                    self.topics
                        .get(name)
                        .is_some_and(|t| t.subscribers.contains_key(id))
                })
        });
        forward_ok && reverse_ok
    }
}
