//! Topic management
//!
//! A `Topic` holds the subscribers registered under one topic, each with its
//! one-shot flag. The registry keys topics by name. Re-adding a subscriber
//! only updates the flag.
//!
//! Concurrency note: topics are owned by the registry, which is only touched
//! from the dispatcher task.

use std::collections::HashMap;

use crate::broker::subscriber::SubscriberId;

#[derive(Debug, Default)]
pub(crate) struct Topic {
    pub(crate) subscribers: HashMap<SubscriberId, bool>,
}

impl Topic {
    /// Create a topic with no subscribers.
    pub(crate) fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }

    /// Add a subscriber to the topic. `once` marks the pair for removal after
    /// its first delivery.
    pub(crate) fn subscribe(&mut self, id: SubscriberId, once: bool) {
        self.subscribers.insert(id, once);
    }

    /// Remove a subscriber from the topic. Returns whether it was present.
    pub(crate) fn unsubscribe(&mut self, id: &SubscriberId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    pub(crate) fn is_once(&self, id: &SubscriberId) -> bool {
        self.subscribers.get(id).copied().unwrap_or(false)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
