//! Message definitions for the broker
//!
//! `Message` is what subscribers read from their channel. The broker never
//! inspects `payload`; it only clones it once per receiving subscriber.
//!
//! Notes on fields:
//! - `topic`: the topic this copy was routed through. A publish to several
//!   topics yields one copy per (topic, subscriber) pair.
//! - `payload`: caller-defined value
//! - `message_id`: UUID assigned once per publish call, shared by all copies
//! - `timestamp`: milliseconds since UNIX epoch; set by the broker on publish

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T> {
    pub topic: String,
    pub payload: T,
    pub message_id: String,
    pub timestamp: i64,
}

impl<T> Message<T> {
    pub fn new(topic: impl Into<String>, payload: T) -> Self {
        Self {
            topic: topic.into(),
            payload,
            message_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Same message routed through a different topic.
    pub fn with_topic(&self, topic: &str) -> Self
    where
        T: Clone,
    {
        Self {
            topic: topic.to_string(),
            payload: self.payload.clone(),
            message_id: self.message_id.clone(),
            timestamp: self.timestamp,
        }
    }
}
