//! Subscriber channels
//!
//! Every subscribe call creates a bounded `tokio::sync::mpsc` channel. The
//! dispatcher keeps the sending half (`Subscriber`) and is the only writer; the
//! caller receives the reading half wrapped in a `Subscription`.
//!
//! When the dispatcher drops the sender (unsubscribe, last one-shot topic
//! consumed, topic closed, shutdown) the reader drains what is already
//! buffered and then sees end-of-stream (`None`).

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver, Sender};
use uuid::Uuid;

use crate::broker::message::Message;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Opaque identifier of one subscription. Unique per subscribe call, even for
/// the same logical consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of a single non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// The subscriber's buffer was at capacity; this copy is lost.
    Dropped,
    /// The reading half is gone; the subscriber should be pruned.
    Disconnected,
}

/// Dispatcher-side view of a subscription.
#[derive(Debug)]
pub(crate) struct Subscriber<T> {
    pub(crate) id: SubscriberId,
    sender: Sender<Message<T>>,
}

impl<T> Subscriber<T> {
    /// Create a subscriber and its caller-facing `Subscription` with a buffer
    /// of `capacity` messages. `capacity` must be non-zero.
    pub(crate) fn channel(capacity: usize) -> (Self, Subscription<T>) {
        let id = SubscriberId::new();
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { id, sender }, Subscription { id, receiver })
    }

    /// Enqueue without waiting. Never applies backpressure to the caller.
    pub(crate) fn try_deliver(&self, message: Message<T>) -> Delivery {
        match self.sender.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Disconnected,
        }
    }
}

/// Caller-visible handle of one subscription.
///
/// Owns the read side of the subscriber's bounded queue. Dropping it does not
/// unsubscribe immediately; the broker prunes the subscription the next time
/// it tries to deliver to it.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriberId,
    receiver: Receiver<Message<T>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next message. Returns `None` once the broker has closed
    /// this subscription and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Message<T>> {
        self.receiver.recv().await
    }

    /// Take a buffered message without waiting.
    pub fn try_recv(&mut self) -> Result<Message<T>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Blocking variant of [`recv`](Self::recv) for threads outside the async
    /// runtime. Panics if called from within an async context.
    pub fn blocking_recv(&mut self) -> Option<Message<T>> {
        self.receiver.blocking_recv()
    }

    /// Number of messages waiting in the buffer.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// True once the broker has dropped its sending half.
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Message<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
