//! Broker engine
//!
//! `Broker` is the public facade over the dispatcher task. Each call is turned
//! into a `Command` and sent over an unbounded queue:
//! - `subscribe`, `subscribe_once`, `publish_with_report`, `stats` and
//!   `shutdown` wait for the dispatcher's reply
//! - `publish`, `unsubscribe`, `add_subscription` and `close_topics` only
//!   enqueue and return immediately
//!
//! Concurrency and usage notes:
//! - `Broker` is cheap to clone; all clones feed the same dispatcher, and
//!   commands from one caller are applied in the order they were issued.
//! - Publishing never waits on subscribers. A subscriber whose buffer is full
//!   simply misses that message.
//! - Once `shutdown` has been called every clone reports `BrokerError::Closed`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::broker::dispatcher::{
    BrokerStats, Command, CommandSender, DeliveryReport, Dispatcher, Metrics,
};
use crate::broker::message::Message;
use crate::broker::subscriber::{SubscriberId, Subscription};
use crate::config::BrokerSettings;
use crate::utils::error::{BrokerError, Result};

#[derive(Debug)]
pub struct Broker<T> {
    commands: CommandSender<T>,
    closed: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
    capacity: usize,
}

impl<T> Clone for Broker<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            closed: self.closed.clone(),
            metrics: self.metrics.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> Broker<T>
where
    T: Clone + Send + 'static,
{
    /// Start a broker whose subscriber channels each buffer up to `capacity`
    /// messages. Spawns the dispatcher on the current tokio runtime.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BrokerError::InvalidCapacity(capacity));
        }
        let runtime = Handle::try_current().map_err(|_| BrokerError::NoRuntime)?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let metrics = Arc::new(Metrics::default());
        let dispatcher = Dispatcher::new(capacity, metrics.clone());
        runtime.spawn(dispatcher.run(receiver));

        Ok(Self {
            commands,
            closed: Arc::new(AtomicBool::new(false)),
            metrics,
            capacity,
        })
    }

    pub fn from_settings(settings: &BrokerSettings) -> Result<Self> {
        Self::new(settings.channel_capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.commands.is_closed()
    }

    /// Subscribe to every topic in `topics`. The returned subscription gets a
    /// copy of each message published to any of them.
    pub async fn subscribe<I, S>(&self, topics: I) -> Result<Subscription<T>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_subscription(collect_topics(topics), false)
            .await
    }

    /// Like [`subscribe`](Self::subscribe), but the subscription leaves each
    /// topic after its first successful delivery there. Once it has left all
    /// of its topics its channel is closed.
    pub async fn subscribe_once<I, S>(&self, topics: I) -> Result<Subscription<T>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_subscription(collect_topics(topics), true).await
    }

    /// Register an existing subscription under more topics. Unknown ids are
    /// ignored.
    pub fn add_subscription<I, S>(&self, id: SubscriberId, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(Command::AddTopics {
            id,
            topics: collect_topics(topics),
            once: false,
        })
    }

    /// One-shot variant of [`add_subscription`](Self::add_subscription).
    pub fn add_subscription_once<I, S>(&self, id: SubscriberId, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(Command::AddTopics {
            id,
            topics: collect_topics(topics),
            once: true,
        })
    }

    /// Publish `payload` to every topic in `topics` without waiting for any
    /// delivery. Topics with no subscribers are skipped.
    ///
    /// The broker never applies backpressure: the command queue is unbounded
    /// and this call never waits. Callers producing faster than the dispatcher
    /// drains must limit their own publish rate, or use
    /// [`publish_with_report`](Self::publish_with_report) to pace themselves.
    pub fn publish<I, S>(&self, payload: T, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (message, topics) = prepare(payload, topics);
        self.send(Command::Publish {
            message,
            topics,
            reply: None,
        })
    }

    /// Publish and wait until the dispatcher has attempted every delivery.
    /// The report counts enqueued and dropped copies.
    pub async fn publish_with_report<I, S>(&self, payload: T, topics: I) -> Result<DeliveryReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (message, topics) = prepare(payload, topics);
        let (reply, rx) = oneshot::channel();
        self.send(Command::Publish {
            message,
            topics,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| BrokerError::Closed)
    }

    /// Remove the subscription from all of its topics and close its channel.
    /// Messages already buffered can still be read. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<()> {
        self.send(Command::Unsubscribe {
            id,
            topics: Vec::new(),
        })
    }

    /// Remove the subscription from the given topics only. The channel is
    /// closed if no topics remain. An empty list behaves like
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn unsubscribe_topics<I, S>(&self, id: SubscriberId, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(Command::Unsubscribe {
            id,
            topics: collect_topics(topics),
        })
    }

    /// Remove every subscriber from the given topics. Subscriptions left with
    /// no topics are closed.
    pub fn close_topics<I, S>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(Command::CloseTopics {
            topics: collect_topics(topics),
        })
    }

    /// Snapshot of registry sizes and delivery counters. Since it goes through
    /// the dispatcher, every command issued before it has been applied.
    pub async fn stats(&self) -> Result<BrokerStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        rx.await.map_err(|_| BrokerError::Closed)
    }

    /// Stop accepting commands and close every subscriber channel. Waits for
    /// the dispatcher to finish. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
        debug!(
            "Broker stopped after {} publishes",
            self.metrics.published.load(Ordering::Relaxed)
        );
    }

    async fn request_subscription(
        &self,
        topics: Vec<String>,
        once: bool,
    ) -> Result<Subscription<T>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            topics,
            once,
            reply,
        })?;
        rx.await.map_err(|_| BrokerError::Closed)?
    }

    fn send(&self, command: Command<T>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        self.commands
            .send(command)
            .map_err(|_| BrokerError::Closed)
    }
}

fn collect_topics<I, S>(topics: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    topics.into_iter().map(Into::into).collect()
}

fn prepare<T, I, S>(payload: T, topics: I) -> (Message<T>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let topics = collect_topics(topics);
    let message = Message::new(topics.first().cloned().unwrap_or_default(), payload);
    (message, topics)
}
