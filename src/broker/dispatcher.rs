//! Dispatcher
//!
//! The dispatcher is a single tokio task that owns the `Registry` and the
//! write side of every subscriber channel. All facade calls arrive here as
//! `Command`s on one unbounded queue and are applied strictly one at a time,
//! in arrival order, so no registry edit ever interleaves with a delivery.
//!
//! Deliveries use `try_send`: a full subscriber queue drops that copy and the
//! publish carries on. A subscriber whose reader was dropped is pruned.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::broker::message::Message;
use crate::broker::registry::Registry;
use crate::broker::subscriber::{Delivery, SubscriberId, Subscriber, Subscription};
use crate::utils::error::{BrokerError, Result};

pub(crate) type CommandSender<T> = mpsc::UnboundedSender<Command<T>>;
pub(crate) type CommandReceiver<T> = mpsc::UnboundedReceiver<Command<T>>;

pub(crate) enum Command<T> {
    Subscribe {
        topics: Vec<String>,
        once: bool,
        reply: oneshot::Sender<Result<Subscription<T>>>,
    },
    AddTopics {
        id: SubscriberId,
        topics: Vec<String>,
        once: bool,
    },
    /// An empty `topics` list means every topic.
    Unsubscribe {
        id: SubscriberId,
        topics: Vec<String>,
    },
    Publish {
        message: Message<T>,
        topics: Vec<String>,
        reply: Option<oneshot::Sender<DeliveryReport>>,
    },
    CloseTopics {
        topics: Vec<String>,
    },
    Stats {
        reply: oneshot::Sender<BrokerStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Result of one publish call, summed over all of its topics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Copies enqueued into subscriber channels.
    pub delivered: usize,
    /// Copies lost because the subscriber's channel was full.
    pub dropped: usize,
}

/// Point-in-time view of the broker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    pub topics: usize,
    pub subscribers: usize,
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// Counters shared between the dispatcher and the facade.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    pub published: AtomicU64,
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
}

pub(crate) struct Dispatcher<T> {
    registry: Registry,
    subscribers: HashMap<SubscriberId, Subscriber<T>>,
    capacity: usize,
    metrics: Arc<Metrics>,
}

impl<T> Dispatcher<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            registry: Registry::new(),
            subscribers: HashMap::new(),
            capacity,
            metrics,
        }
    }

    /// Consume commands until a shutdown arrives or every facade is dropped.
    pub async fn run(mut self, mut commands: CommandReceiver<T>) {
        debug!("Dispatcher started (capacity {})", self.capacity);

        while let Some(command) = commands.recv().await {
            if self.handle(command, &mut commands).is_break() {
                return;
            }
        }

        self.shutdown();
    }

    fn handle(
        &mut self,
        command: Command<T>,
        commands: &mut CommandReceiver<T>,
    ) -> ControlFlow<()> {
        match command {
            Command::Subscribe {
                topics,
                once,
                reply,
            } => {
                let subscription = self.subscribe(&topics, once);
                let _ = reply.send(Ok(subscription));
            }
            Command::AddTopics { id, topics, once } => self.add_topics(id, &topics, once),
            Command::Unsubscribe { id, topics } => self.unsubscribe(id, &topics),
            Command::Publish {
                message,
                topics,
                reply,
            } => {
                let report = self.publish(message, &topics);
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
            Command::CloseTopics { topics } => self.close_topics(&topics),
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown { reply } => {
                commands.close();
                // Requests that were queued before the close still need an answer.
                while let Ok(pending) = commands.try_recv() {
                    self.reject(pending);
                }
                self.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn reject(&self, command: Command<T>) {
        match command {
            Command::Subscribe { reply, .. } => {
                let _ = reply.send(Err(BrokerError::Closed));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
            // Publish replies are dropped, which the facade reports as `Closed`.
            _ => {}
        }
    }

    fn subscribe(&mut self, topics: &[String], once: bool) -> Subscription<T> {
        let (subscriber, subscription) = Subscriber::channel(self.capacity);
        let id = subscriber.id;

        for topic in topics {
            self.registry.add(topic, id, once);
        }
        // A subscription with no topics can never receive anything; close it
        // right away so its reader sees end-of-stream instead of hanging.
        if self.registry.contains(&id) {
            self.subscribers.insert(id, subscriber);
        }

        debug!("{id} subscribed to {topics:?} (once: {once})");
        subscription
    }

    fn add_topics(&mut self, id: SubscriberId, topics: &[String], once: bool) {
        if !self.subscribers.contains_key(&id) {
            debug!("Ignoring topics for unknown subscriber {id}");
            return;
        }
        for topic in topics {
            self.registry.add(topic, id, once);
        }
        debug!("{id} added topics {topics:?} (once: {once})");
    }

    fn unsubscribe(&mut self, id: SubscriberId, topics: &[String]) {
        if topics.is_empty() {
            let left = self.registry.remove(&id);
            self.close(id);
            debug!("{id} unsubscribed from {left:?}");
            return;
        }

        for topic in topics {
            if self.registry.remove_topic(topic, &id) {
                self.close(id);
                break;
            }
        }
        debug!("{id} unsubscribed from {topics:?}");
    }

    fn publish(&mut self, message: Message<T>, topics: &[String]) -> DeliveryReport {
        self.metrics.published.fetch_add(1, Ordering::Relaxed);
        let mut report = DeliveryReport::default();

        for topic in topics {
            let targets = self.registry.subscribers_of(topic);
            if targets.is_empty() {
                debug!("Topic '{topic}' has no subscribers.");
                continue;
            }

            for (id, once) in targets {
                let Some(subscriber) = self.subscribers.get(&id) else {
                    continue;
                };

                match subscriber.try_deliver(message.with_topic(topic)) {
                    Delivery::Delivered => {
                        report.delivered += 1;
                        if once && self.registry.remove_once(topic, &id) {
                            self.close(id);
                        }
                    }
                    Delivery::Dropped => {
                        report.dropped += 1;
                        debug!("Dropped message {} for {id}: channel full", message.message_id);
                    }
                    Delivery::Disconnected => {
                        debug!("Pruning {id}: subscription dropped by reader");
                        self.registry.remove(&id);
                        self.close(id);
                    }
                }
            }
        }

        self.metrics
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.metrics
            .dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        report
    }

    fn close_topics(&mut self, topics: &[String]) {
        for topic in topics {
            for id in self.registry.close_topic(topic) {
                self.close(id);
            }
            debug!("Closed topic '{topic}'");
        }
    }

    fn stats(&self) -> BrokerStats {
        BrokerStats {
            topics: self.registry.topic_count(),
            subscribers: self.registry.subscriber_count(),
            published: self.metrics.published.load(Ordering::Relaxed),
            delivered: self.metrics.delivered.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
        }
    }

    /// Drops the write side; the reader sees end-of-stream after draining.
    fn close(&mut self, id: SubscriberId) {
        self.subscribers.remove(&id);
    }

    fn shutdown(&mut self) {
        let ids = self.registry.clear();
        self.subscribers.clear();
        info!("Broker shut down; closed {} subscriptions", ids.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> (Dispatcher<String>, CommandSender<String>, CommandReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Dispatcher::new(2, Arc::new(Metrics::default())), tx, rx)
    }

    #[tokio::test]
    async fn test_requests_queued_behind_shutdown_are_rejected() {
        let (dispatcher, tx, rx) = dispatcher();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (subscribe_tx, subscribe_rx) = oneshot::channel();
        let (publish_tx, publish_rx) = oneshot::channel();
        let (stats_tx, stats_rx) = oneshot::channel();

        tx.send(Command::Shutdown { reply: shutdown_tx }).unwrap();
        tx.send(Command::Subscribe {
            topics: vec!["late".to_string()],
            once: false,
            reply: subscribe_tx,
        })
        .unwrap();
        tx.send(Command::Publish {
            message: Message::new("late", "dropped".to_string()),
            topics: vec!["late".to_string()],
            reply: Some(publish_tx),
        })
        .unwrap();
        tx.send(Command::Stats { reply: stats_tx }).unwrap();

        dispatcher.run(rx).await;

        assert!(shutdown_rx.await.is_ok());
        assert_eq!(subscribe_rx.await.unwrap().unwrap_err(), BrokerError::Closed);
        // publish replies are dropped rather than answered
        assert!(publish_rx.await.is_err());
        let stats = stats_rx.await.unwrap();
        assert_eq!(stats.published, 0);
        assert_eq!(stats.subscribers, 0);

        // the inbox is closed once the loop returns
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_closes_live_subscriptions() {
        let (dispatcher, tx, rx) = dispatcher();

        let (subscribe_tx, subscribe_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tx.send(Command::Subscribe {
            topics: vec!["a".to_string()],
            once: false,
            reply: subscribe_tx,
        })
        .unwrap();
        tx.send(Command::Shutdown { reply: shutdown_tx }).unwrap();

        dispatcher.run(rx).await;

        shutdown_rx.await.unwrap();
        let mut sub = subscribe_rx.await.unwrap().unwrap();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_loop_ends_when_every_sender_is_dropped() {
        let (dispatcher, tx, rx) = dispatcher();

        let (subscribe_tx, subscribe_rx) = oneshot::channel();
        tx.send(Command::Subscribe {
            topics: vec!["a".to_string()],
            once: true,
            reply: subscribe_tx,
        })
        .unwrap();
        drop(tx);

        dispatcher.run(rx).await;

        let mut sub = subscribe_rx.await.unwrap().unwrap();
        assert!(sub.recv().await.is_none());
    }
}
