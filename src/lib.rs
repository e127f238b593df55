//! # hubbub
//!
//! `hubbub` is a minimalist, in-process publish/subscribe broker built on
//! tokio. Publishers send opaque payloads to named topics; every subscription
//! registered under a topic receives its own copy through a bounded channel.
//! Publishing never blocks on slow subscribers: when a subscriber's buffer is
//! full, that subscriber misses the message.
//!
//! ## Core Modules
//!
//! - `broker`: the `Broker` facade, the dispatcher task that owns all
//!   subscription state, the subscription registry and subscriber channels.
//! - `config`: loads broker and logging settings from files and environment.
//! - `utils`: shared error type and logging setup.
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> hubbub::Result<()> {
//! let broker = hubbub::Broker::<String>::new(16)?;
//! let mut sub = broker.subscribe(["news"]).await?;
//! broker.publish("hello".to_string(), ["news"])?;
//! let msg = sub.recv().await.expect("broker still running");
//! assert_eq!(msg.payload, "hello");
//! broker.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod utils;

pub use broker::{
    Broker, BrokerStats, DeliveryReport, Message, SubscriberId, Subscription, TryRecvError,
};
pub use utils::error::{BrokerError, Result};
