mod dispatcher;
mod engine;
mod message;
mod registry;
mod subscriber;
mod topic;

pub use dispatcher::{BrokerStats, DeliveryReport};
pub use engine::Broker;
pub use message::Message;
pub use subscriber::{SubscriberId, Subscription, TryRecvError};
