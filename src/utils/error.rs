//! Error types returned by the broker facade.
//!
//! A full subscriber queue is not an error: the copy is dropped and counted in
//! `BrokerStats::dropped`. Unsubscribing an unknown id is a no-op.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The broker was shut down; no further commands are accepted.
    #[error("broker closed")]
    Closed,

    #[error("channel capacity must be at least 1 (got {0})")]
    InvalidCapacity(usize),

    #[error("broker must be created inside a tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, BrokerError>;
