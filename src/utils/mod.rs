//! The `utils` module provides the ambient pieces shared across `hubbub`:
//! the broker error type and logging setup.

pub mod error;
pub mod logging;

pub use error::{BrokerError, Result};
