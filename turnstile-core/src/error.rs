//! Error types for turnstile.

use thiserror::Error;

use crate::driver::DriverStatus;

/// The main error type for pool and dispatch operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid setup: unknown engine, unknown compiler, unresolvable type name.
    /// Raised eagerly while the driver is assembled, never at query time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation arrived while the driver status forbids it.
    #[error("cannot {operation} while the driver is {status}")]
    DriverState {
        operation: &'static str,
        status: DriverStatus,
    },

    /// Transaction misuse: `begin` inside a transaction, or
    /// `commit`/`rollback` outside one.
    #[error("transaction error: {0}")]
    TransactionState(String),

    /// Failure propagated from the underlying connection.
    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a transaction-state error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::TransactionState(message.into())
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub(crate) fn state(operation: &'static str, status: DriverStatus) -> Self {
        Self::DriverState { operation, status }
    }
}

/// Result type alias for turnstile operations.
pub type Result<T> = std::result::Result<T, Error>;
