//! Bus Link Error Types
//!
//! Transport-level error taxonomy for the serial channel. Protocol-level
//! errors (CRC, exceptions, malformed frames) live in the protocol crates
//! and wrap these via `#[from]`.

use thiserror::Error;

/// Result type for zapline-comlink operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Bus transport errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Exclusive bus access could not be acquired within the timeout budget
    #[error("Bus busy: {0}")]
    Busy(String),

    /// Transmission did not complete within the timeout budget
    #[error("TX timeout")]
    TxTimeout,

    /// No response byte arrived within the timeout budget
    #[error("RX timeout: no response")]
    RxTimeout,

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for BusError {
    fn from(err: std::io::Error) -> Self {
        BusError::Io(err.to_string())
    }
}

// Helper methods for creating errors
impl BusError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        BusError::InvalidArgument(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        BusError::Busy(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        BusError::Io(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        BusError::Config(msg.into())
    }

    /// True for every bounded wait that elapsed: mutex acquisition, TX
    /// completion, or RX first byte.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BusError::Busy(_) | BusError::TxTimeout | BusError::RxTimeout
        )
    }
}
