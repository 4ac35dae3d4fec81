//! Error types at the market data and order gateway seams.

use thiserror::Error;

/// Failures from the market data port. Every variant means "skip this tick".
#[derive(Debug, Error)]
pub enum DataError {
    /// Empty response, non-success status or transport failure.
    #[error("Market data unavailable: {0}")]
    Unavailable(String),

    /// Response arrived but could not be decoded or failed ordering checks.
    #[error("Malformed market data: {0}")]
    Malformed(String),

    /// Call exceeded its time bound.
    #[error("Market data request timed out")]
    Timeout,
}

impl DataError {
    /// Transient errors worth retrying for idempotent reads.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataError::Unavailable(_) | DataError::Timeout)
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DataError::Timeout
        } else if err.is_decode() {
            DataError::Malformed(err.to_string())
        } else {
            DataError::Unavailable(err.to_string())
        }
    }
}

/// Failures from the order gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Order request timed out")]
    Timeout,

    /// Broker answered and refused the order.
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// Network or protocol failure; the order may or may not have reached the broker.
    #[error("Order transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}
