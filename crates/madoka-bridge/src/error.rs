//! Bridge error types

use madoka_client::ClientError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("invalid payload on {topic}: {reason}")]
    InvalidPayload { topic: String, reason: String },

    #[error("publish failed: {0}")]
    Publish(String),

    /// The thermostat cannot be reached without a new discovery
    #[error("device aborted: {0}")]
    Aborted(String),

    #[error("client error: {0}")]
    Client(#[from] ClientError),
}
