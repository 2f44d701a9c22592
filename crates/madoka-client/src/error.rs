//! Client error types

use madoka_core::Operation;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The link was not connected when the request was issued
    #[error("not connected")]
    NotConnected,

    /// The device was never found; discovery has to be run again
    #[error("connection aborted: {0}")]
    Aborted(String),

    /// The request was abandoned before a response arrived
    #[error("request cancelled")]
    Cancelled,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("{feature} does not support {operation}")]
    Unsupported {
        feature: &'static str,
        operation: Operation,
    },

    #[error("timeout")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] madoka_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] madoka_transport::TransportError),
}
