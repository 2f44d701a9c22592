//! Error types for the Madoka wire format

use thiserror::Error;

/// Result type alias for wire format operations
pub type Result<T> = std::result::Result<T, Error>;

/// Decode and encode failures of envelopes and parameter lists
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Envelope shorter than its fixed header
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Declared envelope length does not match the received byte count
    #[error("length mismatch: envelope declares {declared} bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// A parameter record runs past the end of the envelope
    #[error("truncated parameter record at offset {offset}")]
    TruncatedParameter { offset: usize },

    /// Envelope does not fit the one-byte length field
    #[error("payload too large: {0} bytes (max 255)")]
    PayloadTooLarge(usize),

    /// A parameter the feature requires is absent from the response
    #[error("missing parameter 0x{0:02x}")]
    MissingParameter(u8),

    /// A parameter carries a value outside the feature's domain
    #[error("invalid value for parameter 0x{id:02x}: {reason}")]
    InvalidValue { id: u8, reason: String },
}
