//! Envelope encoding
//!
//! An envelope is one logical protocol message before it is chunked:
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Byte 0:     Length (total envelope size, header included)    │
//! │ Byte 1:     Reserved (0x00)                                  │
//! │ Byte 2-3:   Command id (uint16 big-endian)                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Parameters: [id:u8][len:u8][value...] repeated               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Envelope header size
pub const HEADER_SIZE: usize = 4;

/// Largest envelope the one-byte length field can describe
pub const MAX_ENVELOPE_SIZE: usize = u8::MAX as usize;

/// Build an envelope around an encoded parameter section.
///
/// The length byte is computed last, once the full size is known.
pub fn frame(command_id: u16, parameters: &[u8]) -> Result<Bytes> {
    let size = HEADER_SIZE + parameters.len();
    if size > MAX_ENVELOPE_SIZE {
        return Err(Error::PayloadTooLarge(size));
    }

    let mut buf = BytesMut::with_capacity(size);
    buf.put_u8(0x00);
    buf.put_u8(0x00);
    buf.put_u16(command_id);
    buf.extend_from_slice(parameters);
    buf[0] = size as u8;

    Ok(buf.freeze())
}

/// Command id carried by an envelope, if it is long enough to have one
pub fn command_id(envelope: &[u8]) -> Option<u16> {
    if envelope.len() < HEADER_SIZE {
        return None;
    }
    Some(u16::from_be_bytes([envelope[2], envelope[3]]))
}

/// Check the fixed header and the length invariant.
///
/// Returns the parameter section on success.
pub fn validate(envelope: &[u8]) -> Result<&[u8]> {
    if envelope.len() < HEADER_SIZE {
        return Err(Error::BufferTooSmall {
            needed: HEADER_SIZE,
            have: envelope.len(),
        });
    }

    let declared = envelope[0] as usize;
    if declared != envelope.len() {
        return Err(Error::LengthMismatch {
            declared,
            actual: envelope.len(),
        });
    }

    Ok(&envelope[HEADER_SIZE..])
}
