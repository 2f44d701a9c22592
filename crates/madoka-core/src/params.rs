//! Parameter list codec
//!
//! The body of an envelope is a list of `[id:u8][len:u8][value...]` records.
//! A length byte of `0xFF` stands for an empty value, and an empty list is
//! written as the two bytes `00 00`.

use crate::{envelope, Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Length byte that encodes a zero-length value
pub const EMPTY_VALUE_LEN: u8 = 0xFF;

/// Wire form of an empty parameter list
pub const EMPTY_PARAMETERS: [u8; 2] = [0x00, 0x00];

/// Ordered mapping of parameter id to raw value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterList {
    values: BTreeMap<u8, Bytes>,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, id: u8, value: impl Into<Bytes>) -> Self {
        self.insert(id, value);
        self
    }

    pub fn insert(&mut self, id: u8, value: impl Into<Bytes>) {
        self.values.insert(id, value.into());
    }

    pub fn get(&self, id: u8) -> Option<&[u8]> {
        self.values.get(&id).map(|v| v.as_ref())
    }

    /// Value of a parameter the caller cannot do without
    pub fn require(&self, id: u8) -> Result<&[u8]> {
        self.get(id).ok_or(Error::MissingParameter(id))
    }

    /// First byte of a required parameter; an empty value reads as zero
    pub fn require_u8(&self, id: u8) -> Result<u8> {
        Ok(self.require(id)?.first().copied().unwrap_or(0))
    }

    /// Required parameter as a big-endian unsigned integer
    pub fn require_uint(&self, id: u8) -> Result<u32> {
        let value = self.require(id)?;
        if value.len() > 4 {
            return Err(Error::InvalidValue {
                id,
                reason: format!("{} bytes do not fit an integer", value.len()),
            });
        }
        Ok(value.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
    }

    pub fn contains(&self, id: u8) -> bool {
        self.values.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.values.iter().map(|(id, v)| (*id, v.as_ref()))
    }

    /// Serialize into the parameter section of an envelope
    pub fn encode(&self) -> Result<Bytes> {
        if self.values.is_empty() {
            return Ok(Bytes::from_static(&EMPTY_PARAMETERS));
        }

        let mut buf = BytesMut::new();
        for (id, value) in &self.values {
            if value.len() >= EMPTY_VALUE_LEN as usize {
                return Err(Error::PayloadTooLarge(value.len()));
            }
            buf.put_u8(*id);
            buf.put_u8(value.len() as u8);
            buf.extend_from_slice(value);
        }
        Ok(buf.freeze())
    }

    /// Parse the parameter section of a complete envelope.
    ///
    /// The envelope header is validated first; every record must fit
    /// entirely within the declared length.
    pub fn decode(envelope: &[u8]) -> Result<Self> {
        let body = envelope::validate(envelope)?;
        let mut values = BTreeMap::new();

        let mut i = 0;
        while i < body.len() {
            let offset = envelope::HEADER_SIZE + i;
            if i + 1 >= body.len() {
                return Err(Error::TruncatedParameter { offset });
            }

            let id = body[i];
            let size = match body[i + 1] {
                EMPTY_VALUE_LEN => 0,
                n => n as usize,
            };

            let start = i + 2;
            let end = start + size;
            if end > body.len() {
                return Err(Error::TruncatedParameter { offset });
            }

            values.insert(id, Bytes::copy_from_slice(&body[start..end]));
            i = end;
        }

        Ok(Self { values })
    }
}

impl FromIterator<(u8, Bytes)> for ParameterList {
    fn from_iter<T: IntoIterator<Item = (u8, Bytes)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
