//! Chunk transport
//!
//! GATT writes and notifications carry at most [`MAX_CHUNK_SIZE`] bytes, so
//! every envelope travels as a run of sequence-numbered chunks:
//! ```text
//! ┌────────────┬─────────────────────────────┐
//! │ seq: u8    │ payload (≤ 19 bytes)        │
//! └────────────┴─────────────────────────────┘
//! ```
//! Sequence ids start at 0 and increase by one within a message. There is no
//! acknowledgement; delivery is assumed to be in order and lossless, and a
//! sequence regression is the only sign that a message was abandoned.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

/// Size of one chunk on the wire, sequence byte included
pub const MAX_CHUNK_SIZE: usize = 20;

/// Envelope bytes carried by one chunk
pub const CHUNK_PAYLOAD_SIZE: usize = MAX_CHUNK_SIZE - 1;

/// Split an envelope into sequenced chunks.
///
/// A zero-length envelope still yields one chunk holding only its sequence id.
pub fn split_into_chunks(envelope: &[u8]) -> Vec<Bytes> {
    if envelope.is_empty() {
        return vec![Bytes::from_static(&[0x00])];
    }

    envelope
        .chunks(CHUNK_PAYLOAD_SIZE)
        .enumerate()
        .map(|(seq, piece)| {
            let mut chunk = BytesMut::with_capacity(piece.len() + 1);
            chunk.put_u8(seq as u8);
            chunk.extend_from_slice(piece);
            chunk.freeze()
        })
        .collect()
}

/// Number of chunks a message of `length` bytes occupies.
///
/// The divisor is the full chunk size, not the payload size used when
/// splitting; devices count chunks this way.
pub fn expected_chunks(length: u8) -> usize {
    (length as usize).div_ceil(MAX_CHUNK_SIZE)
}

/// Outcome of feeding a chunk to the [`ChunkAssembler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembly {
    /// A complete envelope was rebuilt
    Rebuilt(Bytes),
    /// An unfinished message was abandoned; carries whatever was accumulated
    Failed(Bytes),
}

/// Rebuilds envelopes from incoming chunks
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    chunks: Vec<Bytes>,
    last_id: Option<u8>,
    corrupted: bool,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received chunk.
    ///
    /// Returns at most two events: the failure of an abandoned message,
    /// followed by the completion of the message the chunk belongs to.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Reassembly> {
        let mut events = Vec::new();

        if chunk.len() < 2 {
            warn!(
                "Chunk discarded, not enough data ({} bytes)",
                chunk.len()
            );
            return events;
        }

        let seq = chunk[0];

        if let Some(last) = self.last_id {
            if seq <= last {
                debug!("Chunk {} starts a new message while rebuilding another, discarding previous chunks", seq);
                events.push(Reassembly::Failed(self.take_payload()));
            } else if seq != last + 1 && !self.corrupted {
                warn!("Chunk sequence gap: expected {}, got {}", last + 1, seq);
                self.corrupted = true;
            }
        }

        if !self.in_progress() && seq != 0 {
            warn!("Message starts with chunk {} instead of 0", seq);
            self.corrupted = true;
        }

        self.last_id = Some(seq);
        self.chunks.push(Bytes::copy_from_slice(chunk));

        if self.is_complete() {
            debug!("Message complete ({} chunks)", self.chunks.len());
            events.push(Reassembly::Rebuilt(self.take_payload()));
        }

        events
    }

    /// Whether a message is partially buffered
    pub fn in_progress(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Discard any partially rebuilt message
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.last_id = None;
        self.corrupted = false;
    }

    fn is_complete(&self) -> bool {
        if self.corrupted {
            return false;
        }
        let Some(first) = self.chunks.first() else {
            return false;
        };

        let declared = first[1];
        let expected = expected_chunks(declared);
        // The chunk count alone undercounts envelopes of 19k+1..=20k bytes
        let buffered: usize = self.chunks.iter().map(|c| c.len() - 1).sum();
        expected > 0 && self.chunks.len() >= expected && buffered >= declared as usize
    }

    /// Concatenate buffered payloads, stripping sequence bytes, and reset
    fn take_payload(&mut self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.chunks.len() * CHUNK_PAYLOAD_SIZE);
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk[1..]);
        }
        self.reset();
        out.freeze()
    }
}
