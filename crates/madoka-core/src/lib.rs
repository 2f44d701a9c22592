//! Madoka Core
//!
//! Wire format and codecs for the BLE protocol of Daikin BRC1H ("Madoka")
//! thermostats.
//!
//! This crate provides:
//! - Envelope framing ([`envelope`])
//! - Chunk splitting and reassembly ([`chunk`], [`ChunkAssembler`])
//! - The parameter list codec ([`ParameterList`])
//! - The feature status contract ([`FeatureStatus`]) and the concrete
//!   statuses in [`features`]
//!
//! Nothing here performs I/O; the connection layer lives in `madoka-client`.

pub mod chunk;
pub mod envelope;
pub mod error;
pub mod features;
pub mod params;
pub mod status;

pub use chunk::{split_into_chunks, ChunkAssembler, Reassembly, MAX_CHUNK_SIZE};
pub use error::{Error, Result};
pub use params::ParameterList;
pub use status::{Feature, FeatureStatus, Operation};
