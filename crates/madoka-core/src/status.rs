//! Feature status contract
//!
//! A feature status is plain data plus two functions: the parameters it
//! contributes to a request, and how it is populated from a response. The
//! envelope-level [`encode`] and [`decode`] are shared by every status.

use crate::{ParameterList, Result};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;

/// Static description of a device capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feature {
    /// Stable snake_case name used for status aggregation
    pub name: &'static str,
    /// Command id that reads the feature, if it can be read
    pub query_command: Option<u16>,
    /// Command id that writes the feature, if it can be written
    pub update_command: Option<u16>,
}

/// Which half of a feature's command pair a request uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Update,
}

impl Operation {
    pub fn command_id(self, feature: &Feature) -> Option<u16> {
        match self {
            Operation::Query => feature.query_command,
            Operation::Update => feature.update_command,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Query => f.write_str("query"),
            Operation::Update => f.write_str("update"),
        }
    }
}

/// Typed view over a parameter list
///
/// `Default` is the status sent as the body of a query.
pub trait FeatureStatus: Clone + Default + fmt::Debug + Serialize + Send + Sync + 'static {
    /// The capability this status belongs to
    const FEATURE: Feature;

    /// Parameters this status contributes as a request body.
    ///
    /// Fails when a field cannot be represented on the wire.
    fn parameter_values(&self) -> Result<ParameterList>;

    /// Populate typed fields from a decoded response
    fn apply_parameter_values(&mut self, values: &ParameterList) -> Result<()>;
}

/// Serialize a status into an envelope parameter section
pub fn encode<S: FeatureStatus>(status: &S) -> Result<Bytes> {
    status.parameter_values()?.encode()
}

/// Validate a complete response envelope and apply it to `status`
pub fn decode<S: FeatureStatus>(status: &mut S, envelope: &[u8]) -> Result<()> {
    let values = ParameterList::decode(envelope)?;
    status.apply_parameter_values(&values)
}

/// Decode a response envelope into a fresh status
pub fn decode_new<S: FeatureStatus>(envelope: &[u8]) -> Result<S> {
    let mut status = S::default();
    decode(&mut status, envelope)?;
    Ok(status)
}
