//! Typed access to one device capability

use madoka_core::{status, Feature, FeatureStatus, Operation};
use madoka_transport::Link;
use parking_lot::RwLock;
use std::marker::PhantomData;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{ClientError, Result};

/// Queries and updates one feature and remembers its last known status
pub struct FeatureClient<S: FeatureStatus, L: Link> {
    connection: Connection<L>,
    status: RwLock<Option<S>>,
    _feature: PhantomData<fn() -> S>,
}

impl<S: FeatureStatus, L: Link> FeatureClient<S, L> {
    pub fn new(connection: Connection<L>) -> Self {
        Self {
            connection,
            status: RwLock::new(None),
            _feature: PhantomData,
        }
    }

    pub fn feature(&self) -> Feature {
        S::FEATURE
    }

    pub fn name(&self) -> &'static str {
        S::FEATURE.name
    }

    pub fn supports(&self, operation: Operation) -> bool {
        operation.command_id(&S::FEATURE).is_some()
    }

    /// Read the current status from the device
    pub async fn query(&self) -> Result<S> {
        let command_id = Self::command_id(Operation::Query)?;
        let request = status::encode(&S::default())?;

        let response = self.connection.request(command_id, &request).await?;
        let new_status: S = status::decode_new(&response)?;
        debug!("{} status updated: {:?}", S::FEATURE.name, new_status);

        *self.status.write() = Some(new_status.clone());
        Ok(new_status)
    }

    /// Write a new status to the device.
    ///
    /// The response echoes the state from before the update, so it is only
    /// decoded to confirm the exchange; the requested status is cached.
    pub async fn update(&self, new_status: S) -> Result<S> {
        let command_id = Self::command_id(Operation::Update)?;
        let request = status::encode(&new_status)?;

        let response = self.connection.request(command_id, &request).await?;
        let echo: S = status::decode_new(&response)?;
        debug!("{} update acknowledged, device echoed {:?}", S::FEATURE.name, echo);

        *self.status.write() = Some(new_status.clone());
        Ok(new_status)
    }

    /// Last status obtained from a successful query or update
    pub fn status(&self) -> Option<S> {
        self.status.read().clone()
    }

    /// Cached status as JSON, if any
    pub fn status_json(&self) -> Option<serde_json::Value> {
        let status = self.status.read();
        status
            .as_ref()
            .and_then(|s| serde_json::to_value(s).ok())
    }

    fn command_id(operation: Operation) -> Result<u16> {
        operation
            .command_id(&S::FEATURE)
            .ok_or(ClientError::Unsupported {
                feature: S::FEATURE.name,
                operation,
            })
    }
}
