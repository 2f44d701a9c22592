//! Thermostat controller
//!
//! Bundles one connection with a client per feature and aggregates their
//! cached statuses.

use madoka_core::features::{
    CleanFilterIndicatorStatus, FanSpeedStatus, OperationModeStatus, PowerStateStatus,
    ResetCleanFilterTimerStatus, SetPointStatus, TemperaturesStatus,
};
use madoka_core::{FeatureStatus, Operation};
use madoka_transport::{Discovery, Link};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::feature::FeatureClient;

/// A thermostat and all of its features
pub struct Thermostat<L: Link> {
    connection: Connection<L>,
    pub fan_speed: FeatureClient<FanSpeedStatus, L>,
    pub operation_mode: FeatureClient<OperationModeStatus, L>,
    pub power_state: FeatureClient<PowerStateStatus, L>,
    pub set_point: FeatureClient<SetPointStatus, L>,
    pub temperatures: FeatureClient<TemperaturesStatus, L>,
    pub clean_filter_indicator: FeatureClient<CleanFilterIndicatorStatus, L>,
    pub reset_clean_filter_timer: FeatureClient<ResetCleanFilterTimerStatus, L>,
}

impl<L: Link> Thermostat<L> {
    pub fn new(address: &str, config: ConnectionConfig) -> Self {
        Self::with_connection(Connection::new(address, config))
    }

    pub fn with_connection(connection: Connection<L>) -> Self {
        Self {
            fan_speed: FeatureClient::new(connection.clone()),
            operation_mode: FeatureClient::new(connection.clone()),
            power_state: FeatureClient::new(connection.clone()),
            set_point: FeatureClient::new(connection.clone()),
            temperatures: FeatureClient::new(connection.clone()),
            clean_filter_indicator: FeatureClient::new(connection.clone()),
            reset_clean_filter_timer: FeatureClient::new(connection.clone()),
            connection,
        }
    }

    pub fn connection(&self) -> &Connection<L> {
        &self.connection
    }

    /// Connect and return once the link is up
    pub async fn start(&self, discovery: &Discovery<L>) -> Result<()> {
        self.connection.start(discovery).await?;
        self.connection.wait_connected().await
    }

    pub async fn stop(&self) {
        self.connection.stop().await;
    }

    /// Query every feature that can be queried.
    ///
    /// A failing feature is logged and skipped; the first failure is
    /// returned once all features were tried.
    pub async fn refresh(&self) -> Result<()> {
        let results = [
            refresh_feature(&self.fan_speed).await,
            refresh_feature(&self.operation_mode).await,
            refresh_feature(&self.power_state).await,
            refresh_feature(&self.set_point).await,
            refresh_feature(&self.temperatures).await,
            refresh_feature(&self.clean_filter_indicator).await,
            refresh_feature(&self.reset_clean_filter_timer).await,
        ];

        match results.into_iter().find_map(|r| r.err()) {
            Some(e) => Err(e),
            None => {
                debug!("Refreshed all features of {}", self.connection.address());
                Ok(())
            }
        }
    }

    /// Last known status of every feature, keyed by feature name.
    ///
    /// Features never read successfully are left out.
    pub fn status(&self) -> Map<String, Value> {
        let mut status = Map::new();
        collect_status(&mut status, &self.fan_speed);
        collect_status(&mut status, &self.operation_mode);
        collect_status(&mut status, &self.power_state);
        collect_status(&mut status, &self.set_point);
        collect_status(&mut status, &self.temperatures);
        collect_status(&mut status, &self.clean_filter_indicator);
        status
    }

    /// Device information; see [`Connection::read_info`]
    pub async fn read_info(&self) -> Result<BTreeMap<String, String>> {
        let info = self.connection.read_info().await?;
        info!("Read {} info values from {}", info.len(), self.connection.name());
        Ok(info)
    }
}

async fn refresh_feature<S: FeatureStatus, L: Link>(client: &FeatureClient<S, L>) -> Result<()> {
    if !client.supports(Operation::Query) {
        return Ok(());
    }
    client.query().await.map(|_| ()).map_err(|e| {
        error!("Failed to update {}: {}", client.name(), e);
        e
    })
}

fn collect_status<S: FeatureStatus, L: Link>(
    status: &mut Map<String, Value>,
    client: &FeatureClient<S, L>,
) {
    if let Some(value) = client.status_json() {
        status.insert(client.name().to_string(), value);
    }
}
