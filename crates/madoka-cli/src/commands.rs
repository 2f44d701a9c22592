//! Command execution against a connected thermostat

use anyhow::{Context, Result};
use madoka_bridge::MqttBridge;
use madoka_client::Thermostat;
use madoka_core::features::{
    clamp_set_point, FanSpeedStatus, OperationModeStatus, PowerStateStatus,
    ResetCleanFilterTimerStatus, SetPointStatus,
};
use madoka_transport::{Discovery, Link};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::FileConfig;
use crate::{Commands, PowerArg};

/// Run one command; `None` means there is nothing to print
pub async fn execute<L: Link>(
    thermostat: &Arc<Thermostat<L>>,
    command: &Commands,
    discovery: &Discovery<L>,
    config: &FileConfig,
) -> Result<Option<Value>> {
    let output = match command {
        Commands::GetStatus => {
            if let Err(e) = thermostat.refresh().await {
                warn!("Some features could not be read: {}", e);
            }
            Value::Object(thermostat.status())
        }
        Commands::GetInfo => serde_json::to_value(thermostat.read_info().await?)?,
        Commands::Scan => scan_report(discovery),
        Commands::GetFanSpeed => to_json(thermostat.fan_speed.query().await?)?,
        Commands::SetFanSpeed { cooling, heating } => to_json(
            thermostat
                .fan_speed
                .update(FanSpeedStatus::new(*cooling, *heating))
                .await?,
        )?,
        Commands::GetOperationMode => to_json(thermostat.operation_mode.query().await?)?,
        Commands::SetOperationMode { operation_mode } => to_json(
            thermostat
                .operation_mode
                .update(OperationModeStatus::new(*operation_mode))
                .await?,
        )?,
        Commands::GetPowerState => to_json(thermostat.power_state.query().await?)?,
        Commands::SetPowerState { power_state } => to_json(
            thermostat
                .power_state
                .update(PowerStateStatus::new(*power_state == PowerArg::On))
                .await?,
        )?,
        Commands::GetTemperatures => to_json(thermostat.temperatures.query().await?)?,
        Commands::GetSetPoint => to_json(thermostat.set_point.query().await?)?,
        Commands::SetSetPoint { cooling, heating } => {
            let status = SetPointStatus::new(clamp_set_point(*cooling), clamp_set_point(*heating));
            to_json(thermostat.set_point.update(status).await?)?
        }
        Commands::GetCleanFilterIndicator => {
            to_json(thermostat.clean_filter_indicator.query().await?)?
        }
        Commands::ResetCleanFilterTimer => to_json(
            thermostat
                .reset_clean_filter_timer
                .update(ResetCleanFilterTimerStatus)
                .await?,
        )?,
        Commands::Mqtt {
            host,
            port,
            username,
            password,
            root_topic,
            root_topic_only,
            update_interval,
        } => {
            let mut mqtt = config.mqtt.clone();
            if let Some(host) = host {
                mqtt.broker_host = host.clone();
            }
            if let Some(port) = port {
                mqtt.broker_port = *port;
            }
            if username.is_some() {
                mqtt.username = username.clone();
                mqtt.password = password.clone();
            }
            if let Some(root_topic) = root_topic {
                mqtt.root_topic = root_topic.clone();
            }
            mqtt.root_topic_only |= *root_topic_only;
            if let Some(interval) = update_interval {
                mqtt.update_interval_secs = *interval;
            }

            let mut bridge = MqttBridge::new(Arc::clone(thermostat), mqtt);
            tokio::select! {
                result = bridge.run(discovery) => result.context("MQTT bridge stopped")?,
                _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
            }
            return Ok(None);
        }
    };

    Ok(Some(output))
}

/// Address, name and signal strength of every device seen
pub fn scan_report<L: Link>(discovery: &Discovery<L>) -> Value {
    Value::Array(
        discovery
            .devices()
            .iter()
            .map(|device| {
                json!({
                    "address": device.address,
                    "name": device.name,
                    "rssi": device.rssi,
                })
            })
            .collect(),
    )
}

fn to_json<S: Serialize>(status: S) -> Result<Value> {
    Ok(serde_json::to_value(status)?)
}
