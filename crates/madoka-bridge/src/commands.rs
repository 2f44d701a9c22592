//! Commands received on the device's `.../set` topics
//!
//! Fan speed and set point commands carry one value. Which of the cooling
//! and heating halves it replaces depends on the current operation mode.

use madoka_client::{FeatureClient, Thermostat};
use madoka_core::features::{
    clamp_set_point, FanSpeed, FanSpeedStatus, OperationMode, OperationModeStatus,
    PowerStateStatus, SetPointStatus,
};
use madoka_core::FeatureStatus;
use madoka_transport::Link;
use tracing::{debug, info};

use crate::error::{BridgeError, Result};

/// A writable feature exposed over MQTT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    OperationMode,
    FanSpeed,
    PowerState,
    SetPoint,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::OperationMode,
        Command::FanSpeed,
        Command::PowerState,
        Command::SetPoint,
    ];

    /// Topic segment below the device topic
    pub fn topic_name(self) -> &'static str {
        match self {
            Command::OperationMode => "operation_mode",
            Command::FanSpeed => "fan_speed",
            Command::PowerState => "power_state",
            Command::SetPoint => "set_point",
        }
    }

    pub fn from_topic_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.topic_name() == name)
    }
}

/// Which halves (cooling, heating) a single-valued command replaces
fn affected_halves(mode: OperationMode) -> (bool, bool) {
    match mode {
        OperationMode::Auto | OperationMode::Dry | OperationMode::Fan => (true, true),
        OperationMode::Cool => (true, false),
        OperationMode::Heat => (false, true),
        OperationMode::Ventilation => (false, false),
    }
}

/// `OFF` only powers down; any mode name selects it and powers up
pub fn plan_operation_mode(
    payload: &str,
) -> std::result::Result<(Option<OperationModeStatus>, PowerStateStatus), String> {
    let payload = payload.trim();
    if payload.eq_ignore_ascii_case("OFF") {
        return Ok((None, PowerStateStatus::new(false)));
    }
    let mode: OperationMode = payload.parse()?;
    Ok((
        Some(OperationModeStatus::new(mode)),
        PowerStateStatus::new(true),
    ))
}

pub fn plan_fan_speed(
    mode: OperationMode,
    current: FanSpeedStatus,
    speed: FanSpeed,
) -> FanSpeedStatus {
    let (cooling, heating) = affected_halves(mode);
    FanSpeedStatus {
        cooling_fan_speed: if cooling { speed } else { current.cooling_fan_speed },
        heating_fan_speed: if heating { speed } else { current.heating_fan_speed },
    }
}

pub fn plan_set_point(mode: OperationMode, current: SetPointStatus, celsius: i16) -> SetPointStatus {
    let (cooling, heating) = affected_halves(mode);
    SetPointStatus {
        cooling_set_point: if cooling { celsius } else { current.cooling_set_point },
        heating_set_point: if heating { celsius } else { current.heating_set_point },
    }
}

pub fn plan_power_state(payload: &str) -> PowerStateStatus {
    PowerStateStatus::new(payload.trim().eq_ignore_ascii_case("ON"))
}

/// Apply one MQTT command to the thermostat
pub async fn apply_command<L: Link>(
    thermostat: &Thermostat<L>,
    command: Command,
    payload: &str,
) -> Result<()> {
    let invalid = |reason: String| BridgeError::InvalidPayload {
        topic: command.topic_name().to_string(),
        reason,
    };
    debug!("Applying {} command: {}", command.topic_name(), payload);

    match command {
        Command::OperationMode => {
            let (mode, power) = plan_operation_mode(payload).map_err(invalid)?;
            if let Some(mode) = mode {
                thermostat.operation_mode.update(mode).await?;
            }
            thermostat.power_state.update(power).await?;
        }
        Command::FanSpeed => {
            let speed: FanSpeed = payload.trim().parse().map_err(invalid)?;
            let mode = current(&thermostat.operation_mode).await?.operation_mode;
            let fan_speed = current(&thermostat.fan_speed).await?;
            thermostat
                .fan_speed
                .update(plan_fan_speed(mode, fan_speed, speed))
                .await?;
        }
        Command::PowerState => {
            thermostat.power_state.update(plan_power_state(payload)).await?;
        }
        Command::SetPoint => {
            let celsius = parse_set_point(payload).map_err(invalid)?;
            let mode = current(&thermostat.operation_mode).await?.operation_mode;
            let set_point = current(&thermostat.set_point).await?;
            thermostat
                .set_point
                .update(plan_set_point(mode, set_point, celsius))
                .await?;
        }
    }

    info!("Applied {} = {}", command.topic_name(), payload.trim());
    Ok(())
}

/// Whole degrees from a set point payload, clamped like the CLI does
pub fn parse_set_point(payload: &str) -> std::result::Result<i16, String> {
    let value = payload.trim().parse::<f64>().map_err(|e| e.to_string())?;
    if !value.is_finite() {
        return Err(format!("{} is not a temperature", payload.trim()));
    }
    Ok(clamp_set_point(value.round().clamp(i16::MIN.into(), i16::MAX.into()) as i16))
}

/// Cached status, or a fresh query when nothing is known yet
async fn current<S: FeatureStatus, L: Link>(client: &FeatureClient<S, L>) -> Result<S> {
    match client.status() {
        Some(status) => Ok(status),
        None => Ok(client.query().await?),
    }
}
