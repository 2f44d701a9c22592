//! MQTT bridge tests
//!
//! Command handling and status refresh run against the in-memory thermostat,
//! so no broker is needed.

use madoka_bridge::{apply_command, BridgeError, Command, MqttBridge, MqttBridgeConfig, StatusUpdate};
use madoka_client::prelude::*;
use madoka_core::ParameterList;
use madoka_test_utils::{FakeThermostat, TEST_ADDRESS};
use std::sync::Arc;

async fn thermostat(fake: &FakeThermostat) -> Thermostat<FakeThermostat> {
    ThermostatBuilder::new(TEST_ADDRESS)
        .connect_backoff(Duration::from_millis(10))
        .write_retry_delay(Duration::from_millis(5))
        .response_timeout(Duration::from_millis(200))
        .connect(&fake.discovery())
        .await
        .expect("Connect failed")
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_operation_mode_off_only_powers_down() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = thermostat(&fake).await;

    apply_command(&thermostat, Command::OperationMode, "OFF").await.unwrap();

    assert_eq!(fake.register(32), Some(ParameterList::new().with(0x20, vec![0])));
    // Mode untouched
    assert_eq!(fake.register(48), Some(ParameterList::new().with(0x20, vec![3])));
    assert_eq!(fake.requests().len(), 1);
}

#[tokio::test]
async fn test_operation_mode_sets_mode_then_powers_on() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    fake.set_register(32, ParameterList::new().with(0x20, vec![0]));
    let thermostat = thermostat(&fake).await;

    apply_command(&thermostat, Command::OperationMode, "heat").await.unwrap();

    let requests = fake.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].as_ref(), &[0x07, 0x00, 0x40, 0x30, 0x20, 0x01, 0x04]);
    assert_eq!(requests[1].as_ref(), &[0x07, 0x00, 0x40, 0x20, 0x20, 0x01, 0x01]);
    assert_eq!(
        thermostat.operation_mode.status(),
        Some(OperationModeStatus::new(OperationMode::Heat))
    );
}

#[tokio::test]
async fn test_fan_speed_in_heat_mode_changes_heating_only() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    fake.set_register(48, ParameterList::new().with(0x20, vec![4]));
    let thermostat = thermostat(&fake).await;

    apply_command(&thermostat, Command::FanSpeed, "mid").await.unwrap();

    // Cooling stays LOW, heating becomes MID
    assert_eq!(
        thermostat.fan_speed.status(),
        Some(FanSpeedStatus::new(FanSpeed::Low, FanSpeed::Mid))
    );
    assert_eq!(
        fake.register(80),
        Some(ParameterList::new().with(0x20, vec![1]).with(0x21, vec![3]))
    );
}

#[tokio::test]
async fn test_set_point_uses_cached_status() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = thermostat(&fake).await;
    thermostat.refresh().await.unwrap();
    let queries = fake.requests().len();

    // Cooling mode: only the cooling set point moves
    apply_command(&thermostat, Command::SetPoint, "26").await.unwrap();

    assert_eq!(fake.requests().len(), queries + 1);
    assert_eq!(thermostat.set_point.status(), Some(SetPointStatus::new(26, 21)));
}

#[tokio::test]
async fn test_set_point_payload_is_clamped() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = thermostat(&fake).await;

    apply_command(&thermostat, Command::SetPoint, "300").await.unwrap();

    // Cooling mode: 30 °C, heating unchanged at 21 °C
    assert_eq!(thermostat.set_point.status(), Some(SetPointStatus::new(30, 21)));
    assert_eq!(
        fake.register(64),
        Some(
            ParameterList::new()
                .with(0x20, vec![0x0f, 0x00])
                .with(0x21, vec![0x0a, 0x80])
        )
    );
}

#[tokio::test]
async fn test_power_state_command() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = thermostat(&fake).await;

    apply_command(&thermostat, Command::PowerState, "off").await.unwrap();
    assert_eq!(thermostat.power_state.status(), Some(PowerStateStatus::new(false)));

    apply_command(&thermostat, Command::PowerState, "ON").await.unwrap();
    assert_eq!(thermostat.power_state.status(), Some(PowerStateStatus::new(true)));
}

#[tokio::test]
async fn test_invalid_payload_is_not_sent() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = thermostat(&fake).await;

    let result = apply_command(&thermostat, Command::SetPoint, "warm").await;
    assert!(matches!(result, Err(BridgeError::InvalidPayload { .. })));

    let result = apply_command(&thermostat, Command::FanSpeed, "turbo").await;
    assert!(matches!(result, Err(BridgeError::InvalidPayload { .. })));

    assert_eq!(fake.write_count(), 0);
}

// ============================================================================
// Status refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_publishes_status() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = Arc::new(thermostat(&fake).await);
    let mut bridge = MqttBridge::new(Arc::clone(&thermostat), MqttBridgeConfig::default());

    let update = bridge.refresh_status(&fake.discovery()).await.unwrap();

    let status = match update {
        Some(StatusUpdate::Available(status)) => status,
        other => panic!("expected a status, got {:?}", other),
    };
    assert_eq!(status["power_state"]["turn_on"], true);
    assert_eq!(status["temperatures"]["indoor"], 23);
    assert_eq!(
        bridge.topics().state(),
        "/madoka/AA_BB_CC_DD_EE_FF/state/get"
    );
}

#[tokio::test]
async fn test_failed_refresh_marks_unavailable_then_restarts() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = Arc::new(thermostat(&fake).await);
    let mut bridge = MqttBridge::new(Arc::clone(&thermostat), MqttBridgeConfig::default());

    fake.set_silent(true);
    let update = bridge.refresh_status(&fake.discovery()).await.unwrap();
    assert_eq!(update, Some(StatusUpdate::Unavailable));

    fake.set_silent(false);
    let update = bridge.refresh_status(&fake.discovery()).await.unwrap();
    assert!(matches!(update, Some(StatusUpdate::Available(_))));
    assert_eq!(fake.connect_count(), 2);
}
