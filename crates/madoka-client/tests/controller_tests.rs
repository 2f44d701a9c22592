//! Thermostat controller tests

use madoka_client::prelude::*;
use madoka_core::ParameterList;
use madoka_test_utils::{FakeThermostat, TEST_ADDRESS};
use serde_json::json;

fn builder() -> ThermostatBuilder {
    ThermostatBuilder::new(TEST_ADDRESS)
        .connect_backoff(Duration::from_millis(10))
        .write_attempts(3)
        .write_retry_delay(Duration::from_millis(5))
        .response_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_status_empty_before_refresh() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = builder().connect(&fake.discovery()).await.unwrap();

    assert!(thermostat.status().is_empty());
    assert!(thermostat.connection().is_connected());
}

#[tokio::test]
async fn test_refresh_aggregates_status() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = builder().connect(&fake.discovery()).await.unwrap();

    thermostat.refresh().await.unwrap();
    let status = serde_json::Value::Object(thermostat.status());

    assert_eq!(
        status,
        json!({
            "fan_speed": {"cooling_fan_speed": "LOW", "heating_fan_speed": "HIGH"},
            "operation_mode": {"operation_mode": "COOL"},
            "power_state": {"turn_on": true},
            "set_point": {"cooling_set_point": 24, "heating_set_point": 21},
            "temperatures": {"indoor": 23, "outdoor": null},
            "clean_filter_indicator": {"clean_filter_indicator": false},
        })
    );
    // Six queries, the reset feature has none
    assert_eq!(fake.requests().len(), 6);
}

#[tokio::test]
async fn test_refresh_continues_past_failures() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    fake.set_register(48, ParameterList::new().with(0x20, vec![9]));
    let thermostat = builder().connect(&fake.discovery()).await.unwrap();

    let result = thermostat.refresh().await;

    assert!(matches!(result, Err(ClientError::Protocol(_))));
    let status = thermostat.status();
    assert!(!status.contains_key("operation_mode"));
    assert_eq!(status.len(), 5);
}

#[tokio::test]
async fn test_update_reflected_in_status() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = builder().connect(&fake.discovery()).await.unwrap();

    thermostat
        .power_state
        .update(PowerStateStatus::new(false))
        .await
        .unwrap();

    assert_eq!(
        serde_json::Value::Object(thermostat.status()),
        json!({"power_state": {"turn_on": false}})
    );
}

#[tokio::test]
async fn test_read_info() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let thermostat = builder().connect(&fake.discovery()).await.unwrap();

    let info = thermostat.read_info().await.unwrap();

    assert_eq!(info.len(), 3);
    assert_eq!(
        info.get("Firmware Revision String").map(String::as_str),
        Some("1.2.3")
    );
}

#[tokio::test]
async fn test_connect_to_missing_device_fails() {
    let fake = FakeThermostat::new("11:22:33:44:55:66");

    let result = builder().connect(&fake.discovery()).await;

    assert!(matches!(result, Err(ClientError::Aborted(_))));
}
