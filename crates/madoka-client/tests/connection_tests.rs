//! Connection manager tests
//!
//! Runs the real connection state machine against the in-memory thermostat:
//! - Device selection and abort
//! - Connect retry and automatic reconnection
//! - Chunked sends with write retries
//! - Cancellation on link loss, reassembly failure and timeout

use madoka_client::{ClientError, Connection, ConnectionConfig, ConnectionState};
use madoka_core::{envelope, split_into_chunks};
use madoka_test_utils::{wait_until, FakeThermostat, DEFAULT_TIMEOUT, TEST_ADDRESS};
use madoka_transport::Discovery;
use std::time::Duration;
use tokio::time::timeout;

fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        connect_backoff_ms: 10,
        write_attempts: 5,
        write_retry_delay_ms: 5,
        response_timeout_ms: Some(2000),
    }
}

async fn connected() -> (FakeThermostat, Connection<FakeThermostat>) {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let connection = Connection::new(TEST_ADDRESS, fast_config());
    connection
        .start(&fake.discovery())
        .await
        .expect("Connect failed");
    (fake, connection)
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_send_while_disconnected_is_cancelled_without_writes() {
    let (fake, connection) = connected().await;
    connection.stop().await;

    let mut pending = connection.send(32, &[0x00, 0x00]).await.unwrap();

    assert!(pending.is_cancelled());
    assert_eq!(fake.write_count(), 0);
    assert_eq!(connection.pending_requests(), 0);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unknown_device_aborts() {
    let connection: Connection<FakeThermostat> = Connection::new(TEST_ADDRESS, fast_config());

    let result = connection.start(&Discovery::default()).await;
    assert!(matches!(result, Err(ClientError::Aborted(_))));
    assert_eq!(connection.state(), ConnectionState::Aborted);

    // Terminal: neither requests nor a new start get through
    assert!(matches!(
        connection.request(32, &[0x00, 0x00]).await,
        Err(ClientError::Aborted(_))
    ));
    let fake = FakeThermostat::new(TEST_ADDRESS);
    assert!(matches!(
        connection.start(&fake.discovery()).await,
        Err(ClientError::Aborted(_))
    ));
    assert_eq!(fake.connect_count(), 0);
}

#[tokio::test]
async fn test_start_selects_device_case_insensitively() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let connection = Connection::new(&TEST_ADDRESS.to_lowercase(), fast_config());

    connection.start(&fake.discovery()).await.unwrap();

    assert!(connection.is_connected());
    assert_eq!(connection.name(), "BRC1H");
    assert_eq!(fake.connect_count(), 1);
}

#[tokio::test]
async fn test_connect_retries_until_success() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    fake.fail_next_connects(2);
    let connection = Connection::new(TEST_ADDRESS, fast_config());

    connection.start(&fake.discovery()).await.unwrap();

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(fake.connect_count(), 1);
}

#[tokio::test]
async fn test_link_loss_cancels_pending_and_reconnects() {
    let (fake, connection) = connected().await;
    fake.set_silent(true);

    let pending = connection.send(64, &[0x00, 0x00]).await.unwrap();
    assert_eq!(connection.pending_requests(), 1);

    fake.drop_link().await;

    let result = timeout(DEFAULT_TIMEOUT, pending.wait()).await.unwrap();
    assert!(matches!(result, Err(ClientError::Cancelled)));

    assert!(
        wait_until(
            || connection.is_connected() && fake.connect_count() == 2,
            DEFAULT_TIMEOUT
        )
        .await,
        "connection was not re-established"
    );

    fake.set_silent(false);
    let response = connection.request(32, &[0x20, 0x01, 0x00]).await.unwrap();
    assert_eq!(envelope::command_id(&response), Some(32));
}

#[tokio::test]
async fn test_stop_disconnects_and_cancels() {
    let (fake, connection) = connected().await;
    fake.set_silent(true);
    let pending = connection.send(48, &[0x20, 0x01, 0x00]).await.unwrap();

    connection.stop().await;

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(!fake.is_linked());
    assert!(matches!(pending.wait().await, Err(ClientError::Cancelled)));

    // No automatic reconnect after an explicit stop
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fake.connect_count(), 1);
}

// ============================================================================
// Sending
// ============================================================================

#[tokio::test]
async fn test_request_roundtrip() {
    let (fake, connection) = connected().await;

    let response = connection.request(32, &[0x20, 0x01, 0x00]).await.unwrap();

    assert_eq!(response.as_ref(), &[0x07, 0x00, 0x00, 0x20, 0x20, 0x01, 0x01]);
    assert_eq!(
        fake.requests()[0].as_ref(),
        &[0x07, 0x00, 0x00, 0x20, 0x20, 0x01, 0x00]
    );
    assert_eq!(connection.pending_requests(), 0);
}

#[tokio::test]
async fn test_multi_chunk_request_written_in_order() {
    let (fake, connection) = connected().await;
    // One 40 byte parameter: a 46 byte envelope, three chunks
    let parameters: Vec<u8> = [0x20, 40].into_iter().chain(0..40).collect();

    connection.request(0x0123, &parameters).await.unwrap();

    let writes = fake.writes();
    assert_eq!(writes.len(), 3);
    for (i, chunk) in writes.iter().enumerate() {
        assert_eq!(chunk[0] as usize, i);
    }
}

#[tokio::test]
async fn test_concurrent_requests_do_not_interleave_chunks() {
    let (fake, connection) = connected().await;
    fake.set_write_delay(Duration::from_millis(2));
    let parameters: Vec<u8> = [0x20, 40].into_iter().chain(0..40).collect();

    let (first, second) = tokio::join!(
        connection.request(0x0123, &parameters),
        connection.request(0x0456, &parameters)
    );

    assert_eq!(envelope::command_id(&first.unwrap()), Some(0x0123));
    assert_eq!(envelope::command_id(&second.unwrap()), Some(0x0456));

    let sequence: Vec<u8> = fake.writes().iter().map(|chunk| chunk[0]).collect();
    assert_eq!(sequence, vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(fake.requests().len(), 2);
}

#[tokio::test]
async fn test_link_loss_mid_send_cancels_without_error() {
    let (fake, connection) = connected().await;
    // Keep the link down once it drops
    fake.fail_next_connects(u32::MAX);
    fake.drop_link_after_writes(1);
    let parameters: Vec<u8> = [0x20, 40].into_iter().chain(0..40).collect();

    let mut pending = connection.send(0x0123, &parameters).await.unwrap();

    assert!(pending.is_cancelled());
    assert_eq!(fake.write_count(), 1);
    assert_eq!(connection.pending_requests(), 0);
    assert!(!connection.is_connected());

    connection.stop().await;
}

#[tokio::test]
async fn test_write_failures_are_retried() {
    let (fake, connection) = connected().await;
    fake.fail_next_writes(3);

    let response = connection.request(48, &[0x20, 0x01, 0x00]).await.unwrap();

    assert_eq!(envelope::command_id(&response), Some(48));
    assert_eq!(fake.write_count(), 1);
}

#[tokio::test]
async fn test_exhausted_write_budget_is_an_error() {
    let (fake, connection) = connected().await;
    fake.fail_next_writes(5);

    let result = connection.send(48, &[0x20, 0x01, 0x00]).await;

    assert!(matches!(result, Err(ClientError::SendFailed(_))));
    assert_eq!(fake.write_count(), 0);
    assert_eq!(connection.pending_requests(), 0);
    assert!(connection.is_connected());
}

// ============================================================================
// Response correlation
// ============================================================================

#[tokio::test]
async fn test_pipelined_requests_for_same_command_match_in_order() {
    let (fake, connection) = connected().await;
    fake.set_silent(true);

    let first = connection.send(32, &[0x00, 0x00]).await.unwrap();
    let second = connection.send(32, &[0x00, 0x00]).await.unwrap();
    assert_eq!(connection.pending_requests(), 2);

    let on = envelope::frame(32, &[0x20, 0x01, 0x01]).unwrap();
    let off = envelope::frame(32, &[0x20, 0x01, 0x00]).unwrap();
    fake.notify_envelope(&on).await;
    fake.notify_envelope(&off).await;

    let first = timeout(DEFAULT_TIMEOUT, connection.await_response(first))
        .await
        .unwrap()
        .unwrap();
    let second = timeout(DEFAULT_TIMEOUT, connection.await_response(second))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, on);
    assert_eq!(second, off);
    assert_eq!(connection.pending_requests(), 0);
}

#[tokio::test]
async fn test_reassembly_failure_cancels_request() {
    let (fake, connection) = connected().await;
    fake.set_silent(true);
    let pending = connection.send(64, &[0x00, 0x00]).await.unwrap();

    // First half of a response, then an unrelated message starting over at 0
    let partial = envelope::frame(64, &[0u8; 30]).unwrap();
    fake.inject(split_into_chunks(&partial)[0].clone()).await;
    fake.notify_envelope(&envelope::frame(32, &[0x20, 0x01, 0x01]).unwrap())
        .await;

    let result = timeout(DEFAULT_TIMEOUT, pending.wait()).await.unwrap();
    assert!(matches!(result, Err(ClientError::Cancelled)));
    assert!(connection.is_connected());
}

#[tokio::test]
async fn test_timeout_drops_handle() {
    let fake = FakeThermostat::new(TEST_ADDRESS);
    let config = ConnectionConfig {
        response_timeout_ms: Some(50),
        ..fast_config()
    };
    let connection = Connection::new(TEST_ADDRESS, config);
    connection.start(&fake.discovery()).await.unwrap();

    fake.set_silent(true);
    let result = connection.request(80, &[0x20, 0x01, 0x00, 0x21, 0x01, 0x00]).await;
    assert!(matches!(result, Err(ClientError::Timeout)));
    assert_eq!(connection.pending_requests(), 0);

    // A late answer has nobody to go to
    fake.notify_envelope(&envelope::frame(80, &[0x20, 0x01, 0x05, 0x21, 0x01, 0x05]).unwrap())
        .await;

    fake.set_silent(false);
    let response = connection
        .request(80, &[0x20, 0x01, 0x00, 0x21, 0x01, 0x00])
        .await
        .unwrap();
    assert_eq!(
        response.as_ref(),
        &[0x0a, 0x00, 0x00, 0x50, 0x20, 0x01, 0x01, 0x21, 0x01, 0x05]
    );
}

// ============================================================================
// Device information
// ============================================================================

#[tokio::test]
async fn test_read_info_is_cached() {
    let (fake, connection) = connected().await;

    let info = connection.read_info().await.unwrap();
    assert_eq!(info.get("Model Number String").map(String::as_str), Some("BRC1H"));
    assert_eq!(info.get("System ID").map(String::as_str), Some("12-34"));

    connection.stop().await;
    assert!(!fake.is_linked());
    assert_eq!(connection.read_info().await.unwrap(), info);
}

#[tokio::test]
async fn test_read_info_requires_connection() {
    let connection: Connection<FakeThermostat> = Connection::new(TEST_ADDRESS, fast_config());
    assert!(matches!(
        connection.read_info().await,
        Err(ClientError::NotConnected)
    ));
}
