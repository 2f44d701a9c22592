//! Common test helpers and utilities for Madoka tests
//!
//! This crate provides:
//! - An in-memory thermostat implementing the link trait ([`FakeThermostat`])
//! - Condition-based waiting (no hardcoded sleeps)

mod fake;

pub use fake::{FakeThermostat, UPDATE_FLAG};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Address every test device uses unless a test needs another one
pub const TEST_ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for a synchronous predicate
pub async fn wait_until<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    let check = &check;
    wait_for(move || async move { check() }, DEFAULT_CHECK_INTERVAL, max_wait).await
}

/// Wait for a boolean flag to become true
pub async fn wait_for_flag(flag: &AtomicBool, max_wait: Duration) -> bool {
    wait_until(|| flag.load(Ordering::SeqCst), max_wait).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.store(true, Ordering::SeqCst);
        });

        assert!(wait_for_flag(&flag, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        assert!(!wait_until(|| false, Duration::from_millis(30)).await);
    }
}
