//! Bounded retry for page opens: exponential backoff, navigation timeouts
//! only, escalating to a driver crash once attempts are exhausted.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use vidwatch_core::WatchError;
use vidwatch_proxy::ProxyEndpoint;

use crate::driver::{PageHandle, WatchDriver};

/// Retry policy configuration. Deterministic: no jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier for each subsequent wait.
    pub backoff_factor: f64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Compute the delay before attempt `attempt_number` (1-indexed; the
    /// first attempt carries no delay).
    pub fn delay_for(&self, attempt_number: u32) -> Duration {
        if attempt_number <= 1 {
            return Duration::ZERO;
        }
        let delay_ms = self.base_delay_ms as f64
            * self.backoff_factor.powi((attempt_number - 2) as i32);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }

    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Open a page, retrying [`WatchError::NavigationTimeout`] per the policy.
///
/// Any other error propagates immediately; a timeout that survives all
/// attempts escalates to [`WatchError::DriverCrashed`].
pub async fn open_with_retry(
    driver: &dyn WatchDriver,
    url: &Url,
    proxy: &ProxyEndpoint,
    headless: bool,
    policy: &RetryPolicy,
) -> Result<PageHandle, WatchError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let delay = policy.delay_for(attempt);
        if !delay.is_zero() {
            debug!(attempt, ?delay, "backing off before navigation retry");
            tokio::time::sleep(delay).await;
        }
        match driver.open(url, proxy, headless).await {
            Ok(handle) => return Ok(handle),
            Err(WatchError::NavigationTimeout(reason)) if policy.should_retry(attempt) => {
                warn!(attempt, %reason, "navigation timed out, retrying");
            }
            Err(WatchError::NavigationTimeout(reason)) => {
                return Err(WatchError::DriverCrashed(format!(
                    "navigation failed after {attempt} attempts: {reason}"
                )));
            }
            Err(e) => return Err(e),
        }
    }
}
