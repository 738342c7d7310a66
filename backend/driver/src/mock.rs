//! Deterministic scripted driver for tests.
//!
//! No timing, no randomness: every behavior is configured up front and every
//! call is counted, so controller tests can assert exactly what the driver
//! was asked to do.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use vidwatch_core::WatchError;
use vidwatch_proxy::ProxyEndpoint;

use crate::driver::{Interaction, InteractionKind, PageHandle, WatchDriver};

#[derive(Default)]
struct MockState {
    open_handles: HashSet<PageHandle>,
    script: VecDeque<Option<Interaction>>,
}

/// Scripted [`WatchDriver`] double.
pub struct MockDriver {
    state: Mutex<MockState>,
    /// Number of leading `open` calls that report a navigation timeout.
    open_timeouts: AtomicU64,
    open_crash: bool,
    /// Delay applied to every `open` call before it resolves.
    open_delay: Option<Duration>,
    /// Crash on the nth `interact` call (1-indexed), if set.
    crash_on_interact: Option<u64>,
    fail_close: bool,
    open_calls: AtomicU64,
    interact_calls: AtomicU64,
    close_calls: AtomicU64,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            open_timeouts: AtomicU64::new(0),
            open_crash: false,
            open_delay: None,
            crash_on_interact: None,
            fail_close: false,
            open_calls: AtomicU64::new(0),
            interact_calls: AtomicU64::new(0),
            close_calls: AtomicU64::new(0),
        }
    }

    /// The first `n` open calls fail with `NavigationTimeout`.
    pub fn with_open_timeouts(self, n: u64) -> Self {
        self.open_timeouts.store(n, Ordering::SeqCst);
        self
    }

    /// Every open call fails with `DriverCrashed`.
    pub fn with_open_crash(mut self) -> Self {
        self.open_crash = true;
        self
    }

    /// Every open call sleeps for `delay` before resolving.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// The nth interact call (1-indexed) fails with `DriverCrashed`.
    pub fn with_crash_on_interact(mut self, nth: u64) -> Self {
        self.crash_on_interact = Some(nth);
        self
    }

    /// Close calls fail with `DriverCrashed`.
    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Fixed interaction sequence; once drained, further calls yield the
    /// default scroll step.
    pub fn with_script(self, script: Vec<Option<Interaction>>) -> Self {
        self.state.lock().unwrap().script = script.into();
        self
    }

    pub fn open_calls(&self) -> u64 {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn interact_calls(&self) -> u64 {
        self.interact_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u64 {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WatchDriver for MockDriver {
    async fn open(
        &self,
        _url: &Url,
        _proxy: &ProxyEndpoint,
        _headless: bool,
    ) -> Result<PageHandle, WatchError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.open_crash {
            return Err(WatchError::DriverCrashed("scripted open crash".into()));
        }
        let remaining = self.open_timeouts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.open_timeouts.store(remaining - 1, Ordering::SeqCst);
            return Err(WatchError::NavigationTimeout("scripted timeout".into()));
        }
        let handle = PageHandle::new();
        self.state.lock().unwrap().open_handles.insert(handle);
        Ok(handle)
    }

    async fn interact(&self, handle: &PageHandle) -> Result<Option<Interaction>, WatchError> {
        let call = self.interact_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.crash_on_interact == Some(call) {
            return Err(WatchError::DriverCrashed("scripted interact crash".into()));
        }
        let mut state = self.state.lock().unwrap();
        if !state.open_handles.contains(handle) {
            return Err(WatchError::DriverCrashed("interact on closed handle".into()));
        }
        Ok(state.script.pop_front().unwrap_or_else(|| {
            Some(Interaction::now(InteractionKind::Scroll { delta_px: 120 }))
        }))
    }

    async fn close(&self, handle: PageHandle) -> Result<(), WatchError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().open_handles.remove(&handle);
        if self.fail_close {
            return Err(WatchError::DriverCrashed("scripted close failure".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_sequence_then_default() {
        let driver = MockDriver::new().with_script(vec![
            Some(Interaction::now(InteractionKind::PlaybackStarted)),
            None,
        ]);
        let url = Url::parse("https://example.com/v").unwrap();
        let proxy = ProxyEndpoint::socks5("127.0.0.1", 9050);
        let handle = driver.open(&url, &proxy, true).await.unwrap();

        let first = driver.interact(&handle).await.unwrap().unwrap();
        assert_eq!(first.kind, InteractionKind::PlaybackStarted);
        assert!(driver.interact(&handle).await.unwrap().is_none());
        // Script drained: default scroll.
        assert!(driver.interact(&handle).await.unwrap().is_some());
        assert_eq!(driver.interact_calls(), 3);
    }

    #[tokio::test]
    async fn interact_after_close_crashes() {
        let driver = MockDriver::new();
        let url = Url::parse("https://example.com/v").unwrap();
        let proxy = ProxyEndpoint::socks5("127.0.0.1", 9050);
        let handle = driver.open(&url, &proxy, true).await.unwrap();
        driver.close(handle).await.unwrap();
        assert!(matches!(
            driver.interact(&handle).await,
            Err(WatchError::DriverCrashed(_))
        ));
    }
}
