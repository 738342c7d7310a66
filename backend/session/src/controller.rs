//! The session state machine.
//!
//! One controller owns one active session. Transitions are serialized
//! through a single mutex; the watch loop runs as a cancellable background
//! task that observes a stop request within one tick.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use vidwatch_config::RuntimeConfig;
use vidwatch_core::{SessionConfig, SessionSnapshot, SessionStatus, Severity, WatchError};
use vidwatch_driver::{open_with_retry, PageHandle, RetryPolicy, WatchDriver};
use vidwatch_proxy::resolve;

use crate::reporter::EventReporter;

/// Orchestrates one watch session: proxy, driver, watch loop, cleanup.
pub struct SessionController {
    config: SessionConfig,
    runtime: RuntimeConfig,
    driver: Arc<dyn WatchDriver>,
    retry: RetryPolicy,
    reporter: Arc<EventReporter>,
    state: RwLock<SessionSnapshot>,
    /// Serializes state transitions; only one may be in flight at a time.
    transitions: Mutex<()>,
    stop_tx: watch::Sender<bool>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        runtime: RuntimeConfig,
        driver: Arc<dyn WatchDriver>,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            runtime,
            driver,
            retry: RetryPolicy::default(),
            reporter: Arc::new(EventReporter::new(SessionSnapshot::new(session_id))),
            state: RwLock::new(SessionSnapshot::new(session_id)),
            transitions: Mutex::new(()),
            stop_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.state.read().unwrap().session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn reporter(&self) -> &Arc<EventReporter> {
        &self.reporter
    }

    /// Current immutable snapshot; never blocks on in-flight transitions.
    pub fn status(&self) -> SessionSnapshot {
        self.state.read().unwrap().clone()
    }

    /// Start the session: `idle -> starting`, resolve the proxy, open the
    /// page (bounded retry), then `starting -> running` and spawn the watch
    /// loop. Any start-phase failure settles the session into `failed`.
    #[instrument(skip_all, fields(session = %self.id()))]
    pub async fn start(self: &Arc<Self>) -> Result<SessionSnapshot, WatchError> {
        let guard = self.transitions.lock().await;
        if self.status().status != SessionStatus::Idle {
            // Rejected; state unchanged.
            return Err(WatchError::AlreadyRunning);
        }
        self.stop_tx.send_replace(false);
        self.apply(SessionStatus::Starting);

        let proxy = match resolve(
            self.config.proxy_mode,
            self.config.custom_proxy_url.as_ref(),
            &self.runtime,
        )
        .await
        {
            Ok(proxy) => proxy,
            Err(e) => return Err(self.fail_while_starting(e)),
        };
        self.reporter
            .log(Severity::Info, format!("egress resolved: {proxy}"));

        if self.stop_requested() {
            drop(guard);
            return Ok(self.wind_down(None).await);
        }

        let handle = match open_with_retry(
            self.driver.as_ref(),
            &self.config.video_url,
            &proxy,
            self.config.headless,
            &self.retry,
        )
        .await
        {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail_while_starting(e)),
        };
        self.reporter
            .log(Severity::Info, format!("page open: {}", self.config.video_url));

        if self.stop_requested() {
            drop(guard);
            return Ok(self.wind_down(Some(handle)).await);
        }

        let snapshot = self.apply(SessionStatus::Running);
        drop(guard);

        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.watch_loop(handle).await });
        Ok(snapshot)
    }

    /// Request a stop. Idempotent: on a terminal session this is a no-op
    /// returning the terminal snapshot. Otherwise the stop signal is raised
    /// and observed by the session within one tick.
    pub fn stop(&self) -> SessionSnapshot {
        let current = self.status();
        if current.status.is_terminal() {
            return current;
        }
        self.reporter.log(Severity::Info, "stop requested");
        // `send_replace` stores the flag even when no receiver is subscribed
        // yet, so a stop raised during the starting phase is not lost.
        self.stop_tx.send_replace(true);
        self.status()
    }

    /// Return a terminal controller to `idle` under a fresh session id.
    pub async fn reset(&self) -> Result<SessionSnapshot, WatchError> {
        let _guard = self.transitions.lock().await;
        if !self.status().status.is_terminal() {
            return Err(WatchError::AlreadyRunning);
        }
        let fresh = SessionSnapshot::new(Uuid::new_v4());
        *self.state.write().unwrap() = fresh.clone();
        self.stop_tx.send_replace(false);
        self.reporter.log(Severity::Info, "session reset");
        self.reporter.publish_state(fresh.clone());
        Ok(fresh)
    }

    fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Apply a transition: mutate the snapshot, stamp start/end times, and
    /// emit a log event plus the updated snapshot. Callers hold the
    /// transition mutex.
    fn apply(&self, status: SessionStatus) -> SessionSnapshot {
        let snapshot = {
            let mut state = self.state.write().unwrap();
            state.status = status;
            match status {
                SessionStatus::Running => state.started_at = Some(Utc::now()),
                SessionStatus::Completed | SessionStatus::Failed => {
                    state.ended_at = Some(Utc::now())
                }
                _ => {}
            }
            state.clone()
        };
        self.reporter.log(
            Severity::Info,
            format!("session {} -> {}", snapshot.session_id, status),
        );
        self.reporter.publish_state(snapshot.clone());
        snapshot
    }

    fn fail_while_starting(&self, error: WatchError) -> WatchError {
        self.reporter.log(Severity::Error, error.to_string());
        self.apply(SessionStatus::Failed);
        error
    }

    /// The cancellable background watch task: one tick per second, pulling
    /// interactions from the driver until the watch time elapses, the stop
    /// signal is raised, or the driver crashes.
    async fn watch_loop(self: Arc<Self>, handle: PageHandle) {
        let mut stop_rx = self.stop_tx.subscribe();
        // `subscribe` marks the current value as seen, so a stop raised
        // before this task ran would never fire `changed`. Honor it here.
        if self.stop_requested() {
            self.wind_down(Some(handle)).await;
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick fires immediately; consume it so every
        // loop tick represents one elapsed second.
        ticker.tick().await;

        let total = u64::from(self.config.watch_time_secs);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let elapsed = {
                        let mut state = self.state.write().unwrap();
                        state.elapsed_secs += 1;
                        state.elapsed_secs
                    };
                    match self.driver.interact(&handle).await {
                        Ok(Some(interaction)) => {
                            let snapshot = {
                                let mut state = self.state.write().unwrap();
                                state.interaction_count += 1;
                                state.clone()
                            };
                            debug!(?interaction, "driver interaction");
                            self.reporter.log(
                                Severity::Info,
                                format!("interaction: {:?}", interaction.kind),
                            );
                            self.reporter.publish_state(snapshot);
                        }
                        Ok(None) => self.reporter.publish_state(self.status()),
                        Err(e) => {
                            let crash = to_crash(e);
                            self.reporter.log(Severity::Error, crash.to_string());
                            if let Err(close_err) = self.driver.close(handle).await {
                                warn!(error = %close_err, "driver close after crash failed");
                            }
                            let _guard = self.transitions.lock().await;
                            self.apply(SessionStatus::Failed);
                            return;
                        }
                    }
                    if elapsed >= total {
                        self.reporter.log(
                            Severity::Info,
                            format!("watch time of {total}s elapsed"),
                        );
                        break;
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow_and_update() {
                        break;
                    }
                }
            }
        }
        self.wind_down(Some(handle)).await;
    }

    /// `-> stopping`, close the driver if a page is open, then settle into
    /// `completed` (or `failed` if the close errors; never a silent leak).
    async fn wind_down(&self, handle: Option<PageHandle>) -> SessionSnapshot {
        let _guard = self.transitions.lock().await;
        self.apply(SessionStatus::Stopping);
        let close_result = match handle {
            Some(handle) => self.driver.close(handle).await,
            None => Ok(()),
        };
        match close_result {
            Ok(()) => self.apply(SessionStatus::Completed),
            Err(e) => {
                self.reporter
                    .log(Severity::Error, format!("driver close failed: {}", to_crash(e)));
                self.apply(SessionStatus::Failed)
            }
        }
    }
}

/// Unexpected driver-side failures are mapped to a crash at the controller
/// boundary.
fn to_crash(error: WatchError) -> WatchError {
    match error {
        e @ WatchError::DriverCrashed(_) => e,
        other => WatchError::DriverCrashed(other.to_string()),
    }
}
