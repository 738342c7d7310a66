//! Event fan-out: append-only log history plus push-based subscriptions.

use std::sync::{Mutex, RwLock};

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use vidwatch_core::{LogEvent, SessionEvent, SessionSnapshot, Severity};

/// Per-subscriber buffer capacity. A subscriber that falls further behind
/// than this loses its oldest buffered events; the producer never blocks.
const SUBSCRIBER_CAPACITY: usize = 256;

/// Append-only ordered log of session events plus the latest state snapshot.
///
/// Subscribers receive every event emitted after they subscribe, in emission
/// order. Prior history is available only through an explicit
/// [`replay`](Self::replay).
pub struct EventReporter {
    tx: broadcast::Sender<SessionEvent>,
    history: Mutex<Vec<LogEvent>>,
    latest: RwLock<SessionSnapshot>,
}

impl EventReporter {
    pub fn new(initial: SessionSnapshot) -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            tx,
            history: Mutex::new(Vec::new()),
            latest: RwLock::new(initial),
        }
    }

    /// Append a log event and push it to all connected subscribers.
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        let event = LogEvent::new(severity, message);
        match severity {
            Severity::Info => info!(session_log = %event.message),
            Severity::Warn => warn!(session_log = %event.message),
            Severity::Error => error!(session_log = %event.message),
        }
        self.history.lock().unwrap().push(event.clone());
        // No receivers is fine; send never blocks either way.
        let _ = self.tx.send(SessionEvent::Log(event));
    }

    /// Record the latest state snapshot and push it to subscribers.
    pub fn publish_state(&self, snapshot: SessionSnapshot) {
        *self.latest.write().unwrap() = snapshot.clone();
        let _ = self.tx.send(SessionEvent::State(snapshot));
    }

    /// Subscribe to events emitted from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Full buffered log history, for late subscribers that ask for it.
    pub fn replay(&self) -> Vec<LogEvent> {
        self.history.lock().unwrap().clone()
    }

    /// Latest recorded state snapshot.
    pub fn latest(&self) -> SessionSnapshot {
        self.latest.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use vidwatch_core::SessionStatus;

    fn reporter() -> EventReporter {
        EventReporter::new(SessionSnapshot::new(Uuid::new_v4()))
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_emission_order() {
        let reporter = reporter();
        let mut rx = reporter.subscribe();
        reporter.log(Severity::Info, "first");
        reporter.log(Severity::Warn, "second");

        match rx.recv().await.unwrap() {
            SessionEvent::Log(e) => assert_eq!(e.message, "first"),
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.unwrap() {
            SessionEvent::Log(e) => assert_eq!(e.message, "second"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn late_subscriber_misses_history_unless_replayed() {
        let reporter = reporter();
        reporter.log(Severity::Info, "before subscription");
        let mut rx = reporter.subscribe();
        reporter.log(Severity::Info, "after subscription");

        match rx.recv().await.unwrap() {
            SessionEvent::Log(e) => assert_eq!(e.message, "after subscription"),
            other => panic!("unexpected event {other:?}"),
        }

        let history = reporter.replay();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "before subscription");
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_block_or_fail() {
        let reporter = reporter();
        for i in 0..1000 {
            reporter.log(Severity::Info, format!("event {i}"));
        }
        assert_eq!(reporter.replay().len(), 1000);
    }

    #[test]
    fn latest_snapshot_tracks_publishes() {
        let reporter = reporter();
        let mut snapshot = reporter.latest();
        snapshot.status = SessionStatus::Running;
        snapshot.elapsed_secs = 7;
        reporter.publish_state(snapshot);
        let latest = reporter.latest();
        assert_eq!(latest.status, SessionStatus::Running);
        assert_eq!(latest.elapsed_secs, 7);
    }
}
