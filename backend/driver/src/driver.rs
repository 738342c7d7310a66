//! The driver trait and the interaction vocabulary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use vidwatch_core::WatchError;
use vidwatch_proxy::ProxyEndpoint;

/// A discrete observable action performed on the page during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionKind {
    /// Playback was started on the page's video element.
    PlaybackStarted,
    /// The page was scrolled by the given amount.
    Scroll { delta_px: i32 },
    /// Playback was paused or resumed.
    PauseToggle,
}

/// One element of a session's interaction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: InteractionKind,
}

impl Interaction {
    pub fn now(kind: InteractionKind) -> Self {
        Self {
            at: Utc::now(),
            kind,
        }
    }
}

/// Handle to one opened page. Opaque to callers; the driver keeps the
/// per-page state behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle {
    pub id: Uuid,
}

impl PageHandle {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for PageHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A controlled browser-like client.
///
/// The interaction sequence produced through [`interact`](Self::interact) is
/// finite and not restartable: once the handle is closed (or the driver
/// reports a crash) no further interactions can be pulled from it.
#[async_trait]
pub trait WatchDriver: Send + Sync {
    /// Open the given URL through the proxy. A single attempt; callers that
    /// want the bounded-retry behavior use
    /// [`open_with_retry`](crate::retry::open_with_retry).
    async fn open(
        &self,
        url: &Url,
        proxy: &ProxyEndpoint,
        headless: bool,
    ) -> Result<PageHandle, WatchError>;

    /// Advance the interaction sequence by one step. Returns `None` for an
    /// idle step (the page stays under observation but nothing user-visible
    /// happens). [`WatchError::DriverCrashed`] is fatal to the session.
    async fn interact(&self, handle: &PageHandle) -> Result<Option<Interaction>, WatchError>;

    /// Release the page and its browser resources.
    async fn close(&self, handle: PageHandle) -> Result<(), WatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_serializes_tagged_kind() {
        let interaction = Interaction::now(InteractionKind::Scroll { delta_px: -120 });
        let value = serde_json::to_value(interaction).unwrap();
        assert_eq!(value["kind"], "scroll");
        assert_eq!(value["delta_px"], -120);
    }

    #[test]
    fn handles_are_unique() {
        assert_ne!(PageHandle::new(), PageHandle::new());
    }
}
