//! `vidwatch-core` — shared types for the vidwatch watch-session runtime.
//!
//! Holds the session configuration (wire form + validated form), the session
//! state machine vocabulary, the log-event types fanned out by the reporter,
//! and the top-level error taxonomy.

pub mod error;
pub mod event;
pub mod types;

pub use error::WatchError;
pub use event::{LogEvent, SessionEvent, SessionSnapshot, SessionStatus, Severity};
pub use types::{ProxyMode, RawSessionConfig, SessionConfig, MAX_WATCH_SECS, MIN_WATCH_SECS};
