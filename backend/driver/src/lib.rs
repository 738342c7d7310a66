//! `vidwatch-driver` — drives a controlled browser to load and watch a video.
//!
//! The [`WatchDriver`] trait is the seam the session controller works
//! against. [`ChromiumDriver`] is the real implementation: it launches a
//! headless Chromium with the resolved proxy and drives the page over the
//! DevTools protocol. [`MockDriver`] is a deterministic scripted double for
//! tests.

pub mod cdp;
pub mod chromium;
pub mod driver;
pub mod mock;
pub mod retry;

pub use chromium::ChromiumDriver;
pub use driver::{Interaction, InteractionKind, PageHandle, WatchDriver};
pub use mock::MockDriver;
pub use retry::{open_with_retry, RetryPolicy};
