//! `vidwatch-session` — the orchestration core.
//!
//! [`SessionController`] runs one watch session end to end: proxy resolution,
//! page open with bounded retry, a cancellable one-second watch loop, and
//! cleanup, emitting a log event plus state snapshot on every transition.
//! [`EventReporter`] fans those out to observers without ever blocking the
//! transition path; [`SessionRegistry`] maps session ids to controllers and
//! enforces the one-active-session rule.

pub mod controller;
pub mod registry;
pub mod reporter;

pub use controller::SessionController;
pub use registry::SessionRegistry;
pub use reporter::EventReporter;
