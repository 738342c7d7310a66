//! vidwatch gateway HTTP API server.
//!
//! Exposes the session control surface: start, stop, status, and a
//! server-sent-events stream of session log events.

pub mod routes;
pub mod server;

pub use routes::{build_router, GatewayState};
pub use server::serve;
