//! `vidwatch-proxy` — turns a proxy selection into a concrete egress route.
//!
//! Tor mode resolves to the fixed local SOCKS endpoint and is probed with a
//! lightweight TCP connect before use; custom mode validates the supplied
//! URL. The resolved endpoint renders in the `scheme://host:port` form the
//! browser's `--proxy-server` flag accepts.

pub mod resolver;

pub use resolver::{probe, resolve, wait_for_proxy, ProxyEndpoint, ProxyScheme};
