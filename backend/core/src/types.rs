//! Session configuration: untrusted wire form and validated form.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::WatchError;

/// Minimum accepted watch duration, in seconds.
pub const MIN_WATCH_SECS: u32 = 30;
/// Maximum accepted watch duration, in seconds.
pub const MAX_WATCH_SECS: u32 = 3600;

/// Egress strategy for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    /// Route through the local Tor SOCKS endpoint.
    Tor,
    /// Route through a caller-supplied proxy URL.
    Custom,
}

/// Raw session config as submitted over the wire (form field names).
///
/// Everything here is untrusted; [`RawSessionConfig::validate`] is the only
/// way to obtain a [`SessionConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSessionConfig {
    #[serde(rename = "video-url")]
    pub video_url: String,
    #[serde(rename = "watch-time")]
    pub watch_time: i64,
    #[serde(rename = "proxy-type")]
    pub proxy_type: String,
    #[serde(rename = "custom-proxy", default)]
    pub custom_proxy: Option<String>,
    #[serde(rename = "headless-mode", default = "default_true")]
    pub headless: bool,
    #[serde(rename = "debug-mode", default)]
    pub debug: bool,
}

fn default_true() -> bool {
    true
}

/// Validated parameters for one watch session. Immutable for the session's
/// lifetime once handed to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub video_url: Url,
    pub watch_time_secs: u32,
    pub proxy_mode: ProxyMode,
    /// Present if and only if `proxy_mode` is [`ProxyMode::Custom`].
    pub custom_proxy_url: Option<Url>,
    pub headless: bool,
    pub debug: bool,
}

impl RawSessionConfig {
    /// Validate the raw input against the session-config invariants.
    ///
    /// Pure function: no I/O, no side effects. Fails with
    /// [`WatchError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<SessionConfig, WatchError> {
        let video_url = Url::parse(self.video_url.trim())
            .map_err(|e| WatchError::validation("video-url", e.to_string()))?;
        if !matches!(video_url.scheme(), "http" | "https") {
            return Err(WatchError::validation(
                "video-url",
                format!("unsupported scheme '{}'", video_url.scheme()),
            ));
        }

        if self.watch_time < i64::from(MIN_WATCH_SECS) || self.watch_time > i64::from(MAX_WATCH_SECS)
        {
            return Err(WatchError::validation(
                "watch-time",
                format!("must be between {MIN_WATCH_SECS} and {MAX_WATCH_SECS} seconds"),
            ));
        }

        let proxy_mode = match self.proxy_type.as_str() {
            "tor" => ProxyMode::Tor,
            "custom" => ProxyMode::Custom,
            other => {
                return Err(WatchError::validation(
                    "proxy-type",
                    format!("expected 'tor' or 'custom', got '{other}'"),
                ))
            }
        };

        // customProxyUrl present and well-formed iff proxy_mode == custom.
        let custom_proxy_url = match (proxy_mode, self.custom_proxy.as_deref()) {
            (ProxyMode::Custom, Some(raw)) if !raw.trim().is_empty() => {
                let parsed = Url::parse(raw.trim())
                    .map_err(|e| WatchError::validation("custom-proxy", e.to_string()))?;
                Some(parsed)
            }
            (ProxyMode::Custom, _) => {
                return Err(WatchError::validation(
                    "custom-proxy",
                    "required when proxy-type is 'custom'",
                ))
            }
            (ProxyMode::Tor, Some(raw)) if !raw.trim().is_empty() => {
                return Err(WatchError::validation(
                    "custom-proxy",
                    "must be empty when proxy-type is 'tor'",
                ))
            }
            (ProxyMode::Tor, _) => None,
        };

        Ok(SessionConfig {
            video_url,
            watch_time_secs: self.watch_time as u32,
            proxy_mode,
            custom_proxy_url,
            headless: self.headless,
            debug: self.debug,
        })
    }
}
