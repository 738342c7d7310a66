//! `vidwatch-config` — runtime configuration, loaded from the environment.

use serde::Deserialize;

/// vidwatch runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// HTTP server bind address.
    pub bind_address: String,
    /// HTTP server port.
    pub port: u16,
    /// Tor SOCKS proxy host.
    pub tor_proxy_host: String,
    /// Tor SOCKS proxy port.
    pub tor_proxy_port: u16,
    /// Browser binary to launch.
    pub browser_bin: String,
    /// Browser window width.
    pub window_width: u32,
    /// Browser window height.
    pub window_height: u32,
    /// Per-attempt navigation timeout in seconds.
    pub nav_timeout_secs: u64,
    /// Proxy reachability probe timeout in seconds.
    pub probe_timeout_secs: u64,
    /// Directory for rolling log files.
    pub log_dir: String,
    /// Log level when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            tor_proxy_host: "127.0.0.1".to_string(),
            tor_proxy_port: 9050,
            browser_bin: "chromium".to_string(),
            window_width: 1920,
            window_height: 1080,
            nav_timeout_secs: 10,
            probe_timeout_secs: 5,
            log_dir: "logs".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables with sensible defaults.
    /// Unparseable numeric values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env_string("VIDWATCH_BIND", defaults.bind_address),
            port: env_parsed("VIDWATCH_PORT", defaults.port),
            tor_proxy_host: env_string("TOR_PROXY_HOST", defaults.tor_proxy_host),
            tor_proxy_port: env_parsed("TOR_PROXY_PORT", defaults.tor_proxy_port),
            browser_bin: env_string("VIDWATCH_BROWSER_BIN", defaults.browser_bin),
            window_width: env_parsed("VIDWATCH_WINDOW_WIDTH", defaults.window_width),
            window_height: env_parsed("VIDWATCH_WINDOW_HEIGHT", defaults.window_height),
            nav_timeout_secs: env_parsed("VIDWATCH_NAV_TIMEOUT_SECS", defaults.nav_timeout_secs),
            probe_timeout_secs: env_parsed(
                "VIDWATCH_PROBE_TIMEOUT_SECS",
                defaults.probe_timeout_secs,
            ),
            log_dir: env_string("VIDWATCH_LOG_DIR", defaults.log_dir),
            log_level: std::env::var("VIDWATCH_LOG_LEVEL")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_tool() {
        let config = RuntimeConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.tor_proxy_host, "127.0.0.1");
        assert_eq!(config.tor_proxy_port, 9050);
        assert_eq!(config.nav_timeout_secs, 10);
    }

    #[test]
    fn env_override_and_bad_parse_fallback() {
        // Env mutation: keys are unique to this test to avoid cross-test races.
        std::env::set_var("VIDWATCH_WINDOW_WIDTH", "1280");
        std::env::set_var("VIDWATCH_WINDOW_HEIGHT", "not-a-number");
        let config = RuntimeConfig::from_env();
        assert_eq!(config.window_width, 1280);
        assert_eq!(config.window_height, 1080);
        std::env::remove_var("VIDWATCH_WINDOW_WIDTH");
        std::env::remove_var("VIDWATCH_WINDOW_HEIGHT");
    }
}
