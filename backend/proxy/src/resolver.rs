//! Proxy resolution: mode + optional URL in, reachable egress descriptor out.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use url::Url;

use vidwatch_config::RuntimeConfig;
use vidwatch_core::{ProxyMode, WatchError};

/// Supported egress proxy schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyScheme {
    Socks5,
    Http,
    Https,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Socks5 => "socks5",
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            Self::Socks5 => 1080,
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

/// A resolved egress route: concrete address plus scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn socks5(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: ProxyScheme::Socks5,
            host: host.into(),
            port,
        }
    }

    fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// Resolve a proxy selection into a concrete egress endpoint.
///
/// Tor mode uses the fixed local SOCKS endpoint from the runtime config and
/// fails with [`WatchError::ProxyUnavailable`] when it does not accept
/// connections. Custom mode validates the caller-supplied URL and fails with
/// [`WatchError::InvalidProxyUrl`]; no reachability probe is applied.
pub async fn resolve(
    mode: ProxyMode,
    custom_url: Option<&Url>,
    config: &RuntimeConfig,
) -> Result<ProxyEndpoint, WatchError> {
    match mode {
        ProxyMode::Tor => {
            let endpoint = ProxyEndpoint::socks5(&config.tor_proxy_host, config.tor_proxy_port);
            probe(&endpoint, Duration::from_secs(config.probe_timeout_secs)).await?;
            info!(endpoint = %endpoint, "resolved tor egress");
            Ok(endpoint)
        }
        ProxyMode::Custom => {
            let url = custom_url
                .ok_or_else(|| WatchError::InvalidProxyUrl("no proxy url supplied".into()))?;
            let endpoint = parse_custom(url)?;
            info!(endpoint = %endpoint, "resolved custom egress");
            Ok(endpoint)
        }
    }
}

/// Validate a custom proxy URL and normalize it into an endpoint.
pub fn parse_custom(url: &Url) -> Result<ProxyEndpoint, WatchError> {
    let scheme = match url.scheme() {
        "socks5" | "socks5h" => ProxyScheme::Socks5,
        "http" => ProxyScheme::Http,
        "https" => ProxyScheme::Https,
        other => {
            return Err(WatchError::InvalidProxyUrl(format!(
                "unsupported scheme '{other}'"
            )))
        }
    };
    let host = url
        .host_str()
        .ok_or_else(|| WatchError::InvalidProxyUrl("missing host".into()))?
        .to_string();
    let port = url.port().unwrap_or_else(|| scheme.default_port());
    Ok(ProxyEndpoint { scheme, host, port })
}

/// Lightweight reachability check: a bounded TCP connect to the endpoint.
pub async fn probe(endpoint: &ProxyEndpoint, timeout: Duration) -> Result<(), WatchError> {
    let addr = endpoint.authority();
    match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => {
            debug!(%addr, "proxy endpoint reachable");
            Ok(())
        }
        Ok(Err(e)) => Err(WatchError::ProxyUnavailable(format!("{addr}: {e}"))),
        Err(_) => Err(WatchError::ProxyUnavailable(format!(
            "{addr}: connect timed out after {timeout:?}"
        ))),
    }
}

/// Poll the reachability probe until the endpoint comes up or the deadline
/// passes.
pub async fn wait_for_proxy(
    endpoint: &ProxyEndpoint,
    deadline: Duration,
    interval: Duration,
) -> Result<(), WatchError> {
    let start = tokio::time::Instant::now();
    loop {
        match probe(endpoint, interval).await {
            Ok(()) => return Ok(()),
            Err(e) if start.elapsed() >= deadline => return Err(e),
            Err(_) => {
                warn!(endpoint = %endpoint, "proxy not yet reachable, retrying");
                tokio::time::sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn endpoint_renders_proxy_server_form() {
        let endpoint = ProxyEndpoint::socks5("127.0.0.1", 9050);
        assert_eq!(endpoint.to_string(), "socks5://127.0.0.1:9050");
    }

    #[test]
    fn custom_url_parses_with_explicit_port() {
        let url = Url::parse("socks5://10.0.0.1:1081").unwrap();
        let endpoint = parse_custom(&url).unwrap();
        assert_eq!(endpoint.scheme, ProxyScheme::Socks5);
        assert_eq!(endpoint.host, "10.0.0.1");
        assert_eq!(endpoint.port, 1081);
    }

    #[test]
    fn custom_url_defaults_port_per_scheme() {
        let url = Url::parse("http://proxy.internal").unwrap();
        let endpoint = parse_custom(&url).unwrap();
        assert_eq!(endpoint.port, 80);

        let url = Url::parse("socks5h://proxy.internal").unwrap();
        let endpoint = parse_custom(&url).unwrap();
        assert_eq!(endpoint.scheme, ProxyScheme::Socks5);
        assert_eq!(endpoint.port, 1080);
    }

    #[test]
    fn custom_url_rejects_unsupported_scheme() {
        let url = Url::parse("ftp://proxy.internal").unwrap();
        assert!(matches!(
            parse_custom(&url),
            Err(WatchError::InvalidProxyUrl(_))
        ));
    }

    #[tokio::test]
    async fn probe_succeeds_against_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = ProxyEndpoint::socks5("127.0.0.1", port);
        probe(&endpoint, Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn probe_reports_unreachable_endpoint() {
        // Bind then drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = ProxyEndpoint::socks5("127.0.0.1", port);
        assert!(matches!(
            probe(&endpoint, Duration::from_secs(2)).await,
            Err(WatchError::ProxyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn resolve_tor_probes_configured_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = RuntimeConfig {
            tor_proxy_host: "127.0.0.1".to_string(),
            tor_proxy_port: port,
            ..RuntimeConfig::default()
        };
        let endpoint = resolve(ProxyMode::Tor, None, &config).await.unwrap();
        assert_eq!(endpoint, ProxyEndpoint::socks5("127.0.0.1", port));
    }

    #[tokio::test]
    async fn resolve_custom_skips_probe() {
        // Nothing listens on this URL; custom resolution must still succeed.
        let url = Url::parse("socks5://192.0.2.1:1080").unwrap();
        let config = RuntimeConfig::default();
        let endpoint = resolve(ProxyMode::Custom, Some(&url), &config)
            .await
            .unwrap();
        assert_eq!(endpoint.host, "192.0.2.1");
    }
}
