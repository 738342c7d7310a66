//! Headless Chromium driver.
//!
//! Launches a Chromium process with the resolved proxy, scrapes the DevTools
//! endpoint off stderr, and drives the page over CDP. Interactions follow a
//! fixed deterministic cycle: start playback first, then periodic scrolls
//! and pause toggles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use async_trait::async_trait;
use vidwatch_config::RuntimeConfig;
use vidwatch_core::WatchError;
use vidwatch_proxy::ProxyEndpoint;

use crate::cdp::CdpConnection;
use crate::driver::{Interaction, InteractionKind, PageHandle, WatchDriver};

const DEVTOOLS_BANNER: &str = "DevTools listening on ";
const SCROLL_STEP_PX: i32 = 240;
/// Ticks between scroll interactions.
const SCROLL_EVERY: u64 = 10;
/// Ticks between pause toggles.
const PAUSE_EVERY: u64 = 30;

struct PageSession {
    child: Child,
    cdp: CdpConnection,
    cdp_session_id: String,
    profile_dir: PathBuf,
    ticks: u64,
    scroll_down: bool,
}

/// Remove a per-session browser profile directory. Best effort; a missing
/// directory is not an error.
async fn cleanup_profile(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), error = %e, "failed to remove profile dir");
        }
    }
}

/// [`WatchDriver`] backed by a locally launched headless Chromium.
pub struct ChromiumDriver {
    browser_bin: String,
    window: (u32, u32),
    nav_timeout: Duration,
    pages: Mutex<HashMap<Uuid, PageSession>>,
}

impl ChromiumDriver {
    pub fn new(browser_bin: impl Into<String>, window: (u32, u32), nav_timeout: Duration) -> Self {
        Self {
            browser_bin: browser_bin.into(),
            window,
            nav_timeout,
            pages: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            &config.browser_bin,
            (config.window_width, config.window_height),
            Duration::from_secs(config.nav_timeout_secs),
        )
    }

    fn launch(
        &self,
        proxy: &ProxyEndpoint,
        headless: bool,
        profile_dir: &Path,
    ) -> Result<Child, WatchError> {
        let mut cmd = Command::new(&self.browser_bin);
        if headless {
            cmd.arg("--headless=new");
        }
        cmd.arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg(format!("--window-size={},{}", self.window.0, self.window.1))
            .arg(format!("--proxy-server={proxy}"))
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn()
            .map_err(|e| WatchError::DriverCrashed(format!("spawn {}: {e}", self.browser_bin)))
    }

    /// Read the child's stderr until the DevTools banner appears, then hand
    /// the rest of the stream to a drain task so the pipe never fills.
    async fn devtools_endpoint(&self, child: &mut Child) -> Result<String, WatchError> {
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| WatchError::DriverCrashed("browser stderr not captured".into()))?;
        let mut lines = BufReader::new(stderr).lines();

        let ws_url = tokio::time::timeout(self.nav_timeout, async {
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| WatchError::DriverCrashed(format!("read browser stderr: {e}")))?
            {
                if let Some(rest) = line.split(DEVTOOLS_BANNER).nth(1) {
                    return Ok(rest.trim().to_string());
                }
            }
            Err(WatchError::DriverCrashed(
                "browser exited before announcing devtools endpoint".into(),
            ))
        })
        .await
        .map_err(|_| {
            WatchError::NavigationTimeout(format!(
                "devtools endpoint not announced within {:?}",
                self.nav_timeout
            ))
        })??;

        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });
        Ok(ws_url)
    }

    async fn evaluate(
        &self,
        session: &PageSession,
        expression: &str,
    ) -> Result<Value, WatchError> {
        session
            .cdp
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
                Some(&session.cdp_session_id),
                Duration::from_secs(5),
            )
            .await
            .map_err(|e| match e {
                // A hung evaluate is a dead page, not a navigation problem.
                WatchError::NavigationTimeout(reason) => WatchError::DriverCrashed(reason),
                other => other,
            })
    }

    /// Launch the browser and attach a navigated page. The child is killed
    /// on every error path; the profile directory is the caller's to clean.
    async fn boot(
        &self,
        url: &Url,
        proxy: &ProxyEndpoint,
        headless: bool,
        handle: PageHandle,
        profile_dir: &Path,
    ) -> Result<PageSession, WatchError> {
        let mut child = self.launch(proxy, headless, profile_dir)?;
        let ws_url = match self.devtools_endpoint(&mut child).await {
            Ok(ws_url) => ws_url,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };
        info!(%ws_url, session = %handle.id, "browser up");

        let cdp = CdpConnection::connect(&ws_url).await?;

        let target = cdp
            .call(
                "Target.createTarget",
                json!({ "url": "about:blank" }),
                None,
                self.nav_timeout,
            )
            .await?;
        let target_id = target
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| WatchError::DriverCrashed("no targetId in createTarget reply".into()))?
            .to_string();

        let attached = cdp
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
                self.nav_timeout,
            )
            .await?;
        let cdp_session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WatchError::DriverCrashed("no sessionId in attach reply".into()))?
            .to_string();

        let navigate = cdp
            .call(
                "Page.navigate",
                json!({ "url": url.as_str() }),
                Some(&cdp_session_id),
                self.nav_timeout,
            )
            .await;
        if let Err(e) = navigate {
            warn!(session = %handle.id, error = %e, "navigation failed, tearing browser down");
            cdp.shutdown().await;
            let _ = child.kill().await;
            return Err(e);
        }

        Ok(PageSession {
            child,
            cdp,
            cdp_session_id,
            profile_dir: profile_dir.to_path_buf(),
            ticks: 0,
            scroll_down: true,
        })
    }
}

#[async_trait]
impl WatchDriver for ChromiumDriver {
    async fn open(
        &self,
        url: &Url,
        proxy: &ProxyEndpoint,
        headless: bool,
    ) -> Result<PageHandle, WatchError> {
        let handle = PageHandle::new();
        let profile_dir = std::env::temp_dir().join(format!("vidwatch-profile-{}", handle.id));
        tokio::fs::create_dir_all(&profile_dir)
            .await
            .map_err(|e| WatchError::DriverCrashed(format!("create profile dir: {e}")))?;

        let session = match self.boot(url, proxy, headless, handle, &profile_dir).await {
            Ok(session) => session,
            Err(e) => {
                cleanup_profile(&profile_dir).await;
                return Err(e);
            }
        };
        self.pages.lock().await.insert(handle.id, session);
        Ok(handle)
    }

    async fn interact(&self, handle: &PageHandle) -> Result<Option<Interaction>, WatchError> {
        let mut pages = self.pages.lock().await;
        let exited = pages
            .get_mut(&handle.id)
            .ok_or_else(|| WatchError::DriverCrashed("interact on unknown page handle".into()))?
            .child
            .try_wait()
            .ok()
            .flatten();
        if let Some(status) = exited {
            if let Some(dead) = pages.remove(&handle.id) {
                cleanup_profile(&dead.profile_dir).await;
            }
            return Err(WatchError::DriverCrashed(format!(
                "browser process exited: {status}"
            )));
        }
        let session = pages
            .get_mut(&handle.id)
            .ok_or_else(|| WatchError::DriverCrashed("interact on unknown page handle".into()))?;

        session.ticks += 1;
        let tick = session.ticks;

        if tick == 1 {
            self.evaluate(
                session,
                "(() => { const v = document.querySelector('video'); if (v) v.play(); return !!v; })()",
            )
            .await?;
            debug!(session = %handle.id, "playback started");
            return Ok(Some(Interaction::now(InteractionKind::PlaybackStarted)));
        }
        if tick % PAUSE_EVERY == 0 {
            self.evaluate(
                session,
                "(() => { const v = document.querySelector('video'); if (!v) return false; v.paused ? v.play() : v.pause(); return true; })()",
            )
            .await?;
            return Ok(Some(Interaction::now(InteractionKind::PauseToggle)));
        }
        if tick % SCROLL_EVERY == 0 {
            let delta_px = if session.scroll_down {
                SCROLL_STEP_PX
            } else {
                -SCROLL_STEP_PX
            };
            session.scroll_down = !session.scroll_down;
            self.evaluate(session, &format!("window.scrollBy(0, {delta_px})"))
                .await?;
            return Ok(Some(Interaction::now(InteractionKind::Scroll { delta_px })));
        }

        Ok(None)
    }

    async fn close(&self, handle: PageHandle) -> Result<(), WatchError> {
        let Some(mut session) = self.pages.lock().await.remove(&handle.id) else {
            return Ok(());
        };

        // Ask the browser to exit cleanly, then make sure it is gone.
        let _ = session
            .cdp
            .call("Browser.close", json!({}), None, Duration::from_secs(3))
            .await;
        session.cdp.shutdown().await;

        let killed = session.child.kill().await;
        cleanup_profile(&session.profile_dir).await;
        match killed {
            Ok(()) => {
                info!(session = %handle.id, "browser closed");
                Ok(())
            }
            Err(e) => Err(WatchError::DriverCrashed(format!(
                "failed to stop browser: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleanup_removes_populated_profile_dir() {
        let dir = std::env::temp_dir().join(format!("vidwatch-profile-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(dir.join("Default")).await.unwrap();
        tokio::fs::write(dir.join("Default").join("Preferences"), b"{}")
            .await
            .unwrap();

        cleanup_profile(&dir).await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn cleanup_tolerates_missing_dir() {
        let dir = std::env::temp_dir().join(format!("vidwatch-profile-{}", Uuid::new_v4()));
        cleanup_profile(&dir).await;
        assert!(!dir.exists());
    }
}
