//! Session registry: id → controller, enforcing one active session at a time.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use vidwatch_config::RuntimeConfig;
use vidwatch_core::{SessionConfig, SessionSnapshot, WatchError};
use vidwatch_driver::WatchDriver;

use crate::controller::SessionController;

/// Tracks controllers by session id. Creation is rejected while any
/// registered session is still non-terminal.
pub struct SessionRegistry {
    runtime: RuntimeConfig,
    driver: Arc<dyn WatchDriver>,
    sessions: RwLock<HashMap<Uuid, Arc<SessionController>>>,
}

impl SessionRegistry {
    pub fn new(runtime: RuntimeConfig, driver: Arc<dyn WatchDriver>) -> Self {
        Self {
            runtime,
            driver,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a fresh controller for the given config.
    pub async fn create(
        &self,
        config: SessionConfig,
    ) -> Result<Arc<SessionController>, WatchError> {
        let mut sessions = self.sessions.write().await;
        if sessions
            .values()
            .any(|c| !c.status().status.is_terminal())
        {
            return Err(WatchError::AlreadyRunning);
        }
        let controller = Arc::new(SessionController::new(
            config,
            self.runtime.clone(),
            Arc::clone(&self.driver),
        ));
        sessions.insert(controller.id(), Arc::clone(&controller));
        Ok(controller)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<SessionController>, WatchError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(WatchError::UnknownSession(id))
    }

    /// Snapshots of every registered session, past and present.
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .values()
            .map(|c| c.status())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use vidwatch_core::{ProxyMode, SessionStatus};
    use vidwatch_driver::MockDriver;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(RuntimeConfig::default(), Arc::new(MockDriver::new()))
    }

    fn config() -> SessionConfig {
        SessionConfig {
            video_url: Url::parse("https://example.com/v").unwrap(),
            watch_time_secs: 60,
            proxy_mode: ProxyMode::Custom,
            custom_proxy_url: Some(Url::parse("socks5://192.0.2.1:1080").unwrap()),
            headless: true,
            debug: false,
        }
    }

    #[tokio::test]
    async fn second_session_rejected_while_first_is_live() {
        let registry = registry();
        let first = registry.create(config()).await.unwrap();
        assert_eq!(first.status().status, SessionStatus::Idle);

        assert!(matches!(
            registry.create(config()).await,
            Err(WatchError::AlreadyRunning)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_allowed_after_previous_terminates() {
        let registry = registry();
        let first = registry.create(config()).await.unwrap();
        first.start().await.unwrap();
        first.stop();
        tokio::time::timeout(std::time::Duration::from_secs(60), async {
            while !first.status().status.is_terminal() {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        })
        .await
        .unwrap();

        let second = registry.create(config()).await.unwrap();
        assert_ne!(second.id(), first.id());
        assert_eq!(registry.list().await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_id_is_reported() {
        let registry = registry();
        let id = Uuid::new_v4();
        assert!(matches!(
            registry.get(id).await,
            Err(WatchError::UnknownSession(e)) if e == id
        ));
    }
}
