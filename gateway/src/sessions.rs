use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{info, warn};

use council_core::{ChatSession, CouncilError, QueryRouter, Result};

pub type SharedSession = Arc<Mutex<ChatSession>>;

// Filled once the remote thread exists
type Slot = Arc<OnceCell<SharedSession>>;

/// Live conversations by session id.
///
/// Each session sits behind its own mutex: turns of one conversation queue
/// up, different conversations run side by side.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Slot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(id).and_then(|slot| slot.get().cloned())
    }

    /// Continues the session `id` names, or starts one under a fresh id when
    /// `id` is missing or unknown.
    pub async fn resume_or_start(&self, router: &QueryRouter, id: Option<&str>) -> Result<(String, SharedSession)> {
        if let Some(id) = id {
            if let Some(session) = self.get(id).await {
                return Ok((id.to_string(), session));
            }
            warn!(session_id = %id, "Unknown session id, starting a new session");
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = self.get_or_open(router, &id).await?;
        Ok((id, session))
    }

    /// Returns the session stored under `key`, opening its thread on first use.
    /// Concurrent callers with the same key share a single thread.
    pub async fn get_or_open(&self, router: &QueryRouter, key: &str) -> Result<SharedSession> {
        let slot = self
            .sessions
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .clone();

        let opened = slot
            .get_or_try_init(|| async {
                let session = router.open_session().await?;
                info!(session_id = %key, "Session opened");
                Ok::<_, CouncilError>(Arc::new(Mutex::new(session)))
            })
            .await;

        match opened {
            Ok(session) => Ok(session.clone()),
            Err(e) => {
                // Drop the empty slot unless someone replaced it meanwhile
                let mut sessions = self.sessions.write().await;
                if sessions.get(key).is_some_and(|s| Arc::ptr_eq(s, &slot) && !s.initialized()) {
                    sessions.remove(key);
                }
                Err(e)
            }
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use council_core::testing::ScriptedPlatform;
    use council_core::{AgentIds, Runtime, ToolRegistry};

    fn router(platform: &Arc<ScriptedPlatform>) -> QueryRouter {
        let runtime = Runtime::new(platform.clone(), Arc::new(ToolRegistry::new()));
        QueryRouter::new(
            runtime,
            AgentIds {
                classifier: "asst_classifier".to_string(),
                information: "asst_info".to_string(),
                eligibility: "asst_eligibility".to_string(),
                postcode: None,
            },
        )
    }

    #[tokio::test]
    async fn racing_opens_share_one_thread() {
        let platform = Arc::new(ScriptedPlatform::new());
        let router = router(&platform);
        let store = SessionStore::new();

        let (a, b) = tokio::join!(store.get_or_open(&router, "call-1"), store.get_or_open(&router, "call-1"));

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(platform.thread_count(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_id_is_replaced_with_a_fresh_one() {
        let platform = Arc::new(ScriptedPlatform::new());
        let router = router(&platform);
        let store = SessionStore::new();

        let (id, _) = store.resume_or_start(&router, Some("my-chosen-id")).await.unwrap();

        assert_ne!(id, "my-chosen-id");
        assert!(store.get("my-chosen-id").await.is_none());
        assert!(store.get(&id).await.is_some());

        let (again, _) = store.resume_or_start(&router, Some(&id)).await.unwrap();
        assert_eq!(again, id);
        assert_eq!(platform.thread_count(), 1);
    }

    #[tokio::test]
    async fn removed_session_is_gone() {
        let platform = Arc::new(ScriptedPlatform::new());
        let router = router(&platform);
        let store = SessionStore::new();

        store.get_or_open(&router, "call-9").await.unwrap();
        assert!(store.remove("call-9").await);
        assert!(!store.remove("call-9").await);
        assert!(store.is_empty().await);
    }
}
