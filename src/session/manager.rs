//! Session metadata and history management.
//!
//! Metadata lives in a process-local table; message logs live in the
//! checkpoint store. TTL pruning runs implicitly before create/get/end/
//! fresh operations, and prune+check+insert sequences hold the table lock
//! so the capacity check cannot interleave.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::SessionSettings;
use crate::error::{GatewayError, Result};
use crate::llm::{HistoryEntry, MessageRole};
use crate::session::checkpoint::CheckpointStore;

/// Session metadata record.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub model: String,
    pub system_prompt: Option<String>,
    /// Per-game sidecar state (e.g. target, scenario).
    pub domain_data: serde_json::Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl SessionRecord {
    fn new(session_id: String, model: String, system_prompt: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            model,
            system_prompt,
            domain_data: serde_json::Map::new(),
            created_at: now,
            last_accessed: now,
        }
    }
}

/// Checkpoint backend health snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendHealth {
    pub backend: &'static str,
    pub connected: bool,
    pub session_count: usize,
    pub session_ttl_minutes: i64,
}

/// Session manager over a pluggable checkpoint store.
pub struct SessionManager {
    store: Arc<dyn CheckpointStore>,
    sessions: Mutex<HashMap<String, SessionRecord>>,
    max_sessions: usize,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CheckpointStore>, settings: &SessionSettings) -> Self {
        info!(
            "SessionManager initialized backend={} max_sessions={} ttl_min={}",
            store.backend_name(),
            settings.max_sessions,
            settings.ttl_minutes
        );
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
            max_sessions: settings.max_sessions,
            ttl: Duration::minutes(settings.ttl_minutes),
        }
    }

    fn is_expired(&self, record: &SessionRecord, now: DateTime<Utc>) -> bool {
        self.ttl > Duration::zero() && now - record.last_accessed > self.ttl
    }

    /// Remove expired sessions from the table and the backing store.
    async fn prune_expired(&self) -> HashSet<String> {
        if self.ttl <= Duration::zero() {
            return HashSet::new();
        }
        let expired: Vec<String> = {
            let mut sessions = self.sessions.lock().await;
            let now = Utc::now();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, record)| self.is_expired(record, now))
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                sessions.remove(id);
            }
            ids
        };
        for id in &expired {
            self.clear_history(id).await;
            info!("SESSION_EXPIRED session_id={}", id);
        }
        expired.into_iter().collect()
    }

    /// Create or resume a session. Does not clear history.
    pub async fn create_session(
        &self,
        session_id: &str,
        model: &str,
        system_prompt: Option<&str>,
    ) -> Result<SessionRecord> {
        self.prune_expired().await;

        let mut sessions = self.sessions.lock().await;
        if let Some(record) = sessions.get_mut(session_id) {
            record.last_accessed = Utc::now();
            return Ok(record.clone());
        }

        if sessions.len() >= self.max_sessions {
            warn!(
                "SESSION_LIMIT_EXCEEDED current={} max={}",
                sessions.len(),
                self.max_sessions
            );
            return Err(GatewayError::SessionLimitExceeded(self.max_sessions));
        }

        let record = SessionRecord::new(
            session_id.to_string(),
            model.to_string(),
            system_prompt.map(str::to_string),
        );
        sessions.insert(session_id.to_string(), record.clone());
        info!(
            "SESSION_CREATE session_id={} model={} total={}",
            session_id,
            model,
            sessions.len()
        );
        Ok(record)
    }

    /// Create a fresh session, clearing any existing history and metadata.
    pub async fn create_fresh_session(
        &self,
        session_id: &str,
        model: &str,
        system_prompt: Option<&str>,
        domain_data: Option<serde_json::Map<String, Value>>,
    ) -> Result<SessionRecord> {
        let expired = self.prune_expired().await;
        if expired.contains(session_id) {
            info!("SESSION_EXPIRED_CREATE session_id={}", session_id);
        }
        self.clear_history(session_id).await;

        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id);

        if sessions.len() >= self.max_sessions {
            warn!(
                "SESSION_LIMIT_EXCEEDED current={} max={}",
                sessions.len(),
                self.max_sessions
            );
            return Err(GatewayError::SessionLimitExceeded(self.max_sessions));
        }

        let mut record = SessionRecord::new(
            session_id.to_string(),
            model.to_string(),
            system_prompt.map(str::to_string),
        );
        if let Some(data) = domain_data {
            record.domain_data = data;
        }
        sessions.insert(session_id.to_string(), record.clone());
        info!(
            "SESSION_CREATE_FRESH session_id={} model={} total={}",
            session_id,
            model,
            sessions.len()
        );
        Ok(record)
    }

    /// Get an existing session, refreshing last-accessed.
    ///
    /// Returns a session-expired error when this exact id was pruned by
    /// this call; a later lookup sees plain None.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let expired = self.prune_expired().await;
        if expired.contains(session_id) {
            return Err(GatewayError::SessionExpired(session_id.to_string()));
        }
        let mut sessions = self.sessions.lock().await;
        Ok(sessions.get_mut(session_id).map(|record| {
            record.last_accessed = Utc::now();
            record.clone()
        }))
    }

    /// End a session: drop metadata and clear history. Returns whether a
    /// metadata record existed.
    pub async fn end_session(&self, session_id: &str) -> bool {
        self.prune_expired().await;
        let existed = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(session_id).is_some()
        };
        self.clear_history(session_id).await;
        info!("SESSION_END session_id={} existed={}", session_id, existed);
        existed
    }

    /// Best-effort history clear: delete the thread, falling back to an
    /// empty overwrite when the backend rejects deletion.
    pub async fn clear_history(&self, session_id: &str) -> bool {
        match self.store.delete_thread(session_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "DELETE_HISTORY_FAILED session_id={} error={}",
                    session_id, e
                );
                self.store
                    .append_messages(session_id, &[])
                    .await
                    .is_ok()
            }
        }
    }

    /// Append messages to the session's history.
    pub async fn add_messages(&self, session_id: &str, messages: &[HistoryEntry]) -> Result<()> {
        let expired = self.prune_expired().await;
        if expired.contains(session_id) {
            return Err(GatewayError::SessionExpired(session_id.to_string()));
        }
        self.store.append_messages(session_id, messages).await
    }

    /// Convenience single-message append.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<()> {
        self.add_messages(
            session_id,
            &[HistoryEntry {
                role,
                content: content.to_string(),
            }],
        )
        .await
    }

    /// Full message history in append order. Store failures degrade to an
    /// empty history.
    pub async fn get_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        let expired = self.prune_expired().await;
        if expired.contains(session_id) {
            return Err(GatewayError::SessionExpired(session_id.to_string()));
        }
        match self.store.get_history(session_id).await {
            Ok(history) => Ok(history),
            Err(e) => {
                warn!("GET_HISTORY_FAILED session_id={} error={}", session_id, e);
                Ok(Vec::new())
            }
        }
    }

    /// Role/content projection used by the LLM client.
    pub async fn get_history_as_dicts(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        self.get_history(session_id).await
    }

    /// Update a key in the session's domain-data sidecar.
    pub async fn update_domain_data(&self, session_id: &str, key: &str, value: Value) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_id) {
            Some(record) => {
                record.domain_data.insert(key.to_string(), value);
                record.last_accessed = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Read a key from the session's domain-data sidecar.
    pub async fn get_domain_data(&self, session_id: &str, key: &str) -> Option<Value> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(session_id).and_then(|record| {
            record.last_accessed = Utc::now();
            record.domain_data.get(key).cloned()
        })
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Backend health snapshot; `deep` additionally pings the store.
    pub async fn backend_health(&self, deep: bool) -> BackendHealth {
        let connected = if deep { self.store.ping().await } else { true };
        BackendHealth {
            backend: self.store.backend_name(),
            connected,
            session_count: self.session_count().await,
            session_ttl_minutes: self.ttl.num_minutes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::checkpoint::MemoryStore;

    fn manager(max_sessions: usize, ttl_minutes: i64) -> SessionManager {
        SessionManager::new(
            Arc::new(MemoryStore::new()),
            &SessionSettings {
                max_sessions,
                ttl_minutes,
                history_max_pairs: 10,
            },
        )
    }

    #[tokio::test]
    async fn test_create_then_resume() {
        let mgr = manager(10, 60);
        let first = mgr
            .create_session("s1", "gemini-2.5-flash", Some("sys"))
            .await
            .unwrap();
        let second = mgr
            .create_session("s1", "other-model", None)
            .await
            .unwrap();
        // Resume returns the original record, not a replacement.
        assert_eq!(second.model, first.model);
        assert_eq!(second.system_prompt.as_deref(), Some("sys"));
        assert!(second.last_accessed >= first.last_accessed);
    }

    #[tokio::test]
    async fn test_session_limit() {
        let mgr = manager(2, 60);
        mgr.create_session("a", "m", None).await.unwrap();
        mgr.create_session("b", "m", None).await.unwrap();
        let err = mgr.create_session("c", "m", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::SessionLimitExceeded(2)));
        // Resuming an existing session still works at capacity.
        assert!(mgr.create_session("a", "m", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_fresh_session_clears_history() {
        let mgr = manager(10, 60);
        mgr.create_session("s", "m", None).await.unwrap();
        mgr.add_message("s", MessageRole::User, "Q: 동물인가요?")
            .await
            .unwrap();
        assert_eq!(mgr.get_history("s").await.unwrap().len(), 1);

        mgr.create_fresh_session("s", "m", None, None).await.unwrap();
        assert!(mgr.get_history("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_session_replaces_at_capacity() {
        let mgr = manager(1, 60);
        mgr.create_session("only", "m", None).await.unwrap();
        // Replacing the single occupant is allowed.
        assert!(mgr.create_fresh_session("only", "m", None, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_history_append_order() {
        let mgr = manager(10, 60);
        mgr.create_session("s", "m", None).await.unwrap();
        mgr.add_messages(
            "s",
            &[
                HistoryEntry::user("Q: 전자기기인가요?"),
                HistoryEntry::assistant("A: 예"),
            ],
        )
        .await
        .unwrap();
        mgr.add_message("s", MessageRole::User, "Q: 손에 들 수 있나요?")
            .await
            .unwrap();

        let history = mgr.get_history("s").await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["Q: 전자기기인가요?", "A: 예", "Q: 손에 들 수 있나요?"]
        );
    }

    #[tokio::test]
    async fn test_end_session() {
        let mgr = manager(10, 60);
        mgr.create_session("s", "m", None).await.unwrap();
        mgr.add_message("s", MessageRole::User, "x").await.unwrap();
        assert!(mgr.end_session("s").await);
        assert!(!mgr.end_session("s").await);
        assert!(mgr.get_history("s").await.unwrap().is_empty());
        assert!(mgr.get_session("s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry_raises_then_none() {
        let mgr = manager(10, 30);
        mgr.create_session("s", "m", None).await.unwrap();
        // Age the record past the TTL.
        {
            let mut sessions = mgr.sessions.lock().await;
            sessions.get_mut("s").unwrap().last_accessed =
                Utc::now() - Duration::minutes(31);
        }
        let err = mgr.get_session("s").await.unwrap_err();
        assert!(matches!(err, GatewayError::SessionExpired(_)));
        // The id is gone now; the next lookup is a plain miss.
        assert!(mgr.get_session("s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_expiry() {
        let mgr = manager(10, 0);
        mgr.create_session("s", "m", None).await.unwrap();
        {
            let mut sessions = mgr.sessions.lock().await;
            sessions.get_mut("s").unwrap().last_accessed =
                Utc::now() - Duration::days(365);
        }
        assert!(mgr.get_session("s").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_domain_data_roundtrip() {
        let mgr = manager(10, 60);
        mgr.create_session("s", "m", None).await.unwrap();
        assert!(
            mgr.update_domain_data("s", "target", serde_json::json!("스마트폰"))
                .await
        );
        assert_eq!(
            mgr.get_domain_data("s", "target").await,
            Some(serde_json::json!("스마트폰"))
        );
        assert_eq!(mgr.get_domain_data("s", "missing").await, None);
        assert!(!mgr.update_domain_data("absent", "k", serde_json::json!(1)).await);
    }

    #[tokio::test]
    async fn test_fresh_session_installs_domain_data() {
        let mgr = manager(10, 60);
        let mut data = serde_json::Map::new();
        data.insert("scenario".to_string(), serde_json::json!("바다"));
        let record = mgr
            .create_fresh_session("s", "m", None, Some(data))
            .await
            .unwrap();
        assert_eq!(record.domain_data["scenario"], "바다");
    }

    #[tokio::test]
    async fn test_backend_health() {
        let mgr = manager(10, 60);
        mgr.create_session("s", "m", None).await.unwrap();
        let health = mgr.backend_health(true).await;
        assert_eq!(health.backend, "memory");
        assert!(health.connected);
        assert_eq!(health.session_count, 1);
        assert_eq!(health.session_ttl_minutes, 60);
    }
}
