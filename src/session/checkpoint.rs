//! Checkpoint store backends.
//!
//! The store maps thread-id → ordered message list. Two backends: an
//! in-memory map for development and a Redis list per thread with TTL
//! refresh on read. Per-thread append ordering is delegated to the store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};
use redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::error::{GatewayError, Result};
use crate::llm::HistoryEntry;

/// Ordered, append-only message log keyed by thread id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn append_messages(&self, thread_id: &str, messages: &[HistoryEntry]) -> Result<()>;
    async fn get_history(&self, thread_id: &str) -> Result<Vec<HistoryEntry>>;
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
    /// Deep backend ping for the readiness probe.
    async fn ping(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// Development backend: a process-local map.
#[derive(Default)]
pub struct MemoryStore {
    threads: RwLock<HashMap<String, Vec<HistoryEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn append_messages(&self, thread_id: &str, messages: &[HistoryEntry]) -> Result<()> {
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn get_history(&self, thread_id: &str) -> Result<Vec<HistoryEntry>> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut threads = self.threads.write().await;
        threads.remove(thread_id);
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

const REDIS_KEY_PREFIX: &str = "botgate:thread:";

/// Redis-backed store: one list per thread, TTL refreshed on read.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
    ttl: Option<Duration>,
}

impl RedisStore {
    /// Connect to Redis. `ttl` of zero disables expiry.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GatewayError::Internal(format!("Invalid Redis URL {}: {}", url, e)))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::Internal(format!("Redis connection failed: {}", e)))?;
        info!("Redis checkpoint store connected: {}", url);
        Ok(Self {
            conn,
            ttl: (!ttl.is_zero()).then_some(ttl),
        })
    }

    fn key(thread_id: &str) -> String {
        format!("{}{}", REDIS_KEY_PREFIX, thread_id)
    }

    async fn refresh_ttl(&self, key: &str) {
        if let Some(ttl) = self.ttl {
            let mut conn = self.conn.clone();
            let result: redis::RedisResult<bool> = conn.expire(key, ttl.as_secs() as i64).await;
            if let Err(e) = result {
                error!("Redis TTL refresh failed for {}: {}", key, e);
            }
        }
    }
}

#[async_trait]
impl CheckpointStore for RedisStore {
    async fn append_messages(&self, thread_id: &str, messages: &[HistoryEntry]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let key = Self::key(thread_id);
        let encoded: Vec<String> = messages
            .iter()
            .map(|m| serde_json::to_string(m).expect("history entry serializes"))
            .collect();
        let mut conn = self.conn.clone();
        let _: () = conn
            .rpush(&key, encoded)
            .await
            .map_err(|e| GatewayError::Session(format!("Redis append failed: {}", e)))?;
        self.refresh_ttl(&key).await;
        Ok(())
    }

    async fn get_history(&self, thread_id: &str) -> Result<Vec<HistoryEntry>> {
        let key = Self::key(thread_id);
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(&key, 0, -1)
            .await
            .map_err(|e| GatewayError::Session(format!("Redis read failed: {}", e)))?;
        self.refresh_ttl(&key).await;
        let mut history = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_str(&item) {
                Ok(entry) => history.push(entry),
                Err(e) => error!("Skipping undecodable history entry: {}", e),
            }
        }
        Ok(history)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(Self::key(thread_id))
            .await
            .map_err(|e| GatewayError::Session(format!("Redis delete failed: {}", e)))?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        matches!(result, Ok(ref pong) if pong == "PONG")
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    fn msg(role: MessageRole, content: &str) -> HistoryEntry {
        HistoryEntry {
            role,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_append_and_get_order() {
        let store = MemoryStore::new();
        store
            .append_messages("t1", &[msg(MessageRole::User, "Q: 동물인가요?")])
            .await
            .unwrap();
        store
            .append_messages("t1", &[msg(MessageRole::Assistant, "A: 예")])
            .await
            .unwrap();

        let history = store.get_history("t1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Q: 동물인가요?");
        assert_eq!(history[1].content, "A: 예");
    }

    #[tokio::test]
    async fn test_memory_threads_are_isolated() {
        let store = MemoryStore::new();
        store
            .append_messages("a", &[msg(MessageRole::User, "x")])
            .await
            .unwrap();
        assert!(store.get_history("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_delete_thread() {
        let store = MemoryStore::new();
        store
            .append_messages("t", &[msg(MessageRole::User, "x")])
            .await
            .unwrap();
        store.delete_thread("t").await.unwrap();
        assert!(store.get_history("t").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_ping() {
        assert!(MemoryStore::new().ping().await);
        assert_eq!(MemoryStore::new().backend_name(), "memory");
    }
}
