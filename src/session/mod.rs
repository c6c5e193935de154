//! Session and history management over a pluggable checkpoint store.

mod checkpoint;
mod manager;

pub use checkpoint::{CheckpointStore, MemoryStore, RedisStore};
pub use manager::{BackendHealth, SessionManager, SessionRecord};

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::config::Settings;

/// Open the configured checkpoint backend. Redis failures fall back to the
/// in-memory store with a logged error so the service still comes up.
pub async fn open_checkpoint_store(settings: &Settings) -> Arc<dyn CheckpointStore> {
    if !settings.redis.enabled {
        info!("Redis disabled, using in-memory checkpoint store");
        return Arc::new(MemoryStore::new());
    }
    let ttl = Duration::from_secs((settings.session.ttl_minutes.max(0) as u64) * 60);
    match RedisStore::connect(&settings.redis.url, ttl).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                "Redis connection failed ({}), using in-memory checkpoint store",
                e
            );
            Arc::new(MemoryStore::new())
        }
    }
}
