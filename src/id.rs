//! Session identifier resolution.
//!
//! Bots may omit an explicit session_id and send chat_id + namespace
//! instead; this derives a stable id for history tracking.

/// Resolve the effective session id.
///
/// Priority:
/// 1. Explicit session_id if non-empty
/// 2. `<namespace>:<chat_id>` if chat_id is provided
/// 3. None (stateless call)
pub fn resolve_session_id(
    session_id: Option<&str>,
    chat_id: Option<&str>,
    namespace: Option<&str>,
    default_namespace: &str,
) -> Option<String> {
    if let Some(id) = session_id {
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }
    if let Some(chat) = chat_id {
        if !chat.is_empty() {
            let ns = namespace.filter(|n| !n.is_empty()).unwrap_or(default_namespace);
            return Some(format!("{}:{}", ns, chat));
        }
    }
    None
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique id with the given prefix
/// (e.g. `req-1722500000000-17`).
pub fn generate_id(prefix: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, millis, counter)
}
