//! Health reporting and the self-healing bot monitor.

mod monitor;

pub use monitor::{BotHealthMonitor, BotHealthTarget, MonitorHandle, build_target};

use serde_json::{Value, json};

use crate::config::LlmSettings;
use crate::session::SessionManager;

/// Collect the health payload. `deep` additionally pings the checkpoint
/// backend (readiness); the liveness probe skips external checks.
pub async fn collect_health(
    sessions: &SessionManager,
    llm: &LlmSettings,
    uptime_seconds: u64,
    deep: bool,
) -> Value {
    let backend = sessions.backend_health(deep).await;
    let checkpoint_status = if backend.connected { "ok" } else { "degraded" };

    let api_key_present = llm.api_key().is_some();
    let llm_status = if api_key_present { "ok" } else { "degraded" };

    let components = json!({
        "app": {
            "status": "ok",
            "detail": {"uptime_seconds": uptime_seconds},
        },
        "checkpoint": {
            "status": checkpoint_status,
            "detail": {
                "backend": backend.backend,
                "connected": backend.connected,
                "session_count": backend.session_count,
                "session_ttl_minutes": backend.session_ttl_minutes,
                "deep_checked": deep,
            },
        },
        "llm": {
            "status": llm_status,
            "detail": {
                "api_key_present": api_key_present,
                "default_model": llm.default_model,
                "timeout_seconds": llm.timeout_secs,
                "max_retries": llm.max_retries,
            },
        },
    });

    let overall = if checkpoint_status == "ok" && llm_status == "ok" {
        "ok"
    } else {
        "degraded"
    };

    json!({
        "status": overall,
        "components": components,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionSettings;
    use crate::session::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_collect_health_ok() {
        let sessions = SessionManager::new(
            Arc::new(MemoryStore::new()),
            &SessionSettings::default(),
        );
        let llm = LlmSettings {
            api_keys: vec!["key".to_string()],
            ..LlmSettings::default()
        };
        let payload = collect_health(&sessions, &llm, 42, true).await;
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["components"]["app"]["detail"]["uptime_seconds"], 42);
        assert_eq!(payload["components"]["checkpoint"]["detail"]["backend"], "memory");
        assert_eq!(payload["components"]["checkpoint"]["detail"]["deep_checked"], true);
    }

    #[tokio::test]
    async fn test_collect_health_degraded_without_key() {
        let sessions = SessionManager::new(
            Arc::new(MemoryStore::new()),
            &SessionSettings::default(),
        );
        let llm = LlmSettings::default();
        let payload = collect_health(&sessions, &llm, 0, false).await;
        assert_eq!(payload["status"], "degraded");
        assert_eq!(
            payload["components"]["llm"]["detail"]["api_key_present"],
            false
        );
    }
}
