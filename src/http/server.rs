//! Router assembly and serving.

use axum::Router;
use axum::routing::{get, post};
use eyre::{Context, Result};
use log::info;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::http::middleware::request_id;
use crate::http::routes;
use crate::http::state::AppState;

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // LLM
        .route("/api/llm/chat", post(routes::llm::chat))
        .route("/api/llm/stream", post(routes::llm::stream))
        .route("/api/llm/stream-events", post(routes::llm::stream_events))
        .route("/api/llm/chat-with-usage", post(routes::llm::chat_with_usage))
        .route("/api/llm/structured", post(routes::llm::structured))
        .route("/api/llm/usage", get(routes::llm::usage))
        .route("/api/llm/usage/total", get(routes::llm::usage_total))
        .route("/api/llm/metrics", get(routes::llm::metrics))
        // Sessions
        .route("/api/sessions", post(routes::session::create))
        .route(
            "/api/sessions/{id}",
            get(routes::session::info).delete(routes::session::end),
        )
        .route("/api/sessions/{id}/messages", post(routes::session::chat))
        // Guard
        .route("/api/guard/evaluations", post(routes::guard::evaluate))
        .route("/api/guard/checks", post(routes::guard::check))
        // NLP
        .route("/api/nlp/analyses", post(routes::nlp::analyze))
        .route("/api/nlp/anomaly-scores", post(routes::nlp::anomaly_score))
        .route("/api/nlp/heuristics", post(routes::nlp::heuristics))
        // Usage
        .route("/api/usage/daily", get(routes::usage::daily))
        .route("/api/usage/recent", get(routes::usage::recent))
        .route("/api/usage/total", get(routes::usage::total))
        // Twenty questions
        .route("/api/twentyq/hints", post(routes::twentyq::hints))
        .route("/api/twentyq/answers", post(routes::twentyq::answer))
        .route("/api/twentyq/verifications", post(routes::twentyq::verify))
        .route("/api/twentyq/normalizations", post(routes::twentyq::normalize))
        .route("/api/twentyq/synonym-checks", post(routes::twentyq::synonym_check))
        // Turtle soup
        .route("/api/turtle-soup/answers", post(routes::turtle::answer))
        .route("/api/turtle-soup/hints", post(routes::turtle::hint))
        .route("/api/turtle-soup/validations", post(routes::turtle::validate))
        .route("/api/turtle-soup/reveals", post(routes::turtle::reveal))
        // Health
        .route("/health", get(routes::health::health))
        .route("/health/ready", get(routes::health::ready))
        .route("/health/live", get(routes::health::live))
        .route("/health/models", get(routes::health::models))
        .layer(axum::middleware::from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> Result<()> {
    let bind_addr = format!("{}:{}", state.settings.http.host, state.settings.http.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .context(format!("Failed to bind {}", bind_addr))?;
    info!("HTTP server listening on http://{}", bind_addr);

    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
