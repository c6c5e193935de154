//! Korean NLP endpoints.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NlpRequest {
    pub text: String,
}

/// POST /api/nlp/analyses — morphological analysis.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<NlpRequest>,
) -> Json<Vec<Value>> {
    let tokens = state.nlp.analyze_async(request.text).await;
    Json(
        tokens
            .into_iter()
            .map(|t| {
                json!({
                    "form": t.form,
                    "tag": t.tag,
                    "position": t.position,
                    "length": t.length,
                })
            })
            .collect(),
    )
}

/// POST /api/nlp/anomaly-scores — anomaly score.
pub async fn anomaly_score(
    State(state): State<AppState>,
    Json(request): Json<NlpRequest>,
) -> Json<Value> {
    let score = state.nlp.anomaly_score_async(request.text).await;
    Json(json!({"score": score}))
}

/// POST /api/nlp/heuristics — answer-validation heuristics.
pub async fn heuristics(
    State(state): State<AppState>,
    Json(request): Json<NlpRequest>,
) -> Json<Value> {
    let h = state.nlp.heuristics_async(request.text).await;
    Json(json!({
        "numeric_quantifier": h.numeric_quantifier,
        "unit_noun": h.unit_noun,
        "boundary_ref": h.boundary_ref,
        "comparison_word": h.comparison_word,
    }))
}
