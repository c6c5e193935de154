//! Usage reporting endpoints backed by the shared daily table.

use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::state::AppState;
use crate::usage::DailyUsage;

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    #[serde(default)]
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DailyUsageResponse {
    pub usage_date: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub reasoning_tokens: i64,
    pub request_count: i64,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsageListResponse {
    pub usages: Vec<DailyUsageResponse>,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_tokens: i64,
    pub total_request_count: i64,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TotalUsageResponse {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub reasoning_tokens: i64,
}

fn daily_response(usage: Option<DailyUsage>, model: String) -> DailyUsageResponse {
    match usage {
        Some(usage) => DailyUsageResponse {
            usage_date: usage.usage_date.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens(),
            reasoning_tokens: usage.reasoning_tokens,
            request_count: usage.request_count,
            model: Some(model),
        },
        None => DailyUsageResponse {
            usage_date: Utc::now().date_naive().to_string(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            reasoning_tokens: 0,
            request_count: 0,
            model: Some(model),
        },
    }
}

/// GET /api/usage/daily — today's row.
pub async fn daily(State(state): State<AppState>) -> Result<Json<DailyUsageResponse>> {
    let usage = state.usage.get_daily_usage(None).await?;
    Ok(Json(daily_response(
        usage,
        state.settings.llm.default_model.clone(),
    )))
}

/// GET /api/usage/recent?days=N — recent rows plus totals.
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<UsageListResponse>> {
    let days = query.days.unwrap_or(7).max(1);
    let usages = state.usage.get_recent_usage(days).await?;
    let model = state.settings.llm.default_model.clone();

    let total_input_tokens = usages.iter().map(|u| u.input_tokens).sum();
    let total_output_tokens = usages.iter().map(|u| u.output_tokens).sum();
    let total_tokens = usages.iter().map(DailyUsage::total_tokens).sum();
    let total_request_count = usages.iter().map(|u| u.request_count).sum();

    Ok(Json(UsageListResponse {
        usages: usages
            .into_iter()
            .map(|u| daily_response(Some(u), model.clone()))
            .collect(),
        total_input_tokens,
        total_output_tokens,
        total_tokens,
        total_request_count,
        model: Some(model),
    }))
}

/// GET /api/usage/total?days=N — trailing aggregate.
pub async fn total(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<TotalUsageResponse>> {
    let days = query.days.unwrap_or(30).max(1) as i32;
    let usage = state.usage.get_total_usage(days).await?;
    Ok(Json(TotalUsageResponse {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens(),
        reasoning_tokens: usage.reasoning_tokens,
    }))
}
