//! Daily token-usage persistence in the shared Postgres table.
//!
//! The table is shared with the bots, keyed by calendar date. Writes are a
//! single server-side upsert so concurrent writers cannot lose updates;
//! the version column increments on every conflict update.

use chrono::{NaiveDate, Utc};
use log::{debug, info};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::OnceCell;

use crate::config::DatabaseSettings;
use crate::error::{GatewayError, Result};

/// Atomic daily upsert: insert a fresh row at version 0 or add the deltas,
/// bumping request_count and version by one.
const UPSERT_SQL: &str = r#"
INSERT INTO token_usage (
    usage_date,
    input_tokens,
    output_tokens,
    reasoning_tokens,
    request_count,
    version
)
VALUES ($1, $2, $3, $4, 1, 0)
ON CONFLICT (usage_date)
DO UPDATE SET
    input_tokens = token_usage.input_tokens + EXCLUDED.input_tokens,
    output_tokens = token_usage.output_tokens + EXCLUDED.output_tokens,
    reasoning_tokens = token_usage.reasoning_tokens + EXCLUDED.reasoning_tokens,
    request_count = token_usage.request_count + 1,
    version = token_usage.version + 1
"#;

const SELECT_COLUMNS: &str =
    "usage_date, input_tokens, output_tokens, reasoning_tokens, request_count";

/// One day's cumulative usage.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, serde::Serialize)]
pub struct DailyUsage {
    pub usage_date: NaiveDate,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub reasoning_tokens: i64,
    pub request_count: i64,
}

impl DailyUsage {
    pub fn total_tokens(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }

    pub fn zero(date: NaiveDate) -> Self {
        Self {
            usage_date: date,
            input_tokens: 0,
            output_tokens: 0,
            reasoning_tokens: 0,
            request_count: 0,
        }
    }
}

/// Postgres-backed usage store with a lazily created pool.
pub struct UsageRepository {
    settings: DatabaseSettings,
    pool: OnceCell<PgPool>,
}

impl UsageRepository {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self {
            settings,
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<&PgPool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = PgPoolOptions::new()
                    .min_connections(self.settings.min_pool_size)
                    .max_connections(self.settings.max_pool_size)
                    .connect(&self.settings.dsn())
                    .await
                    .map_err(|e| {
                        GatewayError::Internal(format!("DB pool creation failed: {}", e))
                    })?;
                info!(
                    "DB pool created: {}:{}/{}",
                    self.settings.host, self.settings.port, self.settings.database
                );
                Ok(pool)
            })
            .await
    }

    /// Record usage for today. Zero-token calls are not recorded.
    pub async fn record_usage(
        &self,
        input_tokens: i64,
        output_tokens: i64,
        reasoning_tokens: i64,
    ) -> Result<()> {
        if input_tokens <= 0 && output_tokens <= 0 {
            return Ok(());
        }
        let pool = self.pool().await?;
        let today = Utc::now().date_naive();
        sqlx::query(UPSERT_SQL)
            .bind(today)
            .bind(input_tokens)
            .bind(output_tokens)
            .bind(reasoning_tokens)
            .execute(pool)
            .await
            .map_err(|e| GatewayError::Internal(format!("USAGE_RECORD_FAILED: {}", e)))?;
        debug!(
            "USAGE_RECORDED date={} in={} out={} reasoning={}",
            today, input_tokens, output_tokens, reasoning_tokens
        );
        Ok(())
    }

    /// Usage for a specific date (default today).
    pub async fn get_daily_usage(&self, date: Option<NaiveDate>) -> Result<Option<DailyUsage>> {
        let pool = self.pool().await?;
        let target = date.unwrap_or_else(|| Utc::now().date_naive());
        let query = format!(
            "SELECT {} FROM token_usage WHERE usage_date = $1",
            SELECT_COLUMNS
        );
        sqlx::query_as(&query)
            .bind(target)
            .fetch_optional(pool)
            .await
            .map_err(|e| GatewayError::Internal(format!("Usage read failed: {}", e)))
    }

    /// Usage rows for an inclusive date range, newest first.
    pub async fn get_usage_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyUsage>> {
        let pool = self.pool().await?;
        let query = format!(
            "SELECT {} FROM token_usage WHERE usage_date >= $1 AND usage_date <= $2 ORDER BY usage_date DESC",
            SELECT_COLUMNS
        );
        sqlx::query_as(&query)
            .bind(start)
            .bind(end)
            .fetch_all(pool)
            .await
            .map_err(|e| GatewayError::Internal(format!("Usage range read failed: {}", e)))
    }

    /// Most recent N rows, newest first.
    pub async fn get_recent_usage(&self, days: i64) -> Result<Vec<DailyUsage>> {
        let pool = self.pool().await?;
        let query = format!(
            "SELECT {} FROM token_usage ORDER BY usage_date DESC LIMIT $1",
            SELECT_COLUMNS
        );
        sqlx::query_as(&query)
            .bind(days)
            .fetch_all(pool)
            .await
            .map_err(|e| GatewayError::Internal(format!("Recent usage read failed: {}", e)))
    }

    /// Aggregate usage over the trailing N days, with a zero-row fallback.
    pub async fn get_total_usage(&self, days: i32) -> Result<DailyUsage> {
        let pool = self.pool().await?;
        let row: Option<DailyUsage> = sqlx::query_as(
            r#"
SELECT
    CURRENT_DATE AS usage_date,
    COALESCE(SUM(input_tokens), 0)::BIGINT AS input_tokens,
    COALESCE(SUM(output_tokens), 0)::BIGINT AS output_tokens,
    COALESCE(SUM(reasoning_tokens), 0)::BIGINT AS reasoning_tokens,
    COALESCE(SUM(request_count), 0)::BIGINT AS request_count
FROM token_usage
WHERE usage_date >= CURRENT_DATE - $1::int
"#,
        )
        .bind(days)
        .fetch_optional(pool)
        .await
        .map_err(|e| GatewayError::Internal(format!("Total usage read failed: {}", e)))?;
        Ok(row.unwrap_or_else(|| DailyUsage::zero(Utc::now().date_naive())))
    }
}
