//! Error types for botgate
//!
//! Centralized error taxonomy using thiserror. Every variant carries a
//! stable error code and an HTTP status so the transport layer can render
//! the standard JSON envelope without matching on variants itself.

use serde_json::{Value, json};
use thiserror::Error;

/// All error types that can occur in botgate
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unclassified internal failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Input validation failed with per-field details
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    /// A single input value was rejected
    #[error("Invalid input '{field}': {message}")]
    InvalidInput { field: String, message: String },

    /// A required field was absent
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Generic LLM failure
    #[error("LLM error: {0}")]
    Llm(String),

    /// LLM call exceeded its deadline
    #[error("LLM timeout: {0}")]
    LlmTimeout(String),

    /// Provider rate limit
    #[error("LLM rate limited: {0}")]
    LlmRateLimit(String),

    /// LLM reply could not be parsed into the expected shape
    #[error("LLM parsing error: {0}")]
    LlmParsing(String),

    /// Provider-side model failure
    #[error("LLM model error: {0}")]
    LlmModel(String),

    /// Generic session failure
    #[error("Session error: {0}")]
    Session(String),

    /// Session id not present in the manager
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session table at capacity
    #[error("Session limit exceeded: max {0} sessions")]
    SessionLimitExceeded(usize),

    /// Session existed but aged out
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Generic guard failure
    #[error("Guard error: {0}")]
    Guard(String),

    /// Input blocked by the injection guard
    #[error("Input blocked by injection guard: score {score:.2} >= threshold {threshold:.2}")]
    GuardBlocked { score: f64, threshold: f64 },

    /// Guard misconfiguration (missing keys, bad rule packs)
    #[error("Guard configuration error: {0}")]
    GuardConfig(String),
}

/// One field-level validation failure
#[derive(Debug, Clone)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl GatewayError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Internal(_) => "INTERNAL_ERROR",
            GatewayError::Validation { .. } => "VALIDATION_ERROR",
            GatewayError::InvalidInput { .. } => "INVALID_INPUT",
            GatewayError::MissingField(_) => "MISSING_FIELD",
            GatewayError::Llm(_) => "LLM_ERROR",
            GatewayError::LlmTimeout(_) => "LLM_TIMEOUT",
            GatewayError::LlmRateLimit(_) => "LLM_RATE_LIMIT",
            GatewayError::LlmParsing(_) => "LLM_PARSING_ERROR",
            GatewayError::LlmModel(_) => "LLM_MODEL_ERROR",
            GatewayError::Session(_) => "SESSION_ERROR",
            GatewayError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            GatewayError::SessionLimitExceeded(_) => "SESSION_LIMIT_EXCEEDED",
            GatewayError::SessionExpired(_) => "SESSION_EXPIRED",
            GatewayError::Guard(_) => "GUARD_ERROR",
            GatewayError::GuardBlocked { .. } => "GUARD_BLOCKED",
            GatewayError::GuardConfig(_) => "GUARD_CONFIG_ERROR",
        }
    }

    /// Error type name as exposed in the JSON envelope
    pub fn type_name(&self) -> &'static str {
        match self {
            GatewayError::Internal(_) => "InternalError",
            GatewayError::Validation { .. } => "ValidationError",
            GatewayError::InvalidInput { .. } => "InvalidInputError",
            GatewayError::MissingField(_) => "MissingFieldError",
            GatewayError::Llm(_) => "LlmError",
            GatewayError::LlmTimeout(_) => "LlmTimeoutError",
            GatewayError::LlmRateLimit(_) => "LlmRateLimitError",
            GatewayError::LlmParsing(_) => "LlmParsingError",
            GatewayError::LlmModel(_) => "LlmModelError",
            GatewayError::Session(_) => "SessionError",
            GatewayError::SessionNotFound(_) => "SessionNotFoundError",
            GatewayError::SessionLimitExceeded(_) => "SessionLimitExceededError",
            GatewayError::SessionExpired(_) => "SessionExpiredError",
            GatewayError::Guard(_) => "GuardError",
            GatewayError::GuardBlocked { .. } => "GuardBlockedError",
            GatewayError::GuardConfig(_) => "GuardConfigError",
        }
    }

    /// HTTP status code for the transport layer
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::Internal(_) | GatewayError::GuardConfig(_) => 500,
            GatewayError::Validation { .. }
            | GatewayError::InvalidInput { .. }
            | GatewayError::MissingField(_)
            | GatewayError::Session(_)
            | GatewayError::Guard(_)
            | GatewayError::GuardBlocked { .. } => 400,
            GatewayError::Llm(_) | GatewayError::LlmParsing(_) | GatewayError::LlmModel(_) => 502,
            GatewayError::LlmTimeout(_) => 504,
            GatewayError::LlmRateLimit(_) | GatewayError::SessionLimitExceeded(_) => 429,
            GatewayError::SessionNotFound(_) => 404,
            GatewayError::SessionExpired(_) => 410,
        }
    }

    /// Structured details for the envelope, where a variant carries any
    pub fn details(&self) -> Option<Value> {
        match self {
            GatewayError::Validation { errors, .. } => Some(json!({
                "errors": errors
                    .iter()
                    .map(|e| json!({"field": e.field, "message": e.message}))
                    .collect::<Vec<_>>(),
            })),
            GatewayError::GuardBlocked { score, threshold } => Some(json!({
                "score": score,
                "threshold": threshold,
            })),
            GatewayError::SessionLimitExceeded(max) => Some(json!({ "max_sessions": max })),
            _ => None,
        }
    }
}

/// Result type alias for botgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases: Vec<(GatewayError, &str, u16)> = vec![
            (GatewayError::Internal("x".into()), "INTERNAL_ERROR", 500),
            (GatewayError::MissingField("prompt".into()), "MISSING_FIELD", 400),
            (GatewayError::Llm("x".into()), "LLM_ERROR", 502),
            (GatewayError::LlmTimeout("x".into()), "LLM_TIMEOUT", 504),
            (GatewayError::LlmRateLimit("x".into()), "LLM_RATE_LIMIT", 429),
            (GatewayError::LlmParsing("x".into()), "LLM_PARSING_ERROR", 502),
            (GatewayError::LlmModel("x".into()), "LLM_MODEL_ERROR", 502),
            (GatewayError::Session("x".into()), "SESSION_ERROR", 400),
            (GatewayError::SessionNotFound("s".into()), "SESSION_NOT_FOUND", 404),
            (GatewayError::SessionLimitExceeded(50), "SESSION_LIMIT_EXCEEDED", 429),
            (GatewayError::SessionExpired("s".into()), "SESSION_EXPIRED", 410),
            (GatewayError::Guard("x".into()), "GUARD_ERROR", 400),
            (GatewayError::GuardConfig("x".into()), "GUARD_CONFIG_ERROR", 500),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn test_guard_blocked_details() {
        let err = GatewayError::GuardBlocked {
            score: 0.9,
            threshold: 0.85,
        };
        assert_eq!(err.status(), 400);
        let details = err.details().unwrap();
        assert_eq!(details["score"], 0.9);
        assert_eq!(details["threshold"], 0.85);
        assert!(err.to_string().contains("0.90"));
    }

    #[test]
    fn test_validation_details() {
        let err = GatewayError::Validation {
            message: "bad input".into(),
            errors: vec![FieldError {
                field: "target".into(),
                message: "required".into(),
            }],
        };
        let details = err.details().unwrap();
        assert_eq!(details["errors"][0]["field"], "target");
    }

    #[test]
    fn test_session_expired_display() {
        let err = GatewayError::SessionExpired("twentyq:room42".into());
        assert_eq!(err.to_string(), "Session expired: twentyq:room42");
        assert_eq!(err.type_name(), "SessionExpiredError");
    }
}
