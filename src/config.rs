//! Environment-driven configuration.
//!
//! The whole settings tree is read once at startup and passed through the
//! composition root; nothing reads the environment after that.

use eyre::Result;
use log::warn;
use std::env;
use std::str::FromStr;

/// Premium thinking models take a categorical thinking level and a fixed
/// temperature of 1.0.
pub fn is_premium_thinking(model: &str) -> bool {
    model.to_lowercase().contains("gemini-3")
}

pub const PREMIUM_FIXED_TEMPERATURE: f64 = 1.0;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("Invalid value for {}={}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => raw.trim().eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

/// Split a comma/whitespace separated env value into items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\t', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Positive integers pass through; zero, negative, or invalid become None.
pub fn positive_or_none(raw: Option<&str>, default: i64) -> Option<u32> {
    let value = match raw {
        Some(s) => s.trim().parse::<i64>().unwrap_or(default),
        None => default,
    };
    if value > 0 { Some(value as u32) } else { None }
}

fn env_positive_or_none(key: &str, default: i64) -> Option<u32> {
    let raw = env::var(key).ok();
    positive_or_none(raw.as_deref(), default)
}

/// Per-task thinking configuration.
///
/// Premium models use the categorical level; older models use the integer
/// token budget. Task overrides fall back to the default slot.
#[derive(Debug, Clone)]
pub struct ThinkingSettings {
    pub level_default: String,
    pub level_hints: String,
    pub level_answer: String,
    pub level_verify: String,
    pub budget_default: Option<u32>,
    pub budget_hints: Option<u32>,
    pub budget_answer: Option<u32>,
    pub budget_verify: Option<u32>,
}

impl Default for ThinkingSettings {
    fn default() -> Self {
        Self {
            level_default: "low".to_string(),
            level_hints: "low".to_string(),
            level_answer: "low".to_string(),
            level_verify: "low".to_string(),
            budget_default: None,
            budget_hints: Some(8192),
            budget_answer: Some(4096),
            budget_verify: Some(2048),
        }
    }
}

impl ThinkingSettings {
    fn from_env() -> Self {
        Self {
            level_default: env_string("GEMINI_THINKING_LEVEL", "low"),
            level_hints: env_string("GEMINI_THINKING_LEVEL_HINTS", "low"),
            level_answer: env_string("GEMINI_THINKING_LEVEL_ANSWER", "low"),
            level_verify: env_string("GEMINI_THINKING_LEVEL_VERIFY", "low"),
            budget_default: env_positive_or_none("GEMINI_THINKING_BUDGET", 0),
            budget_hints: env_positive_or_none("GEMINI_THINKING_BUDGET_HINTS", 8192),
            budget_answer: env_positive_or_none("GEMINI_THINKING_BUDGET_ANSWER", 4096),
            budget_verify: env_positive_or_none("GEMINI_THINKING_BUDGET_VERIFY", 2048),
        }
    }

    pub fn level_for(&self, task: Option<&str>) -> &str {
        match task {
            Some("hints") => &self.level_hints,
            Some("answer") => &self.level_answer,
            Some("verify") => &self.level_verify,
            _ => &self.level_default,
        }
    }

    pub fn budget_for(&self, task: Option<&str>) -> Option<u32> {
        match task {
            Some("hints") => self.budget_hints,
            Some("answer") => self.budget_answer,
            Some("verify") => self.budget_verify,
            _ => self.budget_default,
        }
    }
}

/// Generative backend settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_keys: Vec<String>,
    pub default_model: String,
    pub hints_model: String,
    pub answer_model: String,
    pub verify_model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub thinking: ThinkingSettings,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub model_cache_size: usize,
    pub failover_attempts: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            default_model: "gemini-2.5-flash-preview-09-2025".to_string(),
            hints_model: String::new(),
            answer_model: String::new(),
            verify_model: String::new(),
            temperature: 0.7,
            max_output_tokens: 8192,
            thinking: ThinkingSettings::default(),
            max_retries: 6,
            timeout_secs: 60,
            model_cache_size: 20,
            failover_attempts: 2,
        }
    }
}

impl LlmSettings {
    fn from_env() -> Self {
        let api_keys = match env::var("GOOGLE_API_KEYS") {
            Ok(raw) if !raw.trim().is_empty() => split_list(&raw),
            _ => match env::var("GOOGLE_API_KEY") {
                Ok(key) if !key.trim().is_empty() => vec![key.trim().to_string()],
                _ => Vec::new(),
            },
        };
        Self {
            api_keys,
            default_model: env_string("GEMINI_MODEL", "gemini-2.5-flash-preview-09-2025"),
            hints_model: env_string("GEMINI_HINTS_MODEL", ""),
            answer_model: env_string("GEMINI_ANSWER_MODEL", ""),
            verify_model: env_string("GEMINI_VERIFY_MODEL", ""),
            temperature: env_parse("GEMINI_TEMPERATURE", 0.7),
            max_output_tokens: env_parse("GEMINI_MAX_TOKENS", 8192u32),
            thinking: ThinkingSettings::from_env(),
            max_retries: env_parse("GEMINI_MAX_RETRIES", 6u32).max(1),
            timeout_secs: env_parse("GEMINI_TIMEOUT", 60u64),
            model_cache_size: env_parse("GEMINI_MODEL_CACHE_SIZE", 20usize).max(1),
            failover_attempts: env_parse("GEMINI_FAILOVER_ATTEMPTS", 2u32).max(1),
        }
    }

    /// Primary API key, if any.
    pub fn api_key(&self) -> Option<&str> {
        self.api_keys.first().map(String::as_str)
    }

    /// Model for a task, falling back to the default model.
    pub fn model_for(&self, task: Option<&str>) -> &str {
        let picked = match task {
            Some("hints") => &self.hints_model,
            Some("answer") => &self.answer_model,
            Some("verify") => &self.verify_model,
            _ => &self.default_model,
        };
        if picked.is_empty() {
            &self.default_model
        } else {
            picked
        }
    }

    /// Premium thinking models run at a fixed temperature.
    pub fn temperature_for(&self, model: &str) -> f64 {
        if is_premium_thinking(model) {
            PREMIUM_FIXED_TEMPERATURE
        } else {
            self.temperature
        }
    }
}

/// Session manager settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_sessions: usize,
    pub ttl_minutes: i64,
    pub history_max_pairs: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 50,
            ttl_minutes: 1440,
            history_max_pairs: 10,
        }
    }
}

impl SessionSettings {
    fn from_env() -> Self {
        Self {
            max_sessions: env_parse("MAX_SESSIONS", 50usize),
            ttl_minutes: env_parse("SESSION_TTL_MINUTES", 1440i64),
            history_max_pairs: env_parse("SESSION_HISTORY_MAX_PAIRS", 10i64).max(0) as usize,
        }
    }
}

/// Checkpoint backend settings.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub enabled: bool,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:46379".to_string(),
            enabled: true,
        }
    }
}

impl RedisSettings {
    fn from_env() -> Self {
        Self {
            url: env_string("REDIS_URL", "redis://localhost:46379"),
            enabled: env_bool("LANGGRAPH_REDIS_ENABLED", true),
        }
    }
}

/// Injection guard settings.
#[derive(Debug, Clone)]
pub struct GuardSettings {
    pub enabled: bool,
    pub threshold: f64,
    pub rulepacks_dir: String,
    pub cache_maxsize: u64,
    pub cache_ttl_secs: u64,
    pub anomaly_threshold: f64,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.85,
            rulepacks_dir: "rulepacks".to_string(),
            cache_maxsize: 10_000,
            cache_ttl_secs: 3600,
            anomaly_threshold: 0.5,
        }
    }
}

impl GuardSettings {
    fn from_env() -> Self {
        Self {
            enabled: env_bool("GUARD_ENABLED", true),
            threshold: env_parse("GUARD_THRESHOLD", 0.85),
            rulepacks_dir: env_string("RULEPACKS_DIR", "rulepacks"),
            cache_maxsize: env_parse("GUARD_CACHE_SIZE", 10_000u64),
            cache_ttl_secs: env_parse("GUARD_CACHE_TTL", 3600u64),
            anomaly_threshold: env_parse("GUARD_ANOMALY_THRESHOLD", 0.5),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub dir: String,
    pub rotation: String,
    pub json_logs: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            rotation: "10 MB".to_string(),
            json_logs: false,
        }
    }
}

impl LoggingSettings {
    fn from_env() -> Self {
        Self {
            level: env_string("LOG_LEVEL", "info"),
            dir: env_string("LOG_DIR", "logs"),
            rotation: env_string("LOG_ROTATION", "10 MB"),
            json_logs: env_bool("LOG_JSON", false),
        }
    }
}

/// HTTP bind settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    pub http2_enabled: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 40527,
            http2_enabled: true,
        }
    }
}

impl HttpSettings {
    fn from_env() -> Self {
        Self {
            host: env_string("HTTP_HOST", "127.0.0.1"),
            port: env_parse("HTTP_PORT", 40527u16),
            http2_enabled: env_bool("HTTP2_ENABLED", true),
        }
    }
}

/// Relational store settings for the shared usage table.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub min_pool_size: u32,
    pub max_pool_size: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "twentyq".to_string(),
            user: "twentyq".to_string(),
            password: String::new(),
            min_pool_size: 1,
            max_pool_size: 5,
        }
    }
}

impl DatabaseSettings {
    fn from_env() -> Self {
        Self {
            host: env_string("DB_HOST", "localhost"),
            port: env_parse("DB_PORT", 5432u16),
            database: env_string("DB_NAME", "twentyq"),
            user: env_string("DB_USER", "twentyq"),
            password: env_string("DB_PASSWORD", ""),
            min_pool_size: env_parse("DB_MIN_POOL", 1u32),
            max_pool_size: env_parse("DB_MAX_POOL", 5u32),
        }
    }

    /// Postgres connection DSN.
    pub fn dsn(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Bot health monitor settings.
#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub enabled: bool,
    pub urls: Vec<String>,
    pub interval_secs: u64,
    pub max_failures: u32,
    pub timeout_secs: f64,
    pub startup_grace_secs: u64,
    pub restart_cmd: Vec<String>,
    pub restart_containers: Vec<String>,
    pub docker_socket: String,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            urls: Vec::new(),
            interval_secs: 60,
            max_failures: 5,
            timeout_secs: 3.0,
            startup_grace_secs: 15,
            restart_cmd: Vec::new(),
            restart_containers: Vec::new(),
            docker_socket: "/var/run/docker.sock".to_string(),
        }
    }
}

impl HealthSettings {
    fn from_env(http: &HttpSettings) -> Self {
        // Default target: the server's own readiness endpoint.
        let default_url = format!("http://{}:{}/health/ready", http.host, http.port);
        let urls_raw = env_string("BOT_HEALTH_URLS", "");
        let urls = if !urls_raw.trim().is_empty() {
            split_list(&urls_raw)
        } else {
            let url = env_string("BOT_HEALTH_URL", &default_url);
            if url.trim().is_empty() {
                Vec::new()
            } else {
                vec![url.trim().to_string()]
            }
        };
        Self {
            enabled: env_bool("BOT_HEALTH_ENABLED", true),
            urls,
            interval_secs: env_parse("BOT_HEALTH_INTERVAL_SECONDS", 60u64).max(1),
            max_failures: env_parse("BOT_HEALTH_MAX_FAILURES", 5u32).max(1),
            timeout_secs: env_parse("BOT_HEALTH_TIMEOUT_SECONDS", 3.0f64),
            startup_grace_secs: env_parse("BOT_HEALTH_STARTUP_GRACE_SECONDS", 15u64),
            restart_cmd: split_list(&env_string("BOT_RESTART_CMD", "")),
            restart_containers: split_list(&env_string("BOT_RESTART_CONTAINERS", "")),
            docker_socket: env_string("BOT_DOCKER_SOCKET", "/var/run/docker.sock"),
        }
    }
}

/// Main settings container.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub session: SessionSettings,
    pub redis: RedisSettings,
    pub guard: GuardSettings,
    pub logging: LoggingSettings,
    pub http: HttpSettings,
    pub database: DatabaseSettings,
    pub health: HealthSettings,
}

impl Settings {
    /// Read the full settings tree from the environment.
    pub fn from_env() -> Self {
        let http = HttpSettings::from_env();
        Self {
            llm: LlmSettings::from_env(),
            session: SessionSettings::from_env(),
            redis: RedisSettings::from_env(),
            guard: GuardSettings::from_env(),
            logging: LoggingSettings::from_env(),
            health: HealthSettings::from_env(&http),
            http,
            database: DatabaseSettings::from_env(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.llm.max_output_tokens == 0 {
            eyre::bail!("GEMINI_MAX_TOKENS must be > 0");
        }
        if self.llm.timeout_secs == 0 {
            eyre::bail!("GEMINI_TIMEOUT must be > 0");
        }
        if self.session.max_sessions == 0 {
            eyre::bail!("MAX_SESSIONS must be > 0");
        }
        if self.database.max_pool_size < self.database.min_pool_size {
            eyre::bail!("DB_MAX_POOL must be >= DB_MIN_POOL");
        }
        Ok(())
    }
}

const SECRET_MASK_FULL_LENGTH: usize = 4;

/// Mask a secret for safe logging.
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return "<missing>".to_string();
    }
    if value.chars().count() <= SECRET_MASK_FULL_LENGTH {
        return "*".repeat(value.chars().count());
    }
    let head: String = value.chars().take(2).collect();
    let tail: String = value.chars().rev().take(2).collect::<Vec<_>>().into_iter().rev().collect();
    format!("{}***{}", head, tail)
}

/// Log key environment status (masked) so operators can verify loading.
pub fn log_env_status(settings: &Settings) {
    let primary = settings
        .llm
        .api_key()
        .map(mask_secret)
        .unwrap_or_else(|| "<missing>".to_string());
    log::info!(
        "ENV_STATUS keys={} primary_key={} model={} timeout={}s redis={} db={}:{}/{} session_ttl={}m history_pairs={}",
        settings.llm.api_keys.len(),
        primary,
        settings.llm.default_model,
        settings.llm.timeout_secs,
        settings.redis.url,
        settings.database.host,
        settings.database.port,
        settings.database.database,
        settings.session.ttl_minutes,
        settings.session.history_max_pairs,
    );
    if settings.llm.api_keys.is_empty() {
        log::error!("ENV_MISSING_GOOGLE_API_KEY");
    }
}
