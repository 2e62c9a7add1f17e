//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Storage
//!
//! - `DATABASE_URL`: PostgreSQL DSN. When unset the service runs against an
//!   in-memory store (development and tests only).
//! - `DB_MAX_CONNECTIONS` / `DB_MIN_CONNECTIONS` / `DB_MAX_IDLE_TIME_SECS`: pool sizing
//! - `STORE_TIMEOUT_MS`: upper bound for a single store operation (default: 3000)
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_ENABLED`: global toggle (default: true)
//! - `RATE_LIMIT_RPS`: token refill rate per client (default: 2)
//! - `RATE_LIMIT_BURST`: bucket capacity per client (default: 4)
//! - `RATE_LIMIT_STALE_AFTER_SECS`: idle time before a client entry is evicted (default: 180)

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// A bearer token accepted by the in-memory token validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticToken {
    pub token: String,
    pub permissions: Vec<String>,
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 4000)
    pub port: u16,

    /// Deployment environment label reported by the healthcheck
    /// (development | staging | production)
    pub environment: String,

    // =========================================================================
    // Database Configuration
    // =========================================================================
    /// PostgreSQL connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,

    /// Maximum open connections in the pool (default: 25)
    pub db_max_connections: u32,

    /// Connections kept open even when idle (default: 0)
    pub db_min_connections: u32,

    /// Idle connections are closed after this long (default: 15 minutes)
    pub db_max_idle_time: Duration,

    /// How long an operation may wait for a pooled connection (default: 5 seconds)
    pub db_acquire_timeout: Duration,

    /// Startup connection attempts before giving up (default: 5)
    pub db_connect_attempts: u32,

    /// Base delay between startup connection attempts (exponential backoff applies)
    pub db_connect_base_delay: Duration,

    /// Maximum delay between startup connection attempts
    pub db_connect_max_delay: Duration,

    /// Apply embedded SQL migrations at startup (default: true)
    pub run_migrations: bool,

    /// Timeout for a single store operation (default: 3 seconds)
    pub store_timeout: Duration,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Timeout for a single token lookup (default: 3 seconds)
    pub auth_timeout: Duration,

    /// Tokens accepted when running without a database.
    /// Format: `token=perm|perm,token=perm`
    pub static_tokens: Vec<StaticToken>,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Global rate limiter toggle (default: true)
    pub rate_limit_enabled: bool,

    /// Tokens refilled per second per client (default: 2)
    pub rate_limit_rps: u32,

    /// Bucket capacity per client (default: 4)
    pub rate_limit_burst: u32,

    /// Client entries unseen for longer than this are evicted (default: 3 minutes)
    pub rate_limit_stale_after: Duration,

    /// How often the eviction sweep runs (default: 1 minute)
    pub rate_limit_sweep_interval: Duration,

    /// Trusted proxy CIDR ranges. X-Forwarded-For / X-Real-IP are only honoured
    /// when the connecting peer falls inside one of these networks.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (forwarding headers ignored, peer address only)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    /// Allowed CORS origins, "*" for any
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Emit logs as JSON lines instead of the human-readable format
    pub log_json: bool,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 4000)?,
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),

            // Database
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            db_max_connections: Self::parse_env("DB_MAX_CONNECTIONS", 25)?,
            db_min_connections: Self::parse_env("DB_MIN_CONNECTIONS", 0)?,
            db_max_idle_time: Duration::from_secs(Self::parse_env("DB_MAX_IDLE_TIME_SECS", 900)?),
            db_acquire_timeout: Duration::from_secs(Self::parse_env(
                "DB_ACQUIRE_TIMEOUT_SECS",
                5,
            )?),
            db_connect_attempts: Self::parse_env("DB_CONNECT_ATTEMPTS", 5)?,
            db_connect_base_delay: Duration::from_millis(Self::parse_env(
                "DB_CONNECT_BASE_DELAY_MS",
                500,
            )?),
            db_connect_max_delay: Duration::from_millis(Self::parse_env(
                "DB_CONNECT_MAX_DELAY_MS",
                10_000,
            )?),
            run_migrations: Self::parse_env("RUN_MIGRATIONS", true)?,
            store_timeout: Duration::from_millis(Self::parse_env("STORE_TIMEOUT_MS", 3000)?),

            // Authentication
            auth_timeout: Duration::from_millis(Self::parse_env("AUTH_TIMEOUT_MS", 3000)?),
            static_tokens: Self::parse_static_tokens(
                &env::var("STATIC_AUTH_TOKENS").unwrap_or_default(),
            )?,

            // Rate limiting
            rate_limit_enabled: Self::parse_env("RATE_LIMIT_ENABLED", true)?,
            rate_limit_rps: Self::parse_env("RATE_LIMIT_RPS", 2)?,
            rate_limit_burst: Self::parse_env("RATE_LIMIT_BURST", 4)?,
            rate_limit_stale_after: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_STALE_AFTER_SECS",
                180,
            )?),
            rate_limit_sweep_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                60,
            )?),
            trusted_proxies: Self::parse_list(&env::var("TRUSTED_PROXIES").unwrap_or_default()),

            // HTTP
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,
            cors_allowed_origins: Self::parse_list(
                &env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
            ),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.rate_limit_enabled && self.rate_limit_rps == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_RPS must be greater than 0 when RATE_LIMIT_ENABLED=true".to_string(),
            ));
        }

        if self.rate_limit_enabled && self.rate_limit_burst == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_BURST must be greater than 0 when RATE_LIMIT_ENABLED=true".to_string(),
            ));
        }

        if self.rate_limit_sweep_interval.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.store_timeout.is_zero() || self.auth_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "STORE_TIMEOUT_MS and AUTH_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        if self.db_max_connections == 0 {
            return Err(AppError::ConfigError(
                "DB_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }

        if self.db_min_connections > self.db_max_connections {
            return Err(AppError::ConfigError(format!(
                "DB_MIN_CONNECTIONS ({}) must be <= DB_MAX_CONNECTIONS ({})",
                self.db_min_connections, self.db_max_connections
            )));
        }

        if self.db_connect_base_delay > self.db_connect_max_delay {
            return Err(AppError::ConfigError(format!(
                "DB_CONNECT_BASE_DELAY_MS ({:?}) must be <= DB_CONNECT_MAX_DELAY_MS ({:?})",
                self.db_connect_base_delay, self.db_connect_max_delay
            )));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_enabled()
            .then(|| std::net::SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Split a comma-separated value, dropping empty entries.
    fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parse `STATIC_AUTH_TOKENS`.
    ///
    /// Each entry is `token=permission|permission`; a token with no permissions
    /// (`token=`) authenticates but cannot pass any guarded route.
    pub fn parse_static_tokens(raw: &str) -> AppResult<Vec<StaticToken>> {
        Self::parse_list(raw)
            .into_iter()
            .map(|entry| {
                let (token, permissions) = entry.split_once('=').ok_or_else(|| {
                    AppError::ConfigError(
                        "Invalid STATIC_AUTH_TOKENS entry: expected token=permission|permission"
                            .to_string(),
                    )
                })?;
                let token = token.trim();
                if token.is_empty() {
                    return Err(AppError::ConfigError(
                        "Invalid STATIC_AUTH_TOKENS entry: empty token".to_string(),
                    ));
                }
                Ok(StaticToken {
                    token: token.to_string(),
                    permissions: permissions
                        .split('|')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect(),
                })
            })
            .collect()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 4000,
            environment: "development".to_string(),
            // Database
            database_url: None,
            db_max_connections: 25,
            db_min_connections: 0,
            db_max_idle_time: Duration::from_secs(15 * 60),
            db_acquire_timeout: Duration::from_secs(5),
            db_connect_attempts: 5,
            db_connect_base_delay: Duration::from_millis(500),
            db_connect_max_delay: Duration::from_secs(10),
            run_migrations: true,
            store_timeout: Duration::from_secs(3),
            // Authentication
            auth_timeout: Duration::from_secs(3),
            static_tokens: vec![],
            // Rate limiting
            rate_limit_enabled: true,
            rate_limit_rps: 2,
            rate_limit_burst: 4,
            rate_limit_stale_after: Duration::from_secs(3 * 60),
            rate_limit_sweep_interval: Duration::from_secs(60),
            trusted_proxies: vec![],
            // HTTP
            max_request_body_size: 1024 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
            // Observability
            log_level: "info".to_string(),
            log_json: false,
            metrics_port: 9090,
        }
    }
}
