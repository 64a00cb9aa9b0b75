//! Configuration types
//!
//! `VigilConfig` is loaded from TOML (`VigilConfig::from_path`) or from
//! `VIGIL_*` environment variables layered over the defaults
//! (`VigilConfig::from_env`). Durations are written in milliseconds.

use crate::error::{ConfigError, VigilError, VigilResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Namespace prefixed to every cache key.
pub const DEFAULT_CACHE_NAMESPACE: &str = "vigil";

/// Schema version stamped on every cache entry.
pub const DEFAULT_SCHEMA_VERSION: &str = "1";

/// Default TTL for cache entries (1 hour).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// TTL for the pending/approved mirror lists (5 minutes).
pub const DEFAULT_MIRROR_TTL_SECS: u64 = 300;

/// Default LMDB map size in megabytes.
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 64;

/// Remote write attempts per submission.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound accepted for `retry.max_attempts`.
pub const MAX_RETRY_ATTEMPTS: u32 = 50;

/// Timeout of the first attempt (20 seconds).
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 20;

/// Timeout added for every subsequent attempt (10 seconds).
pub const DEFAULT_TIMEOUT_STEP_SECS: u64 = 10;

/// Backoff before the second attempt (1 second).
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound for any single backoff (30 seconds).
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Administrator session lifetime (4 hours).
pub const DEFAULT_SESSION_DURATION_SECS: u64 = 4 * 3600;

/// Remaining session time below which the guard always extends (15 minutes).
pub const DEFAULT_SESSION_LOW_WATER_SECS: u64 = 15 * 60;

/// Minimum spacing between routine extensions (5 minutes).
pub const DEFAULT_SESSION_REFRESH_SECS: u64 = 5 * 60;

/// Key the session is stored under in both scopes.
pub const DEFAULT_SESSION_KEY: &str = "vigil.admin_session";

/// Cache sweep cadence (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Reconciliation cadence (1 minute).
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;

// ============================================================================
// SECTIONS
// ============================================================================

/// Local cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub namespace: String,
    /// Entries tagged with any other version are misses
    pub schema_version: String,
    #[serde(with = "duration_ms")]
    pub default_ttl: Duration,
    #[serde(with = "duration_ms")]
    pub mirror_ttl: Duration,
    /// Directory of the LMDB environment backing the persistent scope
    pub lmdb_path: PathBuf,
    pub lmdb_max_size_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            mirror_ttl: Duration::from_secs(DEFAULT_MIRROR_TTL_SECS),
            lmdb_path: PathBuf::from("var/vigil-cache"),
            lmdb_max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
        }
    }
}

impl CacheConfig {
    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the schema version.
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// Set the default entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the LMDB directory.
    pub fn with_lmdb_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lmdb_path = path.into();
        self
    }
}

/// Retry policy for the persistence pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub attempt_timeout: Duration,
    /// Added to the timeout for each attempt after the first
    #[serde(with = "duration_ms")]
    pub timeout_step: Duration,
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            timeout_step: Duration::from_secs(DEFAULT_TIMEOUT_STEP_SECS),
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Timeout budget for a 1-based attempt: grows linearly.
    pub fn timeout_for_attempt(&self, attempt: u32) -> Duration {
        self.attempt_timeout + self.timeout_step * attempt.saturating_sub(1)
    }

    /// Delay slept after a failed 1-based attempt: grows exponentially,
    /// capped at `max_backoff`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_possible_wrap)]
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Administrator session policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Remaining time below which a check always extends the session
    #[serde(with = "duration_ms")]
    pub low_water_mark: Duration,
    /// Minimum spacing between routine extensions
    #[serde(with = "duration_ms")]
    pub refresh_interval: Duration,
    pub storage_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(DEFAULT_SESSION_DURATION_SECS),
            low_water_mark: Duration::from_secs(DEFAULT_SESSION_LOW_WATER_SECS),
            refresh_interval: Duration::from_secs(DEFAULT_SESSION_REFRESH_SECS),
            storage_key: DEFAULT_SESSION_KEY.to_string(),
        }
    }
}

/// Background job cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    #[serde(with = "duration_ms")]
    pub cache_sweep_interval: Duration,
    #[serde(with = "duration_ms")]
    pub reconciliation_interval: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            cache_sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            reconciliation_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
        }
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VigilConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl VigilConfig {
    /// Load and validate a TOML configuration file.
    pub fn from_path(path: &Path) -> VigilResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> VigilResult<Self> {
        let config: VigilConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `VIGIL_*` environment variables.
    ///
    /// # Environment Variables
    /// - `VIGIL_CACHE_NAMESPACE`, `VIGIL_SCHEMA_VERSION`, `VIGIL_LMDB_PATH`
    /// - `VIGIL_CACHE_TTL_SECS`, `VIGIL_MIRROR_TTL_SECS`
    /// - `VIGIL_RETRY_MAX_ATTEMPTS`, `VIGIL_RETRY_TIMEOUT_SECS`, `VIGIL_RETRY_TIMEOUT_STEP_SECS`
    /// - `VIGIL_RETRY_BACKOFF_MS`
    /// - `VIGIL_SESSION_DURATION_SECS`, `VIGIL_SESSION_LOW_WATER_SECS`
    /// - `VIGIL_SWEEP_INTERVAL_SECS`, `VIGIL_RECONCILE_INTERVAL_SECS`
    pub fn from_env() -> VigilResult<Self> {
        let mut config = Self::default();

        if let Ok(namespace) = std::env::var("VIGIL_CACHE_NAMESPACE") {
            config.cache.namespace = namespace;
        }
        if let Ok(version) = std::env::var("VIGIL_SCHEMA_VERSION") {
            config.cache.schema_version = version;
        }
        if let Ok(path) = std::env::var("VIGIL_LMDB_PATH") {
            config.cache.lmdb_path = PathBuf::from(path);
        }
        if let Some(secs) = env_u64("VIGIL_CACHE_TTL_SECS") {
            config.cache.default_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("VIGIL_MIRROR_TTL_SECS") {
            config.cache.mirror_ttl = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_u64("VIGIL_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
        }
        if let Some(secs) = env_u64("VIGIL_RETRY_TIMEOUT_SECS") {
            config.retry.attempt_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("VIGIL_RETRY_TIMEOUT_STEP_SECS") {
            config.retry.timeout_step = Duration::from_secs(secs);
        }
        if let Some(ms) = env_u64("VIGIL_RETRY_BACKOFF_MS") {
            config.retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("VIGIL_SESSION_DURATION_SECS") {
            config.session.duration = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("VIGIL_SESSION_LOW_WATER_SECS") {
            config.session.low_water_mark = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("VIGIL_SWEEP_INTERVAL_SECS") {
            config.jobs.cache_sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("VIGIL_RECONCILE_INTERVAL_SECS") {
            config.jobs.reconciliation_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(VigilError::Config) if invalid.
    pub fn validate(&self) -> VigilResult<()> {
        if self.cache.namespace.trim().is_empty() {
            return Err(invalid("cache.namespace", &self.cache.namespace, "must not be empty"));
        }
        if self.cache.namespace.contains([':', '#']) {
            return Err(invalid(
                "cache.namespace",
                &self.cache.namespace,
                "must not contain ':' or '#'",
            ));
        }
        if self.cache.schema_version.trim().is_empty() {
            return Err(invalid(
                "cache.schema_version",
                &self.cache.schema_version,
                "must not be empty",
            ));
        }
        require_positive("cache.default_ttl", self.cache.default_ttl)?;
        require_positive("cache.mirror_ttl", self.cache.mirror_ttl)?;
        if self.cache.lmdb_max_size_mb == 0 {
            return Err(invalid("cache.lmdb_max_size_mb", "0", "must be greater than 0"));
        }

        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "0", "must be greater than 0"));
        }
        if self.retry.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(invalid(
                "retry.max_attempts",
                &self.retry.max_attempts.to_string(),
                &format!("must be at most {}", MAX_RETRY_ATTEMPTS),
            ));
        }
        require_positive("retry.attempt_timeout", self.retry.attempt_timeout)?;
        if self.retry.backoff_multiplier < 1.0 || !self.retry.backoff_multiplier.is_finite() {
            return Err(invalid(
                "retry.backoff_multiplier",
                &self.retry.backoff_multiplier.to_string(),
                "must be >= 1.0",
            ));
        }
        if self.retry.max_backoff < self.retry.initial_backoff {
            return Err(invalid(
                "retry.max_backoff",
                &format!("{:?}", self.retry.max_backoff),
                "must be >= initial_backoff",
            ));
        }

        require_positive("session.duration", self.session.duration)?;
        if self.session.low_water_mark >= self.session.duration {
            return Err(invalid(
                "session.low_water_mark",
                &format!("{:?}", self.session.low_water_mark),
                "must be shorter than session.duration",
            ));
        }
        if self.session.storage_key.trim().is_empty() {
            return Err(invalid("session.storage_key", "", "must not be empty"));
        }
        // The session shares its scopes with the caches; keys under a cache
        // prefix would be swept or purged as cache entries.
        let reserved = [
            format!("{}:", self.cache.namespace),
            format!("{}#", self.cache.namespace),
            format!("{}.session:", self.cache.namespace),
            format!("{}.session#", self.cache.namespace),
        ];
        if reserved
            .iter()
            .any(|prefix| self.session.storage_key.starts_with(prefix.as_str()))
        {
            return Err(invalid(
                "session.storage_key",
                &self.session.storage_key,
                "must not start with a cache namespace prefix",
            ));
        }

        require_positive("jobs.cache_sweep_interval", self.jobs.cache_sweep_interval)?;
        require_positive("jobs.reconciliation_interval", self.jobs.reconciliation_interval)?;

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> VigilError {
    VigilError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

fn require_positive(field: &str, value: Duration) -> VigilResult<()> {
    if value.is_zero() {
        return Err(invalid(field, &format!("{:?}", value), "must be positive"));
    }
    Ok(())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Serialize `Duration` as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
