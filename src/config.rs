//! Service configuration, loaded once at startup.
//!
//! Every setting has a typed default and can be overridden through an
//! `INSIGHTS_*` environment variable. Invalid values fail startup instead of
//! being silently replaced.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::audit::AuditConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct InsightsConfig {
    pub dispatch: DispatchConfig,
    pub fallback: FallbackConfig,
    pub cache: CacheConfig,
    pub executor: ExecutorConfig,
    pub audit: AuditConfig,
}

impl InsightsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            dispatch: DispatchConfig {
                confidence_threshold: env_parse("INSIGHTS_CONFIDENCE_THRESHOLD", 0.5)?,
                ambiguity_floor: env_parse("INSIGHTS_AMBIGUITY_FLOOR", 0.3)?,
            },
            fallback: FallbackConfig {
                kind: env_parse("INSIGHTS_FALLBACK", FallbackKind::Similarity)?,
                timeout_ms: env_parse("INSIGHTS_FALLBACK_TIMEOUT_MS", 2000)?,
                ollama_host: env_string("OLLAMA_HOST", "http://localhost:11434"),
                ollama_model: env_string("OLLAMA_MODEL", "mistral:7b-instruct"),
            },
            cache: CacheConfig {
                enabled: env_bool("INSIGHTS_CACHE_ENABLED", true),
                ttl_secs: env_parse("INSIGHTS_CACHE_TTL_SECS", 3600)?,
                max_entries: env_parse("INSIGHTS_CACHE_MAX_ENTRIES", 1000)?,
            },
            executor: ExecutorConfig {
                timeout_ms: env_parse("INSIGHTS_EXECUTION_TIMEOUT_MS", 30_000)?,
            },
            audit: AuditConfig::with_path(PathBuf::from(env_string(
                "INSIGHTS_AUDIT_PATH",
                "query_logs/audit.jsonl",
            )))
            .enabled(env_bool("INSIGHTS_AUDIT_ENABLED", true))
            .buffer_size(env_parse("INSIGHTS_AUDIT_BUFFER", 4096)?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.dispatch.confidence_threshold;
        let floor = self.dispatch.ambiguity_floor;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "INSIGHTS_CONFIDENCE_THRESHOLD",
                threshold,
                "must be within [0, 1]",
            ));
        }
        if !(0.0..=threshold).contains(&floor) {
            return Err(invalid(
                "INSIGHTS_AMBIGUITY_FLOOR",
                floor,
                "must be within [0, confidence threshold]",
            ));
        }
        if self.audit.buffer_size == 0 {
            return Err(invalid("INSIGHTS_AUDIT_BUFFER", 0, "must be positive"));
        }
        if self.cache.max_entries == 0 {
            return Err(invalid("INSIGHTS_CACHE_MAX_ENTRIES", 0, "must be positive"));
        }
        Ok(())
    }

    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }
}

/// Confidence cut-offs for the classifier chain.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// A result at or above this is used directly.
    pub confidence_threshold: f64,
    /// Below the threshold but at or above this, the best candidate is
    /// returned as a tentative guess.
    pub ambiguity_floor: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            ambiguity_floor: 0.3,
        }
    }
}

impl DispatchConfig {
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn floor(mut self, floor: f64) -> Self {
        self.ambiguity_floor = floor;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    None,
    Similarity,
    Ollama,
}

impl FromStr for FallbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(FallbackKind::None),
            "similarity" => Ok(FallbackKind::Similarity),
            "ollama" | "llm" => Ok(FallbackKind::Ollama),
            other => Err(format!("unknown fallback '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub kind: FallbackKind,
    pub timeout_ms: u64,
    pub ollama_host: String,
    pub ollama_model: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            kind: FallbackKind::Similarity,
            timeout_ms: 2000,
            ollama_host: "http://localhost:11434".to_string(),
            ollama_model: "mistral:7b-instruct".to_string(),
        }
    }
}

impl FallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn kind(mut self, kind: FallbackKind) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn invalid(key: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
