//! Audit log configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the audit logger.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Whether audit records are written at all.
    pub enabled: bool,

    /// Channel capacity between request tasks and the drain.
    ///
    /// Records beyond this are dropped and counted, never waited on.
    pub buffer_size: usize,

    /// JSONL file the drain appends to.
    pub path: PathBuf,

    pub drain: DrainConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 4096,
            path: PathBuf::from("query_logs/audit.jsonl"),
            drain: DrainConfig::default(),
        }
    }
}

impl AuditConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn flush_interval_ms(mut self, millis: u64) -> Self {
        self.drain.flush_interval_ms = millis;
        self
    }
}

/// Drain task configuration.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Maximum records written per drain cycle.
    pub batch_size: usize,

    /// Interval between drain cycles (milliseconds).
    pub flush_interval_ms: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 1000,
        }
    }
}

impl DrainConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuditConfig::default();
        assert!(config.enabled);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.path, PathBuf::from("query_logs/audit.jsonl"));
        assert_eq!(config.drain.batch_size, 100);
        assert_eq!(config.drain.flush_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_builder_pattern() {
        let config = AuditConfig::with_path("/tmp/audit.jsonl")
            .buffer_size(16)
            .flush_interval_ms(10)
            .enabled(false);

        assert!(!config.enabled);
        assert_eq!(config.buffer_size, 16);
        assert_eq!(config.drain.flush_interval_ms, 10);
    }
}
