//! Audit record written once per dispatched question.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::StrategySource;
use crate::question::{Question, TenantId};

pub const MAX_QUESTION_CHARS: usize = 200;
pub const MAX_ERROR_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
    Ambiguous,
    Unroutable,
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
            Outcome::Ambiguous => "ambiguous",
            Outcome::Unroutable => "unroutable",
            Outcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tenant: TenantId,
    /// Question text, truncated.
    pub question: String,
    pub tool: Option<String>,
    pub confidence: Option<f64>,
    pub source: Option<StrategySource>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub outcome: Outcome,
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn new(question: &Question, outcome: Outcome, latency: Duration) -> Self {
        Self {
            id: question.id(),
            timestamp: Utc::now(),
            tenant: question.tenant().clone(),
            question: truncate(question.text(), MAX_QUESTION_CHARS),
            tool: None,
            confidence: None,
            source: None,
            latency_ms: latency.as_millis() as u64,
            cache_hit: false,
            outcome,
            error: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>, confidence: Option<f64>) -> Self {
        self.tool = Some(tool.into());
        self.confidence = confidence;
        self
    }

    pub fn with_source(mut self, source: Option<StrategySource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(truncate(&error.to_string(), MAX_ERROR_CHARS));
        self
    }
}

/// At most `max` characters, with a trailing `...` when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_is_truncated() {
        let long = "é".repeat(300);
        let record = AuditRecord::new(
            &Question::new("10", long),
            Outcome::Success,
            Duration::from_millis(12),
        );
        assert_eq!(record.question.chars().count(), MAX_QUESTION_CHARS);
        assert!(record.question.ends_with("..."));
        assert_eq!(record.latency_ms, 12);
    }

    #[test]
    fn test_serializes_outcome_snake_case() {
        let record = AuditRecord::new(
            &Question::new("10", "how many orders"),
            Outcome::Unroutable,
            Duration::ZERO,
        )
        .with_error("no classifier was confident enough");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "unroutable");
        assert_eq!(json["tenant"], "10");
        let back: AuditRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
