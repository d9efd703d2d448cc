//! Summary statistics over an audit log.
//!
//! Read-only: the report never touches the drain or the sink, it just reads
//! whatever JSONL is on disk.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use serde::Serialize;

use super::types::{AuditRecord, Outcome};

/// Confidence below which a resolved question is listed for review.
pub const LOW_CONFIDENCE: f64 = 0.5;

const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub total: usize,
    pub successes: usize,
    pub cache_hits: usize,
    pub outcomes: BTreeMap<String, usize>,
    pub tools: BTreeMap<String, usize>,
    pub avg_latency_ms: f64,
    /// Most recent first.
    pub recent_failures: Vec<ReportEntry>,
    pub low_confidence: Vec<ReportEntry>,
    /// Lines that did not parse as an audit record.
    pub skipped_lines: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub question: String,
    pub tool: Option<String>,
    pub confidence: Option<f64>,
    pub outcome: Outcome,
    pub error: Option<String>,
}

impl From<&AuditRecord> for ReportEntry {
    fn from(record: &AuditRecord) -> Self {
        Self {
            question: record.question.clone(),
            tool: record.tool.clone(),
            confidence: record.confidence,
            outcome: record.outcome,
            error: record.error.clone(),
        }
    }
}

impl AuditReport {
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader(reader: impl BufRead) -> std::io::Result<Self> {
        let mut report = AuditReport::default();
        let mut latency_total: u64 = 0;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Ok(record) = serde_json::from_str::<AuditRecord>(&line) else {
                report.skipped_lines += 1;
                continue;
            };
            latency_total += record.latency_ms;
            report.add(&record);
        }

        if report.total > 0 {
            report.avg_latency_ms = latency_total as f64 / report.total as f64;
        }
        report.recent_failures.reverse();
        report.recent_failures.truncate(RECENT_LIMIT);
        report.low_confidence.reverse();
        report.low_confidence.truncate(RECENT_LIMIT);
        Ok(report)
    }

    fn add(&mut self, record: &AuditRecord) {
        self.total += 1;
        *self.outcomes.entry(record.outcome.to_string()).or_default() += 1;
        if record.cache_hit {
            self.cache_hits += 1;
        }
        if let Some(tool) = &record.tool {
            *self.tools.entry(tool.clone()).or_default() += 1;
        }

        match record.outcome {
            Outcome::Success => {
                self.successes += 1;
                if record.confidence.is_some_and(|c| c < LOW_CONFIDENCE) {
                    self.low_confidence.push(record.into());
                }
            }
            Outcome::Ambiguous => self.low_confidence.push(record.into()),
            Outcome::Error | Outcome::Unroutable | Outcome::Cancelled => {
                self.recent_failures.push(record.into())
            }
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }

    /// Tools ordered by how often they were used.
    pub fn top_tools(&self) -> Vec<(&str, usize)> {
        let mut tools: Vec<_> = self.tools.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        tools.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        tools
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::question::Question;

    fn line(record: &AuditRecord) -> String {
        serde_json::to_string(record).unwrap()
    }

    #[test]
    fn test_report_totals() {
        let ok = AuditRecord::new(
            &Question::new("10", "how many orders"),
            Outcome::Success,
            Duration::from_millis(10),
        )
        .with_tool("count_documents", Some(0.8));
        let shaky = AuditRecord::new(
            &Question::new("10", "orders thing"),
            Outcome::Success,
            Duration::from_millis(30),
        )
        .with_tool("count_documents", Some(0.4))
        .with_cache_hit(true);
        let failed = AuditRecord::new(
            &Question::new("10", "weather"),
            Outcome::Unroutable,
            Duration::from_millis(20),
        )
        .with_error("no classifier was confident enough");

        let input = format!(
            "{}\nnot json\n\n{}\n{}\n",
            line(&ok),
            line(&shaky),
            line(&failed)
        );
        let report = AuditReport::from_reader(input.as_bytes()).unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.successes, 2);
        assert_eq!(report.skipped_lines, 1);
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.avg_latency_ms, 20.0);
        assert_eq!(report.top_tools(), vec![("count_documents", 2)]);
        assert_eq!(report.outcomes.get("unroutable"), Some(&1));
        assert_eq!(report.recent_failures.len(), 1);
        assert_eq!(report.recent_failures[0].question, "weather");
        assert_eq!(report.low_confidence.len(), 1);
        assert_eq!(report.low_confidence[0].question, "orders thing");
        assert!((report.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_log() {
        let report = AuditReport::from_reader("".as_bytes()).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.success_rate(), 0.0);
        assert_eq!(report.avg_latency_ms, 0.0);
    }
}
