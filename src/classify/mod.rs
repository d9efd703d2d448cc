//! Classifier chain: deterministic rules first, an injected fallback second.
//!
//! Merge policy:
//! - a rule result at or above the confidence threshold is used directly and
//!   the fallback never runs;
//! - otherwise a fallback verdict at or above the threshold is used;
//! - otherwise the best remaining candidate at or above the ambiguity floor is
//!   returned as a tentative guess (higher confidence wins, ties prefer the
//!   rule result);
//! - otherwise there is no match.

pub mod fallback;
pub mod infer;
pub mod ollama;
pub mod rules;
pub mod similarity;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use fallback::{classify_with_timeout, Candidate, ClassifierVerdict, FallbackClassifier};
pub use infer::infer_params;
pub use ollama::OllamaClassifier;
pub use rules::RuleCatalog;
pub use similarity::SimilarityClassifier;

use crate::config::DispatchConfig;
use crate::question::Question;
use crate::registry::{ToolParams, ToolRegistry};

/// Which strategy produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategySource {
    Deterministic,
    Fallback,
}

impl fmt::Display for StrategySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategySource::Deterministic => write!(f, "deterministic"),
            StrategySource::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Canonical name or alias, resolved by the dispatcher.
    pub tool: String,
    pub params: ToolParams,
    pub confidence: f64,
    pub source: StrategySource,
    pub matched_trigger: Option<String>,
}

impl ClassificationResult {
    fn from_verdict(verdict: ClassifierVerdict) -> Self {
        Self {
            tool: verdict.tool,
            params: verdict.parameters.into_iter().collect(),
            confidence: verdict.confidence,
            source: StrategySource::Fallback,
            matched_trigger: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// At or above the confidence threshold.
    Confident(ClassificationResult),
    /// Below the threshold but at or above the ambiguity floor.
    Tentative(ClassificationResult),
    NoMatch,
}

pub struct ClassifierChain {
    rules: RuleCatalog,
    fallback: Option<Arc<dyn FallbackClassifier>>,
    fallback_timeout: Duration,
    config: DispatchConfig,
    candidates: Vec<Candidate>,
    runs: AtomicU64,
}

impl ClassifierChain {
    pub fn new(rules: RuleCatalog, registry: &ToolRegistry, config: DispatchConfig) -> Self {
        Self {
            rules,
            fallback: None,
            fallback_timeout: Duration::from_secs(2),
            config,
            candidates: registry.list().into_iter().map(Candidate::from).collect(),
            runs: AtomicU64::new(0),
        }
    }

    pub fn with_fallback(
        mut self,
        fallback: Arc<dyn FallbackClassifier>,
        timeout: Duration,
    ) -> Self {
        self.fallback = Some(fallback);
        self.fallback_timeout = timeout;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// How many times `classify` has run.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub async fn classify(&self, question: &Question) -> ChainOutcome {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let normalized = question.normalized();
        let threshold = self.config.confidence_threshold;

        let deterministic = self.rules.classify(&normalized);
        if let Some(result) = &deterministic {
            debug!(
                tool = %result.tool,
                confidence = result.confidence,
                trigger = result.matched_trigger.as_deref().unwrap_or_default(),
                "rule match"
            );
            if result.confidence >= threshold {
                return ChainOutcome::Confident(result.clone());
            }
        }

        let fallback = match &self.fallback {
            Some(fallback) => classify_with_timeout(
                fallback.as_ref(),
                question.text(),
                &self.candidates,
                self.fallback_timeout,
            )
            .await
            .map(ClassificationResult::from_verdict),
            None => None,
        };
        if let Some(result) = &fallback {
            if result.confidence >= threshold {
                info!(tool = %result.tool, confidence = result.confidence, "fallback resolved question");
                return ChainOutcome::Confident(result.clone());
            }
        }

        let best = match (deterministic, fallback) {
            (Some(d), Some(f)) => Some(if f.confidence > d.confidence { f } else { d }),
            (d, f) => d.or(f),
        };
        match best {
            Some(result) if result.confidence >= self.config.ambiguity_floor => {
                ChainOutcome::Tentative(result)
            }
            _ => ChainOutcome::NoMatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;

    const ONE_RULE: &str = r#"
rules:
  - tool: count_records
    confidence: 0.5
    params: { collection: order }
    triggers: ["orders"]
  - tool: sum_field
    confidence: 0.49
    params: { collection: order, field: grand_total }
    triggers: ["revenue"]
  - tool: find_records
    confidence: 0.35
    params: { collection: product }
    triggers: ["products"]
"#;

    struct Counting {
        calls: AtomicU64,
        confidence: f64,
    }

    impl Counting {
        fn new(confidence: f64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                confidence,
            })
        }
    }

    #[async_trait]
    impl FallbackClassifier for Counting {
        async fn classify(&self, _: &str, _: &[Candidate]) -> Result<Option<ClassifierVerdict>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ClassifierVerdict {
                tool: "average_field".into(),
                confidence: self.confidence,
                parameters: BTreeMap::new(),
            }))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn chain(fallback: Arc<Counting>) -> ClassifierChain {
        ClassifierChain::new(
            RuleCatalog::from_yaml(ONE_RULE).unwrap(),
            &ToolRegistry::new(),
            DispatchConfig::default(),
        )
        .with_fallback(fallback, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let fallback = Counting::new(0.9);
        let chain = chain(fallback.clone());

        let outcome = chain.classify(&Question::new("10", "how many orders")).await;
        assert!(matches!(outcome, ChainOutcome::Confident(ref r) if r.tool == "count_records"));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);

        let outcome = chain.classify(&Question::new("10", "total revenue")).await;
        assert!(matches!(outcome, ChainOutcome::Confident(ref r) if r.tool == "average_field"));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.runs(), 2);
    }

    #[tokio::test]
    async fn test_tentative_prefers_higher_confidence() {
        let chain = chain(Counting::new(0.4));
        match chain.classify(&Question::new("10", "total revenue")).await {
            ChainOutcome::Tentative(result) => {
                assert_eq!(result.tool, "sum_field");
                assert_eq!(result.source, StrategySource::Deterministic);
            }
            other => panic!("expected tentative, got {other:?}"),
        }

        match chain.classify(&Question::new("10", "list products")).await {
            ChainOutcome::Tentative(result) => assert_eq!(result.source, StrategySource::Fallback),
            other => panic!("expected tentative, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tie_prefers_rule() {
        let chain = chain(Counting::new(0.35));
        match chain.classify(&Question::new("10", "list products")).await {
            ChainOutcome::Tentative(result) => {
                assert_eq!(result.source, StrategySource::Deterministic)
            }
            other => panic!("expected tentative, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_below_floor_is_no_match() {
        let chain = chain(Counting::new(0.1));
        let outcome = chain.classify(&Question::new("10", "tell me a joke")).await;
        assert_eq!(outcome, ChainOutcome::NoMatch);
    }
}
