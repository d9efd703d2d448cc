//! Turns a question into a dispatch decision.
//!
//! The cache is consulted first. On a miss, concurrent identical questions
//! share one run of the classifier chain; only resolved decisions are
//! cached.

pub mod aliases;
pub mod decision;

use std::sync::Arc;

use insight_filters::FilterExtractor;
use tracing::{debug, info, instrument};

pub use decision::{DispatchDecision, UnroutableReason};

use crate::cache::{cache_key, ResultCache, SingleFlight};
use crate::classify::{infer_params, ChainOutcome, ClassificationResult, ClassifierChain};
use crate::executor::RawResult;
use crate::question::Question;

/// A decision plus where it came from.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub decision: DispatchDecision,
    /// Executed result stored with a cached decision, if any.
    pub cached_result: Option<RawResult>,
    /// True when the classifier chain did not run for this question.
    pub cache_hit: bool,
    pub key: String,
}

#[derive(Debug, Clone)]
struct Flight {
    decision: DispatchDecision,
    result: Option<RawResult>,
    from_cache: bool,
}

pub struct Dispatcher {
    chain: Arc<ClassifierChain>,
    cache: Arc<ResultCache>,
    flights: SingleFlight<Flight>,
    extractor: FilterExtractor,
}

impl Dispatcher {
    pub fn new(chain: Arc<ClassifierChain>, cache: Arc<ResultCache>) -> Self {
        Self {
            chain,
            cache,
            flights: SingleFlight::new(),
            extractor: FilterExtractor::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: FilterExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn chain(&self) -> &ClassifierChain {
        &self.chain
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    #[instrument(skip(self, question), fields(tenant = %question.tenant(), question_id = %question.id()))]
    pub async fn dispatch(&self, question: &Question) -> Dispatch {
        let key = cache_key(question.tenant(), &question.normalized());

        if let Some(entry) = self.cache.get(&key) {
            debug!("decision served from cache");
            return Dispatch {
                decision: entry.decision,
                cached_result: entry.result,
                cache_hit: true,
                key,
            };
        }

        let (flight, leader) = self
            .flights
            .run(&key, || self.decide(question, &key))
            .await;

        Dispatch {
            decision: flight.decision,
            cached_result: flight.result,
            cache_hit: flight.from_cache || !leader,
            key,
        }
    }

    async fn decide(&self, question: &Question, key: &str) -> Flight {
        if let Some(entry) = self.cache.get(key) {
            return Flight {
                decision: entry.decision,
                result: entry.result,
                from_cache: true,
            };
        }

        let decision = match self.chain.classify(question).await {
            ChainOutcome::Confident(result) => self.resolve(question, result),
            ChainOutcome::Tentative(result) => DispatchDecision::Ambiguous {
                best_guess: aliases::canonical_name(&result.tool),
                confidence: result.confidence,
            },
            ChainOutcome::NoMatch => DispatchDecision::Unroutable {
                reason: UnroutableReason::NoConfidentMatch,
            },
        };

        match &decision {
            DispatchDecision::Resolved {
                tool,
                confidence,
                source,
                ..
            } => {
                info!(tool = %tool, confidence, source = %source, "question resolved");
                self.cache
                    .put(key, question.tenant(), decision.clone(), None, self.cache.ttl());
            }
            DispatchDecision::Ambiguous {
                best_guess,
                confidence,
            } => info!(best_guess = %best_guess, confidence, "question ambiguous"),
            DispatchDecision::Unroutable { reason } => info!(reason = %reason, "question unroutable"),
        }

        Flight {
            decision,
            result: None,
            from_cache: false,
        }
    }

    /// Alias normalization, parameter inference, filter extraction and
    /// binding for a confident classification.
    fn resolve(&self, question: &Question, result: ClassificationResult) -> DispatchDecision {
        let Some((kind, implied)) = aliases::resolve(&result.tool) else {
            return DispatchDecision::Unroutable {
                reason: UnroutableReason::UnknownTool(result.tool),
            };
        };

        let mut params = result.params;
        params.fill_missing(&implied);
        infer_params(kind, &question.normalized(), &mut params);

        let mut filters = self
            .extractor
            .extract(question.text(), question.received_at());
        if let Some(limit) = filters.take_limit() {
            if kind.accepts("limit") {
                params.set("limit", limit);
            }
        }
        params.filters_mut().extend(filters.iter().cloned());

        match kind.bind(params, question.received_at()) {
            Ok(params) => DispatchDecision::Resolved {
                tool: kind,
                params,
                confidence: result.confidence,
                source: result.source,
            },
            Err(e) => {
                debug!(tool = %kind, error = %e, "parameter binding failed");
                DispatchDecision::Unroutable {
                    reason: UnroutableReason::InvalidParameters(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use insight_filters::NumericRange;

    use super::*;
    use crate::classify::RuleCatalog;
    use crate::config::{CacheConfig, DispatchConfig};
    use crate::error::ParameterError;
    use crate::registry::{ToolKind, ToolRegistry};

    fn dispatcher() -> Dispatcher {
        let chain = ClassifierChain::new(
            RuleCatalog::builtin().unwrap(),
            &ToolRegistry::new(),
            DispatchConfig::default(),
        );
        Dispatcher::new(
            Arc::new(chain),
            Arc::new(ResultCache::new(CacheConfig::default())),
        )
    }

    fn question(text: &str) -> Question {
        Question::at("10", text, Utc.with_ymd_and_hms(2024, 5, 15, 14, 30, 0).unwrap())
    }

    #[tokio::test]
    async fn test_filters_merge_into_params() {
        let dispatch = dispatcher()
            .dispatch(&question("How many orders over $100 and under $900 are pending?"))
            .await;
        let DispatchDecision::Resolved { tool, params, .. } = dispatch.decision.clone() else {
            panic!("expected resolved, got {:?}", dispatch.decision);
        };
        assert_eq!(tool, ToolKind::CountRecords);
        let mut expected = NumericRange::gt(100.0);
        expected.merge(NumericRange::lt(900.0));
        assert_eq!(params.filters().numeric("grand_total"), Some(&expected));
        assert_eq!(params.filters().equals("status"), Some("Pending"));
    }

    #[tokio::test]
    async fn test_extracted_limit_becomes_param() {
        let dispatch = dispatcher().dispatch(&question("top 3 customers")).await;
        let DispatchDecision::Resolved { tool, params, .. } = dispatch.decision.clone() else {
            panic!("expected resolved, got {:?}", dispatch.decision);
        };
        assert_eq!(tool, ToolKind::TopEntitiesByAggregate);
        assert_eq!(params.int("limit"), Some(3));
        assert!(params.filters().limit().is_none());
    }

    #[tokio::test]
    async fn test_second_dispatch_hits_cache() {
        let dispatcher = dispatcher();
        let first = dispatcher.dispatch(&question("What is my total revenue?")).await;
        assert!(!first.cache_hit);
        let second = dispatcher.dispatch(&question("  what is my TOTAL revenue ")).await;
        assert!(second.cache_hit);
        assert_eq!(first.decision, second.decision);
        assert_eq!(dispatcher.chain().runs(), 1);
    }

    #[tokio::test]
    async fn test_missing_time_range_is_not_cached() {
        let dispatcher = dispatcher();
        let dispatch = dispatcher.dispatch(&question("orders from the sale")).await;
        match dispatch.decision {
            DispatchDecision::Unroutable {
                reason: UnroutableReason::InvalidParameters(ParameterError::MissingTimeRange { .. }),
            } => {}
            other => panic!("expected missing time range, got {other:?}"),
        }
        assert_eq!(dispatcher.cache().stats().entries, 0);
    }
}
