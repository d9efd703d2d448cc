//! Answering a question end to end.
//!
//! dispatch → build → execute → render, with one audit record per question.
//! Every failure along the way becomes an [`Answer`]; nothing here returns
//! an error to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::audit::{AuditLogger, AuditRecord, Outcome};
use crate::cache::ResultCache;
use crate::classify::{
    ClassifierChain, FallbackClassifier, OllamaClassifier, RuleCatalog, SimilarityClassifier,
};
use crate::config::{FallbackKind, InsightsConfig};
use crate::dispatch::{Dispatch, DispatchDecision, Dispatcher, UnroutableReason};
use crate::error::{ExecutionError, InsightsError};
use crate::executor::{DocumentStore, Executor, RawResult};
use crate::question::{Question, TenantId};
use crate::registry::{ToolKind, ToolParams, ToolRegistry};
use crate::render::{ResponseRenderer, TemplateRenderer};

const NO_MATCH_TEXT: &str = "I couldn't work out what you're asking. Try something like \
     \"how many orders last week\" or \"top 5 customers by spending\".";

/// Why an answer carries no data.
#[derive(Error, Debug, Clone)]
pub enum AnswerError {
    #[error("question is ambiguous (best guess '{best_guess}' at {confidence:.2})")]
    Ambiguous { best_guess: String, confidence: f64 },

    #[error("question could not be routed: {0}")]
    Unroutable(UnroutableReason),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("rendering failed: {0}")]
    Render(String),

    #[error("cancelled after {0:?}")]
    Cancelled(Duration),
}

impl AnswerError {
    pub fn outcome(&self) -> Outcome {
        match self {
            AnswerError::Ambiguous { .. } => Outcome::Ambiguous,
            AnswerError::Unroutable(_) => Outcome::Unroutable,
            AnswerError::Execution(_) | AnswerError::Render(_) => Outcome::Error,
            AnswerError::Cancelled(_) => Outcome::Cancelled,
        }
    }
}

/// What the asker gets back, whatever happened.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub tool: Option<String>,
    pub confidence: Option<f64>,
    pub latency: Duration,
    pub error: Option<AnswerError>,
    pub cache_hit: bool,
    pub data: Option<RawResult>,
}

impl Answer {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn outcome(&self) -> Outcome {
        self.error
            .as_ref()
            .map_or(Outcome::Success, AnswerError::outcome)
    }
}

pub struct InsightService {
    dispatcher: Dispatcher,
    registry: ToolRegistry,
    executor: Executor,
    renderer: Arc<dyn ResponseRenderer>,
    audit: Arc<AuditLogger>,
}

impl InsightService {
    pub fn builder(store: Arc<dyn DocumentStore>) -> InsightServiceBuilder {
        InsightServiceBuilder::new(store)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub async fn answer_question(&self, tenant: impl Into<TenantId>, text: &str) -> Answer {
        self.answer(&Question::new(tenant, text)).await
    }

    /// Answer with a deadline. When it passes, the work is dropped and a
    /// single `cancelled` record is written.
    pub async fn answer_within(&self, question: &Question, budget: Duration) -> Answer {
        let started = Instant::now();
        match tokio::time::timeout(budget, self.answer(question)).await {
            Ok(answer) => answer,
            Err(_) => {
                warn!(question_id = %question.id(), budget_ms = budget.as_millis() as u64, "question cancelled");
                let error = AnswerError::Cancelled(budget);
                let latency = started.elapsed();
                self.audit.record(
                    AuditRecord::new(question, Outcome::Cancelled, latency).with_error(&error),
                );
                Answer {
                    text: "That question took too long to answer. Please try again.".to_string(),
                    tool: None,
                    confidence: None,
                    latency,
                    error: Some(error),
                    cache_hit: false,
                    data: None,
                }
            }
        }
    }

    #[instrument(skip(self, question), fields(tenant = %question.tenant(), question_id = %question.id()))]
    pub async fn answer(&self, question: &Question) -> Answer {
        let started = Instant::now();
        let dispatch = self.dispatcher.dispatch(question).await;
        let cache_hit = dispatch.cache_hit;
        let tool = dispatch.decision.tool_name().map(str::to_string);
        let confidence = dispatch.decision.confidence();
        let source = dispatch.decision.source();

        let (text, data, error) = self.respond(question, dispatch).await;

        let latency = started.elapsed();
        let outcome = error.as_ref().map_or(Outcome::Success, AnswerError::outcome);

        let mut record = AuditRecord::new(question, outcome, latency)
            .with_source(source)
            .with_cache_hit(cache_hit);
        if let Some(tool) = &tool {
            record = record.with_tool(tool.clone(), confidence);
        }
        if let Some(error) = &error {
            record = record.with_error(error);
        }
        self.audit.record(record);

        info!(
            outcome = %outcome,
            tool = tool.as_deref().unwrap_or("-"),
            cache_hit,
            latency_ms = latency.as_millis() as u64,
            "question answered"
        );

        Answer {
            text,
            tool,
            confidence,
            latency,
            error,
            cache_hit,
            data,
        }
    }

    async fn respond(
        &self,
        question: &Question,
        dispatch: Dispatch,
    ) -> (String, Option<RawResult>, Option<AnswerError>) {
        match dispatch.decision {
            DispatchDecision::Resolved { tool, params, .. } => {
                let result = match dispatch.cached_result {
                    Some(result) => result,
                    None => match self.execute(question.tenant(), tool, &params).await {
                        Ok(result) => {
                            self.dispatcher.cache().attach_result(&dispatch.key, result.clone());
                            result
                        }
                        Err(AnswerError::Unroutable(UnroutableReason::InvalidParameters(e))) => {
                            warn!(tool = %tool, error = %e, "parameters rejected by pipeline builder");
                            let text = e.clarification();
                            let reason = UnroutableReason::InvalidParameters(e);
                            return (text, None, Some(AnswerError::Unroutable(reason)));
                        }
                        Err(e) => {
                            let text = match &e {
                                AnswerError::Execution(inner) => inner.user_message().to_string(),
                                _ => NO_MATCH_TEXT.to_string(),
                            };
                            return (text, None, Some(e));
                        }
                    },
                };

                match self
                    .renderer
                    .render(question.text(), tool, &params, &result)
                    .await
                {
                    Ok(text) => (text, Some(result), None),
                    Err(e) => {
                        error!(tool = %tool, error = %e, "rendering failed");
                        let text = "I found an answer but couldn't put it into words. Please try again."
                            .to_string();
                        (text, Some(result), Some(AnswerError::Render(e.to_string())))
                    }
                }
            }
            DispatchDecision::Ambiguous {
                best_guess,
                confidence,
            } => {
                let text = clarify_guess(&best_guess);
                (
                    text,
                    None,
                    Some(AnswerError::Ambiguous {
                        best_guess,
                        confidence,
                    }),
                )
            }
            DispatchDecision::Unroutable { reason } => {
                let text = match &reason {
                    UnroutableReason::InvalidParameters(e) => e.clarification(),
                    UnroutableReason::NoConfidentMatch | UnroutableReason::UnknownTool(_) => {
                        NO_MATCH_TEXT.to_string()
                    }
                };
                (text, None, Some(AnswerError::Unroutable(reason)))
            }
        }
    }

    async fn execute(
        &self,
        tenant: &TenantId,
        tool: ToolKind,
        params: &ToolParams,
    ) -> Result<RawResult, AnswerError> {
        let request = self
            .registry
            .get(tool)
            .build(tenant, params)
            .map_err(|e| AnswerError::Unroutable(UnroutableReason::InvalidParameters(e)))?;
        Ok(self.executor.execute(request).await?)
    }
}

fn clarify_guess(best_guess: &str) -> String {
    match ToolKind::from_name(best_guess) {
        Some(kind) => format!(
            "I'm not sure I understood. Did you want me to {}? Try rephrasing with a bit more detail.",
            lowercase_first(kind.description().trim_end_matches('.'))
        ),
        None => NO_MATCH_TEXT.to_string(),
    }
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Builds an [`InsightService`]. Anything not set explicitly comes from the
/// config.
pub struct InsightServiceBuilder {
    store: Arc<dyn DocumentStore>,
    config: InsightsConfig,
    rules: Option<RuleCatalog>,
    fallback: Option<Option<Arc<dyn FallbackClassifier>>>,
    renderer: Option<Arc<dyn ResponseRenderer>>,
    cache: Option<Arc<ResultCache>>,
    audit: Option<Arc<AuditLogger>>,
}

impl InsightServiceBuilder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            config: InsightsConfig::default(),
            rules: None,
            fallback: None,
            renderer: None,
            cache: None,
            audit: None,
        }
    }

    pub fn config(mut self, config: InsightsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rules(mut self, rules: RuleCatalog) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn FallbackClassifier>) -> Self {
        self.fallback = Some(Some(fallback));
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback = Some(None);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn ResponseRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Share a cache between services, e.g. two thresholds over one store.
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the service. Without an explicit audit logger one is started
    /// from the config, which needs a tokio runtime.
    pub fn build(self) -> Result<InsightService, InsightsError> {
        let config = self.config;
        config.validate()?;

        let registry = ToolRegistry::new();
        let rules = match self.rules {
            Some(rules) => rules,
            None => RuleCatalog::builtin()?,
        };
        let fallback = match self.fallback {
            Some(fallback) => fallback,
            None => fallback_from_config(&config)?,
        };

        let mut chain = ClassifierChain::new(rules, &registry, config.dispatch);
        if let Some(fallback) = fallback {
            info!(fallback = fallback.name(), "fallback classifier enabled");
            chain = chain.with_fallback(fallback, config.fallback.timeout());
        }

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ResultCache::new(config.cache)));
        let renderer: Arc<dyn ResponseRenderer> = match self.renderer {
            Some(renderer) => renderer,
            None => Arc::new(
                TemplateRenderer::new().map_err(|e| InsightsError::Render(e.to_string()))?,
            ),
        };
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(AuditLogger::start(&config.audit)));

        info!(
            store = self.store.name(),
            threshold = config.dispatch.confidence_threshold,
            floor = config.dispatch.ambiguity_floor,
            cache = cache.is_enabled(),
            audit = audit.is_enabled(),
            "insight service ready"
        );

        Ok(InsightService {
            dispatcher: Dispatcher::new(Arc::new(chain), cache),
            registry,
            executor: Executor::new(self.store, &config.executor),
            renderer,
            audit,
        })
    }
}

fn fallback_from_config(
    config: &InsightsConfig,
) -> Result<Option<Arc<dyn FallbackClassifier>>, InsightsError> {
    let fallback: Arc<dyn FallbackClassifier> = match config.fallback.kind {
        FallbackKind::None => return Ok(None),
        FallbackKind::Similarity => Arc::new(SimilarityClassifier::builtin()?),
        FallbackKind::Ollama => Arc::new(OllamaClassifier::from_config(&config.fallback)),
    };
    Ok(Some(fallback))
}
