//! Shop Insights - natural-language analytics over per-shop data
//!
//! Routes a free-text question to one of a fixed set of aggregation tools,
//! extracts its filters, runs the aggregation scoped to the asking shop and
//! renders a short answer.
//!
//! ## Pipeline
//! Question -> Dispatcher (cache, single-flight) -> Classifier chain
//! (rules, then fallback) -> Tool registry (bind, build) -> Executor
//! (tenant re-check, timeout) -> Renderer -> Answer + audit record
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shop_insights::{InMemoryStore, InsightService};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = InMemoryStore::from_fixture("data/sample_shop.json")?;
//! let service = InsightService::builder(Arc::new(store)).build()?;
//! let answer = service.answer_question("10", "How many orders do I have?").await;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

// Core error handling and configuration
pub mod config;
pub mod error;

// Inbound question and tenant identity
pub mod question;

// Tool catalog and aggregation request model
pub mod registry;

// Classification strategies and the chain that merges them
pub mod classify;

// Routing: cache lookup, single-flight, parameter binding
pub mod cache;
pub mod dispatch;

// Execution against a document store
pub mod executor;

// Answer text
pub mod render;

// Audit trail
pub mod audit;

// End-to-end service
pub mod service;

pub use audit::{AuditConfig, AuditLogger, AuditRecord, AuditReport, AuditStats, Outcome};
pub use cache::{CacheStats, ResultCache};
pub use classify::{
    ChainOutcome, ClassificationResult, ClassifierChain, FallbackClassifier, OllamaClassifier,
    RuleCatalog, SimilarityClassifier, StrategySource,
};
pub use config::{
    CacheConfig, DispatchConfig, ExecutorConfig, FallbackConfig, FallbackKind, InsightsConfig,
};
pub use dispatch::{Dispatch, DispatchDecision, Dispatcher, UnroutableReason};
pub use error::{
    ClassifierError, ConfigError, ExecutionError, InsightsError, ParameterError, RegistryError,
    Result, RulesError, StoreError,
};
pub use executor::{DocumentStore, Executor, InMemoryStore, RawResult};
pub use question::{Question, TenantId};
pub use registry::{AggregationRequest, ToolKind, ToolParams, ToolRegistry};
pub use render::{ResponseRenderer, TemplateRenderer};
pub use service::{Answer, AnswerError, InsightService, InsightServiceBuilder};

// Predicate extraction lives in its own crate
pub use insight_filters;
