//! Shared fixtures for the integration tests.
//!
//! Builders for services and dispatchers over the sample shop, plus mock
//! fallbacks and stores with controllable latency and failures.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use shop_insights::classify::{Candidate, ClassifierVerdict};
use shop_insights::executor::Document;
use shop_insights::registry::Stage;
use shop_insights::{
    AuditLogger, CacheConfig, ClassifierChain, DispatchConfig, Dispatcher, DocumentStore,
    FallbackClassifier, InMemoryStore, InsightService, InsightsConfig, ResultCache, RuleCatalog,
    StoreError, TenantId, ToolRegistry,
};

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/sample_shop.json")
}

pub fn sample_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::from_fixture(fixture_path()).expect("sample fixture loads"))
}

pub fn shared_cache() -> Arc<ResultCache> {
    Arc::new(ResultCache::new(CacheConfig::default()))
}

/// Rules-only chain with the given cut-offs.
pub fn chain(config: DispatchConfig) -> ClassifierChain {
    ClassifierChain::new(
        RuleCatalog::builtin().expect("builtin rules parse"),
        &ToolRegistry::new(),
        config,
    )
}

pub fn dispatcher(config: DispatchConfig, cache: Arc<ResultCache>) -> Dispatcher {
    Dispatcher::new(Arc::new(chain(config)), cache)
}

pub fn dispatcher_with_fallback(
    config: DispatchConfig,
    cache: Arc<ResultCache>,
    fallback: Arc<dyn FallbackClassifier>,
) -> Dispatcher {
    let chain = chain(config).with_fallback(fallback, Duration::from_secs(5));
    Dispatcher::new(Arc::new(chain), cache)
}

/// Service over `store` with no fallback and no audit file.
pub fn service(store: Arc<dyn DocumentStore>) -> InsightService {
    InsightService::builder(store)
        .without_fallback()
        .audit(Arc::new(AuditLogger::disabled()))
        .build()
        .expect("service builds")
}

pub fn service_with(
    store: Arc<dyn DocumentStore>,
    config: InsightsConfig,
    audit: Arc<AuditLogger>,
) -> InsightService {
    InsightService::builder(store)
        .config(config)
        .without_fallback()
        .audit(audit)
        .build()
        .expect("service builds")
}

// =============================================================================
// Scenarios
// =============================================================================

/// What a question is expected to route to.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub question: &'static str,
    pub tool: Option<&'static str>,
    pub params: Vec<(&'static str, serde_json::Value)>,
}

impl Scenario {
    pub fn resolves(name: &'static str, question: &'static str, tool: &'static str) -> Self {
        Self {
            name,
            question,
            tool: Some(tool),
            params: Vec::new(),
        }
    }

    pub fn unroutable(name: &'static str, question: &'static str) -> Self {
        Self {
            name,
            question,
            tool: None,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &'static str, value: impl Into<serde_json::Value>) -> Self {
        self.params.push((name, value.into()));
        self
    }
}

// =============================================================================
// Mock fallbacks
// =============================================================================

/// Always answers with the same verdict after an optional delay.
pub struct FixedFallback {
    tool: String,
    confidence: f64,
    delay: Duration,
    calls: AtomicUsize,
}

impl FixedFallback {
    pub fn new(tool: &str, confidence: f64) -> Self {
        Self {
            tool: tool.to_string(),
            confidence,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FallbackClassifier for FixedFallback {
    async fn classify(
        &self,
        _question: &str,
        _candidates: &[Candidate],
    ) -> Result<Option<ClassifierVerdict>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Some(ClassifierVerdict {
            tool: self.tool.clone(),
            confidence: self.confidence,
            parameters: Default::default(),
        }))
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

// =============================================================================
// Mock stores
// =============================================================================

/// Delegates to the sample store after sleeping.
pub struct SlowStore {
    inner: Arc<InMemoryStore>,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: sample_store(),
            delay,
        }
    }
}

#[async_trait]
impl DocumentStore for SlowStore {
    async fn run_aggregation(
        &self,
        tenant: &TenantId,
        collection: &str,
        stages: &[Stage],
    ) -> Result<Vec<Document>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.run_aggregation(tenant, collection, stages).await
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Fails every call with a detailed backend error.
pub struct FailingStore;

pub const FAILING_DETAIL: &str = "connection refused by 10.0.0.3:27017";

#[async_trait]
impl DocumentStore for FailingStore {
    async fn run_aggregation(
        &self,
        _tenant: &TenantId,
        _collection: &str,
        _stages: &[Stage],
    ) -> Result<Vec<Document>, StoreError> {
        Err(StoreError::Backend(FAILING_DETAIL.to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Records every call and delegates to the sample store.
pub struct RecordingStore {
    inner: Arc<InMemoryStore>,
    calls: Mutex<Vec<(TenantId, String, Vec<Stage>)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: sample_store(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(TenantId, String, Vec<Stage>)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn run_aggregation(
        &self,
        tenant: &TenantId,
        collection: &str,
        stages: &[Stage],
    ) -> Result<Vec<Document>, StoreError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((tenant.clone(), collection.to_string(), stages.to_vec()));
        self.inner.run_aggregation(tenant, collection, stages).await
    }

    fn name(&self) -> &str {
        "recording"
    }
}
