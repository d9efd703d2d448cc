//! Runs tenant-scoped aggregation requests against a document store.

pub mod memory;
pub mod store;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

pub use memory::InMemoryStore;
pub use store::{Document, DocumentStore};

use crate::config::ExecutorConfig;
use crate::error::ExecutionError;
use crate::registry::{AggregationRequest, ResultShape};

/// Documents returned for one request plus how to read them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawResult {
    pub shape: ResultShape,
    pub documents: Vec<Document>,
}

impl RawResult {
    pub fn new(shape: ResultShape, documents: Vec<Document>) -> Self {
        Self { shape, documents }
    }

    pub fn empty(shape: ResultShape) -> Self {
        Self::new(shape, Vec::new())
    }

    /// A scalar result holding `value` under `name`.
    pub fn single(name: &str, value: Value) -> Self {
        let mut doc = Document::new();
        doc.insert(name.to_string(), value);
        Self::new(ResultShape::Scalar, vec![doc])
    }

    /// First non-`_id` value of the first document.
    pub fn scalar(&self) -> Option<&Value> {
        self.documents
            .first()?
            .iter()
            .find(|(key, _)| key.as_str() != "_id")
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub struct Executor {
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
}

impl Executor {
    pub fn new(store: Arc<dyn DocumentStore>, config: &ExecutorConfig) -> Self {
        Self {
            store,
            timeout: config.timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `request` once, bounded by the configured timeout.
    ///
    /// The tenant match is re-established in first position before the store
    /// sees the stages.
    #[instrument(skip(self, request), fields(tenant = %request.tenant(), collection = request.collection()))]
    pub async fn execute(&self, mut request: AggregationRequest) -> Result<RawResult, ExecutionError> {
        if request.ensure_tenant_scope() {
            warn!("request was missing its tenant scope; restored");
        }

        let started = Instant::now();
        let run = self
            .store
            .run_aggregation(request.tenant(), request.collection(), request.stages());

        let documents = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(documents)) => documents,
            Ok(Err(e)) => {
                error!(store = self.store.name(), error = %e, "aggregation failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(store = self.store.name(), timeout_ms = self.timeout.as_millis() as u64, "aggregation timed out");
                return Err(ExecutionError::Timeout(self.timeout));
            }
        };

        info!(
            rows = documents.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregation complete"
        );
        Ok(RawResult::new(request.shape(), documents))
    }
}
