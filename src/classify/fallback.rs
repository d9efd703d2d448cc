//! Fallback classification capability.
//!
//! A fallback runs only when the rule stage produced nothing confident. It
//! may be slow or unavailable, so every call is bounded by a timeout and any
//! failure degrades to "no answer".

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClassifierError;
use crate::registry::{ParamValue, ToolSpec};

/// A tool the fallback may choose, as presented to it.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub name: &'static str,
    pub description: &'static str,
}

impl From<&ToolSpec> for Candidate {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            name: spec.name,
            description: spec.description,
        }
    }
}

/// What a fallback decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub tool: String,
    pub confidence: f64,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

#[async_trait]
pub trait FallbackClassifier: Send + Sync {
    /// Pick a tool for `question` among `candidates`, or `None` when nothing
    /// fits.
    async fn classify(
        &self,
        question: &str,
        candidates: &[Candidate],
    ) -> Result<Option<ClassifierVerdict>>;

    /// Name for logs.
    fn name(&self) -> &str;
}

/// Run `fallback` with a deadline. Timeouts, backend errors and invalid
/// confidences all come back as `None`.
pub async fn classify_with_timeout(
    fallback: &dyn FallbackClassifier,
    question: &str,
    candidates: &[Candidate],
    timeout: Duration,
) -> Option<ClassifierVerdict> {
    let outcome = match tokio::time::timeout(timeout, fallback.classify(question, candidates)).await
    {
        Ok(Ok(verdict)) => Ok(verdict),
        Ok(Err(e)) => Err(ClassifierError::Backend(e)),
        Err(_) => Err(ClassifierError::Timeout(timeout)),
    };

    match outcome {
        Ok(Some(verdict)) if verdict.confidence.is_finite() => {
            debug!(
                fallback = fallback.name(),
                tool = %verdict.tool,
                confidence = verdict.confidence,
                "fallback verdict"
            );
            Some(ClassifierVerdict {
                confidence: verdict.confidence.clamp(0.0, 1.0),
                ..verdict
            })
        }
        Ok(Some(verdict)) => {
            let err = ClassifierError::Unparseable(format!(
                "confidence {} for {}",
                verdict.confidence, verdict.tool
            ));
            warn!(fallback = fallback.name(), error = %err, "discarding fallback verdict");
            None
        }
        Ok(None) => None,
        Err(e) => {
            warn!(fallback = fallback.name(), error = %e, "fallback classifier gave no answer");
            None
        }
    }
}
