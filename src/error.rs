//! Error types for the insights pipeline.
//!
//! Startup errors (`ConfigError`, `RulesError`) abort construction. Everything
//! raised while answering a single question stays local to that question and
//! ends up in its `Answer` and audit record.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Top-level error for building the service.
#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Classifier rules error: {0}")]
    Rules(#[from] RulesError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Renderer error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Problems in the classifier rule or example catalogs.
#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Failed to parse catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Rule {index} names unknown tool '{tool}'")]
    UnknownTool { index: usize, tool: String },

    #[error("Rule {index} ({tool}) has an empty trigger")]
    EmptyTrigger { index: usize, tool: String },

    #[error("Rule {index} ({tool}) has confidence {confidence} outside [0, 1]")]
    InvalidConfidence {
        index: usize,
        tool: String,
        confidence: f64,
    },

    #[error("Invalid trigger fragment '{fragment}': {source}")]
    Pattern {
        fragment: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Tool not found: {0}")]
    NotFound(String),
}

/// A tool's parameters failed binding. Surfaces to the user as a
/// clarification request rather than a failure.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterError {
    #[error("{tool}: missing required parameter '{param}'")]
    Missing { tool: String, param: String },

    #[error("{tool}: parameter '{param}' expected {expected}, got {found}")]
    InvalidType {
        tool: String,
        param: String,
        expected: String,
        found: String,
    },

    #[error("{tool}: parameter '{param}' is invalid: {reason}")]
    InvalidValue {
        tool: String,
        param: String,
        reason: String,
    },

    #[error("{tool}: needs a time range on '{field}'")]
    MissingTimeRange { tool: String, field: String },
}

impl ParameterError {
    /// The parameter the user needs to supply or fix.
    pub fn param(&self) -> &str {
        match self {
            ParameterError::Missing { param, .. }
            | ParameterError::InvalidType { param, .. }
            | ParameterError::InvalidValue { param, .. } => param,
            ParameterError::MissingTimeRange { field, .. } => field,
        }
    }

    pub fn clarification(&self) -> String {
        match self {
            ParameterError::Missing { param, .. } => {
                format!("Could you tell me which {} you mean?", param.replace('_', " "))
            }
            ParameterError::InvalidType { param, expected, .. } => format!(
                "The {} should be {}. Could you rephrase?",
                param.replace('_', " "),
                expected
            ),
            ParameterError::InvalidValue { param, reason, .. } => {
                format!("I can't use that {}: {}.", param.replace('_', " "), reason)
            }
            ParameterError::MissingTimeRange { .. } => {
                "Which time period should I look at? For example \"last 7 days\" or \"this month\"."
                    .to_string()
            }
        }
    }
}

/// Failure reported by a document store backend.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Failed to load fixture: {0}")]
    Fixture(String),
}

/// Failure executing an aggregation request.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store failure: {detail}")]
    StoreFailure { detail: String },
}

impl ExecutionError {
    /// Text safe to show the asker. Never includes store detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExecutionError::Timeout(_) => {
                "That question took too long to answer. Try narrowing the time range."
            }
            ExecutionError::StoreFailure { .. } => {
                "Something went wrong while fetching your data. Please try again."
            }
        }
    }
}

impl From<StoreError> for ExecutionError {
    fn from(error: StoreError) -> Self {
        ExecutionError::StoreFailure {
            detail: error.to_string(),
        }
    }
}

/// Failure from a fallback classification backend.
///
/// The chain never propagates these; they are logged and treated as
/// "no answer".
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("Classifier backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("Unparseable classifier output: {0}")]
    Unparseable(String),
}

pub type Result<T> = std::result::Result<T, InsightsError>;
