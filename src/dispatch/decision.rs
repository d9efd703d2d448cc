//! Outcome of routing one question.

use std::fmt;

use serde::Serialize;

use crate::classify::StrategySource;
use crate::error::ParameterError;
use crate::registry::{ToolKind, ToolParams};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DispatchDecision {
    /// A tool with bound parameters, ready to build and execute.
    Resolved {
        tool: ToolKind,
        params: ToolParams,
        confidence: f64,
        source: StrategySource,
    },
    /// Something matched, but not confidently enough to run.
    Ambiguous { best_guess: String, confidence: f64 },
    Unroutable { reason: UnroutableReason },
}

impl DispatchDecision {
    pub fn is_resolved(&self) -> bool {
        matches!(self, DispatchDecision::Resolved { .. })
    }

    /// Tool name for logs and audit records.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            DispatchDecision::Resolved { tool, .. } => Some(tool.name()),
            DispatchDecision::Ambiguous { best_guess, .. } => Some(best_guess),
            DispatchDecision::Unroutable { .. } => None,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            DispatchDecision::Resolved { confidence, .. }
            | DispatchDecision::Ambiguous { confidence, .. } => Some(*confidence),
            DispatchDecision::Unroutable { .. } => None,
        }
    }

    pub fn source(&self) -> Option<StrategySource> {
        match self {
            DispatchDecision::Resolved { source, .. } => Some(*source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnroutableReason {
    NoConfidentMatch,
    UnknownTool(String),
    InvalidParameters(ParameterError),
}

impl fmt::Display for UnroutableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnroutableReason::NoConfidentMatch => write!(f, "no classifier was confident enough"),
            UnroutableReason::UnknownTool(tool) => write!(f, "unknown tool '{tool}'"),
            UnroutableReason::InvalidParameters(e) => write!(f, "{e}"),
        }
    }
}
