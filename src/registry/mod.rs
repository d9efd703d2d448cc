//! Read-only catalog of the tools a question can be routed to.

pub mod params;
pub mod pipeline;
pub mod tools;

use std::collections::HashMap;

use serde::Serialize;

pub use params::{DefaultValue, ParamSpec, ParamType, ParamValue, ToolParams};
pub use pipeline::{
    Accumulator, AggregationRequest, Condition, GroupKey, MatchValue, RangeBound, ResultShape,
    Stage, TimeUnit, TENANT_FIELD,
};
pub use tools::{ToolKind, COLLECTIONS, CUSTOMER_METRICS, PRODUCT_METRICS};

use crate::error::{ParameterError, RegistryError};
use crate::question::TenantId;

/// Static description of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl ToolSpec {
    fn of(kind: ToolKind) -> Self {
        Self {
            kind,
            name: kind.name(),
            description: kind.description(),
            params: kind.params(),
        }
    }

    /// Build the tenant-scoped request. Fails if a required parameter is
    /// missing or ill-typed.
    pub fn build(
        &self,
        tenant: &TenantId,
        params: &ToolParams,
    ) -> Result<AggregationRequest, ParameterError> {
        self.kind.build(tenant, params)
    }
}

/// Tool catalog. Populated at construction and never modified.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolSpec>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        let tools = ToolKind::ALL
            .into_iter()
            .map(|kind| (kind.name(), ToolSpec::of(kind)))
            .collect();
        Self { tools }
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolSpec, RegistryError> {
        self.tools
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn get(&self, kind: ToolKind) -> &ToolSpec {
        // Every kind is inserted in `new`.
        &self.tools[kind.name()]
    }

    /// All tools in declaration order.
    pub fn list(&self) -> Vec<&ToolSpec> {
        ToolKind::ALL
            .iter()
            .filter_map(|kind| self.tools.get(kind.name()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
