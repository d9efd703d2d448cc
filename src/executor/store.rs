//! Document store capability.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::question::TenantId;
use crate::registry::Stage;

pub type Document = Map<String, Value>;

/// A tenant-scoped document store that can run aggregation pipelines.
///
/// Implementations receive the tenant alongside the stages so joins into
/// other collections can stay within the same tenant.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn run_aggregation(
        &self,
        tenant: &TenantId,
        collection: &str,
        stages: &[Stage],
    ) -> Result<Vec<Document>, StoreError>;

    fn name(&self) -> &str;
}
