//! The inbound question and the tenant it belongs to.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier of the shop whose data a question may touch.
///
/// Stores keep `shop_id` as an integer, so an identifier that is an integer
/// literal compares against the JSON integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The value documents carry in their tenant field.
    pub fn to_json(&self) -> Value {
        match self.0.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::from(self.0.clone()),
        }
    }

    /// True when a document's tenant field holds this tenant.
    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::Number(n) => n.as_i64().map(|n| n.to_string()).as_deref() == Some(self.as_str()),
            Value::String(s) => s == &self.0,
            _ => false,
        }
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        TenantId::new(id)
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        TenantId::new(id)
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        TenantId(id.to_string())
    }
}

/// A question as received. Never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    id: Uuid,
    tenant: TenantId,
    text: String,
    received_at: DateTime<Utc>,
}

impl Question {
    pub fn new(tenant: impl Into<TenantId>, text: impl Into<String>) -> Self {
        Self::at(tenant, text, Utc::now())
    }

    /// Build a question received at a fixed instant. Relative time
    /// expressions resolve against `received_at`.
    pub fn at(
        tenant: impl Into<TenantId>,
        text: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant: tenant.into(),
            text: text.into(),
            received_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn normalized(&self) -> String {
        normalize(&self.text)
    }
}

/// Lowercase, trim, collapse internal whitespace and strip trailing
/// punctuation. Two questions that normalize equal share a cache entry.
pub fn normalize(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  How many   ORDERS do I have?? "), "how many orders do i have");
        assert_eq!(normalize("revenue\tlast month."), "revenue last month");
        assert_eq!(normalize("?!"), "");
    }

    #[test]
    fn test_numeric_tenant_matches_integer_field() {
        let tenant = TenantId::from("10");
        assert_eq!(tenant.to_json(), serde_json::json!(10));
        assert!(tenant.matches(&serde_json::json!(10)));
        assert!(tenant.matches(&serde_json::json!("10")));
        assert!(!tenant.matches(&serde_json::json!(11)));
    }

    #[test]
    fn test_text_tenant() {
        let tenant = TenantId::new(" shop-a ");
        assert_eq!(tenant.as_str(), "shop-a");
        assert_eq!(tenant.to_json(), serde_json::json!("shop-a"));
    }
}
