//! Tenant-scoped aggregation requests and their stage vocabulary.
//!
//! An [`AggregationRequest`] can only be built through
//! [`AggregationRequest::new`], which puts the tenant match first. Stages
//! render to MongoDB pipeline documents with [`Stage::to_document`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::question::TenantId;

/// Field every document carries to identify its shop.
pub const TENANT_FIELD: &str = "shop_id";

/// Scalar operand in a match condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MatchValue {
    Int(i64),
    Number(f64),
    Text(String),
    Time(DateTime<Utc>),
}

impl MatchValue {
    pub fn to_document(&self) -> Value {
        match self {
            MatchValue::Int(n) => json!(n),
            MatchValue::Number(x) => json!(x),
            MatchValue::Text(s) => json!(s),
            MatchValue::Time(t) => json!({ "$date": t.to_rfc3339() }),
        }
    }

    pub fn from_tenant(tenant: &TenantId) -> Self {
        match tenant.as_str().parse::<i64>() {
            Ok(n) => MatchValue::Int(n),
            Err(_) => MatchValue::Text(tenant.as_str().to_string()),
        }
    }
}

/// One side of a range condition: value and whether it is inclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeBound {
    pub value: MatchValue,
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Eq(MatchValue),
    Range {
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
}

impl Condition {
    fn to_document(&self) -> Value {
        match self {
            Condition::Eq(value) => value.to_document(),
            Condition::Range { lower, upper } => {
                let mut doc = Map::new();
                if let Some(b) = lower {
                    let op = if b.inclusive { "$gte" } else { "$gt" };
                    doc.insert(op.to_string(), b.value.to_document());
                }
                if let Some(b) = upper {
                    let op = if b.inclusive { "$lte" } else { "$lt" };
                    doc.insert(op.to_string(), b.value.to_document());
                }
                Value::Object(doc)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "day" | "daily" => Some(TimeUnit::Day),
            "week" | "weekly" => Some(TimeUnit::Week),
            "month" | "monthly" => Some(TimeUnit::Month),
            "year" | "yearly" => Some(TimeUnit::Year),
            _ => None,
        }
    }

    /// strftime pattern producing the bucket label. Shared by the Mongo
    /// `$dateToString` form and the in-memory store.
    pub fn format(self) -> &'static str {
        match self {
            TimeUnit::Day => "%Y-%m-%d",
            TimeUnit::Week => "%G-W%V",
            TimeUnit::Month => "%Y-%m",
            TimeUnit::Year => "%Y",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    None,
    Field(String),
    TimeBucket { field: String, unit: TimeUnit },
}

impl GroupKey {
    fn to_document(&self) -> Value {
        match self {
            GroupKey::None => Value::Null,
            GroupKey::Field(field) => json!(format!("${field}")),
            GroupKey::TimeBucket { field, unit } => json!({
                "$dateToString": { "format": unit.format(), "date": format!("${field}") }
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulator {
    Sum(String),
    /// Sum of `a * b` per document.
    SumProduct(String, String),
    Avg(String),
    Count,
    First(String),
}

impl Accumulator {
    fn to_document(&self) -> Value {
        match self {
            Accumulator::Sum(field) => json!({ "$sum": format!("${field}") }),
            Accumulator::SumProduct(a, b) => {
                json!({ "$sum": { "$multiply": [format!("${a}"), format!("${b}")] } })
            }
            Accumulator::Avg(field) => json!({ "$avg": format!("${field}") }),
            Accumulator::Count => json!({ "$sum": 1 }),
            Accumulator::First(field) => json!({ "$first": format!("${field}") }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Match {
        conditions: BTreeMap<String, Condition>,
    },
    Group {
        key: GroupKey,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort {
        field: String,
        descending: bool,
    },
    Limit {
        count: u32,
    },
    /// Foreign-key join. Matches are attached as an array under `as_field`
    /// and are restricted to the requesting tenant.
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    Count {
        output: String,
    },
}

impl Stage {
    pub fn tenant_match(tenant: &TenantId) -> Self {
        let mut conditions = BTreeMap::new();
        conditions.insert(
            TENANT_FIELD.to_string(),
            Condition::Eq(MatchValue::from_tenant(tenant)),
        );
        Stage::Match { conditions }
    }

    /// True when this stage is exactly the tenant scope for `tenant`.
    pub fn is_tenant_match(&self, tenant: &TenantId) -> bool {
        match self {
            Stage::Match { conditions } => {
                conditions.len() == 1
                    && conditions.get(TENANT_FIELD)
                        == Some(&Condition::Eq(MatchValue::from_tenant(tenant)))
            }
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match { .. } => "$match",
            Stage::Group { .. } => "$group",
            Stage::Sort { .. } => "$sort",
            Stage::Limit { .. } => "$limit",
            Stage::Lookup { .. } => "$lookup",
            Stage::Count { .. } => "$count",
        }
    }

    pub fn to_document(&self) -> Value {
        let body = match self {
            Stage::Match { conditions } => Value::Object(
                conditions
                    .iter()
                    .map(|(field, cond)| (field.clone(), cond.to_document()))
                    .collect(),
            ),
            Stage::Group { key, accumulators } => {
                let mut doc = Map::new();
                doc.insert("_id".to_string(), key.to_document());
                for (name, acc) in accumulators {
                    doc.insert(name.clone(), acc.to_document());
                }
                Value::Object(doc)
            }
            Stage::Sort { field, descending } => {
                json!({ field.as_str(): if *descending { -1 } else { 1 } })
            }
            Stage::Limit { count } => json!(count),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => json!({
                "from": from,
                "localField": local_field,
                "foreignField": foreign_field,
                "as": as_field,
            }),
            Stage::Count { output } => json!(output),
        };
        json!({ self.name(): body })
    }
}

/// How a consumer should read the documents a request returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    Scalar,
    List,
    Grouped,
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResultShape::Scalar => "scalar",
            ResultShape::List => "list",
            ResultShape::Grouped => "grouped",
        })
    }
}

/// A tenant-scoped aggregation against one collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationRequest {
    tenant: TenantId,
    collection: String,
    stages: Vec<Stage>,
    shape: ResultShape,
}

impl AggregationRequest {
    pub fn new(tenant: &TenantId, collection: impl Into<String>, shape: ResultShape) -> Self {
        Self {
            tenant: tenant.clone(),
            collection: collection.into(),
            stages: vec![Stage::tenant_match(tenant)],
            shape,
        }
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.push(stage);
        self
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    pub fn is_tenant_scoped(&self) -> bool {
        self.stages
            .first()
            .is_some_and(|stage| stage.is_tenant_match(&self.tenant))
    }

    /// Put the tenant match back in first position if anything displaced
    /// it. Returns true when a repair was needed.
    pub fn ensure_tenant_scope(&mut self) -> bool {
        if self.is_tenant_scoped() {
            return false;
        }
        self.stages.insert(0, Stage::tenant_match(&self.tenant));
        true
    }

    /// MongoDB pipeline form.
    pub fn to_pipeline(&self) -> Vec<Value> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}
