//! In-memory document store.
//!
//! Evaluates the stage vocabulary over JSON documents held per collection.
//! Used for the sample data set, the CLI and tests.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use super::store::{Document, DocumentStore};
use crate::error::StoreError;
use crate::question::TenantId;
use crate::registry::{
    Accumulator, Condition, GroupKey, MatchValue, RangeBound, Stage, TENANT_FIELD,
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    collections: HashMap<String, Vec<Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{ "collection": [documents...] }` from a JSON file.
    pub fn from_fixture(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Fixture(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| StoreError::Fixture(e.to_string()))?;
        let Value::Object(root) = value else {
            return Err(StoreError::Fixture(
                "expected an object of collections".to_string(),
            ));
        };

        let mut store = Self::new();
        for (name, docs) in root {
            let Value::Array(docs) = docs else {
                return Err(StoreError::Fixture(format!(
                    "collection '{name}' is not an array"
                )));
            };
            let docs = docs
                .into_iter()
                .map(|doc| match doc {
                    Value::Object(map) => Ok(map),
                    other => Err(StoreError::Fixture(format!(
                        "collection '{name}' holds a non-object: {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            store.collections.insert(name, docs);
        }
        Ok(store)
    }

    pub fn insert(&mut self, collection: &str, doc: Document) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    pub fn with_collection(mut self, collection: &str, docs: Vec<Value>) -> Self {
        let docs = docs
            .into_iter()
            .filter_map(|doc| match doc {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.collections.insert(collection.to_string(), docs);
        self
    }

    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, Vec::len)
    }

    fn collection(&self, name: &str) -> Result<&[Document], StoreError> {
        self.collections
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }

    fn lookup(
        &self,
        tenant: &TenantId,
        docs: Vec<Document>,
        from: &str,
        local_field: &str,
        foreign_field: &str,
        as_field: &str,
    ) -> Result<Vec<Document>, StoreError> {
        let foreign: Vec<&Document> = self
            .collection(from)?
            .iter()
            .filter(|doc| doc.get(TENANT_FIELD).is_some_and(|v| tenant.matches(v)))
            .collect();

        Ok(docs
            .into_iter()
            .map(|mut doc| {
                let joined: Vec<Value> = match doc.get(local_field) {
                    Some(local) => foreign
                        .iter()
                        .filter(|f| f.get(foreign_field).is_some_and(|v| values_equal(v, local)))
                        .map(|f| Value::Object((*f).clone()))
                        .collect(),
                    None => Vec::new(),
                };
                doc.insert(as_field.to_string(), Value::Array(joined));
                doc
            })
            .collect())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn run_aggregation(
        &self,
        tenant: &TenantId,
        collection: &str,
        stages: &[Stage],
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self.collection(collection)?.to_vec();

        for stage in stages {
            docs = match stage {
                Stage::Match { conditions } => docs
                    .into_iter()
                    .filter(|doc| {
                        conditions
                            .iter()
                            .all(|(field, cond)| condition_holds(doc.get(field), cond))
                    })
                    .collect(),
                Stage::Group { key, accumulators } => group(&docs, key, accumulators),
                Stage::Sort { field, descending } => {
                    docs.sort_by(|a, b| {
                        let order = compare_values(a.get(field), b.get(field));
                        if *descending {
                            order.reverse()
                        } else {
                            order
                        }
                    });
                    docs
                }
                Stage::Limit { count } => {
                    docs.truncate(*count as usize);
                    docs
                }
                Stage::Lookup {
                    from,
                    local_field,
                    foreign_field,
                    as_field,
                } => self.lookup(tenant, docs, from, local_field, foreign_field, as_field)?,
                // An empty input yields no document, as in MongoDB.
                Stage::Count { .. } if docs.is_empty() => Vec::new(),
                Stage::Count { output } => {
                    let mut doc = Document::new();
                    doc.insert(output.clone(), json!(docs.len()));
                    vec![doc]
                }
            };
        }

        debug!(collection, rows = docs.len(), "in-memory aggregation");
        Ok(docs)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Dates are stored as RFC 3339 strings, `YYYY-MM-DD HH:MM:SS`, plain
/// dates, or `{"$date": ...}`.
fn time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|t| t.and_utc())
            })
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|t| t.and_utc())
            }),
        Value::Object(map) => map.get("$date").and_then(time),
        _ => None,
    }
}

fn compare_operand(value: &Value, operand: &MatchValue) -> Option<Ordering> {
    match operand {
        MatchValue::Int(n) => number(value)?.partial_cmp(&(*n as f64)),
        MatchValue::Number(x) => number(value)?.partial_cmp(x),
        MatchValue::Text(s) => value.as_str().map(|v| v.cmp(s.as_str())),
        MatchValue::Time(t) => time(value).map(|v| v.cmp(t)),
    }
}

fn bound_holds(value: &Value, bound: &RangeBound, lower: bool) -> bool {
    match compare_operand(value, &bound.value) {
        Some(Ordering::Equal) => bound.inclusive,
        Some(Ordering::Greater) => lower,
        Some(Ordering::Less) => !lower,
        None => false,
    }
}

fn condition_holds(value: Option<&Value>, condition: &Condition) -> bool {
    let Some(value) = value else {
        return false;
    };
    match condition {
        Condition::Eq(operand) => compare_operand(value, operand) == Some(Ordering::Equal),
        Condition::Range { lower, upper } => {
            lower.as_ref().is_none_or(|b| bound_holds(value, b, true))
                && upper.as_ref().is_none_or(|b| bound_holds(value, b, false))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (number(a), number(b)) {
        (Some(x), Some(y)) if a.is_number() || b.is_number() => x == y,
        _ => a == b,
    }
}

/// Missing and null sort first; numbers before strings.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = |v: Option<&Value>| match v {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(_) => 3,
    };
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn group_id(doc: &Document, key: &GroupKey) -> Value {
    match key {
        GroupKey::None => Value::Null,
        GroupKey::Field(field) => doc.get(field).cloned().unwrap_or(Value::Null),
        GroupKey::TimeBucket { field, unit } => doc
            .get(field)
            .and_then(time)
            .map_or(Value::Null, |t| json!(t.format(unit.format()).to_string())),
    }
}

#[derive(Debug, Clone)]
enum AccState {
    Sum(f64),
    Avg { sum: f64, n: u64 },
    Count(u64),
    First(Option<Value>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) | Accumulator::SumProduct(..) => AccState::Sum(0.0),
            Accumulator::Avg(_) => AccState::Avg { sum: 0.0, n: 0 },
            Accumulator::Count => AccState::Count(0),
            Accumulator::First(_) => AccState::First(None),
        }
    }

    fn add(&mut self, acc: &Accumulator, doc: &Document) {
        let field = |name: &str| doc.get(name).and_then(number);
        match (self, acc) {
            (AccState::Sum(total), Accumulator::Sum(f)) => *total += field(f).unwrap_or(0.0),
            (AccState::Sum(total), Accumulator::SumProduct(a, b)) => {
                *total += field(a).unwrap_or(0.0) * field(b).unwrap_or(0.0)
            }
            (AccState::Avg { sum, n }, Accumulator::Avg(f)) => {
                if let Some(x) = field(f) {
                    *sum += x;
                    *n += 1;
                }
            }
            (AccState::Count(n), Accumulator::Count) => *n += 1,
            (AccState::First(slot @ None), Accumulator::First(f)) => {
                *slot = Some(doc.get(f).cloned().unwrap_or(Value::Null))
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum(total) => json!(total),
            AccState::Avg { n: 0, .. } => Value::Null,
            AccState::Avg { sum, n } => json!(sum / n as f64),
            AccState::Count(n) => json!(n),
            AccState::First(v) => v.unwrap_or(Value::Null),
        }
    }
}

/// Groups in first-seen order.
fn group(docs: &[Document], key: &GroupKey, accumulators: &[(String, Accumulator)]) -> Vec<Document> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();

    for doc in docs {
        let id = group_id(doc, key);
        let slot = *index.entry(id.to_string()).or_insert_with(|| {
            groups.push((
                id.clone(),
                accumulators.iter().map(|(_, acc)| AccState::new(acc)).collect(),
            ));
            groups.len() - 1
        });
        for ((_, acc), state) in accumulators.iter().zip(groups[slot].1.iter_mut()) {
            state.add(acc, doc);
        }
    }

    groups
        .into_iter()
        .map(|(id, states)| {
            let mut out = Document::new();
            out.insert("_id".to_string(), id);
            for ((name, _), state) in accumulators.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::registry::{TimeUnit, ToolKind, ToolParams};

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_collection(
                "order",
                vec![
                    json!({"id": 1, "shop_id": 10, "user_id": 100, "grand_total": 50.0, "status": "Pending", "created_at": "2024-05-01T10:00:00Z"}),
                    json!({"id": 2, "shop_id": 10, "user_id": 101, "grand_total": 150.0, "status": "Delivered", "created_at": "2024-05-20T10:00:00Z"}),
                    json!({"id": 3, "shop_id": 10, "user_id": 100, "grand_total": 300.0, "status": "Delivered", "created_at": "2024-06-02 09:30:00"}),
                    json!({"id": 4, "shop_id": 11, "user_id": 200, "grand_total": 999.0, "status": "Delivered", "created_at": "2024-06-03T10:00:00Z"}),
                ],
            )
            .with_collection(
                "customer",
                vec![
                    json!({"id": 100, "shop_id": 10, "name": "Ada"}),
                    json!({"id": 101, "shop_id": 10, "name": "Grace"}),
                    json!({"id": 100, "shop_id": 11, "name": "Other shop"}),
                ],
            )
    }

    async fn run(kind: ToolKind, params: ToolParams) -> Vec<Document> {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let tenant = TenantId::from("10");
        let request = kind.build(&tenant, &kind.bind(params, now).unwrap()).unwrap();
        store()
            .run_aggregation(&tenant, request.collection(), request.stages())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_count_is_tenant_scoped() {
        let docs = run(ToolKind::CountRecords, ToolParams::new().with("collection", "order")).await;
        assert_eq!(docs[0]["count"], json!(3));
    }

    #[tokio::test]
    async fn test_sum_by_month() {
        let docs = run(
            ToolKind::SumField,
            ToolParams::new()
                .with("collection", "order")
                .with("field", "grand_total")
                .with("group_by", "month"),
        )
        .await;
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["_id"], json!("2024-05"));
        assert_eq!(docs[0]["total"], json!(200.0));
        assert_eq!(docs[1]["total"], json!(300.0));
    }

    #[tokio::test]
    async fn test_top_customers_join_within_tenant() {
        let docs = run(
            ToolKind::TopEntitiesByAggregate,
            ToolParams::new().with("metric", "total_spent"),
        )
        .await;
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["_id"], json!(100));
        assert_eq!(docs[0]["total_spent"], json!(350.0));
        let joined = docs[0]["customer"].as_array().unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0]["name"], json!("Ada"));
    }

    #[tokio::test]
    async fn test_range_bounds() {
        let mut conditions = std::collections::BTreeMap::new();
        conditions.insert(
            "grand_total".to_string(),
            Condition::Range {
                lower: Some(RangeBound {
                    value: MatchValue::Number(50.0),
                    inclusive: false,
                }),
                upper: Some(RangeBound {
                    value: MatchValue::Number(300.0),
                    inclusive: true,
                }),
            },
        );
        let stages = [
            Stage::tenant_match(&TenantId::from("10")),
            Stage::Match { conditions },
        ];
        let docs = store()
            .run_aggregation(&TenantId::from("10"), "order", &stages)
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d["id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_week_bucket_label() {
        let stages = [
            Stage::tenant_match(&TenantId::from("10")),
            Stage::Group {
                key: GroupKey::TimeBucket {
                    field: "created_at".into(),
                    unit: TimeUnit::Week,
                },
                accumulators: vec![("count".into(), Accumulator::Count)],
            },
        ];
        let docs = store()
            .run_aggregation(&TenantId::from("10"), "order", &stages)
            .await
            .unwrap();
        assert_eq!(docs[0]["_id"], json!("2024-W18"));
    }

    #[tokio::test]
    async fn test_empty_count_and_unknown_collection() {
        let stages = [
            Stage::tenant_match(&TenantId::from("99")),
            Stage::Count {
                output: "count".into(),
            },
        ];
        let docs = store()
            .run_aggregation(&TenantId::from("99"), "order", &stages)
            .await
            .unwrap();
        assert!(docs.is_empty());

        let err = store()
            .run_aggregation(&TenantId::from("10"), "invoice", &stages)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownCollection(_)));
    }

    #[test]
    fn test_fixture_must_be_object_of_arrays() {
        assert!(InMemoryStore::from_json("[]").is_err());
        assert!(InMemoryStore::from_json(r#"{"order": {}}"#).is_err());
        let store = InMemoryStore::from_json(r#"{"order": [{"id": 1}]}"#).unwrap();
        assert_eq!(store.collection_len("order"), 1);
    }
}
