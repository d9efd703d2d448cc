//! The eight canonical tools: parameter schemas, binding and pipeline
//! builders.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use insight_filters::{days_back_window, NumericRange, Predicate, PredicateSet};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::params::{DefaultValue, ParamSpec, ParamType, ParamValue, ToolParams};
use super::pipeline::{
    Accumulator, AggregationRequest, Condition, GroupKey, MatchValue, RangeBound, ResultShape,
    Stage, TimeUnit,
};
use crate::error::ParameterError;
use crate::question::TenantId;

pub const COLLECTIONS: &[&str] = &["order", "product", "customer", "category", "order_product"];

pub const CUSTOMER_METRICS: &[&str] = &["total_spent", "order_count"];
pub const PRODUCT_METRICS: &[&str] = &["total_quantity", "total_revenue"];

/// Date field used when a tool or predicate does not name one.
pub const DEFAULT_DATE_FIELD: &str = "created_at";

const MAX_LIMIT: i64 = 1000;
const MAX_LIST_ROWS: u32 = 100;

static FIELD_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,63}$").unwrap());

/// Fields each collection carries. Extracted predicates on other fields are
/// not applied to that collection.
fn collection_fields(collection: &str) -> &'static [&'static str] {
    match collection {
        "order" => &[
            "created_at",
            "grand_total",
            "subtotal",
            "delivery_charge",
            "status",
            "payment_status",
            "user_id",
        ],
        "product" => &["created_at", "price", "stock", "category_id", "name"],
        "customer" => &["created_at", "name", "email", "city"],
        "category" => &["created_at", "name"],
        "order_product" => &["created_at", "product_id", "order_id", "quantity", "price"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    CountRecords,
    SumField,
    AverageField,
    TopNByField,
    GroupAndCount,
    DateRangeFilter,
    TopEntitiesByAggregate,
    FindRecords,
}

const COLLECTION: ParamSpec = ParamSpec::required(
    "collection",
    ParamType::Text,
    "Collection to query: order, product, customer, category or order_product",
);
const GROUP_BY_OPTIONAL: ParamSpec = ParamSpec::optional(
    "group_by",
    ParamType::Text,
    None,
    "Field or time bucket (day, week, month, year) to group by",
);

const COUNT_RECORDS_PARAMS: &[ParamSpec] = &[COLLECTION];
const SUM_FIELD_PARAMS: &[ParamSpec] = &[
    COLLECTION,
    ParamSpec::required("field", ParamType::Text, "Numeric field to sum"),
    GROUP_BY_OPTIONAL,
];
const AVERAGE_FIELD_PARAMS: &[ParamSpec] = &[
    COLLECTION,
    ParamSpec::required("field", ParamType::Text, "Numeric field to average"),
    GROUP_BY_OPTIONAL,
];
const TOP_N_PARAMS: &[ParamSpec] = &[
    COLLECTION,
    ParamSpec::required("sort_by", ParamType::Text, "Field to rank by"),
    ParamSpec::optional(
        "limit",
        ParamType::Int,
        Some(DefaultValue::Int(5)),
        "Number of rows",
    ),
    ParamSpec::optional(
        "ascending",
        ParamType::Bool,
        Some(DefaultValue::Bool(false)),
        "Rank lowest first",
    ),
];
const GROUP_AND_COUNT_PARAMS: &[ParamSpec] = &[
    COLLECTION,
    ParamSpec::required(
        "group_by",
        ParamType::Text,
        "Field or time bucket (day, week, month, year) to group by",
    ),
];
const DATE_RANGE_PARAMS: &[ParamSpec] = &[
    COLLECTION,
    ParamSpec::optional(
        "date_field",
        ParamType::Text,
        Some(DefaultValue::Text(DEFAULT_DATE_FIELD)),
        "Date field the window applies to",
    ),
    ParamSpec::optional(
        "days_back",
        ParamType::Int,
        None,
        "Window of the last N days when the question names no period",
    ),
];
const TOP_ENTITIES_PARAMS: &[ParamSpec] = &[
    ParamSpec::required(
        "metric",
        ParamType::Text,
        "total_spent, order_count, total_quantity or total_revenue",
    ),
    ParamSpec::optional(
        "entity",
        ParamType::Text,
        Some(DefaultValue::Text("customer")),
        "customer or product; follows the metric when omitted",
    ),
    ParamSpec::optional(
        "limit",
        ParamType::Int,
        Some(DefaultValue::Int(5)),
        "Number of rows",
    ),
];
const FIND_RECORDS_PARAMS: &[ParamSpec] = &[
    COLLECTION,
    ParamSpec::optional("sort_by", ParamType::Text, None, "Field to order by"),
    ParamSpec::optional(
        "ascending",
        ParamType::Bool,
        Some(DefaultValue::Bool(false)),
        "Order lowest first",
    ),
    ParamSpec::optional(
        "limit",
        ParamType::Int,
        Some(DefaultValue::Int(10)),
        "Number of rows",
    ),
];

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::CountRecords,
        ToolKind::SumField,
        ToolKind::AverageField,
        ToolKind::TopNByField,
        ToolKind::GroupAndCount,
        ToolKind::DateRangeFilter,
        ToolKind::TopEntitiesByAggregate,
        ToolKind::FindRecords,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::CountRecords => "count_records",
            ToolKind::SumField => "sum_field",
            ToolKind::AverageField => "average_field",
            ToolKind::TopNByField => "top_n_by_field",
            ToolKind::GroupAndCount => "group_and_count",
            ToolKind::DateRangeFilter => "date_range_filter",
            ToolKind::TopEntitiesByAggregate => "top_entities_by_aggregate",
            ToolKind::FindRecords => "find_records",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::CountRecords => "Count documents in a collection",
            ToolKind::SumField => "Sum a numeric field, optionally grouped",
            ToolKind::AverageField => "Average a numeric field, optionally grouped",
            ToolKind::TopNByField => "Top N documents ranked by a field",
            ToolKind::GroupAndCount => "Count documents per group",
            ToolKind::DateRangeFilter => "Documents within a date window",
            ToolKind::TopEntitiesByAggregate => {
                "Top customers or products by spending, order count, quantity or revenue"
            }
            ToolKind::FindRecords => "List documents matching the question's filters",
        }
    }

    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            ToolKind::CountRecords => COUNT_RECORDS_PARAMS,
            ToolKind::SumField => SUM_FIELD_PARAMS,
            ToolKind::AverageField => AVERAGE_FIELD_PARAMS,
            ToolKind::TopNByField => TOP_N_PARAMS,
            ToolKind::GroupAndCount => GROUP_AND_COUNT_PARAMS,
            ToolKind::DateRangeFilter => DATE_RANGE_PARAMS,
            ToolKind::TopEntitiesByAggregate => TOP_ENTITIES_PARAMS,
            ToolKind::FindRecords => FIND_RECORDS_PARAMS,
        }
    }

    pub fn accepts(self, param: &str) -> bool {
        self.params().iter().any(|spec| spec.name == param)
    }

    /// Coerce, default and validate raw parameters.
    ///
    /// Required parameters are never defaulted. Unknown parameters are
    /// dropped. `now` anchors `days_back` for the date range tool.
    pub fn bind(self, raw: ToolParams, now: DateTime<Utc>) -> Result<ToolParams, ParameterError> {
        let mut bound = ToolParams::new();
        bound.set_filters(raw.filters().clone());

        for spec in self.params() {
            match raw.get(spec.name) {
                Some(value) => {
                    let coerced =
                        value
                            .coerce(spec.ty)
                            .map_err(|found| ParameterError::InvalidType {
                                tool: self.name().to_string(),
                                param: spec.name.to_string(),
                                expected: spec.ty.to_string(),
                                found,
                            })?;
                    bound.set(spec.name, coerced);
                }
                None if spec.required => {
                    return Err(ParameterError::Missing {
                        tool: self.name().to_string(),
                        param: spec.name.to_string(),
                    });
                }
                None => {}
            }
        }

        for name in raw.values().keys() {
            if !self.accepts(name) {
                debug!(tool = self.name(), param = %name, "dropping unknown parameter");
            }
        }

        self.apply_defaults(&mut bound);

        if self == ToolKind::DateRangeFilter {
            self.anchor_days_back(&mut bound, now)?;
        }

        self.validate(&bound)?;
        Ok(bound)
    }

    fn apply_defaults(self, params: &mut ToolParams) {
        if self == ToolKind::TopEntitiesByAggregate && !params.contains("entity") {
            if let Some(metric) = params.text("metric") {
                if PRODUCT_METRICS.contains(&metric) {
                    params.set("entity", "product");
                }
            }
        }
        for spec in self.params() {
            if let Some(default) = spec.default {
                params.set_default(spec.name, default.to_value());
            }
        }
    }

    fn anchor_days_back(self, params: &mut ToolParams, now: DateTime<Utc>) -> Result<(), ParameterError> {
        let field = params
            .text("date_field")
            .unwrap_or(DEFAULT_DATE_FIELD)
            .to_string();
        if params.filters().time_range(&field).is_some() {
            return Ok(());
        }
        let Some(days) = params.int("days_back") else {
            return Ok(());
        };
        let window = u32::try_from(days)
            .ok()
            .filter(|d| *d > 0)
            .and_then(|d| days_back_window(d, now))
            .ok_or_else(|| self.invalid("days_back", "must be a positive number of days"))?;
        params.filters_mut().insert(Predicate::TimeRange {
            field,
            start: window.0,
            end: window.1,
        });
        Ok(())
    }

    fn invalid(self, param: &str, reason: impl Into<String>) -> ParameterError {
        ParameterError::InvalidValue {
            tool: self.name().to_string(),
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    /// Check domain rules on already-coerced parameters.
    pub fn validate(self, params: &ToolParams) -> Result<(), ParameterError> {
        if let Some(collection) = params.text("collection") {
            if !COLLECTIONS.contains(&collection) {
                return Err(self.invalid(
                    "collection",
                    format!("unknown collection '{collection}'"),
                ));
            }
        }

        for name in ["field", "sort_by", "date_field"] {
            if let Some(field) = params.text(name) {
                if !FIELD_NAME_RE.is_match(field) {
                    return Err(self.invalid(name, format!("'{field}' is not a field name")));
                }
            }
        }

        if let Some(group_by) = params.text("group_by") {
            if TimeUnit::parse(group_by).is_none() && !FIELD_NAME_RE.is_match(group_by) {
                return Err(self.invalid(
                    "group_by",
                    format!("'{group_by}' is not a field or time bucket"),
                ));
            }
        }

        if let Some(limit) = params.int("limit") {
            if !(1..=MAX_LIMIT).contains(&limit) {
                return Err(self.invalid("limit", format!("must be between 1 and {MAX_LIMIT}")));
            }
        }

        match self {
            ToolKind::TopEntitiesByAggregate => {
                let metric = params.text("metric").unwrap_or_default();
                let entity = params.text("entity").unwrap_or("customer");
                let allowed = match entity {
                    "customer" => CUSTOMER_METRICS,
                    "product" => PRODUCT_METRICS,
                    other => {
                        return Err(self.invalid("entity", format!("unknown entity '{other}'")))
                    }
                };
                if !allowed.contains(&metric) {
                    return Err(self.invalid(
                        "metric",
                        format!("'{metric}' is not a {entity} metric"),
                    ));
                }
            }
            ToolKind::DateRangeFilter => {
                let field = params.text("date_field").unwrap_or(DEFAULT_DATE_FIELD);
                if params.filters().time_range(field).is_none() {
                    return Err(ParameterError::MissingTimeRange {
                        tool: self.name().to_string(),
                        field: field.to_string(),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Required parameters must be present and already of their declared
    /// type. Nothing is coerced or defaulted here.
    fn check_required(self, params: &ToolParams) -> Result<(), ParameterError> {
        for spec in self.params().iter().filter(|spec| spec.required) {
            self.required(params, spec.name, spec.ty)?;
        }
        Ok(())
    }

    fn required<'a>(
        self,
        params: &'a ToolParams,
        name: &str,
        ty: ParamType,
    ) -> Result<&'a ParamValue, ParameterError> {
        let value = params.get(name).ok_or_else(|| ParameterError::Missing {
            tool: self.name().to_string(),
            param: name.to_string(),
        })?;
        let well_typed = match ty {
            ParamType::Text => value.as_str().is_some(),
            ParamType::Int => value.as_i64().is_some(),
            ParamType::Bool => value.as_bool().is_some(),
        };
        if !well_typed {
            return Err(ParameterError::InvalidType {
                tool: self.name().to_string(),
                param: name.to_string(),
                expected: ty.to_string(),
                found: value.type_name().to_string(),
            });
        }
        Ok(value)
    }

    fn required_text<'a>(self, params: &'a ToolParams, name: &str) -> Result<&'a str, ParameterError> {
        let value = self.required(params, name, ParamType::Text)?;
        value.as_str().ok_or_else(|| ParameterError::Missing {
            tool: self.name().to_string(),
            param: name.to_string(),
        })
    }

    /// Build the tenant-scoped request for bound parameters.
    ///
    /// Checks required parameters and domain rules again, so a caller that
    /// skipped [`ToolKind::bind`] gets a [`ParameterError`] rather than a
    /// request built on guessed values.
    pub fn build(
        self,
        tenant: &TenantId,
        params: &ToolParams,
    ) -> Result<AggregationRequest, ParameterError> {
        self.check_required(params)?;
        self.validate(params)?;

        let limit = params
            .int("limit")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(MAX_LIST_ROWS);
        let descending = !params.bool("ascending").unwrap_or(false);

        let request = match self {
            ToolKind::CountRecords => {
                let collection = self.required_text(params, "collection")?;
                let mut request = scoped(tenant, collection, ResultShape::Scalar, params.filters());
                request.push(Stage::Count {
                    output: "count".to_string(),
                });
                request
            }
            ToolKind::SumField | ToolKind::AverageField => {
                let collection = self.required_text(params, "collection")?;
                let field = self.required_text(params, "field")?.to_string();
                let accumulator = if self == ToolKind::SumField {
                    ("total".to_string(), Accumulator::Sum(field))
                } else {
                    ("average".to_string(), Accumulator::Avg(field))
                };
                let key = params.text("group_by").map_or(GroupKey::None, group_key);
                let shape = if key == GroupKey::None {
                    ResultShape::Scalar
                } else {
                    ResultShape::Grouped
                };
                let grouped = shape == ResultShape::Grouped;
                let mut request = scoped(tenant, collection, shape, params.filters());
                request.push(Stage::Group {
                    key,
                    accumulators: vec![accumulator],
                });
                if grouped {
                    request.push(Stage::Sort {
                        field: "_id".to_string(),
                        descending: false,
                    });
                }
                request
            }
            ToolKind::TopNByField => {
                let collection = self.required_text(params, "collection")?;
                let mut request = scoped(tenant, collection, ResultShape::List, params.filters());
                request.push(Stage::Sort {
                    field: self.required_text(params, "sort_by")?.to_string(),
                    descending,
                });
                request.push(Stage::Limit { count: limit });
                request
            }
            ToolKind::GroupAndCount => {
                let collection = self.required_text(params, "collection")?;
                let key = group_key(self.required_text(params, "group_by")?);
                let mut request =
                    scoped(tenant, collection, ResultShape::Grouped, params.filters());
                request.push(Stage::Group {
                    key,
                    accumulators: vec![("count".to_string(), Accumulator::Count)],
                });
                request.push(Stage::Sort {
                    field: "count".to_string(),
                    descending: true,
                });
                request
            }
            ToolKind::DateRangeFilter => {
                let collection = self.required_text(params, "collection")?;
                let date_field = params.text("date_field").unwrap_or(DEFAULT_DATE_FIELD);
                let mut request = scoped(tenant, collection, ResultShape::List, params.filters());
                request.push(Stage::Sort {
                    field: date_field.to_string(),
                    descending: true,
                });
                request.push(Stage::Limit {
                    count: MAX_LIST_ROWS,
                });
                request
            }
            ToolKind::TopEntitiesByAggregate => {
                top_entities(tenant, params, self.required_text(params, "metric")?, limit)
            }
            ToolKind::FindRecords => {
                let collection = self.required_text(params, "collection")?;
                let mut request = scoped(tenant, collection, ResultShape::List, params.filters());
                if let Some(sort_by) = params.text("sort_by") {
                    request.push(Stage::Sort {
                        field: sort_by.to_string(),
                        descending,
                    });
                }
                request.push(Stage::Limit { count: limit });
                request
            }
        };
        Ok(request)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn group_key(group_by: &str) -> GroupKey {
    match TimeUnit::parse(group_by) {
        Some(unit) => GroupKey::TimeBucket {
            field: DEFAULT_DATE_FIELD.to_string(),
            unit,
        },
        None => GroupKey::Field(group_by.to_string()),
    }
}

/// A request on `collection` with the applicable filters matched right
/// after the tenant scope.
fn scoped(
    tenant: &TenantId,
    collection: &str,
    shape: ResultShape,
    filters: &PredicateSet,
) -> AggregationRequest {
    let mut request = AggregationRequest::new(tenant, collection, shape);
    if let Some(stage) = filter_stage(collection, filters) {
        request.push(stage);
    }
    request
}

fn filter_stage(collection: &str, filters: &PredicateSet) -> Option<Stage> {
    let fields = collection_fields(collection);
    let mut conditions = BTreeMap::new();

    for predicate in filters.conditions() {
        let Some(field) = predicate.field() else {
            continue;
        };
        if !fields.contains(&field) {
            debug!(collection, field, "predicate does not apply to collection");
            continue;
        }
        let condition = match predicate {
            Predicate::TimeRange { start, end, .. } => Condition::Range {
                lower: Some(RangeBound {
                    value: MatchValue::Time(*start),
                    inclusive: true,
                }),
                upper: Some(RangeBound {
                    value: MatchValue::Time(*end),
                    inclusive: false,
                }),
            },
            Predicate::Numeric { range, .. } => numeric_condition(range),
            Predicate::Equals { value, .. } => Condition::Eq(MatchValue::Text(value.clone())),
            Predicate::Limit { .. } => continue,
        };
        conditions.insert(field.to_string(), condition);
    }

    (!conditions.is_empty()).then_some(Stage::Match { conditions })
}

fn numeric_condition(range: &NumericRange) -> Condition {
    let bound = |b: insight_filters::Bound| RangeBound {
        value: MatchValue::Number(b.value),
        inclusive: b.inclusive,
    };
    Condition::Range {
        lower: range.lower.map(bound),
        upper: range.upper.map(bound),
    }
}

fn top_entities(
    tenant: &TenantId,
    params: &ToolParams,
    metric: &str,
    limit: u32,
) -> AggregationRequest {
    let entity = params.text("entity").unwrap_or("customer");

    let (source, key, lookup_from, accumulators) = if entity == "product" {
        (
            "order_product",
            "product_id",
            "product",
            vec![
                (
                    "total_quantity".to_string(),
                    Accumulator::Sum("quantity".to_string()),
                ),
                (
                    "total_revenue".to_string(),
                    Accumulator::SumProduct("price".to_string(), "quantity".to_string()),
                ),
            ],
        )
    } else {
        (
            "order",
            "user_id",
            "customer",
            vec![
                (
                    "total_spent".to_string(),
                    Accumulator::Sum("grand_total".to_string()),
                ),
                ("order_count".to_string(), Accumulator::Count),
            ],
        )
    };

    let mut request = scoped(tenant, source, ResultShape::List, params.filters());
    request.push(Stage::Group {
        key: GroupKey::Field(key.to_string()),
        accumulators,
    });
    request.push(Stage::Sort {
        field: metric.to_string(),
        descending: true,
    });
    request.push(Stage::Limit { count: limit });
    request.push(Stage::Lookup {
        from: lookup_from.to_string(),
        local_field: "_id".to_string(),
        foreign_field: "id".to_string(),
        as_field: entity.to_string(),
    });
    request
}

/// Parameter defaults as a plain map, for listings.
pub fn documented_defaults(kind: ToolKind) -> BTreeMap<&'static str, ParamValue> {
    kind.params()
        .iter()
        .filter_map(|spec| spec.default.map(|d| (spec.name, d.to_value())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn tenant() -> TenantId {
        TenantId::from("10")
    }

    #[test]
    fn test_every_tool_builds_tenant_first() {
        for kind in ToolKind::ALL {
            let mut raw = ToolParams::new()
                .with("collection", "order")
                .with("field", "grand_total")
                .with("sort_by", "grand_total")
                .with("group_by", "status")
                .with("metric", "total_spent")
                .with("days_back", 7);
            raw.set_filters(PredicateSet::new());
            let bound = kind.bind(raw, now()).unwrap();
            let request = kind.build(&tenant(), &bound).unwrap();
            assert!(request.is_tenant_scoped(), "{kind} lost tenant scope");
        }
    }

    #[test]
    fn test_required_params_are_never_defaulted() {
        let err = ToolKind::SumField
            .bind(ToolParams::new().with("collection", "order"), now())
            .unwrap_err();
        assert_eq!(
            err,
            ParameterError::Missing {
                tool: "sum_field".into(),
                param: "field".into()
            }
        );
    }

    #[test]
    fn test_binding_coerces_and_defaults() {
        let bound = ToolKind::TopNByField
            .bind(
                ToolParams::new()
                    .with("collection", "product")
                    .with("sort_by", "price")
                    .with("limit", "3")
                    .with("ascending", "true"),
                now(),
            )
            .unwrap();
        assert_eq!(bound.int("limit"), Some(3));
        assert_eq!(bound.bool("ascending"), Some(true));

        let bound = ToolKind::FindRecords
            .bind(ToolParams::new().with("collection", "order"), now())
            .unwrap();
        assert_eq!(bound.int("limit"), Some(10));
        assert_eq!(bound.bool("ascending"), Some(false));
    }

    #[test]
    fn test_invalid_type_names_field() {
        let err = ToolKind::TopNByField
            .bind(
                ToolParams::new()
                    .with("collection", "order")
                    .with("sort_by", "grand_total")
                    .with("limit", "lots"),
                now(),
            )
            .unwrap_err();
        assert_eq!(err.param(), "limit");
    }

    #[test]
    fn test_unknown_collection_rejected() {
        let err = ToolKind::CountRecords
            .bind(ToolParams::new().with("collection", "invoices"), now())
            .unwrap_err();
        assert!(matches!(err, ParameterError::InvalidValue { ref param, .. } if param == "collection"));
    }

    #[test]
    fn test_entity_follows_product_metric() {
        let bound = ToolKind::TopEntitiesByAggregate
            .bind(ToolParams::new().with("metric", "total_quantity"), now())
            .unwrap();
        assert_eq!(bound.text("entity"), Some("product"));
        assert_eq!(bound.int("limit"), Some(5));

        let request = ToolKind::TopEntitiesByAggregate.build(&tenant(), &bound).unwrap();
        assert_eq!(request.collection(), "order_product");

        let err = ToolKind::TopEntitiesByAggregate
            .bind(
                ToolParams::new()
                    .with("metric", "total_quantity")
                    .with("entity", "customer"),
                now(),
            )
            .unwrap_err();
        assert_eq!(err.param(), "metric");
    }

    #[test]
    fn test_date_range_needs_window() {
        let err = ToolKind::DateRangeFilter
            .bind(ToolParams::new().with("collection", "order"), now())
            .unwrap_err();
        assert!(matches!(err, ParameterError::MissingTimeRange { .. }));

        let bound = ToolKind::DateRangeFilter
            .bind(
                ToolParams::new().with("collection", "order").with("days_back", "30"),
                now(),
            )
            .unwrap();
        let (start, end) = bound.filters().time_range("created_at").unwrap();
        assert_eq!(end, now());
        assert_eq!(start, now() - chrono::Duration::days(30));
    }

    #[test]
    fn test_combined_filters_land_in_one_match() {
        let mut raw = ToolParams::new().with("collection", "order");
        raw.set_filters(
            vec![
                Predicate::Equals {
                    field: "status".into(),
                    value: "Paid".into(),
                },
                Predicate::Numeric {
                    field: "grand_total".into(),
                    range: NumericRange::gt(800.0),
                },
            ]
            .into_iter()
            .collect(),
        );
        let bound = ToolKind::FindRecords.bind(raw, now()).unwrap();
        let request = ToolKind::FindRecords.build(&tenant(), &bound).unwrap();

        let Stage::Match { conditions } = &request.stages()[1] else {
            panic!("expected filter match after tenant scope");
        };
        assert_eq!(
            conditions.get("status"),
            Some(&Condition::Eq(MatchValue::Text("Paid".into())))
        );
        assert_eq!(
            conditions.get("grand_total"),
            Some(&Condition::Range {
                lower: Some(RangeBound {
                    value: MatchValue::Number(800.0),
                    inclusive: false
                }),
                upper: None
            })
        );
    }

    #[test]
    fn test_grouped_sum_by_month() {
        let bound = ToolKind::SumField
            .bind(
                ToolParams::new()
                    .with("collection", "order")
                    .with("field", "grand_total")
                    .with("group_by", "month"),
                now(),
            )
            .unwrap();
        let request = ToolKind::SumField.build(&tenant(), &bound).unwrap();
        assert_eq!(request.shape(), ResultShape::Grouped);
        assert!(matches!(
            &request.stages()[1],
            Stage::Group { key: GroupKey::TimeBucket { unit: TimeUnit::Month, .. }, .. }
        ));
    }
}
