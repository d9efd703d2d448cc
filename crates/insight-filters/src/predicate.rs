//! Typed predicates and the rules that combine them.
//!
//! A [`PredicateSet`] never holds two predicates for the same field. Numeric
//! predicates on one field fold into a single range; any other collision is
//! resolved last-wins, in the order predicates are inserted (which the
//! extractor guarantees is their order of appearance in the question).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Limit used by top-N style consumers when the question names none.
pub const DEFAULT_LIMIT: u32 = 5;

/// One side of a numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: f64,
    pub inclusive: bool,
}

impl Bound {
    pub fn exclusive(value: f64) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }

    pub fn inclusive(value: f64) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }
}

/// A numeric constraint with optional lower and upper bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<Bound>,
}

impl NumericRange {
    pub fn gt(value: f64) -> Self {
        Self {
            lower: Some(Bound::exclusive(value)),
            upper: None,
        }
    }

    pub fn gte(value: f64) -> Self {
        Self {
            lower: Some(Bound::inclusive(value)),
            upper: None,
        }
    }

    pub fn lt(value: f64) -> Self {
        Self {
            lower: None,
            upper: Some(Bound::exclusive(value)),
        }
    }

    pub fn lte(value: f64) -> Self {
        Self {
            lower: None,
            upper: Some(Bound::inclusive(value)),
        }
    }

    /// Inclusive on both ends, matching "between X and Y".
    pub fn between(low: f64, high: f64) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self {
            lower: Some(Bound::inclusive(low)),
            upper: Some(Bound::inclusive(high)),
        }
    }

    /// Fold a later range into this one.
    ///
    /// Each side present in `later` replaces the same side here; sides it
    /// leaves open are kept.
    pub fn merge(&mut self, later: NumericRange) {
        if later.lower.is_some() {
            self.lower = later.lower;
        }
        if later.upper.is_some() {
            self.upper = later.upper;
        }
    }

    /// True when no value can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) => {
                lo.value > hi.value
                    || (lo.value == hi.value && !(lo.inclusive && hi.inclusive))
            }
            _ => false,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        let above = match self.lower {
            Some(b) if b.inclusive => value >= b.value,
            Some(b) => value > b.value,
            None => true,
        };
        let below = match self.upper {
            Some(b) if b.inclusive => value <= b.value,
            Some(b) => value < b.value,
            None => true,
        };
        above && below
    }
}

/// A single structured filter condition extracted from question text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Half-open `[start, end)` window on a date field.
    TimeRange {
        field: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Numeric {
        field: String,
        range: NumericRange,
    },
    Equals {
        field: String,
        value: String,
    },
    Limit {
        value: u32,
    },
}

impl Predicate {
    /// The constrained field, `None` for limits.
    pub fn field(&self) -> Option<&str> {
        match self {
            Predicate::TimeRange { field, .. }
            | Predicate::Numeric { field, .. }
            | Predicate::Equals { field, .. } => Some(field),
            Predicate::Limit { .. } => None,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Predicate::TimeRange { .. } => "time_range",
            Predicate::Numeric { .. } => "numeric",
            Predicate::Equals { .. } => "equals",
            Predicate::Limit { .. } => "limit",
        }
    }
}

/// The AND-combined predicates of one question.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredicateSet {
    predicates: Vec<Predicate>,
}

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a predicate, merging or replacing whatever already targets
    /// the same field.
    pub fn insert(&mut self, predicate: Predicate) {
        let slot = self
            .predicates
            .iter()
            .position(|existing| same_target(existing, &predicate));

        let Some(index) = slot else {
            self.predicates.push(predicate);
            return;
        };

        match (&mut self.predicates[index], predicate) {
            (Predicate::Numeric { range, .. }, Predicate::Numeric { range: later, .. }) => {
                range.merge(later);
            }
            (existing, later) => *existing = later,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Predicate> {
        self.predicates.iter().find(|p| p.field() == Some(field))
    }

    pub fn limit(&self) -> Option<u32> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::Limit { value } => Some(*value),
            _ => None,
        })
    }

    pub fn limit_or_default(&self) -> u32 {
        self.limit().unwrap_or(DEFAULT_LIMIT)
    }

    /// Remove and return the limit predicate, if any.
    pub fn take_limit(&mut self) -> Option<u32> {
        let index = self
            .predicates
            .iter()
            .position(|p| matches!(p, Predicate::Limit { .. }))?;
        match self.predicates.remove(index) {
            Predicate::Limit { value } => Some(value),
            _ => None,
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<Predicate> {
        let index = self
            .predicates
            .iter()
            .position(|p| p.field() == Some(field))?;
        Some(self.predicates.remove(index))
    }

    pub fn time_range(&self, field: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self.get(field)? {
            Predicate::TimeRange { start, end, .. } => Some((*start, *end)),
            _ => None,
        }
    }

    pub fn numeric(&self, field: &str) -> Option<&NumericRange> {
        match self.get(field)? {
            Predicate::Numeric { range, .. } => Some(range),
            _ => None,
        }
    }

    pub fn equals(&self, field: &str) -> Option<&str> {
        match self.get(field)? {
            Predicate::Equals { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Predicates that constrain documents (everything except the limit).
    pub fn conditions(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates
            .iter()
            .filter(|p| !matches!(p, Predicate::Limit { .. }))
    }
}

fn same_target(existing: &Predicate, incoming: &Predicate) -> bool {
    match (existing.field(), incoming.field()) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}

impl Extend<Predicate> for PredicateSet {
    fn extend<T: IntoIterator<Item = Predicate>>(&mut self, iter: T) {
        for predicate in iter {
            self.insert(predicate);
        }
    }
}

impl FromIterator<Predicate> for PredicateSet {
    fn from_iter<T: IntoIterator<Item = Predicate>>(iter: T) -> Self {
        let mut set = PredicateSet::new();
        set.extend(iter);
        set
    }
}
