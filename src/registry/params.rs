//! Tool parameters and their coercion rules.

use std::collections::BTreeMap;
use std::fmt;

use insight_filters::PredicateSet;
use serde::{Deserialize, Serialize};

/// A single parameter value as supplied by a classifier or rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "boolean",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "number",
            ParamValue::Text(_) => "text",
        }
    }

    /// Convert a JSON value from an external classifier. Nulls, arrays and
    /// objects carry no usable parameter.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(ParamValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(ParamValue::Int)
                .or_else(|| n.as_f64().map(ParamValue::Float)),
            serde_json::Value::String(s) => Some(ParamValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Coerce to `ty`, returning a description of the offending value on
    /// failure.
    pub fn coerce(&self, ty: ParamType) -> Result<ParamValue, String> {
        match (ty, self) {
            (ParamType::Text, ParamValue::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Err("empty text".to_string())
                } else {
                    Ok(ParamValue::Text(trimmed.to_string()))
                }
            }
            (ParamType::Int, ParamValue::Int(n)) => Ok(ParamValue::Int(*n)),
            (ParamType::Int, ParamValue::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                Ok(ParamValue::Int(*f as i64))
            }
            (ParamType::Int, ParamValue::Text(s)) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| {
                        trimmed
                            .parse::<f64>()
                            .ok()
                            .filter(|f| f.fract() == 0.0 && f.is_finite())
                            .map(|f| f as i64)
                    })
                    .map(ParamValue::Int)
                    .ok_or_else(|| format!("text {s:?}"))
            }
            (ParamType::Bool, ParamValue::Bool(b)) => Ok(ParamValue::Bool(*b)),
            (ParamType::Bool, ParamValue::Int(n)) if *n == 0 || *n == 1 => {
                Ok(ParamValue::Bool(*n == 1))
            }
            (ParamType::Bool, ParamValue::Text(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(ParamValue::Bool(true)),
                "false" | "no" | "0" => Ok(ParamValue::Bool(false)),
                _ => Err(format!("text {s:?}")),
            },
            (_, other) => Err(format!("{} {}", other.type_name(), other)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Int(n)
    }
}

impl From<i32> for ParamValue {
    fn from(n: i32) -> Self {
        ParamValue::Int(i64::from(n))
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        ParamValue::Int(i64::from(n))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Text,
    Int,
    Bool,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamType::Text => "text",
            ParamType::Int => "an integer",
            ParamType::Bool => "true or false",
        })
    }
}

/// Documented default for an optional parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Int(i64),
    Bool(bool),
    Text(&'static str),
}

impl DefaultValue {
    pub fn to_value(self) -> ParamValue {
        match self {
            DefaultValue::Int(n) => ParamValue::Int(n),
            DefaultValue::Bool(b) => ParamValue::Bool(b),
            DefaultValue::Text(s) => ParamValue::Text(s.to_string()),
        }
    }
}

/// Schema entry for one tool parameter.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            default: None,
            description,
        }
    }

    pub const fn optional(
        name: &'static str,
        ty: ParamType,
        default: Option<DefaultValue>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            ty,
            required: false,
            default,
            description,
        }
    }
}

/// Named parameters plus the predicates extracted from the question.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ToolParams {
    values: BTreeMap<String, ParamValue>,
    #[serde(skip_serializing_if = "PredicateSet::is_empty")]
    filters: PredicateSet,
}

impl ToolParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Set `name` only when it is not already present.
    pub fn set_default(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.values
            .entry(name.to_string())
            .or_insert_with(|| value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(ParamValue::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(ParamValue::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(ParamValue::as_bool)
    }

    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }

    pub fn filters(&self) -> &PredicateSet {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut PredicateSet {
        &mut self.filters
    }

    pub fn set_filters(&mut self, filters: PredicateSet) {
        self.filters = filters;
    }

    /// Copy values from `other` that are not already set here.
    pub fn fill_missing(&mut self, other: &ToolParams) {
        for (name, value) in &other.values {
            self.values
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.values).unwrap_or(serde_json::Value::Null)
    }
}

impl FromIterator<(String, ParamValue)> for ToolParams {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
            filters: PredicateSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_coercion() {
        assert_eq!(ParamValue::from("5").coerce(ParamType::Int), Ok(ParamValue::Int(5)));
        assert_eq!(ParamValue::Float(5.0).coerce(ParamType::Int), Ok(ParamValue::Int(5)));
        assert_eq!(ParamValue::from(" 12 ").coerce(ParamType::Int), Ok(ParamValue::Int(12)));
        assert!(ParamValue::Float(5.5).coerce(ParamType::Int).is_err());
        assert!(ParamValue::from("five").coerce(ParamType::Int).is_err());
    }

    #[test]
    fn test_bool_coercion() {
        assert_eq!(ParamValue::from("true").coerce(ParamType::Bool), Ok(ParamValue::Bool(true)));
        assert_eq!(ParamValue::Int(0).coerce(ParamType::Bool), Ok(ParamValue::Bool(false)));
        assert!(ParamValue::from("maybe").coerce(ParamType::Bool).is_err());
    }

    #[test]
    fn test_text_rejects_numbers_and_blanks() {
        assert!(ParamValue::Int(3).coerce(ParamType::Text).is_err());
        assert!(ParamValue::from("   ").coerce(ParamType::Text).is_err());
    }

    #[test]
    fn test_untagged_json_shapes() {
        let values: BTreeMap<String, ParamValue> =
            serde_json::from_str(r#"{"limit": 5, "collection": "order", "ascending": false}"#)
                .unwrap();
        assert_eq!(values["limit"], ParamValue::Int(5));
        assert_eq!(values["collection"], ParamValue::from("order"));
        assert_eq!(values["ascending"], ParamValue::Bool(false));
    }

    #[test]
    fn test_fill_missing_keeps_existing() {
        let mut params = ToolParams::new().with("limit", 3);
        params.fill_missing(&ToolParams::new().with("limit", 10).with("entity", "product"));
        assert_eq!(params.int("limit"), Some(3));
        assert_eq!(params.text("entity"), Some("product"));
    }
}
