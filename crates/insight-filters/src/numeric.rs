//! Numeric comparisons on monetary fields.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::predicate::{NumericRange, Predicate};

const NUMBER: &str = r"(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?(k)?";

static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\bbetween\s+\$?\s*{NUMBER}\s+(?:and|to)\s+\$?\s*{NUMBER}"
    ))
    .unwrap()
});

static COMPARISON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:\b(no more than|more than|greater than|exceeding|over|above|at least|minimum of|minimum|less than|under|below|at most|up to)\b|(>=|<=|>|<))\s*\$?\s*{NUMBER}"
    ))
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "more than" | "greater than" | "exceeding" | "over" | "above" | ">" => Op::Gt,
            "at least" | "minimum" | "minimum of" | ">=" => Op::Gte,
            "less than" | "under" | "below" | "<" => Op::Lt,
            "at most" | "up to" | "no more than" | "<=" => Op::Lte,
            _ => return None,
        })
    }

    fn range(self, value: f64) -> NumericRange {
        match self {
            Op::Gt => NumericRange::gt(value),
            Op::Gte => NumericRange::gte(value),
            Op::Lt => NumericRange::lt(value),
            Op::Lte => NumericRange::lte(value),
        }
    }
}

/// Parse a number captured as (integer part, fraction, k-suffix) starting at
/// capture group `first`.
fn parse_amount(caps: &Captures<'_>, first: usize) -> Option<f64> {
    let whole = caps.get(first)?.as_str().replace(',', "");
    let fraction = caps.get(first + 1).map_or("", |m| m.as_str());
    let mut value: f64 = format!("{whole}{fraction}").parse().ok()?;
    if caps.get(first + 2).is_some() {
        value *= 1000.0;
    }
    value.is_finite().then_some(value)
}

/// A trailing `-` or `/` means the digits belong to a date, not an amount.
fn looks_like_date(text: &str, end: usize) -> bool {
    matches!(text[end..].chars().next(), Some('-') | Some('/'))
}

/// Pick the field a comparison applies to from the words that precede it.
fn field_for<'a>(segment: &str, hints: &'a [(String, String)], default: &'a str) -> &'a str {
    hints
        .iter()
        .filter_map(|(word, field)| segment.rfind(word.as_str()).map(|pos| (pos, field)))
        .max_by_key(|(pos, _)| *pos)
        .map_or(default, |(_, field)| field.as_str())
}

/// Find every numeric comparison in lowercased `text`, keyed by byte offset.
///
/// The field for each comparison is the last hint word found between the
/// previous comparison and this one, or `default_field`.
pub fn find_comparisons(
    text: &str,
    default_field: &str,
    hints: &[(String, String)],
) -> Vec<(usize, Predicate)> {
    let mut spans: Vec<(usize, usize, NumericRange)> = Vec::new();

    for caps in BETWEEN_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if looks_like_date(text, whole.end()) {
            continue;
        }
        if let (Some(low), Some(high)) = (parse_amount(&caps, 1), parse_amount(&caps, 4)) {
            spans.push((whole.start(), whole.end(), NumericRange::between(low, high)));
        }
    }

    for caps in COMPARISON_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if looks_like_date(text, whole.end()) {
            continue;
        }
        if spans
            .iter()
            .any(|(start, end, _)| whole.start() < *end && *start < whole.end())
        {
            continue;
        }
        let keyword = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        let (Some(op), Some(value)) = (keyword.and_then(Op::from_keyword), parse_amount(&caps, 3))
        else {
            continue;
        };
        spans.push((whole.start(), whole.end(), op.range(value)));
    }

    spans.sort_by_key(|(start, _, _)| *start);

    let mut previous_end = 0;
    spans
        .into_iter()
        .map(|(start, end, range)| {
            let segment = &text[previous_end..start];
            let field = field_for(segment, hints, default_field).to_string();
            previous_end = end;
            (start, Predicate::Numeric { field, range })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Bound;

    fn hints() -> Vec<(String, String)> {
        vec![
            ("delivery".to_string(), "delivery_charge".to_string()),
            ("subtotal".to_string(), "subtotal".to_string()),
        ]
    }

    fn ranges(text: &str) -> Vec<(String, NumericRange)> {
        find_comparisons(text, "grand_total", &hints())
            .into_iter()
            .map(|(_, p)| match p {
                Predicate::Numeric { field, range } => (field, range),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_keywords_map_to_operators() {
        let found = ranges("orders over $100 and under $900");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].1, NumericRange::gt(100.0));
        assert_eq!(found[1].1, NumericRange::lt(900.0));

        assert_eq!(ranges("at least 50")[0].1, NumericRange::gte(50.0));
        assert_eq!(ranges("no more than 20")[0].1, NumericRange::lte(20.0));
        assert_eq!(ranges("total >= 10")[0].1, NumericRange::gte(10.0));
    }

    #[test]
    fn test_amount_formats() {
        assert_eq!(ranges("over $1,250.50")[0].1, NumericRange::gt(1250.5));
        assert_eq!(ranges("above 2k")[0].1, NumericRange::gt(2000.0));
    }

    #[test]
    fn test_between_is_inclusive() {
        let found = ranges("orders between $100 and $500");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.lower, Some(Bound::inclusive(100.0)));
        assert_eq!(found[0].1.upper, Some(Bound::inclusive(500.0)));
    }

    #[test]
    fn test_field_hints_apply_per_clause() {
        let found = ranges("orders over $100 with delivery charge under $10");
        assert_eq!(found[0].0, "grand_total");
        assert_eq!(found[1].0, "delivery_charge");
    }

    #[test]
    fn test_dates_are_not_amounts() {
        assert!(ranges("orders between 2024-01-01 and 2024-02-01").is_empty());
        assert!(ranges("placed after over 2024-01-01").is_empty());
    }
}
