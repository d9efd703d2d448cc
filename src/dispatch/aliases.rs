//! Legacy and shorthand tool names accepted from rules and classifiers.

use crate::registry::{ToolKind, ToolParams};

/// `(alias, canonical tool, implied parameters)`.
const ALIASES: &[(&str, ToolKind, &[(&str, &str)])] = &[
    (
        "get_top_customer",
        ToolKind::TopEntitiesByAggregate,
        &[("entity", "customer"), ("metric", "total_spent")],
    ),
    (
        "get_top_customers_by_spending",
        ToolKind::TopEntitiesByAggregate,
        &[("entity", "customer"), ("metric", "total_spent")],
    ),
    (
        "get_best_selling_products",
        ToolKind::TopEntitiesByAggregate,
        &[("entity", "product"), ("metric", "total_quantity")],
    ),
    ("count_documents", ToolKind::CountRecords, &[]),
    ("calculate_sum", ToolKind::SumField, &[]),
    ("calculate_average", ToolKind::AverageField, &[]),
    ("get_top_n", ToolKind::TopNByField, &[]),
    ("get_date_range", ToolKind::DateRangeFilter, &[]),
    ("find_documents", ToolKind::FindRecords, &[]),
];

/// Resolve a canonical name or alias to its tool and the parameters the
/// alias implies. Matching ignores case and surrounding whitespace.
pub fn resolve(name: &str) -> Option<(ToolKind, ToolParams)> {
    let name = name.trim().to_lowercase();
    if let Some(kind) = ToolKind::from_name(&name) {
        return Some((kind, ToolParams::new()));
    }
    ALIASES
        .iter()
        .find(|(alias, _, _)| *alias == name)
        .map(|(_, kind, implied)| {
            let params = implied
                .iter()
                .fold(ToolParams::new(), |params, (key, value)| params.with(key, *value));
            (*kind, params)
        })
}

/// Canonical name for display, falling back to the raw name.
pub fn canonical_name(name: &str) -> String {
    resolve(name).map_or_else(|| name.to_string(), |(kind, _)| kind.name().to_string())
}

pub fn is_known(name: &str) -> bool {
    resolve(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names_resolve_to_themselves() {
        for kind in ToolKind::ALL {
            let (resolved, implied) = resolve(kind.name()).unwrap();
            assert_eq!(resolved, kind);
            assert!(implied.values().is_empty());
        }
    }

    #[test]
    fn test_alias_carries_implied_params() {
        let (kind, implied) = resolve(" Get_Best_Selling_Products ").unwrap();
        assert_eq!(kind, ToolKind::TopEntitiesByAggregate);
        assert_eq!(implied.text("entity"), Some("product"));
        assert_eq!(implied.text("metric"), Some("total_quantity"));
    }

    #[test]
    fn test_unknown_names() {
        assert!(resolve("delete_everything").is_none());
        assert_eq!(canonical_name("calculate_sum"), "sum_field");
        assert_eq!(canonical_name("mystery"), "mystery");
    }
}
