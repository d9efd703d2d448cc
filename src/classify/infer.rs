//! Parameter inference from question wording.
//!
//! Fills in what the winning strategy did not supply. Never overwrites a
//! parameter that is already present.

use crate::registry::{ToolKind, ToolParams};

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|w| w == word || w.strip_suffix('s') == Some(word))
}

fn has_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| has_word(text, w))
}

fn infer_collection(text: &str) -> &'static str {
    if has_any(text, &["category", "categorie"]) {
        "category"
    } else if has_any(text, &["product", "item"]) {
        "product"
    } else if has_any(text, &["customer", "client", "buyer", "user"]) {
        "customer"
    } else {
        "order"
    }
}

fn infer_field(text: &str, collection: &str) -> &'static str {
    if has_word(text, "delivery") || has_word(text, "shipping") {
        "delivery_charge"
    } else if has_word(text, "subtotal") {
        "subtotal"
    } else if has_word(text, "quantity") {
        "quantity"
    } else if collection == "product" || has_word(text, "price") {
        "price"
    } else {
        "grand_total"
    }
}

fn infer_group_by(text: &str) -> Option<&'static str> {
    const BUCKETS: &[(&[&str], &str)] = &[
        (&["monthly", "month"], "month"),
        (&["weekly", "week"], "week"),
        (&["daily", "day"], "day"),
        (&["yearly", "annual", "year"], "year"),
    ];
    let grouped = text.contains(" by ") || text.contains(" per ") || text.contains(" each ");
    for (words, unit) in BUCKETS {
        if has_word(text, words[0]) || (grouped && has_any(text, words)) {
            return Some(unit);
        }
    }
    if !grouped {
        return None;
    }
    if text.contains("payment") {
        Some("payment_status")
    } else if has_word(text, "status") {
        Some("status")
    } else if has_word(text, "category") || text.contains("categories") {
        Some("category_id")
    } else {
        None
    }
}

fn infer_sort_by(text: &str, collection: &str) -> &'static str {
    if has_any(text, &["recent", "latest", "newest", "oldest"]) {
        "created_at"
    } else if collection == "product"
        || has_any(text, &["price", "expensive", "cheapest", "priciest"])
    {
        "price"
    } else {
        "grand_total"
    }
}

fn infer_metric(text: &str) -> &'static str {
    let product = has_any(text, &["product", "item"]);
    if product && has_word(text, "revenue") {
        "total_revenue"
    } else if product || has_any(text, &["sold", "selling", "quantity"]) {
        "total_quantity"
    } else if text.contains("most orders") || text.contains("order count") {
        "order_count"
    } else {
        "total_spent"
    }
}

/// Fill parameters of `kind` that `params` lacks using `text`, which should
/// already be normalized.
pub fn infer_params(kind: ToolKind, text: &str, params: &mut ToolParams) {
    if kind.accepts("collection") && !params.contains("collection") {
        params.set("collection", infer_collection(text));
    }
    let collection = params.text("collection").unwrap_or("order").to_string();

    match kind {
        ToolKind::SumField | ToolKind::AverageField => {
            params.set_default("field", infer_field(text, &collection));
            if let Some(group_by) = infer_group_by(text) {
                params.set_default("group_by", group_by);
            }
        }
        ToolKind::GroupAndCount => {
            params.set_default("group_by", infer_group_by(text).unwrap_or("status"));
        }
        ToolKind::TopNByField => {
            params.set_default("sort_by", infer_sort_by(text, &collection));
            if has_any(text, &["cheapest", "lowest", "smallest", "oldest"]) {
                params.set_default("ascending", true);
            }
        }
        ToolKind::TopEntitiesByAggregate => {
            params.set_default("metric", infer_metric(text));
        }
        ToolKind::FindRecords => {
            if has_any(text, &["recent", "latest", "newest"]) {
                params.set_default("sort_by", "created_at");
            }
        }
        ToolKind::CountRecords | ToolKind::DateRangeFilter => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inferred(kind: ToolKind, text: &str) -> ToolParams {
        let mut params = ToolParams::new();
        infer_params(kind, text, &mut params);
        params
    }

    #[test]
    fn test_average_order_value_by_month() {
        let params = inferred(ToolKind::AverageField, "average order value by month");
        assert_eq!(params.text("collection"), Some("order"));
        assert_eq!(params.text("field"), Some("grand_total"));
        assert_eq!(params.text("group_by"), Some("month"));
    }

    #[test]
    fn test_group_and_count_defaults_to_status() {
        let params = inferred(ToolKind::GroupAndCount, "break down my orders");
        assert_eq!(params.text("group_by"), Some("status"));

        let params = inferred(ToolKind::GroupAndCount, "orders by payment status");
        assert_eq!(params.text("group_by"), Some("payment_status"));
    }

    #[test]
    fn test_cheapest_products_ascending() {
        let params = inferred(ToolKind::TopNByField, "cheapest products");
        assert_eq!(params.text("collection"), Some("product"));
        assert_eq!(params.text("sort_by"), Some("price"));
        assert_eq!(params.bool("ascending"), Some(true));
    }

    #[test]
    fn test_metric_follows_wording() {
        let params = inferred(ToolKind::TopEntitiesByAggregate, "which items sold the most");
        assert_eq!(params.text("metric"), Some("total_quantity"));
        assert!(!params.contains("collection"));

        let params = inferred(ToolKind::TopEntitiesByAggregate, "customers with the most orders");
        assert_eq!(params.text("metric"), Some("order_count"));
    }

    #[test]
    fn test_existing_params_are_kept() {
        let mut params = ToolParams::new()
            .with("collection", "order")
            .with("field", "delivery_charge");
        infer_params(ToolKind::SumField, "total product revenue", &mut params);
        assert_eq!(params.text("collection"), Some("order"));
        assert_eq!(params.text("field"), Some("delivery_charge"));
    }
}
