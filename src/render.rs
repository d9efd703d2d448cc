//! Natural-language rendering of raw results.

use anyhow::{Context, Result};
use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::{json, Value};

use crate::executor::{Document, RawResult};
use crate::registry::{ResultShape, ToolKind, ToolParams};

/// Turns a raw result into the answer text.
#[async_trait]
pub trait ResponseRenderer: Send + Sync {
    async fn render(
        &self,
        question: &str,
        tool: ToolKind,
        params: &ToolParams,
        result: &RawResult,
    ) -> Result<String>;
}

const TEMPLATES: &[(&str, &str)] = &[
    (
        "count_records",
        "You have {{number value}} {{noun}}{{filter_note}}.",
    ),
    (
        "sum_field",
        "{{#if grouped}}Total {{humanize field}} by {{humanize group_by}}{{filter_note}}:\n\
         {{#each rows}}- {{label}}: {{money value}}\n{{/each}}\
         {{else}}Total {{humanize field}}{{filter_note}}: {{money value}}.{{/if}}",
    ),
    (
        "average_field",
        "{{#if grouped}}Average {{humanize field}} by {{humanize group_by}}{{filter_note}}:\n\
         {{#each rows}}- {{label}}: {{money value}}\n{{/each}}\
         {{else}}Average {{humanize field}}{{filter_note}}: {{money value}}.{{/if}}",
    ),
    (
        "top_n_by_field",
        "{{#if ascending}}Lowest{{else}}Top{{/if}} {{count}} {{noun}} by {{humanize sort_by}}{{filter_note}}:\n\
         {{#each rows}}{{inc @index}}. {{label}}: {{#if ../money}}{{money value}}{{else}}{{value}}{{/if}}\n{{/each}}",
    ),
    (
        "group_and_count",
        "{{capitalize noun}} by {{humanize group_by}}{{filter_note}}:\n\
         {{#each rows}}- {{label}}: {{number value}}\n{{/each}}",
    ),
    (
        "date_range_filter",
        "Found {{count}} {{noun}}{{filter_note}}.\n\
         {{#each rows}}- {{label}}{{#if value}}: {{money value}}{{/if}}\n{{/each}}",
    ),
    (
        "top_entities_by_aggregate",
        "Top {{count}} {{noun}} by {{humanize metric}}{{filter_note}}:\n\
         {{#each rows}}{{inc @index}}. {{label}}: {{#if ../money}}{{money value}}{{else}}{{number value}}{{/if}}\n{{/each}}",
    ),
    (
        "find_records",
        "Here are {{count}} {{noun}}{{filter_note}}:\n\
         {{#each rows}}- {{label}}{{#if value}}: {{money value}}{{/if}}\n{{/each}}",
    ),
];

const EMPTY_TEMPLATE: &str = "I couldn't find any {{noun}}{{filter_note}}.";

/// Handlebars renderer with one template per tool.
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("money", Box::new(money_helper));
        handlebars.register_helper("number", Box::new(number_helper));
        handlebars.register_helper("humanize", Box::new(humanize_helper));
        handlebars.register_helper("capitalize", Box::new(capitalize_helper));
        handlebars.register_helper("inc", Box::new(inc_helper));

        for (name, template) in TEMPLATES {
            handlebars
                .register_template_string(name, template)
                .with_context(|| format!("invalid template for {name}"))?;
        }
        handlebars
            .register_template_string("empty", EMPTY_TEMPLATE)
            .context("invalid empty-result template")?;

        Ok(Self { handlebars })
    }

    /// Replace the template for `tool`.
    pub fn with_template(mut self, tool: ToolKind, template: &str) -> Result<Self> {
        self.handlebars
            .register_template_string(tool.name(), template)
            .with_context(|| format!("invalid template for {tool}"))?;
        Ok(self)
    }

    fn render_data(&self, tool: ToolKind, params: &ToolParams, result: &RawResult) -> Value {
        let collection = match tool {
            ToolKind::TopEntitiesByAggregate => params.text("entity").unwrap_or("customer"),
            _ => params.text("collection").unwrap_or("order"),
        };
        let field = params.text("field").unwrap_or("grand_total");
        let sort_by = params.text("sort_by");
        let metric = params.text("metric").unwrap_or("total_spent");

        let value_field = match tool {
            ToolKind::TopNByField => sort_by.unwrap_or("grand_total"),
            ToolKind::TopEntitiesByAggregate => metric,
            ToolKind::SumField => "total",
            ToolKind::AverageField => "average",
            ToolKind::GroupAndCount => "count",
            _ => amount_field(collection),
        };
        let money = match tool {
            ToolKind::TopEntitiesByAggregate => metric == "total_spent" || metric == "total_revenue",
            ToolKind::TopNByField => is_money_field(value_field),
            _ => true,
        };

        let rows: Vec<Value> = result
            .documents
            .iter()
            .map(|doc| {
                json!({
                    "label": row_label(doc, tool, collection),
                    "value": doc.get(value_field).cloned().unwrap_or(Value::Null),
                })
            })
            .collect();

        let filter_note = if params.filters().conditions().next().is_some() {
            " matching your filters"
        } else {
            ""
        };

        json!({
            "tool": tool.name(),
            "noun": noun(collection),
            "field": field,
            "group_by": params.text("group_by").unwrap_or_default(),
            "sort_by": sort_by.unwrap_or_default(),
            "metric": metric,
            "ascending": params.bool("ascending").unwrap_or(false),
            "grouped": result.shape == ResultShape::Grouped,
            "value": result.scalar().cloned().unwrap_or(json!(0)),
            "count": result.len(),
            "money": money,
            "rows": rows,
            "filter_note": filter_note,
        })
    }
}

#[async_trait]
impl ResponseRenderer for TemplateRenderer {
    async fn render(
        &self,
        _question: &str,
        tool: ToolKind,
        params: &ToolParams,
        result: &RawResult,
    ) -> Result<String> {
        let data = self.render_data(tool, params, result);
        let template = if result.is_empty() && tool != ToolKind::CountRecords {
            "empty"
        } else {
            tool.name()
        };
        let text = self
            .handlebars
            .render(template, &data)
            .with_context(|| format!("rendering {tool} answer"))?;
        Ok(text.trim_end().to_string())
    }
}

fn noun(collection: &str) -> &'static str {
    match collection {
        "order" => "orders",
        "product" => "products",
        "customer" => "customers",
        "category" => "categories",
        "order_product" => "order items",
        _ => "records",
    }
}

fn amount_field(collection: &str) -> &'static str {
    match collection {
        "product" | "order_product" => "price",
        _ => "grand_total",
    }
}

fn is_money_field(field: &str) -> bool {
    matches!(
        field,
        "grand_total" | "subtotal" | "delivery_charge" | "price" | "total_spent" | "total_revenue"
    )
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn row_label(doc: &Document, tool: ToolKind, collection: &str) -> String {
    if let Some(id) = doc.get("_id") {
        if tool == ToolKind::TopEntitiesByAggregate {
            let joined = doc
                .get(collection)
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .and_then(|e| e.get("name"))
                .and_then(text_of);
            if let Some(name) = joined {
                return name;
            }
        }
        return text_of(id).unwrap_or_else(|| "none".to_string());
    }

    let name = doc.get("name").and_then(text_of);
    let id = doc.get("id").and_then(text_of);
    let date = doc
        .get("created_at")
        .and_then(Value::as_str)
        .map(|s| s.chars().take(10).collect::<String>());
    match (name, id, date) {
        (Some(name), _, _) => name,
        (None, Some(id), Some(date)) => format!("#{id} on {date}"),
        (None, Some(id), None) => format!("#{id}"),
        (None, None, Some(date)) => date,
        (None, None, None) => "record".to_string(),
    }
}

/// `1234.5` as `1,234.50`.
pub fn format_money(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", group_thousands(cents / 100), cents % 100)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let n = value as i64;
        let sign = if n < 0 { "-" } else { "" };
        format!("{sign}{}", group_thousands(n.unsigned_abs()))
    } else {
        format_money(value)
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn param_f64(h: &handlebars::Helper) -> Option<f64> {
    let value = h.param(0)?.value();
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn money_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    match param_f64(h) {
        Some(v) => out.write(&format_money(v))?,
        None => out.write("n/a")?,
    }
    Ok(())
}

fn number_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    match param_f64(h) {
        Some(v) => out.write(&format_number(v))?,
        None => out.write("0")?,
    }
    Ok(())
}

fn humanize_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    let text = match param {
        "grand_total" => "order value".to_string(),
        "category_id" => "category".to_string(),
        other => other.replace('_', " "),
    };
    out.write(&text)?;
    Ok(())
}

fn capitalize_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    let mut chars = param.chars();
    if let Some(first) = chars.next() {
        out.write(&first.to_uppercase().collect::<String>())?;
        out.write(chars.as_str())?;
    }
    Ok(())
}

fn inc_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let n = h.param(0).and_then(|v| v.value().as_u64()).unwrap_or(0);
    out.write(&(n + 1).to_string())?;
    Ok(())
}
