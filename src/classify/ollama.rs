//! Fallback that asks a local Ollama model to pick the tool.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::fallback::{Candidate, ClassifierVerdict, FallbackClassifier};
use crate::config::FallbackConfig;
use crate::registry::ParamValue;

/// Confidence given to a verdict that does not state one.
pub const DEFAULT_LLM_CONFIDENCE: f64 = 0.7;

const PROMPT_TEMPLATE: &str = r#"Choose a tool for this shop analytics question: "{{question}}"

Tools:
{{#each candidates}}
- {{this.name}}: {{this.description}}
{{/each}}

Return JSON only:
{"tool": "tool_name", "confidence": 0.0, "parameters": {"collection": "order", "field": "grand_total", "group_by": "status", "sort_by": "field_name", "metric": "total_spent", "limit": 5}}

Example for "how many orders": {"tool": "count_records", "confidence": 0.9, "parameters": {"collection": "order"}}
Example for "total revenue": {"tool": "sum_field", "confidence": 0.9, "parameters": {"collection": "order", "field": "grand_total"}}
"#;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
    options: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaClassifier {
    client: reqwest::Client,
    host: String,
    model: String,
    handlebars: Handlebars<'static>,
}

impl OllamaClassifier {
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        Self {
            client: reqwest::Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
            model: model.into(),
            handlebars,
        }
    }

    pub fn from_config(config: &FallbackConfig) -> Self {
        Self::new(&config.ollama_host, &config.ollama_model)
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn prompt(&self, question: &str, candidates: &[Candidate]) -> Result<String> {
        self.handlebars
            .render_template(
                PROMPT_TEMPLATE,
                &json!({ "question": question, "candidates": candidates }),
            )
            .context("rendering classifier prompt")
    }
}

#[async_trait]
impl FallbackClassifier for OllamaClassifier {
    async fn classify(
        &self,
        question: &str,
        candidates: &[Candidate],
    ) -> Result<Option<ClassifierVerdict>> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: self.prompt(question, candidates)?,
            stream: false,
            format: "json",
            options: json!({ "temperature": 0.1 }),
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&request)
            .send()
            .await
            .context("calling Ollama")?
            .error_for_status()
            .context("Ollama returned an error status")?
            .json::<GenerateResponse>()
            .await
            .context("decoding Ollama response")?;

        debug!(model = %self.model, raw = %response.response, "ollama output");
        parse_verdict(&response.response, candidates)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Pull the JSON object out of model output, tolerating Markdown fences.
pub fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    match after.find("```") {
        Some(close) => after[..close].trim(),
        None => after.trim(),
    }
}

/// Interpret model output. A tool outside `candidates` (when given) is
/// treated as no answer.
pub fn parse_verdict(text: &str, candidates: &[Candidate]) -> Result<Option<ClassifierVerdict>> {
    let body = strip_fences(text);
    if body.is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(body).map_err(|e| anyhow!("unparseable model output: {e}"))?;

    let Some(tool) = value.get("tool").and_then(Value::as_str).map(str::trim) else {
        return Ok(None);
    };
    if tool.is_empty() || tool == "none" {
        return Ok(None);
    }
    if !candidates.is_empty()
        && !candidates
            .iter()
            .any(|c| c.name == crate::dispatch::aliases::canonical_name(tool))
    {
        debug!(tool, "model chose a tool outside the candidates");
        return Ok(None);
    }

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_LLM_CONFIDENCE);

    let mut parameters = BTreeMap::new();
    if let Some(Value::Object(map)) = value.get("parameters") {
        for (key, raw) in map {
            let key = match key.as_str() {
                "sum_field" | "avg_field" => "field",
                other => other,
            };
            if let Some(param) = ParamValue::from_json(raw) {
                parameters.insert(key.to_string(), param);
            }
        }
    }

    Ok(Some(ClassifierVerdict {
        tool: tool.to_string(),
        confidence,
        parameters,
    }))
}
