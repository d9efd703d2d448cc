//! Deterministic rule matcher.
//!
//! Rules come from a YAML catalog. A rule fires when any of its triggers
//! matches; a trigger is a conjunction of literal fragments, each matched on
//! word boundaries. Across all rules the trigger with the greatest total
//! literal length wins, and ties go to the rule declared first.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{ClassificationResult, StrategySource};
use crate::dispatch::aliases;
use crate::error::RulesError;
use crate::registry::{ParamValue, ToolParams};

const BUILTIN_RULES: &str = include_str!("../../config/classifier_rules.yaml");

fn default_confidence() -> f64 {
    0.9
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<RuleDef>,
}

#[derive(Debug, Deserialize)]
struct RuleDef {
    tool: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    params: BTreeMap<String, ParamValue>,
    triggers: Vec<TriggerDef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TriggerDef {
    Phrase(String),
    AllOf { all_of: Vec<String> },
}

impl TriggerDef {
    fn fragments(&self) -> Vec<String> {
        match self {
            TriggerDef::Phrase(p) => vec![p.clone()],
            TriggerDef::AllOf { all_of } => all_of.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Trigger {
    fragments: Vec<String>,
    patterns: Vec<Regex>,
    specificity: usize,
}

impl Trigger {
    fn matches(&self, text: &str) -> bool {
        self.patterns.iter().all(|p| p.is_match(text))
    }

    fn label(&self) -> String {
        self.fragments.join(" + ")
    }
}

#[derive(Debug, Clone)]
struct Rule {
    tool: String,
    confidence: f64,
    params: ToolParams,
    triggers: Vec<Trigger>,
}

/// Ordered, compiled rule catalog.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
}

impl RuleCatalog {
    /// The catalog shipped in `config/classifier_rules.yaml`.
    pub fn builtin() -> Result<Self, RulesError> {
        Self::from_yaml(BUILTIN_RULES)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, RulesError> {
        let file: RuleFile = serde_yaml::from_str(yaml)?;
        let mut rules = Vec::with_capacity(file.rules.len());

        for (index, def) in file.rules.into_iter().enumerate() {
            if !aliases::is_known(&def.tool) {
                return Err(RulesError::UnknownTool {
                    index,
                    tool: def.tool,
                });
            }
            if !(0.0..=1.0).contains(&def.confidence) {
                return Err(RulesError::InvalidConfidence {
                    index,
                    tool: def.tool,
                    confidence: def.confidence,
                });
            }

            let mut triggers = Vec::with_capacity(def.triggers.len());
            for trigger in &def.triggers {
                let fragments: Vec<String> = trigger
                    .fragments()
                    .iter()
                    .map(|f| match_text(f))
                    .filter(|f| !f.is_empty())
                    .collect();
                if fragments.is_empty() {
                    return Err(RulesError::EmptyTrigger {
                        index,
                        tool: def.tool.clone(),
                    });
                }
                let patterns = fragments
                    .iter()
                    .map(|f| {
                        Regex::new(&format!(r"\b{}\b", regex::escape(f))).map_err(|source| {
                            RulesError::Pattern {
                                fragment: f.clone(),
                                source,
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let specificity = fragments.iter().map(|f| f.chars().count()).sum();
                triggers.push(Trigger {
                    fragments,
                    patterns,
                    specificity,
                });
            }
            if triggers.is_empty() {
                return Err(RulesError::EmptyTrigger {
                    index,
                    tool: def.tool,
                });
            }

            rules.push(Rule {
                tool: def.tool,
                confidence: def.confidence,
                params: def.params.into_iter().collect(),
                triggers,
            });
        }

        debug!(rules = rules.len(), "compiled classifier rules");
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Best matching rule for already-normalized question text.
    pub fn classify(&self, normalized: &str) -> Option<ClassificationResult> {
        let text = match_text(normalized);
        let mut best: Option<(&Rule, &Trigger)> = None;

        for rule in &self.rules {
            for trigger in &rule.triggers {
                if !trigger.matches(&text) {
                    continue;
                }
                let better = best.is_none_or(|(_, current)| trigger.specificity > current.specificity);
                if better {
                    best = Some((rule, trigger));
                }
            }
        }

        best.map(|(rule, trigger)| ClassificationResult {
            tool: rule.tool.clone(),
            params: rule.params.clone(),
            confidence: rule.confidence,
            source: StrategySource::Deterministic,
            matched_trigger: Some(trigger.label()),
        })
    }
}

/// Lowercase, drop apostrophes, turn other punctuation into spaces and
/// collapse whitespace.
pub fn match_text(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
