//! Bag-of-words similarity fallback.
//!
//! Scores the question against example phrasings per tool with cosine
//! similarity over word counts. Cheap, deterministic and offline, which makes
//! it the default fallback.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::fallback::{Candidate, ClassifierVerdict, FallbackClassifier};
use crate::dispatch::aliases;
use crate::error::RulesError;
use crate::registry::ParamValue;

const BUILTIN_EXAMPLES: &str = include_str!("../../config/similarity_examples.yaml");

pub const DEFAULT_MIN_SIMILARITY: f64 = 0.65;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "my", "me", "i", "is", "are", "do", "does", "did", "to",
    "for", "what", "please", "can", "you", "show",
];

fn default_min_similarity() -> f64 {
    DEFAULT_MIN_SIMILARITY
}

#[derive(Debug, Deserialize)]
struct ExampleFile {
    #[serde(default = "default_min_similarity")]
    min_similarity: f64,
    groups: Vec<ExampleGroup>,
}

#[derive(Debug, Deserialize)]
struct ExampleGroup {
    tool: String,
    #[serde(default)]
    params: BTreeMap<String, ParamValue>,
    examples: Vec<String>,
}

#[derive(Debug, Clone)]
struct Example {
    group: usize,
    vector: HashMap<String, f64>,
    norm: f64,
}

#[derive(Debug, Clone)]
struct Group {
    tool: String,
    params: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone)]
pub struct SimilarityClassifier {
    groups: Vec<Group>,
    examples: Vec<Example>,
    min_similarity: f64,
}

impl SimilarityClassifier {
    pub fn builtin() -> Result<Self, RulesError> {
        Self::from_yaml(BUILTIN_EXAMPLES)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, RulesError> {
        let file: ExampleFile = serde_yaml::from_str(yaml)?;
        let mut groups = Vec::with_capacity(file.groups.len());
        let mut examples = Vec::new();

        for (index, group) in file.groups.into_iter().enumerate() {
            if !aliases::is_known(&group.tool) {
                return Err(RulesError::UnknownTool {
                    index,
                    tool: group.tool,
                });
            }
            for text in &group.examples {
                let vector = bag_of_words(text);
                let norm = norm(&vector);
                if norm > 0.0 {
                    examples.push(Example {
                        group: index,
                        vector,
                        norm,
                    });
                }
            }
            groups.push(Group {
                tool: group.tool,
                params: group.params,
            });
        }

        Ok(Self {
            groups,
            examples,
            min_similarity: file.min_similarity,
        })
    }

    pub fn with_min_similarity(mut self, min_similarity: f64) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// Best `(group index, similarity)` among groups whose tool is a
    /// candidate.
    fn best_match(&self, question: &str, candidates: &[Candidate]) -> Option<(usize, f64)> {
        let query = bag_of_words(question);
        let query_norm = norm(&query);
        if query_norm == 0.0 {
            return None;
        }

        let allowed = |tool: &str| {
            candidates.is_empty()
                || candidates
                    .iter()
                    .any(|c| c.name == aliases::canonical_name(tool))
        };

        let mut best: Option<(usize, f64)> = None;
        for example in &self.examples {
            if !allowed(&self.groups[example.group].tool) {
                continue;
            }
            let dot: f64 = query
                .iter()
                .filter_map(|(word, weight)| example.vector.get(word).map(|w| w * weight))
                .sum();
            let score = dot / (query_norm * example.norm);
            if best.is_none_or(|(_, current)| score > current) {
                best = Some((example.group, score));
            }
        }
        best
    }
}

#[async_trait]
impl FallbackClassifier for SimilarityClassifier {
    async fn classify(
        &self,
        question: &str,
        candidates: &[Candidate],
    ) -> Result<Option<ClassifierVerdict>> {
        let Some((group, score)) = self.best_match(question, candidates) else {
            return Ok(None);
        };
        debug!(score, tool = %self.groups[group].tool, "best similarity match");
        if score < self.min_similarity {
            return Ok(None);
        }
        let group = &self.groups[group];
        Ok(Some(ClassifierVerdict {
            tool: group.tool.clone(),
            confidence: score,
            parameters: group.params.clone(),
        }))
    }

    fn name(&self) -> &str {
        "similarity"
    }
}

fn bag_of_words(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
    {
        *counts.entry(word.to_string()).or_insert(0.0) += 1.0;
    }
    counts
}

fn norm(vector: &HashMap<String, f64>) -> f64 {
    vector.values().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paraphrase_matches() {
        let classifier = SimilarityClassifier::builtin().unwrap();
        let verdict = classifier
            .classify("Which clients spent the most money?", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verdict.tool, "top_entities_by_aggregate");
        assert!(verdict.confidence >= DEFAULT_MIN_SIMILARITY);
        assert_eq!(
            verdict.parameters.get("metric"),
            Some(&ParamValue::Text("total_spent".into()))
        );
    }

    #[tokio::test]
    async fn test_gibberish_has_no_answer() {
        let classifier = SimilarityClassifier::builtin().unwrap();
        assert!(classifier.classify("asdkjhasd", &[]).await.unwrap().is_none());
        assert!(classifier.classify("???", &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_candidates_restrict_choice() {
        let classifier = SimilarityClassifier::builtin().unwrap();
        let only_count = [Candidate {
            name: "count_records",
            description: "",
        }];
        let verdict = classifier
            .classify("which customers spent the most money", &only_count)
            .await
            .unwrap();
        assert!(verdict.is_none_or(|v| v.tool == "count_records"));
    }

    #[test]
    fn test_unknown_tool_in_examples() {
        let yaml = "groups:\n  - tool: nope\n    examples: [hello]\n";
        assert!(SimilarityClassifier::from_yaml(yaml).is_err());
    }
}
