//! Combines the individual recognisers into one pass over a question.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::lexicon::Lexicon;
use crate::limit::find_limits;
use crate::numeric::find_comparisons;
use crate::predicate::{Predicate, PredicateSet};
use crate::time::find_time_ranges;

/// Field names and vocabularies the extractor targets.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Field numeric comparisons apply to when no hint word is present.
    pub amount_field: String,
    /// Field time windows apply to.
    pub date_field: String,
    /// `(word, field)` pairs that redirect a nearby comparison.
    pub field_hints: Vec<(String, String)>,
    pub lexicon: Lexicon,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            amount_field: "grand_total".to_string(),
            date_field: "created_at".to_string(),
            field_hints: vec![
                ("delivery".to_string(), "delivery_charge".to_string()),
                ("shipping".to_string(), "delivery_charge".to_string()),
                ("subtotal".to_string(), "subtotal".to_string()),
            ],
            lexicon: Lexicon::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn with_amount_field(mut self, field: impl Into<String>) -> Self {
        self.amount_field = field.into();
        self
    }

    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = field.into();
        self
    }

    pub fn with_field_hint(mut self, word: impl Into<String>, field: impl Into<String>) -> Self {
        self.field_hints.push((word.into().to_lowercase(), field.into()));
        self
    }

    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }
}

/// Turns free text into a [`PredicateSet`].
///
/// Extraction is total: text that matches nothing yields an empty set and
/// fragments that fail to parse are skipped.
#[derive(Debug, Clone, Default)]
pub struct FilterExtractor {
    config: ExtractorConfig,
}

impl FilterExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn extract(&self, text: &str, now: DateTime<Utc>) -> PredicateSet {
        let lowered = text.to_lowercase();

        let mut found: Vec<(usize, Predicate)> = Vec::new();
        found.extend(find_time_ranges(&lowered, now, &self.config.date_field));
        found.extend(find_comparisons(
            &lowered,
            &self.config.amount_field,
            &self.config.field_hints,
        ));
        found.extend(self.config.lexicon.find_all(&lowered));
        found.extend(find_limits(&lowered));

        // Stable: equal offsets keep recogniser order.
        found.sort_by_key(|(pos, _)| *pos);

        let set: PredicateSet = found.into_iter().map(|(_, p)| p).collect();
        debug!(predicates = set.len(), "extracted filters");
        set
    }
}
