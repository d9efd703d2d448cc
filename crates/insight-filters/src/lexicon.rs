//! Exact keyword lexicon for equality predicates (order status and similar).

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::predicate::Predicate;

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("lexicon has no entries")]
    Empty,

    #[error("keyword {0:?} is listed twice")]
    Duplicate(String),

    #[error("failed to compile lexicon pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// One keyword and the equality it implies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub keyword: String,
    pub field: String,
    pub value: String,
}

impl LexiconEntry {
    pub fn new(keyword: &str, field: &str, value: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Order statuses recognised in questions.
pub const DEFAULT_STATUS_KEYWORDS: &[(&str, &str)] = &[
    ("pending", "Pending"),
    ("paid", "Paid"),
    ("unpaid", "Unpaid"),
    ("confirmed", "Confirmed"),
    ("processing", "Processing"),
    ("shipped", "Shipped"),
    ("delivered", "Delivered"),
    ("canceled", "Canceled"),
    ("cancelled", "Canceled"),
    ("refunded", "Refunded"),
    ("returned", "Returned"),
];

static DEFAULT_LEXICON: LazyLock<Lexicon> = LazyLock::new(|| {
    let entries = DEFAULT_STATUS_KEYWORDS
        .iter()
        .map(|(keyword, value)| LexiconEntry::new(keyword, "status", value))
        .collect();
    Lexicon::with_entries(entries).unwrap()
});

/// Word-boundary keyword matcher. Matching is exact: no stemming or typo
/// tolerance.
#[derive(Debug, Clone)]
pub struct Lexicon {
    by_keyword: HashMap<String, LexiconEntry>,
    pattern: Regex,
}

impl Lexicon {
    pub fn with_entries(entries: Vec<LexiconEntry>) -> Result<Self, LexiconError> {
        if entries.is_empty() {
            return Err(LexiconError::Empty);
        }

        let mut by_keyword = HashMap::with_capacity(entries.len());
        for entry in entries {
            if by_keyword.contains_key(&entry.keyword) {
                return Err(LexiconError::Duplicate(entry.keyword));
            }
            by_keyword.insert(entry.keyword.clone(), entry);
        }

        // Longest first so multi-word keywords win over their prefixes.
        let mut keywords: Vec<&String> = by_keyword.keys().collect();
        keywords.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"\b(?:{alternation})\b"))?;

        Ok(Self {
            by_keyword,
            pattern,
        })
    }

    pub fn default_status() -> &'static Lexicon {
        &DEFAULT_LEXICON
    }

    pub fn len(&self) -> usize {
        self.by_keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_keyword.is_empty()
    }

    /// Find every keyword in lowercased `text`, keyed by byte offset.
    pub fn find_all(&self, text: &str) -> Vec<(usize, Predicate)> {
        self.pattern
            .find_iter(text)
            .filter_map(|m| {
                let entry = self.by_keyword.get(m.as_str())?;
                Some((
                    m.start(),
                    Predicate::Equals {
                        field: entry.field.clone(),
                        value: entry.value.clone(),
                    },
                ))
            })
            .collect()
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        DEFAULT_LEXICON.clone()
    }
}
