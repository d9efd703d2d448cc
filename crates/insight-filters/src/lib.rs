//! Predicate extraction for shop analytics questions.
//!
//! Parses the filter-bearing parts of a natural-language question (time
//! windows, amount comparisons, status keywords and top-N limits) into a
//! typed [`PredicateSet`]. The crate has no knowledge of tools, stores or
//! tenants; callers decide how predicates map onto a query.
//!
//! ```
//! use chrono::Utc;
//! use insight_filters::extract;
//!
//! let set = extract("top 3 pending orders over $100", Utc::now());
//! assert_eq!(set.limit(), Some(3));
//! assert_eq!(set.equals("status"), Some("Pending"));
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Utc};

pub mod extractor;
pub mod lexicon;
pub mod limit;
pub mod numeric;
pub mod predicate;
pub mod time;

pub use extractor::{ExtractorConfig, FilterExtractor};
pub use lexicon::{Lexicon, LexiconEntry, LexiconError};
pub use predicate::{Bound, NumericRange, Predicate, PredicateSet, DEFAULT_LIMIT};
pub use time::days_back_window;

static DEFAULT_EXTRACTOR: LazyLock<FilterExtractor> = LazyLock::new(FilterExtractor::default);

/// Extract predicates with the default shop vocabulary.
pub fn extract(text: &str, now: DateTime<Utc>) -> PredicateSet {
    DEFAULT_EXTRACTOR.extract(text, now)
}
