//! Top-N limits.

use std::sync::LazyLock;

use regex::Regex;

use crate::predicate::Predicate;

pub const MAX_LIMIT: u32 = 1000;

static LEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:top|first|best|bottom|worst|limit)\s+(\d{1,4})\b").unwrap()
});

static TRAILING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d{1,4})\s+(?:best|top|most|highest|lowest|largest|biggest|latest|newest|recent|cheapest)\b",
    )
    .unwrap()
});

pub fn find_limits(text: &str) -> Vec<(usize, Predicate)> {
    LEADING_RE
        .captures_iter(text)
        .chain(TRAILING_RE.captures_iter(text))
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let value: u32 = caps[1].parse().ok()?;
            (1..=MAX_LIMIT)
                .contains(&value)
                .then_some((start, Predicate::Limit { value }))
        })
        .collect()
}
