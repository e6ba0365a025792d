//! Core book record model and storage field limits for bookflow.

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "bookflow-core";

pub const TITLE_MAX_CHARS: usize = 200;
pub const AUTHOR_MAX_CHARS: usize = 200;
pub const PRICE_MAX_CHARS: usize = 50;
pub const RATING_MAX_CHARS: usize = 50;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
pub const PRICE_FREE: &str = "Free";
pub const NOT_AVAILABLE: &str = "N/A";

/// One book as it flows from the catalog into the `book` table.
///
/// `title` is the natural key. `author` is a comma-joined author list,
/// `price` is `"<amount> <currency>"`, `"Free"` or `"N/A"`, and `rating` is
/// `"<score>/5 (<count> reviews)"` or `"N/A"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookRecord {
    pub title: String,
    pub author: String,
    pub price: String,
    pub rating: String,
}

impl BookRecord {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        price: impl Into<String>,
        rating: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            price: price.into(),
            rating: rating.into(),
        }
    }

    /// Returns a copy with every field cut to its column limit.
    pub fn truncated(&self) -> Self {
        Self {
            title: truncate_chars(&self.title, TITLE_MAX_CHARS),
            author: truncate_chars(&self.author, AUTHOR_MAX_CHARS),
            price: truncate_chars(&self.price, PRICE_MAX_CHARS),
            rating: truncate_chars(&self.rating, RATING_MAX_CHARS),
        }
    }

    pub fn within_limits(&self) -> bool {
        self.title.chars().count() <= TITLE_MAX_CHARS
            && self.author.chars().count() <= AUTHOR_MAX_CHARS
            && self.price.chars().count() <= PRICE_MAX_CHARS
            && self.rating.chars().count() <= RATING_MAX_CHARS
    }
}

/// Cuts `value` to at most `max_chars` chars, never splitting a code point.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}

/// Outcome of one persistence batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistSummary {
    pub inserted_or_updated: usize,
    pub failed: usize,
}
