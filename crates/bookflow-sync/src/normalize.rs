use std::collections::HashSet;
use std::num::NonZeroUsize;

use bookflow_core::BookRecord;
use tracing::{debug, info};

/// Dedups by title (first occurrence wins), cuts fields to their column
/// limits, and keeps at most `limit` records. Input order is preserved.
///
/// Titles are compared after truncation so that two long titles sharing
/// their first 200 chars cannot both reach the table.
pub fn normalize(
    records: impl IntoIterator<Item = BookRecord>,
    limit: NonZeroUsize,
) -> Vec<BookRecord> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut duplicates = 0usize;
    let mut over_limit = 0usize;

    for record in records {
        let record = record.truncated();
        if seen.contains(&record.title) {
            debug!(title = %record.title, "dropping duplicate title");
            duplicates += 1;
            continue;
        }
        if kept.len() == limit.get() {
            debug!(title = %record.title, limit = limit.get(), "dropping book over limit");
            over_limit += 1;
            continue;
        }
        seen.insert(record.title.clone());
        kept.push(record);
    }

    info!(
        kept = kept.len(),
        duplicates,
        over_limit,
        "final dataset ready for database insertion"
    );
    kept
}
