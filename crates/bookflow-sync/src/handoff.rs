use std::collections::{HashMap, HashSet};
use std::fmt;

use bookflow_core::BookRecord;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Fixed identifiers of the pipeline steps within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    FetchBookData,
    NormalizeBookData,
    InsertBookData,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchBookData => "fetch_book_data",
            Self::NormalizeBookData => "normalize_book_data",
            Self::InsertBookData => "insert_book_data",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandoffError {
    #[error("step {consumer} already read the output of {producer} in this run")]
    AlreadyConsumed { producer: StepId, consumer: StepId },
}

/// Per-run step outputs keyed by producing step. Each consumer may read a
/// given producer's output once.
#[derive(Debug, Default)]
pub struct Handoff {
    slots: HashMap<StepId, Vec<BookRecord>>,
    reads: HashSet<(StepId, StepId)>,
}

impl Handoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, producer: StepId, records: Vec<BookRecord>) {
        if self.slots.insert(producer, records).is_some() {
            warn!(%producer, "replacing earlier output of step in this run");
        }
    }

    /// `Ok(None)` means the producer never pushed anything.
    pub fn pull(
        &mut self,
        producer: StepId,
        consumer: StepId,
    ) -> Result<Option<Vec<BookRecord>>, HandoffError> {
        if !self.reads.insert((producer, consumer)) {
            return Err(HandoffError::AlreadyConsumed { producer, consumer });
        }
        Ok(self.slots.get(&producer).cloned())
    }
}
