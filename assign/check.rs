//! The seam for consistency checking.
//!
//! A consistency checker repairs implausible answer combinations (a male record answering a
//! pregnancy question, say) before inference. The rule set itself lives outside this crate;
//! the pipeline only needs the cleaned record and a description of what changed.

use crate::types::Record;

/// Changes made to one record, split by the checker's two passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLog {
    pub first_pass: Vec<String>,
    pub second_pass: Vec<String>,
}

impl ChangeLog {
    pub fn is_empty(&self) -> bool {
        self.first_pass.is_empty() && self.second_pass.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub cleaned: Record,
    pub log: ChangeLog,
}

/// Repairs a record before it is scored.
///
/// Implementations run on worker threads and must not keep per-record state between calls;
/// everything they learn about a record goes into the returned [`ChangeLog`].
pub trait ConsistencyChecker: Send + Sync {
    fn check(&self, record: &Record) -> CheckOutcome;
}

/// Returns every record unchanged with an empty change log.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughChecker;

impl ConsistencyChecker for PassThroughChecker {
    fn check(&self, record: &Record) -> CheckOutcome {
        CheckOutcome {
            cleaned: record.clone(),
            log: ChangeLog::default(),
        }
    }
}
