//! In-memory request status table.
//!
//! Each record moves `Processing -> Completed | Failed` exactly once and a
//! terminal record is handed out by exactly one poll. Records live in a
//! sharded [`DashMap`] so unrelated requests never contend on one lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use classpilot_server::DocumentKind;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Processing,
    Completed { text: String },
    Failed { message: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub kind: DocumentKind,
    pub state: JobState,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// What a single poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    NotFound,
    Processing,
    Completed { kind: DocumentKind, text: String },
    Failed { kind: DocumentKind, message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobTrackerError {
    #[error("request `{id}` not found")]
    NotFound { id: String },
    #[error("request `{id}` already finished")]
    AlreadyFinished { id: String },
}

#[derive(Debug, Default)]
pub struct JobTracker {
    records: DashMap<String, JobRecord>,
    next_seq: AtomicU64,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh `<kind>_<n>` id and records it as processing.
    pub fn register(&self, kind: DocumentKind) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}_{seq}", kind.id_prefix());
        let now = current_timestamp_ms();
        let previous = self.records.insert(
            id.clone(),
            JobRecord {
                kind,
                state: JobState::Processing,
                created_at_ms: now,
                updated_at_ms: now,
            },
        );
        debug_assert!(previous.is_none(), "request ids are never reused");
        tracing::debug!(request_id = %id, %kind, "request registered");
        id
    }

    pub fn complete(&self, id: &str, text: String) -> Result<(), JobTrackerError> {
        self.finish(id, JobState::Completed { text })
    }

    pub fn fail(&self, id: &str, message: String) -> Result<(), JobTrackerError> {
        self.finish(id, JobState::Failed { message })
    }

    fn finish(&self, id: &str, state: JobState) -> Result<(), JobTrackerError> {
        debug_assert!(state.is_terminal());
        match self.records.entry(id.to_string()) {
            Entry::Vacant(_) => Err(JobTrackerError::NotFound { id: id.to_string() }),
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if record.state.is_terminal() {
                    return Err(JobTrackerError::AlreadyFinished { id: id.to_string() });
                }
                record.state = state;
                record.updated_at_ms = current_timestamp_ms();
                Ok(())
            }
        }
    }

    /// Terminal records are removed by the poll that observes them.
    pub fn poll(&self, id: &str) -> JobOutcome {
        if let Some((_, record)) = self.records.remove_if(id, |_, record| record.state.is_terminal())
        {
            return match record.state {
                JobState::Completed { text } => JobOutcome::Completed {
                    kind: record.kind,
                    text,
                },
                JobState::Failed { message } => JobOutcome::Failed {
                    kind: record.kind,
                    message,
                },
                JobState::Processing => JobOutcome::Processing,
            };
        }

        match self.records.get(id) {
            Some(_) => JobOutcome::Processing,
            None => JobOutcome::NotFound,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn processing_count(&self) -> usize {
        self.records
            .iter()
            .filter(|entry| !entry.value().state.is_terminal())
            .count()
    }

    /// Drops every record and returns how many were discarded.
    pub fn clear(&self) -> usize {
        let discarded = self.records.len();
        self.records.clear();
        discarded
    }

    /// Removes terminal records last updated before `cutoff_ms`.
    pub fn evict_finished_before(&self, cutoff_ms: i64) -> Vec<String> {
        let candidates: Vec<String> = self
            .records
            .iter()
            .filter(|entry| {
                let record = entry.value();
                record.state.is_terminal() && record.updated_at_ms < cutoff_ms
            })
            .map(|entry| entry.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter(|id| {
                self.records
                    .remove_if(id, |_, record| {
                        record.state.is_terminal() && record.updated_at_ms < cutoff_ms
                    })
                    .is_some()
            })
            .collect()
    }

    #[cfg(test)]
    fn backdate(&self, id: &str, updated_at_ms: i64) {
        if let Some(mut record) = self.records.get_mut(id) {
            record.updated_at_ms = updated_at_ms;
        }
    }
}

pub(crate) fn current_timestamp_ms() -> i64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    since_epoch.as_millis() as i64
}
