//! Persisting finished runs without stalling a frame.
//!
//! The Game Over scene hands its frozen [`RunSnapshot`] to a
//! [`ResultSubmitter`]. The bridge turns it into a ledger entry, writes it on a
//! worker thread and reports the outcome through an observable status that
//! the overlay reads. A failed write keeps the entry so it can be retried
//! as-is.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dungeon_engine::{run_off_thread, Observable, TurnQueue};
use run_ledger::{append_entry_reporting, AppendOutcome, LedgerError, RunEntry};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::state::RunSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum SubmissionStatus {
    #[default]
    Idle,
    Pending,
    Submitted(String),
    Failed(String),
}

#[derive(Debug, Error)]
pub(crate) enum SubmitError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("failed to start submission worker: {0}")]
    Worker(#[source] io::Error),
}

pub(crate) trait ResultSubmitter {
    /// Starts persisting `run`. The outcome lands in [`Self::status`] on a
    /// later turn. Submitting a run that was already accepted is a no-op.
    fn submit(&self, run: &RunSnapshot);
    /// Resubmits the last run after a failure. Returns false when there is
    /// nothing to retry.
    fn retry(&self) -> bool;
    fn status(&self) -> Observable<SubmissionStatus>;
    /// Applies finished attempts. Called once per turn.
    fn poll(&self);
}

/// Durable storage for run entries. Runs on a worker thread.
pub(crate) trait RecordStore: Send + Sync {
    fn store(&self, entry: &RunEntry) -> Result<AppendOutcome, SubmitError>;
}

#[derive(Debug, Clone)]
pub(crate) struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RecordStore for LedgerStore {
    fn store(&self, entry: &RunEntry) -> Result<AppendOutcome, SubmitError> {
        let (outcome, malformed) = append_entry_reporting(&self.path, entry)?;
        for skipped in malformed {
            warn!(
                path = %self.path.display(),
                line = skipped.line,
                message = %skipped.message,
                "ledger_line_skipped"
            );
        }
        Ok(outcome)
    }
}

/// The record is stamped with the run's end time, so building it twice for
/// the same run yields the same id.
pub(crate) fn build_entry(player: &str, run: &RunSnapshot) -> RunEntry {
    let mut entry = RunEntry {
        id: String::new(),
        player: player.to_string(),
        score: run.score,
        level: run.level,
        duration_ms: u64::try_from(run.duration.as_millis()).unwrap_or(u64::MAX),
        rounds: run.rounds,
        recorded_at_ms: run.ended_at_ms,
    };
    entry.id = record_id(&entry);
    entry
}

pub(crate) fn record_id(entry: &RunEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.canonical_text().as_bytes());
    to_hex_lower(&hasher.finalize())
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

type AttemptResult = (u64, String, Result<AppendOutcome, SubmitError>);

pub(crate) struct SubmissionBridge {
    player: String,
    store: Arc<dyn RecordStore>,
    status: Observable<SubmissionStatus>,
    last_entry: RefCell<Option<RunEntry>>,
    attempt: Cell<u64>,
    results: TurnQueue<AttemptResult>,
}

impl fmt::Debug for SubmissionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionBridge")
            .field("player", &self.player)
            .field("status", &self.status)
            .field("attempt", &self.attempt.get())
            .finish()
    }
}

impl SubmissionBridge {
    pub(crate) fn new(player: impl Into<String>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            player: player.into(),
            store,
            status: Observable::new(SubmissionStatus::Idle),
            last_entry: RefCell::new(None),
            attempt: Cell::new(0),
            results: TurnQueue::new(),
        }
    }

    pub(crate) fn player(&self) -> &str {
        &self.player
    }

    fn start_attempt(&self, entry: RunEntry) {
        let attempt = self.attempt.get() + 1;
        self.attempt.set(attempt);
        self.status.set(SubmissionStatus::Pending);
        info!(record_id = %entry.id, attempt, "submission_started");

        let store = Arc::clone(&self.store);
        let spawned = run_off_thread("run-submit", self.results.sender(), move || {
            let outcome = store.store(&entry);
            (attempt, entry.id, outcome)
        });
        if let Err(error) = spawned {
            let error = SubmitError::Worker(error);
            warn!(error = %error, "submission_failed");
            self.status.set(SubmissionStatus::Failed(error.to_string()));
        }
    }
}

impl ResultSubmitter for SubmissionBridge {
    fn submit(&self, run: &RunSnapshot) {
        let entry = build_entry(&self.player, run);
        let already_accepted = self
            .last_entry
            .borrow()
            .as_ref()
            .is_some_and(|last| last.id == entry.id);
        if already_accepted {
            debug!(record_id = %entry.id, "submission_already_accepted");
            return;
        }
        *self.last_entry.borrow_mut() = Some(entry.clone());
        self.start_attempt(entry);
    }

    fn retry(&self) -> bool {
        if !matches!(self.status.get(), SubmissionStatus::Failed(_)) {
            return false;
        }
        let Some(entry) = self.last_entry.borrow().clone() else {
            return false;
        };
        self.start_attempt(entry);
        true
    }

    fn status(&self) -> Observable<SubmissionStatus> {
        self.status.clone()
    }

    fn poll(&self) {
        for (attempt, record_id, outcome) in self.results.drain() {
            if attempt != self.attempt.get() {
                continue;
            }
            match outcome {
                Ok(outcome) => {
                    info!(record_id = %record_id, outcome = ?outcome, "submission_completed");
                    self.status.set(SubmissionStatus::Submitted(record_id));
                }
                Err(error) => {
                    warn!(record_id = %record_id, error = %error, "submission_failed");
                    self.status.set(SubmissionStatus::Failed(error.to_string()));
                }
            }
        }
    }
}
