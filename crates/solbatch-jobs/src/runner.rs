//! Checkpointed, bounded-concurrency job runner
//!
//! # Model
//!
//! - Work set: `discovered - failed - succeeded`, in key order. Items with a
//!   recorded outcome are never dispatched again until an operator clears
//!   the failures.
//! - A fixed number of slots; each in-flight item owns one slot.
//! - Worker tasks send `(key, slot, outcome)` over a channel to one
//!   aggregating loop, which owns the job records and the checkpoint.
//! - A worker panic becomes a `Failed` outcome for that item.
//!
//! # Flush points
//!
//! The checkpoint is rewritten every `flush_every` recorded outcomes, on
//! normal completion, after a cancellation drain, and when the run is torn
//! down by a fault in the loop itself.
//!
//! # Cancellation
//!
//! Once the signal fires no further item is dispatched. Items already in
//! flight run to completion but their outcomes are discarded, so they are
//! retried on the next run rather than recorded with an ambiguous result.
//! A failed checkpoint write stops dispatch the same way; in-flight items
//! are drained before the error is returned.

use crate::cancel::CancelSignal;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::JobError;
use crate::state::{JobRecord, JobStatus};
use crate::worker::{Outcome, Worker};
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Default number of recorded outcomes between flushes
pub const DEFAULT_FLUSH_EVERY: usize = 16;

/// Counters and failures from one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Distinct items discovered
    pub discovered: usize,
    /// Items skipped because they already succeeded
    pub skipped_succeeded: usize,
    /// Items skipped because they already failed
    pub skipped_failed: usize,
    /// Items handed to a worker in this run
    pub dispatched: usize,
    /// Items recorded as succeeded in this run
    pub succeeded: usize,
    /// Items recorded as failed in this run, with detail
    pub failures: BTreeMap<String, String>,
    /// Items that finished after cancellation and were not recorded
    pub abandoned: usize,
    /// Items never dispatched because of cancellation
    pub not_started: usize,
    /// Whether the run was cancelled
    pub cancelled: bool,
}

impl RunSummary {
    /// Items recorded as failed in this run
    #[inline]
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Resumable runner over one checkpoint
#[derive(Debug, Clone)]
pub struct JobRunner {
    store: CheckpointStore,
    concurrency: usize,
    flush_every: usize,
}

impl JobRunner {
    /// Create a runner with `concurrency` slots
    ///
    /// # Errors
    /// Returns `JobError::ZeroConcurrency` if `concurrency` is zero.
    pub fn new(store: CheckpointStore, concurrency: usize) -> Result<Self, JobError> {
        if concurrency == 0 {
            return Err(JobError::ZeroConcurrency);
        }
        Ok(Self {
            store,
            concurrency,
            flush_every: DEFAULT_FLUSH_EVERY,
        })
    }

    /// Flush after every `n` recorded outcomes (minimum 1)
    #[must_use]
    pub fn with_flush_every(mut self, n: usize) -> Self {
        self.flush_every = n.max(1);
        self
    }

    /// Backing checkpoint store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Number of slots
    #[inline]
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Clear recorded failures so the next run retries them
    ///
    /// # Errors
    /// Returns `JobError::Checkpoint` if the checkpoint cannot be read or written.
    pub fn retry_failed(&self) -> Result<usize, JobError> {
        let mut checkpoint = self.store.load()?;
        let cleared = checkpoint.clear_failures();
        if cleared > 0 {
            self.store.save(&checkpoint)?;
        }
        tracing::info!(cleared, path = %self.store.failed_path().display(), "cleared failed items");
        Ok(cleared)
    }

    /// Process every discovered item that has no recorded outcome
    ///
    /// # Errors
    /// Returns `JobError::Checkpoint` if the checkpoint cannot be loaded or
    /// flushed. In-flight items finish before the error is returned.
    /// Per-item failures are recorded, never returned.
    pub async fn run_all<I, W>(
        &self,
        discovered: I,
        worker: Arc<W>,
        mut cancel: CancelSignal,
    ) -> Result<RunSummary, JobError>
    where
        I: IntoIterator<Item = String>,
        W: Worker,
    {
        let checkpoint = self.store.load()?;
        let discovered: BTreeSet<String> = discovered.into_iter().collect();

        let mut summary = RunSummary {
            discovered: discovered.len(),
            skipped_succeeded: discovered
                .iter()
                .filter(|k| checkpoint.succeeded.contains(*k))
                .count(),
            skipped_failed: discovered
                .iter()
                .filter(|k| checkpoint.failed.contains_key(*k))
                .count(),
            ..RunSummary::default()
        };
        let mut queue: VecDeque<String> = checkpoint.remaining(discovered).into();
        let total = queue.len();

        tracing::info!(
            discovered = summary.discovered,
            skipped_succeeded = summary.skipped_succeeded,
            skipped_failed = summary.skipped_failed,
            remaining = total,
            concurrency = self.concurrency,
            "starting run"
        );

        let mut ledger = Ledger::new(self.store.clone(), checkpoint, self.flush_every);
        let mut records: HashMap<String, JobRecord> = HashMap::new();
        let mut free_slots: Vec<usize> = (0..self.concurrency).rev().collect();
        let mut tasks = JoinSet::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, usize, Outcome)>();
        let mut fault: Option<JobError> = None;

        loop {
            while fault.is_none() && !summary.cancelled && !cancel.is_cancelled() && !free_slots.is_empty() {
                let Some(key) = queue.pop_front() else { break };
                let Some(slot) = free_slots.pop() else { break };

                let mut record = JobRecord::pending(key.clone());
                if let Err(e) = record.transition(JobStatus::Dispatched) {
                    fault = Some(e);
                    free_slots.push(slot);
                    queue.push_front(key);
                    break;
                }
                records.insert(key.clone(), record);
                summary.dispatched += 1;
                tracing::debug!(item = %key, slot, "dispatched");

                let worker = Arc::clone(&worker);
                let tx = tx.clone();
                tasks.spawn(async move {
                    let outcome = AssertUnwindSafe(worker.run(&key, slot))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Outcome::Failed(panic_detail(&*panic)));
                    // The receiver outlives every task; a send error means
                    // the run is being torn down.
                    let _ = tx.send((key, slot, outcome));
                });
            }

            if records.is_empty() {
                break;
            }

            tokio::select! {
                () = cancel.cancelled(), if !summary.cancelled => {
                    summary.cancelled = true;
                    tracing::warn!(in_flight = records.len(), "cancellation requested; draining");
                }
                Some((key, slot, outcome)) = rx.recv() => {
                    free_slots.push(slot);
                    let Some(record) = records.remove(&key) else {
                        fault.get_or_insert(JobError::UnknownItem(key));
                        continue;
                    };

                    if fault.is_some() || summary.cancelled || cancel.is_cancelled() {
                        summary.abandoned += 1;
                        tracing::info!(item = %key, "finished after run stopped; not recorded");
                        continue;
                    }

                    if let Err(e) = settle(record, outcome, &mut ledger, &mut summary) {
                        tracing::error!(item = %key, error = %e, "recording failed; draining in-flight items");
                        fault = Some(e);
                        continue;
                    }

                    let done = summary.succeeded + summary.failed();
                    if done % self.flush_every == 0 || done == total {
                        tracing::info!(done, total, failed = summary.failed(), "progress");
                    }
                }
                else => break,
            }
        }

        // Reap finished tasks so none outlive the run.
        while tasks.join_next().await.is_some() {}

        summary.cancelled |= cancel.is_cancelled();
        summary.not_started = queue.len();
        if let Some(e) = fault {
            tracing::error!(
                error = %e,
                succeeded = summary.succeeded,
                abandoned = summary.abandoned,
                not_started = summary.not_started,
                "run stopped by a fault"
            );
            return Err(e);
        }
        ledger.close()?;

        tracing::info!(
            dispatched = summary.dispatched,
            succeeded = summary.succeeded,
            failed = summary.failed(),
            abandoned = summary.abandoned,
            not_started = summary.not_started,
            cancelled = summary.cancelled,
            "run finished"
        );
        Ok(summary)
    }
}

/// Move one finished item to its terminal state and record it
fn settle(
    mut record: JobRecord,
    outcome: Outcome,
    ledger: &mut Ledger,
    summary: &mut RunSummary,
) -> Result<(), JobError> {
    match outcome {
        Outcome::Succeeded => {
            record.transition(JobStatus::Succeeded)?;
            summary.succeeded += 1;
            tracing::debug!(item = %record.key, "succeeded");
        }
        Outcome::Failed(detail) => {
            record.transition(JobStatus::Failed(detail.clone()))?;
            tracing::warn!(item = %record.key, %detail, "failed");
            summary.failures.insert(record.key.clone(), detail);
        }
    }
    ledger.record(&record)
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("worker panicked: {message}")
}

/// Owns the in-memory checkpoint and decides when it reaches disk
///
/// Dropping an unclosed ledger with unflushed outcomes writes them, so a
/// fault that unwinds the run loop still checkpoints.
struct Ledger {
    store: CheckpointStore,
    checkpoint: Checkpoint,
    flush_every: usize,
    unflushed: usize,
    closed: bool,
}

impl Ledger {
    fn new(store: CheckpointStore, checkpoint: Checkpoint, flush_every: usize) -> Self {
        Self {
            store,
            checkpoint,
            flush_every,
            unflushed: 0,
            closed: false,
        }
    }

    fn record(&mut self, record: &JobRecord) -> Result<(), JobError> {
        match &record.status {
            JobStatus::Succeeded => self.checkpoint.record_success(&record.key),
            JobStatus::Failed(detail) => self.checkpoint.record_failure(&record.key, detail.as_str()),
            other => {
                return Err(JobError::IllegalTransition {
                    key: record.key.clone(),
                    from: other.clone(),
                    to: other.clone(),
                })
            }
        }
        self.unflushed += 1;
        if self.unflushed >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), JobError> {
        self.store.save(&self.checkpoint)?;
        tracing::debug!(
            succeeded = self.checkpoint.succeeded.len(),
            failed = self.checkpoint.failed.len(),
            "checkpoint flushed"
        );
        self.unflushed = 0;
        Ok(())
    }

    fn close(mut self) -> Result<(), JobError> {
        self.closed = true;
        self.flush()
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        if self.closed || self.unflushed == 0 {
            return;
        }
        match self.store.save(&self.checkpoint) {
            Ok(()) => tracing::warn!(unflushed = self.unflushed, "run aborted; checkpoint flushed"),
            Err(e) => tracing::error!(error = %e, "run aborted; checkpoint flush failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::worker::FnWorker;
    use pretty_assertions::assert_eq;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let store = CheckpointStore::with_paths("v.json", "f.json");
        assert!(matches!(JobRunner::new(store, 0), Err(JobError::ZeroConcurrency)));
    }

    #[tokio::test]
    async fn records_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "run");
        let runner = JobRunner::new(store.clone(), 2).unwrap();
        let worker = Arc::new(FnWorker::new(|item: String, _slot: usize| async move {
            if item.starts_with("bad") {
                Outcome::failed(format!("{item} broke"))
            } else {
                Outcome::Succeeded
            }
        }));

        let summary = runner
            .run_all(keys(&["good1", "bad1", "good2"]), worker, CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed(), 1);
        let checkpoint = store.load().unwrap();
        assert_eq!(checkpoint.succeeded.len(), 2);
        assert_eq!(checkpoint.failed.get("bad1").map(String::as_str), Some("bad1 broke"));
    }

    #[tokio::test]
    async fn slots_are_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(CheckpointStore::new(dir.path(), "run"), 3).unwrap();
        let busy = Arc::new(std::sync::Mutex::new(BTreeSet::new()));
        let seen = Arc::clone(&busy);
        let worker = Arc::new(FnWorker::new(move |_item: String, slot: usize| {
            let busy = Arc::clone(&seen);
            async move {
                assert!(slot < 3);
                assert!(busy.lock().unwrap().insert(slot), "slot {slot} reused while busy");
                tokio::task::yield_now().await;
                busy.lock().unwrap().remove(&slot);
                Outcome::Succeeded
            }
        }));

        let items: Vec<String> = (0..20).map(|i| format!("item{i:02}")).collect();
        let summary = runner.run_all(items, worker, CancelSignal::never()).await.unwrap();
        assert_eq!(summary.succeeded, 20);
        assert!(busy.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_dispatches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(CheckpointStore::new(dir.path(), "run"), 2).unwrap();
        let (token, signal) = CancelToken::new();
        token.cancel();
        let worker = Arc::new(FnWorker::new(|_: String, _: usize| async { Outcome::Succeeded }));

        let summary = runner.run_all(keys(&["a", "b"]), worker, signal).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.dispatched, 0);
        assert_eq!(summary.not_started, 2);
    }

    #[test]
    fn dropped_ledger_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "fault");
        {
            let mut ledger = Ledger::new(store.clone(), Checkpoint::default(), 100);
            let mut record = JobRecord::pending("a");
            record.transition(JobStatus::Dispatched).unwrap();
            record.transition(JobStatus::Succeeded).unwrap();
            ledger.record(&record).unwrap();
        }
        assert!(store.load().unwrap().succeeded.contains("a"));
    }

    #[test]
    fn ledger_rejects_non_terminal_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::new(CheckpointStore::new(dir.path(), "x"), Checkpoint::default(), 1);
        assert!(ledger.record(&JobRecord::pending("a")).is_err());
    }

    #[test]
    fn panic_detail_reads_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_detail(&*payload), "worker panicked: boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_detail(&*payload), "worker panicked: bang");
    }
}
