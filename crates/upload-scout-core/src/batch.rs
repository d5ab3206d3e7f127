//! Batched delivery of scan results to a listener.
//!
//! The [`BatchEmitter`] sits between artifact extraction and the consumer.
//! It enforces the delivery contract of a scan:
//!
//! - `on_progress` once per visited directory, with a 1-based index that
//!   strictly increases.
//! - `on_batch_result` with exactly `batch_size` artifacts whenever that many
//!   are pending, plus one final call with the remainder. Never empty.
//! - `on_complete` exactly once, after the last batch, whatever the outcome.
//!
//! All callbacks run synchronously on the scanning task; a slow listener
//! stalls the scan.

use crate::models::UploadArtifact;

/// Consumer of scan progress and results.
pub trait ScanListener: Send + Sync {
    /// A directory has been visited (`processed` counts from 1 to `total`).
    fn on_progress(&self, directory: &str, processed: usize, total: usize);

    /// A batch of discovered artifacts; never empty.
    fn on_batch_result(&self, artifacts: &[UploadArtifact]);

    /// The scan attempt has ended. Called exactly once.
    fn on_complete(&self);
}

/// Accumulates artifacts and forwards them to a [`ScanListener`] in
/// fixed-size batches.
pub struct BatchEmitter<'a> {
    listener: &'a dyn ScanListener,
    batch_size: usize,
    pending: Vec<UploadArtifact>,
    total: usize,
    processed: usize,
    batches: usize,
    delivered: usize,
    cancelled: bool,
    completed: bool,
}

impl<'a> BatchEmitter<'a> {
    /// Create an emitter. A `batch_size` of zero is treated as one.
    pub fn new(listener: &'a dyn ScanListener, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            listener,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            total: 0,
            processed: 0,
            batches: 0,
            delivered: 0,
            cancelled: false,
            completed: false,
        }
    }

    pub fn set_total(&mut self, total: usize) {
        self.total = total;
    }

    /// Report that `directory` is being visited.
    pub fn progress(&mut self, directory: &str) {
        self.processed += 1;
        self.listener
            .on_progress(directory, self.processed, self.total);
    }

    /// Queue an artifact. When the queue reaches `batch_size`, the batch is
    /// handed to the listener and returned so the caller can persist it.
    pub fn push(&mut self, artifact: UploadArtifact) -> Option<Vec<UploadArtifact>> {
        if self.cancelled || self.completed {
            return None;
        }
        self.pending.push(artifact);
        if self.pending.len() < self.batch_size {
            return None;
        }
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        Some(self.deliver(batch))
    }

    /// Deliver whatever is pending as a final short batch.
    pub fn flush(&mut self) -> Option<Vec<UploadArtifact>> {
        if self.cancelled || self.completed || self.pending.is_empty() {
            return None;
        }
        let batch = std::mem::take(&mut self.pending);
        Some(self.deliver(batch))
    }

    /// Drop pending artifacts and suppress any further batch delivery.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.pending.clear();
    }

    /// Signal completion to the listener. Subsequent calls are no-ops.
    pub fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.listener.on_complete();
    }

    fn deliver(&mut self, batch: Vec<UploadArtifact>) -> Vec<UploadArtifact> {
        self.batches += 1;
        self.delivered += batch.len();
        self.listener.on_batch_result(&batch);
        batch
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Drop for BatchEmitter<'_> {
    fn drop(&mut self) {
        self.complete();
    }
}
