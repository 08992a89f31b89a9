//! Surfaces durable-vs-in-flight byte counts to the caller (spec §4.7),
//! ported from `original_source/reporter.go`.

use std::collections::HashMap;
use std::sync::Arc;

/// One file currently tracked by a [`Report`]: its path and declared size.
#[derive(Debug, Clone)]
pub struct TrackedFile {
    pub id: u64,
    pub path: String,
    pub size: u64,
}

/// A snapshot of transfer progress, handed to the [`Reporter`] callback
/// whenever durable byte totals change.
#[derive(Debug, Clone, Default)]
pub struct Report {
    in_transfer: HashMap<u64, TrackedFile>,
    finished: HashMap<u64, TrackedFile>,
    durable: u64,
    total: u64,
}

impl Report {
    pub fn durable(&self) -> u64 {
        self.durable
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn in_transfer(&self) -> &HashMap<u64, TrackedFile> {
        &self.in_transfer
    }

    pub fn finished(&self) -> &HashMap<u64, TrackedFile> {
        &self.finished
    }

    pub(crate) fn begin_transfer(&mut self, file: TrackedFile) {
        self.total += file.size;
        self.in_transfer.insert(file.id, file);
    }

    pub(crate) fn advance_durable(&mut self, bytes: u64) {
        self.durable += bytes;
    }

    /// Moves a file's bytes from in-flight to finished, as a successful
    /// flush does (spec §4.6 "Failure semantics").
    pub(crate) fn finish_transfer(&mut self, id: u64) {
        if let Some(file) = self.in_transfer.remove(&id) {
            self.finished.insert(id, file);
        }
    }
}

/// Invoked whenever [`Report`] byte totals change.
pub type Reporter = Arc<dyn Fn(&Report) + Send + Sync>;
