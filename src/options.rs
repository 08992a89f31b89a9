//! Store configuration (spec §4.5 "Options"), ported from
//! `original_source/options.go`'s functional-options into an idiomatic
//! Rust builder.

use crate::reporter::Reporter;
use std::time::Duration;

/// Schedules the log writer's FULL/DIFF/INC cadence (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct RecoveryPolicy {
    pub full_interval: Duration,
    pub differential_after: u64,
    pub incremental_after: u64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            full_interval: Duration::from_secs(60 * 60),
            differential_after: u64::MAX,
            incremental_after: u64::MAX,
        }
    }
}

const DEFAULT_BLOCK_SIZE: u64 = 512 * 1024;

/// Store-wide options, built with [`StoreOptions::builder`].
#[derive(Clone)]
pub struct StoreOptions {
    pub block_size: u64,
    pub recovery_policy: RecoveryPolicy,
    pub reporter: Option<Reporter>,
    /// Assume the file-emulated backend: no real ioctl paths are attempted.
    pub filedebug: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            recovery_policy: RecoveryPolicy::default(),
            reporter: None,
            filedebug: false,
        }
    }
}

impl StoreOptions {
    pub fn builder() -> StoreOptionsBuilder {
        StoreOptionsBuilder::default()
    }
}

#[derive(Default)]
pub struct StoreOptionsBuilder {
    opts: StoreOptions,
}

impl StoreOptionsBuilder {
    pub fn block_size(mut self, block_size: u64) -> Self {
        self.opts.block_size = block_size;
        self
    }

    pub fn recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.opts.recovery_policy = policy;
        self
    }

    pub fn reporter(mut self, reporter: Reporter) -> Self {
        self.opts.reporter = Some(reporter);
        self
    }

    pub fn filedebug(mut self) -> Self {
        self.opts.filedebug = true;
        self
    }

    pub fn build(self) -> StoreOptions {
        self.opts
    }
}

/// Per-`open`/`create` options (spec §4.5), ported from `fileOptions`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOptions {
    /// Disable batching of index mutations for this handle's writes.
    pub no_batch: bool,
}

impl FileOptions {
    pub fn builder() -> FileOptionsBuilder {
        FileOptionsBuilder::default()
    }
}

#[derive(Default)]
pub struct FileOptionsBuilder {
    opts: FileOptions,
}

impl FileOptionsBuilder {
    pub fn no_batch(mut self) -> Self {
        self.opts.no_batch = true;
        self
    }

    pub fn build(self) -> FileOptions {
        self.opts
    }
}
