//! Background log writer & recovery policy (spec §4.6), ported from
//! `original_source/log.go`'s `Incremental`/`Differential` log builders
//! plus the commented-out `Store.Recover` sketch in
//! `original_source/bltfs.go`.
//!
//! The reference leaves the scheduler's concurrency shape unspecified
//! (spec §9 "Background task with a timer"); this implementation picks a
//! dedicated OS thread selecting between a policy timer and a mutation
//! queue, which needs no async runtime of its own.

use crate::error::Result;
use crate::index::entry::{Entry, ExtentRecord, Operation};
use crate::index::BinaryIndex;
use crate::options::RecoveryPolicy;
use crate::reporter::{Report, Reporter};
use crate::store::SynchronizedWriter;
use crossbeam_channel::{bounded, tick, Receiver, Select, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// One of the three tiers in the recovery chain (spec §3 "Log").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogClass {
    Inc,
    Diff,
    Full,
}

/// An on-tape change log record (spec §3 "Log"). `prev_block` chains to
/// the previous log of the same or a higher tier; `block` is this log's
/// own position, filled in once it has actually been written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    pub class: LogClass,
    pub prev_block: u64,
    pub block: u64,
    pub entries: Vec<Entry>,
    pub extents: Vec<ExtentRecord>,
}

impl Log {
    pub(crate) fn new(class: LogClass, prev_block: u64) -> Self {
        Self {
            class,
            prev_block,
            block: 0,
            entries: Vec::new(),
            extents: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: Entry, op: Operation) {
        let mut entry = entry;
        entry.operation = Some(op);
        self.entries.push(entry);
    }
}

/// A single mutation observed by the store, queued for the log writer.
pub enum Mutation {
    Entry { entry: Entry, op: Operation, bytes: u64 },
}

#[derive(Default)]
struct Tiers {
    prev_full_block: u64,
    prev_diff_block: u64,
    prev_inc_block: u64,
    bytes_since_full: u64,
    bytes_since_diff: u64,
    bytes_since_inc: u64,
}

/// Drives the FULL/DIFF/INC scheduler described in spec §4.6. Constructed
/// by [`LogWriter::spawn`], which hands back a [`Sender<Mutation>`] for
/// the store to push mutations into and a handle to join on shutdown.
pub struct LogWriter {
    handle: Option<JoinHandle<()>>,
    mutations: Sender<Mutation>,
    shutdown: Sender<()>,
}

impl LogWriter {
    pub fn spawn(
        rw: Arc<SynchronizedWriter>,
        index: Arc<BinaryIndex>,
        policy: RecoveryPolicy,
        reporter: Option<Reporter>,
        report: Arc<Mutex<Report>>,
    ) -> Self {
        let (mutation_tx, mutation_rx) = bounded::<Mutation>(256);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("bltfs-log-writer".to_string())
            .spawn(move || run(rw, index, policy, reporter, report, mutation_rx, shutdown_rx))
            .expect("failed to spawn log writer thread");

        Self {
            handle: Some(handle),
            mutations: mutation_tx,
            shutdown: shutdown_tx,
        }
    }

    /// Queue a mutation observed on the foreground path.
    pub fn notify(&self, mutation: Mutation) {
        if self.mutations.send(mutation).is_err() {
            warn!("log writer thread gone, dropping mutation");
        }
    }

    /// A cloneable handle to queue mutations, shared with `File` so writes
    /// can notify the log writer without going through `Store`.
    pub(crate) fn sender(&self) -> Sender<Mutation> {
        self.mutations.clone()
    }

    /// Signal the writer to stop and flush nothing further.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    rw: Arc<SynchronizedWriter>,
    index: Arc<BinaryIndex>,
    policy: RecoveryPolicy,
    reporter: Option<Reporter>,
    report: Arc<Mutex<Report>>,
    mutations: Receiver<Mutation>,
    shutdown: Receiver<()>,
) {
    let mut tiers = Tiers::default();
    let mut pending = Log::new(LogClass::Inc, tiers.prev_inc_block);
    let timer = tick(policy.full_interval);

    loop {
        let mut select = Select::new();
        let timer_idx = select.recv(&timer);
        let mutation_idx = select.recv(&mutations);
        let shutdown_idx = select.recv(&shutdown);

        let op = select.select();
        match op.index() {
            i if i == shutdown_idx => {
                let _ = op.recv(&shutdown);
                debug!("log writer shutting down");
                break;
            }
            i if i == timer_idx => {
                let _ = op.recv(&timer);
                if let Err(e) =
                    flush_full(&rw, &index, &mut tiers, &mut pending, &report, &reporter)
                {
                    error!(error = %e, "full index flush failed");
                }
            }
            i if i == mutation_idx => {
                match op.recv(&mutations) {
                    Ok(Mutation::Entry { entry, op, bytes }) => {
                        pending.record(entry, op);
                        tiers.bytes_since_inc += bytes;
                        tiers.bytes_since_diff += bytes;
                        tiers.bytes_since_full += bytes;

                        if tiers.bytes_since_diff >= policy.differential_after {
                            if let Err(e) = flush_diff(
                                &rw,
                                &index,
                                &mut tiers,
                                &mut pending,
                                &report,
                                &reporter,
                            ) {
                                error!(error = %e, "differential flush failed");
                            }
                        } else if tiers.bytes_since_inc >= policy.incremental_after {
                            if let Err(e) =
                                flush_inc(&rw, &mut tiers, &mut pending, &report, &reporter)
                            {
                                error!(error = %e, "incremental flush failed");
                            }
                        }
                    }
                    Err(_) => {
                        debug!("mutation channel closed");
                        break;
                    }
                }
            }
            _ => unreachable!(),
        }
    }
}

/// Writes `log`'s record block preceded and followed by a filemark (spec
/// §3 "Binary log record"), and returns the tape block the record itself
/// landed on — the same address `recover_chain` later `locate`s to via
/// `prev_block`. The leading filemark is what makes a plain `space_fmb(2)`
/// from EOD land exactly on the most recently written record: the first
/// filemark found walking backward is always the trailing FM of the last
/// log, and the second is that same log's own leading FM.
fn write_log(rw: &SynchronizedWriter, log: &Log) -> Result<u64> {
    rw.write_filemark(1)?;
    let block = rw.read_position()?;
    let bytes = bincode::serialize(log)?;
    rw.write(&bytes)?;
    rw.write_filemark(1)?;
    Ok(block)
}

fn notify_reporter(reporter: &Option<Reporter>, report: &Arc<Mutex<Report>>) {
    if let Some(reporter) = reporter {
        let snapshot = report.lock().unwrap().clone();
        reporter(&snapshot);
    }
}

fn flush_inc(
    rw: &SynchronizedWriter,
    tiers: &mut Tiers,
    pending: &mut Log,
    report: &Arc<Mutex<Report>>,
    reporter: &Option<Reporter>,
) -> Result<()> {
    pending.prev_block = tiers.prev_inc_block;
    let block = write_log(rw, pending)?;
    tiers.prev_inc_block = block;
    tiers.bytes_since_inc = 0;

    {
        let mut r = report.lock().unwrap();
        r.advance_durable(bincode::serialize(pending).map(|b| b.len() as u64).unwrap_or(0));
    }
    notify_reporter(reporter, report);

    *pending = Log::new(LogClass::Inc, tiers.prev_inc_block);
    info!(block, "flushed incremental log");
    Ok(())
}

fn flush_diff(
    rw: &SynchronizedWriter,
    index: &BinaryIndex,
    tiers: &mut Tiers,
    pending: &mut Log,
    report: &Arc<Mutex<Report>>,
    reporter: &Option<Reporter>,
) -> Result<()> {
    // Flush the subordinate incremental first (spec §4.6 "Rolling DIFF/FULL").
    if !pending.entries.is_empty() {
        flush_inc(rw, tiers, pending, report, reporter)?;
    }

    let mut diff = Log::new(LogClass::Diff, tiers.prev_diff_block);
    diff.entries.push(index.marshal()?);

    let block = write_log(rw, &diff)?;
    tiers.prev_diff_block = block;
    tiers.bytes_since_diff = 0;

    notify_reporter(reporter, report);
    info!(block, "flushed differential log");
    Ok(())
}

fn flush_full(
    rw: &SynchronizedWriter,
    index: &BinaryIndex,
    tiers: &mut Tiers,
    pending: &mut Log,
    report: &Arc<Mutex<Report>>,
    reporter: &Option<Reporter>,
) -> Result<()> {
    // Flush the subordinate incremental first (spec §4.6 "Rolling DIFF/FULL"),
    // same precedent as `flush_diff`.
    if !pending.entries.is_empty() {
        flush_inc(rw, tiers, pending, report, reporter)?;
    }

    let mut full = Log::new(LogClass::Full, tiers.prev_full_block);
    full.entries.push(index.marshal()?);

    let block = write_log(rw, &full)?;
    tiers.prev_full_block = block;
    tiers.prev_diff_block = block;
    tiers.prev_inc_block = block;
    tiers.bytes_since_full = 0;
    tiers.bytes_since_diff = 0;
    tiers.bytes_since_inc = 0;

    notify_reporter(reporter, report);
    info!(block, "flushed full index");
    Ok(())
}

/// Recovery (spec §4.6, §8 scenario 5): scan backward from EOD on the
/// data partition collecting INCs until a DIFF or FULL is hit. `flush_diff`
/// and `flush_full` both stash a complete `index.marshal()` snapshot in
/// `entries`, not a delta, so whichever of the two is hit first already
/// carries the full state as of that log; only the INCs after it still
/// need replaying on top.
pub fn recover_chain(rw: &SynchronizedWriter) -> Result<Vec<Log>> {
    let mut chain = Vec::new();

    // Two filemarks back from EOD, not one: the nearest filemark is the
    // trailing FM of the last log already written, directly adjacent to
    // EOD, so spacing past only it is a no-op. The second FM back is the
    // one that terminates the second-to-last log, and stepping past it
    // lands on the start of the last log's data block (same convention
    // `Store::read_ltfs_index` uses to find the latest index generation).
    rw.locate(1, u64::MAX)?;
    rw.space_fmb(2)?;

    loop {
        let buf = rw.read_file()?;
        let log: Log = bincode::deserialize(&buf)?;

        let class = log.class;
        chain.push(log);

        if class == LogClass::Full || class == LogClass::Diff {
            break;
        }

        let prev = chain.last().unwrap().prev_block;
        rw.locate(1, prev)?;
    }

    chain.reverse();
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    #[test]
    fn log_records_operation_tag() {
        let mut log = Log::new(LogClass::Inc, 0);
        let entry = Entry {
            id: 1,
            name: "a".to_string(),
            create_time: 0,
            change_time: 0,
            modify_time: 0,
            access_time: 0,
            backup_time: 0,
            readonly: false,
            payload: crate::index::entry::Payload::File {
                length: 0,
                extents: vec![],
            },
            operation: None,
        };

        log.record(entry, Operation::Add);
        assert_eq!(log.entries[0].operation, Some(Operation::Add));
    }

    fn test_entry(id: u64, name: &str) -> Entry {
        Entry {
            id,
            name: name.to_string(),
            create_time: 0,
            change_time: 0,
            modify_time: 0,
            access_time: 0,
            backup_time: 0,
            readonly: false,
            payload: crate::index::entry::Payload::File {
                length: 0,
                extents: vec![],
            },
            operation: None,
        }
    }

    /// Spec §8 end-to-end scenario #5: write a FULL, a couple of INCs, a
    /// DIFF (which, like FULL, carries a complete marshaled snapshot — see
    /// `flush_diff`), then a trailing INC. A backward scan from EOD should
    /// stop at the DIFF without walking past it to the FULL, since the
    /// DIFF already has everything the FULL had plus the intervening
    /// changes; only the trailing INC still needs replaying on top.
    #[test]
    fn recovery_chain_stops_at_nearest_snapshot() {
        let tape_dir = tempfile::tempdir().unwrap();
        let mut backend = crate::backend::FileBackend::open(tape_dir.path()).unwrap();
        backend.load().unwrap();
        backend.set_partition(1).unwrap();
        let rw = SynchronizedWriter::for_test(Box::new(backend));

        let mut tiers = Tiers::default();

        let mut full = Log::new(LogClass::Full, tiers.prev_full_block);
        full.entries.push(test_entry(1, "a.txt"));
        let block = write_log(&rw, &full).unwrap();
        tiers.prev_full_block = block;
        tiers.prev_diff_block = block;
        tiers.prev_inc_block = block;

        for (id, name) in [(2, "b.txt"), (3, "c.txt")] {
            let mut inc = Log::new(LogClass::Inc, tiers.prev_inc_block);
            inc.record(test_entry(id, name), Operation::Add);
            let block = write_log(&rw, &inc).unwrap();
            tiers.prev_inc_block = block;
        }

        let mut diff = Log::new(LogClass::Diff, tiers.prev_diff_block);
        diff.entries.push(test_entry(1, "a.txt"));
        diff.entries.push(test_entry(2, "b.txt"));
        diff.entries.push(test_entry(3, "c.txt"));
        let block = write_log(&rw, &diff).unwrap();
        tiers.prev_diff_block = block;
        tiers.prev_inc_block = block;

        let mut inc = Log::new(LogClass::Inc, tiers.prev_inc_block);
        inc.record(test_entry(4, "d.txt"), Operation::Add);
        write_log(&rw, &inc).unwrap();

        let chain = recover_chain(&rw).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].class, LogClass::Diff);
        assert_eq!(chain[0].entries.len(), 3);
        assert_eq!(chain[1].class, LogClass::Inc);
        assert_eq!(chain[1].entries[0].name, "d.txt");
    }

    /// A lone FULL with nothing written before it must still be reachable:
    /// `space_fmb(2)` from EOD lands on its data block by consuming the
    /// FULL's own leading filemark as the "second" one found.
    #[test]
    fn recovery_chain_recovers_single_full() {
        let tape_dir = tempfile::tempdir().unwrap();
        let mut backend = crate::backend::FileBackend::open(tape_dir.path()).unwrap();
        backend.load().unwrap();
        backend.set_partition(1).unwrap();
        let rw = SynchronizedWriter::for_test(Box::new(backend));

        let mut full = Log::new(LogClass::Full, 0);
        full.entries.push(test_entry(1, "a.txt"));
        write_log(&rw, &full).unwrap();

        let chain = recover_chain(&rw).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].class, LogClass::Full);
        assert_eq!(chain[0].entries[0].name, "a.txt");
    }
}
