//! The store facade (spec §4.5): opens a volume on top of a ready
//! backend and routes mkdir/stat/open/copy through a synchronized
//! writer. Ported from `original_source/bltfs.go`, `file.go`, `stat.go`,
//! `path.go`, and `io.go`.

use crate::backend::Backend;
use crate::error::{BltfsError, Result};
use crate::index::entry::{Entry, ExtentRecord, Operation, Payload};
use crate::index::{BinaryIndex, VolumeMeta};
use crate::ltfs_index::LtfsIndex;
use crate::log_writer::{self, Log, LogWriter, Mutation};
use crate::options::{FileOptions, StoreOptions};
use crate::reporter::{Report, TrackedFile};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// The highest addressable tape block; used as a "seek to the end" sentinel
/// for `locate` (spec §4.5 "Open").
pub const TAPE_BLOCK_MAX: u64 = u64::MAX;

/// Serializes every backend call between foreground store operations and
/// the background log writer (spec §5 "exactly one backend mutex").
pub struct SynchronizedWriter {
    backend: Mutex<Box<dyn Backend>>,
}

impl SynchronizedWriter {
    fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(backend: Box<dyn Backend>) -> Self {
        Self::new(backend)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.backend.lock().read(buf)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.backend.lock().write(buf)
    }

    pub fn write_filemark(&self, count: usize) -> Result<()> {
        self.backend.lock().write_filemark(count)
    }

    pub fn locate(&self, part: u32, block: u64) -> Result<()> {
        self.backend.lock().locate(part, block)
    }

    pub fn set_partition(&self, part: u32) -> Result<()> {
        self.backend.lock().set_partition(part)
    }

    pub fn rewind(&self) -> Result<()> {
        self.backend.lock().rewind()
    }

    pub fn read_position(&self) -> Result<u64> {
        self.backend.lock().read_position()
    }

    pub fn space_eod(&self) -> Result<()> {
        self.backend.lock().space_eod()
    }

    pub fn space_fmf(&self, count: u64) -> Result<()> {
        self.backend.lock().space_fmf(count)
    }

    pub fn space_fmb(&self, count: u64) -> Result<()> {
        self.backend.lock().space_fmb(count)
    }

    pub fn format(&self) -> Result<()> {
        self.backend.lock().format()
    }

    pub fn block_size(&self) -> u64 {
        self.backend.lock().block_size()
    }

    /// Reads from the underlying device until the next filemark (spec §4.5
    /// `read_ltfs_index`, §4.6 recovery). A filemark ends the file cleanly;
    /// EOD propagates as an error.
    pub fn read_file(&self) -> Result<Vec<u8>> {
        let block_size = self.block_size() as usize;
        let mut out = Vec::new();
        let mut blk = vec![0u8; block_size];

        loop {
            let n = self.read(&mut blk)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&blk[..n]);
        }

        Ok(out)
    }

    /// Writes `src` to the device in `block_size` chunks without a
    /// trailing filemark. The reference's Go implementation has a known
    /// bug comparing `io.EOF` to `io.ErrUnexpectedEOF` with `&&` where the
    /// intended check is `||` (spec §9c); Rust's `Read::read` already
    /// signals end-of-stream as `Ok(0)` with no separate error variant,
    /// so looping until a short (or empty) read naturally implements the
    /// intended OR semantics.
    pub fn write_file(&self, mut src: impl Read) -> Result<usize> {
        let block_size = self.block_size() as usize;
        let mut buf = vec![0u8; block_size];
        let mut written = 0;

        loop {
            let mut filled = 0;
            while filled < block_size {
                let n = src.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }

            if filled == 0 {
                break;
            }

            let n = self.write(&buf[..filled])?;
            written += n;

            if filled < block_size {
                break;
            }
        }

        Ok(written)
    }
}

/// A handle returned by [`Store::open`]/[`Store::create`] (spec §3
/// Lifecycle: "entries are... mutated by writes that add extents").
/// `entry` is this file's live copy of its index record; each `write`
/// appends the `ExtentRecord` it just landed, persists the updated entry,
/// and notifies the log writer. `offset` tracks the logical position
/// within the file for both directions: on a read handle it's advanced by
/// `read` and capped at the entry's `length`; on a write handle it's the
/// next `file_offset` an appended extent will carry.
pub struct File {
    rw: Arc<SynchronizedWriter>,
    index: Arc<BinaryIndex>,
    mutations: Option<Sender<Mutation>>,
    report: Arc<std::sync::Mutex<Report>>,
    key: String,
    entry: Entry,
    offset: u64,
    wrote: bool,
    /// The backend's last-read block, since `Backend::read` requires a
    /// buffer of at least `block_size` (spec §4.2) regardless of how much
    /// of it the caller's `read` actually asked for.
    read_buf: Vec<u8>,
    read_buf_pos: usize,
    #[allow(dead_code)]
    opts: FileOptions,
}

impl File {
    pub fn name(&self) -> &str {
        &self.key
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let length = match &self.entry.payload {
            Payload::File { length, .. } => *length,
            Payload::Directory { .. } => 0,
        };

        if self.offset >= length {
            return Ok(0);
        }

        if self.read_buf_pos >= self.read_buf.len() {
            let mut block = vec![0u8; self.rw.block_size() as usize];
            let n = self
                .rw
                .read(&mut block)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            if n == 0 {
                return Ok(0);
            }
            block.truncate(n);
            self.read_buf = block;
            self.read_buf_pos = 0;
        }

        let available = self.read_buf.len() - self.read_buf_pos;
        let remaining = (length - self.offset) as usize;
        let want = buf.len().min(available).min(remaining);

        buf[..want]
            .copy_from_slice(&self.read_buf[self.read_buf_pos..self.read_buf_pos + want]);
        self.read_buf_pos += want;
        self.offset += want as u64;
        Ok(want)
    }
}

impl Write for File {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let block = self
            .rw
            .read_position()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let n = self
            .rw
            .write(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        if n == 0 {
            return Ok(0);
        }

        self.wrote = true;

        if let Payload::File { length, extents } = &mut self.entry.payload {
            extents.push(ExtentRecord {
                partition: 1,
                block,
                length: n as u64,
                block_offset: 0,
                file_offset: self.offset,
            });
            *length += n as u64;
        }
        self.entry.change_time = crate::ltfs_index::Time::now().unix_nanos();
        self.offset += n as u64;

        self.index
            .insert(&self.key, &self.entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        if let Some(sender) = &self.mutations {
            let _ = sender.send(Mutation::Entry {
                entry: self.entry.clone(),
                op: Operation::Ch,
                bytes: n as u64,
            });
        }

        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for File {
    /// Moves this file's bytes from in-flight to finished once the handle
    /// that wrote them is done (spec §4.6 "Failure semantics"); tape writes
    /// are synchronous, so a file's data is durable as soon as it's been
    /// written.
    fn drop(&mut self) {
        if self.wrote {
            self.report.lock().unwrap().finish_transfer(self.entry.id);
        }
    }
}

/// Canonicalizes a directory key: absolute, trailing `/` (spec §9 "Path
/// canonicalization").
fn canonical_dir_key(path: &str) -> String {
    let mut p = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    if !p.ends_with('/') {
        p.push('/');
    }
    p
}

/// Canonicalizes a file key: absolute, no trailing `/`.
fn canonical_file_key(path: &str) -> String {
    let p = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    p.trim_end_matches('/').to_string()
}

/// A bLTFS store, opened on top of a ready backend (spec §4.5).
pub struct Store {
    rw: Arc<SynchronizedWriter>,
    index: Arc<BinaryIndex>,
    #[allow(dead_code)]
    db: sled::Db,
    opts: StoreOptions,
    next_uid: AtomicU64,
    report: Arc<std::sync::Mutex<Report>>,
    log_writer: Option<LogWriter>,
}

impl Store {
    /// Opens a store on `backend` with an index persisted under
    /// `index_path` (a fresh `sled` database directory).
    pub fn open(
        backend: Box<dyn Backend>,
        index_path: impl AsRef<std::path::Path>,
        opts: StoreOptions,
    ) -> Result<Self> {
        let rw = Arc::new(SynchronizedWriter::new(backend));

        {
            let mut backend = rw.backend.lock();
            backend.load()?;
        }

        rw.locate(1, TAPE_BLOCK_MAX)?;

        let db = sled::open(index_path)?;
        let index = Arc::new(BinaryIndex::open(&db, VolumeMeta::default())?);

        let report = Arc::new(std::sync::Mutex::new(Report::default()));

        let log_writer = Some(LogWriter::spawn(
            rw.clone(),
            index.clone(),
            opts.recovery_policy,
            opts.reporter.clone(),
            report.clone(),
        ));

        info!("store opened");

        Ok(Self {
            rw,
            index,
            db,
            opts,
            next_uid: AtomicU64::new(1),
            report,
            log_writer,
        })
    }

    pub fn close(mut self) -> Result<()> {
        if let Some(writer) = self.log_writer.take() {
            writer.shutdown();
        }
        Ok(())
    }

    fn alloc_uid(&self) -> u64 {
        self.next_uid.fetch_add(1, Ordering::SeqCst)
    }

    fn notify(&self, entry: Entry, op: Operation, bytes: u64) {
        if let Some(writer) = &self.log_writer {
            writer.notify(Mutation::Entry { entry, op, bytes });
        }
    }

    fn sender(&self) -> Option<Sender<Mutation>> {
        self.log_writer.as_ref().map(|w| w.sender())
    }

    /// Creates a directory at `path`. A no-op if it already exists.
    pub fn mkdir(&self, path: &str) -> Result<()> {
        let key = canonical_dir_key(path);

        if self.index.stat(&key).is_ok() {
            return Ok(());
        }

        let name = key
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let now = crate::ltfs_index::Time::now().unix_nanos();
        let entry = Entry {
            id: self.alloc_uid(),
            name,
            create_time: now,
            change_time: now,
            modify_time: now,
            access_time: now,
            backup_time: now,
            readonly: false,
            payload: Payload::Directory { entries: Vec::new() },
            operation: None,
        };

        self.index.insert(&key, &entry)?;
        self.notify(entry, Operation::Add, 0);

        Ok(())
    }

    /// Creates `path` and any missing parent directories, ported from
    /// `original_source/path.go`'s `MkdirAll`.
    pub fn mkdir_all(&self, path: &str) -> Result<()> {
        let key = canonical_dir_key(path);

        if let Ok(entry) = self.index.stat(&key) {
            return if entry.is_directory() {
                Ok(())
            } else {
                Err(BltfsError::path(format!("{path}: not a directory")))
            };
        }

        let trimmed = key.trim_end_matches('/');
        if let Some(slash) = trimmed.rfind('/') {
            if slash > 0 {
                self.mkdir_all(&trimmed[..slash])?;
            }
        }

        self.mkdir(path)
    }

    pub fn stat(&self, path: &str) -> Result<Entry> {
        if let Ok(entry) = self.index.stat(&canonical_dir_key(path)) {
            return Ok(entry);
        }
        self.index.stat(&canonical_file_key(path))
    }

    pub fn lstat(&self, path: &str) -> Result<Entry> {
        self.stat(path)
    }

    /// Opens `path` for reading. Seeks to the start of its first extent so
    /// a fresh read sees the file's own data, not wherever the shared tape
    /// cursor happens to be sitting (spec §3 "Entry"/"Extent").
    pub fn open(&self, path: &str, opts: FileOptions) -> Result<File> {
        let key = canonical_file_key(path);
        let entry = self.index.stat(&key)?;

        if let Payload::File { extents, .. } = &entry.payload {
            if let Some(first) = extents.first() {
                self.rw.locate(1, first.block)?;
            }
        }

        Ok(File {
            rw: self.rw.clone(),
            index: self.index.clone(),
            mutations: self.sender(),
            report: self.report.clone(),
            key,
            entry,
            offset: 0,
            wrote: false,
            read_buf: Vec::new(),
            read_buf_pos: 0,
            opts,
        })
    }

    pub fn create(&self, path: &str, opts: FileOptions) -> Result<File> {
        let key = canonical_file_key(path);
        let now = crate::ltfs_index::Time::now().unix_nanos();

        match self.index.stat(&key) {
            Err(_) => {
                let name = key.rsplit('/').next().unwrap_or_default().to_string();
                let entry = Entry {
                    id: self.alloc_uid(),
                    name,
                    create_time: now,
                    change_time: now,
                    modify_time: now,
                    access_time: now,
                    backup_time: now,
                    readonly: false,
                    payload: Payload::File {
                        length: 0,
                        extents: Vec::new(),
                    },
                    operation: None,
                };
                self.index.insert(&key, &entry)?;
                self.notify(entry, Operation::Add, 0);
            }
            Ok(mut entry) => {
                // Truncate: drop any extents/length from a previous
                // generation so the new writes start from a clean file.
                entry.payload = Payload::File {
                    length: 0,
                    extents: Vec::new(),
                };
                entry.change_time = now;
                self.index.insert(&key, &entry)?;
            }
        }

        let file = self.open(path, opts)?;
        self.report.lock().unwrap().begin_transfer(TrackedFile {
            id: file.entry.id,
            path: key,
            size: 0,
        });
        Ok(file)
    }

    /// Copies data from `src` to `dst` in `block_size` chunks (spec §4.5
    /// "copy contract"). Returns the total bytes written.
    pub fn copy(&self, dst: &mut impl Write, src: &mut impl Read) -> Result<u64> {
        let mut buf = vec![0u8; self.opts.block_size as usize];
        let mut written = 0u64;

        loop {
            let mut filled = 0;
            loop {
                if filled >= buf.len() {
                    break;
                }
                match src.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) => return Err(e.into()),
                }
            }

            if filled == 0 {
                break;
            }

            let n = dst.write(&buf[..filled])?;
            written += n as u64;

            if n != filled {
                return Err(BltfsError::ShortWrite {
                    offered: filled,
                    accepted: n,
                });
            }

            if filled < buf.len() {
                break;
            }
        }

        Ok(written)
    }

    /// Positions at EOD on the index partition, spaces backward over the
    /// trailing two filemarks, reads the latest index block group, and
    /// XML-unmarshals it (spec §4.5 `read_ltfs_index`).
    pub fn read_ltfs_index(&self) -> Result<LtfsIndex> {
        self.rw.locate(0, TAPE_BLOCK_MAX)?;
        self.rw.space_fmb(2)?;

        let buf = self.rw.read_file()?;
        let xml = std::str::from_utf8(&buf)
            .map_err(|e| BltfsError::xml(format!("non-utf8 LTFS index: {e}")))?;

        LtfsIndex::from_xml(xml)
    }

    /// Recovers the latest state by scanning the recovery chain backward
    /// from EOD on the data partition and replaying FULL, then DIFF, then
    /// INCs in chronological order (spec §4.6, §8 scenario 5).
    pub fn recover(&self) -> Result<Vec<Entry>> {
        let chain = log_writer::recover_chain(&self.rw)?;

        let mut state: Vec<Entry> = Vec::new();
        for log in chain {
            apply_log(&mut state, &log);
        }

        debug!(entries = state.len(), "recovered state from log chain");
        Ok(state)
    }

    pub fn block_size(&self) -> u64 {
        self.opts.block_size
    }

    pub fn index(&self) -> &BinaryIndex {
        &self.index
    }

    /// A snapshot of durable-vs-in-flight byte counts (spec §2 "Reporter").
    pub fn report(&self) -> Report {
        self.report.lock().unwrap().clone()
    }
}

/// Flattens a `marshal()`-produced directory tree into the entries it
/// contains, dropping the synthetic `id: 0` root itself.
fn flatten(entry: &Entry, out: &mut Vec<Entry>) {
    if let Payload::Directory { entries } = &entry.payload {
        for child in entries {
            out.push(child.clone());
            flatten(child, out);
        }
    }
}

/// FULL and DIFF logs each carry a single `index.marshal()` snapshot of
/// the whole tree as of that point (spec §4.6), so applying one replaces
/// `state` outright; INC logs carry flat, per-mutation entries tagged
/// with an `Operation` and are merged in instead.
fn apply_log(state: &mut Vec<Entry>, log: &Log) {
    match log.class {
        crate::log_writer::LogClass::Full | crate::log_writer::LogClass::Diff => {
            state.clear();
            if let Some(root) = log.entries.first() {
                flatten(root, state);
            }
        }
        crate::log_writer::LogClass::Inc => {
            for entry in &log.entries {
                match entry.operation {
                    Some(Operation::Rm) => state.retain(|e| e.id != entry.id),
                    Some(Operation::Add) | Some(Operation::Ch) | None => {
                        state.retain(|e| e.id != entry.id);
                        state.push(entry.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileBackend;

    fn open_store() -> (tempfile::TempDir, tempfile::TempDir, Store) {
        let tape_dir = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();

        let backend = FileBackend::open(tape_dir.path()).unwrap();
        let store = Store::open(
            Box::new(backend),
            index_dir.path(),
            StoreOptions::default(),
        )
        .unwrap();

        (tape_dir, index_dir, store)
    }

    #[test]
    fn mkdir_all_creates_missing_parents() {
        let (_tape, _idx, store) = open_store();
        store.mkdir_all("/a/b/c").unwrap();

        assert!(store.stat("/a/").unwrap().is_directory());
        assert!(store.stat("/a/b/").unwrap().is_directory());
        assert!(store.stat("/a/b/c/").unwrap().is_directory());
    }

    #[test]
    fn create_then_stat_file() {
        let (_tape, _idx, store) = open_store();
        store.mkdir_all("/a").unwrap();
        store.create("/a/f.txt", FileOptions::default()).unwrap();

        let entry = store.stat("/a/f.txt").unwrap();
        assert!(!entry.is_directory());
        assert_eq!(entry.name, "f.txt");
    }

    #[test]
    fn write_then_read_back_reproduces_bytes_and_tracks_extents() {
        let (_tape, _idx, store) = open_store();
        store.mkdir_all("/a").unwrap();

        let mut dst = store.create("/a/f.txt", FileOptions::default()).unwrap();
        let payload = b"the quick brown fox jumps over the lazy dog";
        let mut src: &[u8] = payload;
        store.copy(&mut dst, &mut src).unwrap();
        drop(dst);

        let entry = store.stat("/a/f.txt").unwrap();
        let Payload::File { length, extents } = &entry.payload else {
            panic!("f.txt must be a file");
        };
        assert_eq!(*length, payload.len() as u64);
        assert!(!extents.is_empty());
        assert_eq!(
            extents.iter().map(|e| e.length).sum::<u64>(),
            payload.len() as u64
        );

        let mut src = store.open("/a/f.txt", FileOptions::default()).unwrap();
        let mut read_back = Vec::new();
        src.read_to_end(&mut read_back).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn create_then_write_reports_finished_transfer() {
        let (_tape, _idx, store) = open_store();
        store.mkdir_all("/a").unwrap();

        let mut dst = store.create("/a/f.txt", FileOptions::default()).unwrap();
        let id = store.stat("/a/f.txt").unwrap().id;

        assert!(store.report().in_transfer().contains_key(&id));

        dst.write_all(b"payload").unwrap();
        drop(dst);

        let report = store.report();
        assert!(!report.in_transfer().contains_key(&id));
        assert!(report.finished().contains_key(&id));
    }

    #[test]
    fn apply_log_replaces_state_on_full_and_diff_then_merges_incs() {
        use crate::log_writer::LogClass;

        fn file(id: u64, name: &str) -> Entry {
            Entry {
                id,
                name: name.to_string(),
                create_time: 0,
                change_time: 0,
                modify_time: 0,
                access_time: 0,
                backup_time: 0,
                readonly: false,
                payload: Payload::File {
                    length: 0,
                    extents: vec![],
                },
                operation: None,
            }
        }

        fn root(children: Vec<Entry>) -> Entry {
            Entry {
                id: 0,
                name: String::new(),
                create_time: 0,
                change_time: 0,
                modify_time: 0,
                access_time: 0,
                backup_time: 0,
                readonly: false,
                payload: Payload::Directory { entries: children },
                operation: None,
            }
        }

        let mut state = Vec::new();

        let mut full = Log::new(LogClass::Full, 0);
        full.entries.push(root(vec![file(1, "a.txt")]));
        apply_log(&mut state, &full);
        assert_eq!(state.len(), 1);
        assert_eq!(state[0].name, "a.txt");

        let mut inc = Log::new(LogClass::Inc, 0);
        inc.record(file(2, "b.txt"), Operation::Add);
        apply_log(&mut state, &inc);
        assert_eq!(state.len(), 2);

        // A DIFF replaces state wholesale, same as FULL, dropping anything
        // not present in its snapshot.
        let mut diff = Log::new(LogClass::Diff, 0);
        diff.entries.push(root(vec![file(1, "a.txt"), file(2, "b.txt")]));
        apply_log(&mut state, &diff);
        assert_eq!(state.len(), 2);

        let mut inc2 = Log::new(LogClass::Inc, 0);
        inc2.record(file(1, "a.txt"), Operation::Rm);
        apply_log(&mut state, &inc2);
        assert_eq!(state.len(), 1);
        assert_eq!(state[0].name, "b.txt");
    }

    #[test]
    fn copy_reports_short_write() {
        let (_tape, _idx, store) = open_store();

        struct Bottleneck;
        impl Write for Bottleneck {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len().min(1))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut src: &[u8] = b"hello world";
        let mut dst = Bottleneck;
        let err = store.copy(&mut dst, &mut src).unwrap_err();
        assert!(matches!(err, BltfsError::ShortWrite { .. }));
    }
}
