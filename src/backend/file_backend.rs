//! The file-emulated backend (spec §4.2), ported from
//! `original_source/backend/file/file.go`. Each tape block is one file
//! under a root directory, named `<part>_<block>_<suffix>`.
//!
//! Basically ported from `tape_drivers/generic/file/filedebug_tc.c` in the
//! IBM LTFS SDE distribution, this emulator uses the same on-disk layout so
//! real LTFS utilities can work against volumes this crate creates.

use super::cartridge_config::{CartridgeConfig, DEFAULT_BLOCK_SIZE, DEFAULT_CARTRIDGE_CONFIG_FILE};
use super::{Backend, EOD_MISSING};
use crate::error::{BltfsError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const SUFFIX_RECORD: &str = "R";
const SUFFIX_FILEMARK: &str = "F";
const SUFFIX_EOD: &str = "E";

const PARTITIONS: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
struct Position {
    blk: u64,
    part: u32,
}

impl Position {
    fn adv(&mut self, count: u64) {
        self.blk += count;
    }

    fn rev(&mut self, count: u64) {
        self.blk = self
            .blk
            .checked_sub(count)
            .expect("reversing to negative block");
    }

    fn reset(&mut self) {
        self.blk = 0;
        self.part = 0;
    }
}

/// A tape volume emulated as a directory of per-block files.
pub struct FileBackend {
    root: PathBuf,
    block_size: u64,
    pos: Position,

    last: [u64; PARTITIONS],
    eod: [u64; PARTITIONS],

    ready: bool,

    cart_cfg: CartridgeConfig,
}

impl FileBackend {
    /// Opens `root` as a backend. `root` must already exist as a directory;
    /// the cartridge config sidecar is created lazily on first [`load`](Backend::load).
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta = std::fs::metadata(&root)?;
        if !meta.is_dir() {
            return Err(BltfsError::path("path must be an existing directory"));
        }

        Ok(Self {
            root,
            block_size: DEFAULT_BLOCK_SIZE,
            pos: Position::default(),
            last: [0; PARTITIONS],
            eod: [0; PARTITIONS],
            ready: false,
            cart_cfg: CartridgeConfig::default(),
        })
    }

    fn make_path(&self, p: Position, suffix: &str) -> PathBuf {
        self.root.join(format!("{}_{}_{}", p.part, p.blk, suffix))
    }

    fn make_record_path(&self, p: Position) -> PathBuf {
        self.make_path(p, SUFFIX_RECORD)
    }

    fn make_filemark_path(&self, p: Position) -> PathBuf {
        self.make_path(p, SUFFIX_FILEMARK)
    }

    fn make_eod_path(&self, p: Position) -> PathBuf {
        self.make_path(p, SUFFIX_EOD)
    }

    fn on_filemark(&self) -> bool {
        self.make_filemark_path(self.pos).exists()
    }

    fn on_record(&self) -> bool {
        self.make_record_path(self.pos).exists()
    }

    /// Remove whatever suffix file currently occupies a position.
    fn clean(&self, p: Position) -> Result<()> {
        for suffix in [SUFFIX_RECORD, SUFFIX_FILEMARK, SUFFIX_EOD] {
            let path = self.make_path(p, suffix);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn clean_current(&self) -> Result<()> {
        self.clean(self.pos)
    }

    fn write_eod(&mut self) -> Result<()> {
        self.clean_current()?;

        let path = self.make_eod_path(self.pos);
        std::fs::File::create(&path)?;

        let part = self.pos.part as usize;
        for blk in (self.pos.blk + 1)..=self.eod[part] {
            self.clean(Position {
                blk,
                part: self.pos.part,
            })?;
        }

        self.last[part] = self.pos.blk.saturating_sub(1);
        self.eod[part] = self.pos.blk;

        Ok(())
    }

    /// Ported from the IBM LTFS SDE `filedebug_tc.c` EOD search: probe
    /// forward while a record or filemark is found and no EOD is found,
    /// then step back one block.
    fn search_eod(&mut self, part: u32) -> Result<()> {
        self.pos.reset();
        self.pos.part = part;

        let mut found_record = true;
        let mut found_filemark = true;
        let mut found_eod = false;

        while (found_record || found_filemark) && !found_eod {
            found_record = self.make_record_path(self.pos).exists();
            found_filemark = self.make_filemark_path(self.pos).exists();
            found_eod = self.make_eod_path(self.pos).exists();

            self.pos.adv(1);
        }

        self.pos.rev(1);

        let part_idx = part as usize;
        if !found_eod && self.pos.blk != 0 {
            self.last[part_idx] = self.pos.blk;
            self.eod[part_idx] = EOD_MISSING;
        } else {
            self.write_eod()?;
        }

        Ok(())
    }

    fn capacity(&self, part: usize) -> u64 {
        match part {
            0 => self.cart_cfg.capacity * 5 / 100,
            1 => self.cart_cfg.capacity - self.capacity(0),
            _ => panic!("no more than two partitions supported"),
        }
    }

    fn cartridge_config_path(&self) -> PathBuf {
        self.root.join(DEFAULT_CARTRIDGE_CONFIG_FILE)
    }
}

impl Backend for FileBackend {
    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn load(&mut self) -> Result<()> {
        if self.ready {
            self.pos.reset();
            return Ok(());
        }

        let cfg_path = self.cartridge_config_path();
        self.cart_cfg = match CartridgeConfig::read(&cfg_path) {
            Ok(cfg) => cfg,
            Err(BltfsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = CartridgeConfig::default();
                cfg.write(&cfg_path)?;
                cfg
            }
            Err(e) => return Err(e),
        };

        self.ready = true;

        for part in 0..PARTITIONS as u32 {
            self.search_eod(part)?;
        }

        self.pos.reset();

        debug!(root = %self.root.display(), "loaded file backend");
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        self.ready = false;
        self.pos.reset();
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos.blk = 0;
        Ok(())
    }

    fn set_partition(&mut self, part: u32) -> Result<()> {
        self.pos.part = part;
        Ok(())
    }

    fn read_position(&self) -> Result<u64> {
        Ok(self.pos.blk)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.ready {
            return Err(BltfsError::NotReady);
        }

        if (buf.len() as u64) < self.block_size {
            return Err(BltfsError::ShortBuffer {
                len: buf.len(),
                block_size: self.block_size,
            });
        }

        let part = self.pos.part as usize;
        if self.eod[part] == self.pos.blk {
            return Err(BltfsError::Eod);
        }

        if self.on_filemark() {
            self.pos.adv(1);
            return Ok(0);
        }

        if !self.on_record() {
            return Err(BltfsError::NoSuchRecord {
                partition: self.pos.part,
                block: self.pos.blk,
            });
        }

        let data = std::fs::read(self.make_record_path(self.pos))?;
        let n = data.len();
        buf[..n].copy_from_slice(&data);
        self.pos.adv(1);

        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.ready {
            return Err(BltfsError::NotReady);
        }

        self.clean_current()?;

        let path = self.make_record_path(self.pos);

        let block_size = self.block_size as usize;
        let (to_write, exceeded) = if buf.len() > block_size {
            (&buf[..block_size], true)
        } else {
            (buf, false)
        };

        std::fs::write(&path, to_write)?;

        self.pos.adv(1);
        self.write_eod()?;

        if exceeded {
            return Err(BltfsError::BlockSizeExceeded {
                len: buf.len(),
                block_size: self.block_size,
            });
        }

        Ok(to_write.len())
    }

    fn write_filemark(&mut self, count: usize) -> Result<()> {
        if !self.ready {
            return Err(BltfsError::NotReady);
        }

        for _ in 0..count {
            self.clean_current()?;

            let path = self.make_filemark_path(self.pos);
            std::fs::File::create(&path)?;

            self.pos.adv(1);
            self.write_eod()?;
        }

        Ok(())
    }

    fn space_eod(&mut self) -> Result<()> {
        let part = self.pos.part as usize;
        self.pos.blk = self.eod[part];
        Ok(())
    }

    fn space_fmb(&mut self, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }

        let mut n = 0u64;
        loop {
            if self.make_filemark_path(self.pos).exists() {
                n += 1;
                if n == count {
                    self.pos.adv(1);
                    return Ok(());
                }
            }

            if self.pos.blk == 0 {
                return Err(BltfsError::Bot);
            }

            self.pos.rev(1);
        }
    }

    fn space_fmf(&mut self, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }

        let part = self.pos.part as usize;
        if self.pos.blk == self.eod[part] {
            return Err(BltfsError::Eod);
        }

        if self.pos.blk == self.last[part] {
            return Err(BltfsError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "positioned on last block before EOD with no filemark",
            )));
        }

        if self.pos.blk > self.last[part] {
            panic!("space_fmf: position past last recorded block");
        }

        let mut n = 0u64;
        loop {
            if self.make_filemark_path(self.pos).exists() {
                n += 1;
                if n == count {
                    self.pos.adv(1);
                    return Ok(());
                }
            }

            self.pos.adv(1);
        }
    }

    fn locate(&mut self, part: u32, block: u64) -> Result<()> {
        if !self.ready {
            return Err(BltfsError::NotReady);
        }

        self.pos.part = part;
        let part_idx = part as usize;

        if self.eod[part_idx] == EOD_MISSING && self.last[part_idx] < block {
            self.pos.blk = self.last[part_idx] + 1;
        } else if self.eod[part_idx] < block {
            self.pos.blk = self.eod[part_idx];
        } else {
            self.pos.blk = block;
        }

        Ok(())
    }

    fn format(&mut self) -> Result<()> {
        if self.pos.part != 0 || self.pos.blk != 0 {
            return Err(BltfsError::illegal_request(
                "format is only legal at position (0, 0)",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn backend() -> (tempfile::TempDir, FileBackend) {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(dir.path()).unwrap();
        backend.load().unwrap();
        (dir, backend)
    }

    #[test]
    fn fresh_volume_is_at_eod() {
        let (_dir, mut backend) = backend();
        let mut buf = vec![0u8; backend.block_size() as usize];
        let err = backend.read(&mut buf).unwrap_err();
        assert!(err.is_eod());
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_dir, mut backend) = backend();
        let payload = b"hello tape";
        let mut block = vec![0u8; backend.block_size() as usize];
        block[..payload.len()].copy_from_slice(payload);

        backend.write(&block).unwrap();
        backend.rewind().unwrap();

        let mut buf = vec![0u8; backend.block_size() as usize];
        let n = backend.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], block.as_slice());
    }

    #[test]
    fn filemark_then_eod() {
        let (_dir, mut backend) = backend();
        backend.write_filemark(1).unwrap();
        backend.rewind().unwrap();

        let mut buf = vec![0u8; backend.block_size() as usize];
        let n = backend.read(&mut buf).unwrap();
        assert_eq!(n, 0);

        let err = backend.read(&mut buf).unwrap_err();
        assert!(err.is_eod());
    }

    #[test]
    fn format_requires_origin() {
        let (_dir, mut backend) = backend();
        assert!(backend.format().is_ok());

        backend.write_filemark(1).unwrap();
        let err = backend.format().unwrap_err();
        assert!(matches!(err, BltfsError::IllegalRequest(_)));
    }

    #[test]
    fn locate_clamps_to_eod() {
        let (_dir, mut backend) = backend();
        backend.write_filemark(1).unwrap();
        backend.locate(0, 100).unwrap();
        assert_eq!(backend.read_position().unwrap(), backend.eod[0]);
    }

    #[test]
    fn space_fmb_rejects_bot() {
        let (_dir, mut backend) = backend();
        let err = backend.space_fmb(1).unwrap_err();
        assert!(matches!(err, BltfsError::Bot));
    }
}
