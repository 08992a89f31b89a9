//! The backend interface (spec §4.1): block/filemark/EOD tape operations
//! that a store is built on top of. Grounded on
//! `original_source/backend/backend.go`, with the trait shape borrowed from
//! the `TapeRead`/`BlockRead` traits in the reference emulator examples.

pub mod cartridge_config;
pub mod file_backend;

pub use cartridge_config::CartridgeConfig;
pub use file_backend::FileBackend;

use crate::error::Result;

/// Sentinel for "no EOD has been recorded on this partition yet" (§4.2).
pub const EOD_MISSING: u64 = u64::MAX;

/// A two-partition linear tape, real or emulated.
///
/// Implementors never panic on I/O; the only panics permitted are the
/// EOD-search invariant violations the reference backend documents as
/// programmer errors (§4.1).
pub trait Backend: Send {
    /// Maximum bytes per record block.
    fn block_size(&self) -> u64;

    /// Establish readiness. Idempotent; a re-`load` rewinds.
    fn load(&mut self) -> Result<()>;

    /// Tear down readiness.
    fn unload(&mut self) -> Result<()>;

    /// Position → (current_partition, 0).
    fn rewind(&mut self) -> Result<()>;

    /// Select the active partition; the cursor's block is preserved.
    fn set_partition(&mut self, part: u32) -> Result<()>;

    /// Current block on the active partition.
    fn read_position(&self) -> Result<u64>;

    /// Read into `buf`. See §4.2 for the filemark/EOD signaling contract:
    /// a filemark returns `Ok(0)` and advances; two callers in a row
    /// hitting EOD without any read in between is how real tape signals
    /// end of recorded data, but this backend reports it directly via
    /// [`crate::error::BltfsError::Eod`] instead of an ambiguous zero read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Atomically replace the block at the current position with
    /// `buf[..min(len, block_size)]`, advance one block, and re-establish
    /// EOD. Returns the number of bytes actually written.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Write `count` filemarks, advancing one block per mark and
    /// re-establishing EOD after the last.
    fn write_filemark(&mut self, count: usize) -> Result<()>;

    /// Seek to `eod[part]` on the active partition.
    fn space_eod(&mut self) -> Result<()>;

    /// Forward space over `count` filemarks.
    fn space_fmf(&mut self, count: u64) -> Result<()>;

    /// Backward space over `count` filemarks.
    fn space_fmb(&mut self, count: u64) -> Result<()>;

    /// Seek. Clamped per §4.1: if `block` exceeds `eod[part]`, clamp to
    /// `eod[part]`; if EOD is missing and `block > last[part]`, clamp to
    /// `last[part] + 1`.
    fn locate(&mut self, part: u32, block: u64) -> Result<()>;

    /// Legal only at position `(0, 0)`; the reference emulator treats this
    /// as a no-op because the on-disk state is already a blank directory.
    fn format(&mut self) -> Result<()>;
}
