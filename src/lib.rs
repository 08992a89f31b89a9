//! bltfs
//!
//! A block-emulated Linear Tape File System engine: a two-partition tape
//! backend, a binary path index, an LTFS XML index codec, and a
//! FULL/DIFF/INC recovery log, fronted by a `Store` facade and a CLI.

pub mod backend;
pub mod error;
pub mod index;
pub mod log_writer;
pub mod logger;
pub mod ltfs_index;
pub mod options;
pub mod reporter;
pub mod store;

pub use error::{BltfsError, Result};
pub use ltfs_index::LtfsIndex;
pub use options::{FileOptions, StoreOptions};
pub use reporter::{Report, Reporter};
pub use store::Store;
