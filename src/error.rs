use thiserror::Error;

pub type Result<T> = std::result::Result<T, BltfsError>;

/// Error taxonomy for the bLTFS engine.
///
/// Backends surface these unchanged; the store only adds path context when
/// wrapping index lookups. `Eod` doubles as the expected control signal
/// during a deliberate tail scan (locate-to-EOD, space-backward) — callers
/// doing such a scan match on it explicitly instead of propagating it.
#[derive(Error, Debug)]
pub enum BltfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("end of recorded data")]
    Eod,

    #[error("beginning of tape")]
    Bot,

    #[error("backend not ready: call load() first")]
    NotReady,

    #[error("write of {len} bytes exceeds block size {block_size}")]
    BlockSizeExceeded { len: usize, block_size: u64 },

    #[error("read buffer of {len} bytes is smaller than block size {block_size}")]
    ShortBuffer { len: usize, block_size: u64 },

    #[error("short write: offered {offered} bytes, destination accepted {accepted}")]
    ShortWrite { offered: usize, accepted: usize },

    #[error("no block recorded at position {partition}:{block}")]
    NoSuchRecord { partition: u32, block: u64 },

    #[error("path not found in index: {0}")]
    NotFound(String),

    #[error("illegal request: {0}")]
    IllegalRequest(String),

    #[error("binary index error: {0}")]
    Index(String),

    #[error("LTFS XML error: {0}")]
    Xml(String),

    #[error("path error: {0}")]
    Path(String),

    #[error("{0}")]
    Generic(#[from] anyhow::Error),
}

impl BltfsError {
    pub fn illegal_request<T: Into<String>>(msg: T) -> Self {
        Self::IllegalRequest(msg.into())
    }

    pub fn index<T: Into<String>>(msg: T) -> Self {
        Self::Index(msg.into())
    }

    pub fn xml<T: Into<String>>(msg: T) -> Self {
        Self::Xml(msg.into())
    }

    pub fn path<T: Into<String>>(msg: T) -> Self {
        Self::Path(msg.into())
    }

    pub fn not_found<T: Into<String>>(path: T) -> Self {
        Self::NotFound(path.into())
    }

    pub fn is_eod(&self) -> bool {
        matches!(self, Self::Eod)
    }
}

impl From<sled::Error> for BltfsError {
    fn from(e: sled::Error) -> Self {
        Self::Index(e.to_string())
    }
}

impl From<quick_xml::DeError> for BltfsError {
    fn from(e: quick_xml::DeError) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<bincode::Error> for BltfsError {
    fn from(e: bincode::Error) -> Self {
        Self::Index(format!("entry codec error: {e}"))
    }
}
