//! LTFS Index Module
//!
//! Data structures and (de)serialization for the LTFS index XML schema
//! (spec §3 "invariants", §6 "LTFS XML index").
//!
//! - `types`: core data structure definitions
//! - `time`: the ISO-8601 nanosecond timestamp newtype
//! - `label`: the ANSI volume label and `<ltfslabel>` construct
//! - `parser` / `serializer`: XML (de)serialization
//! - `validator`: structural sanity checks run before/after parsing

pub mod label;
pub mod parser;
pub mod serializer;
pub mod time;
pub mod types;
pub mod validator;

pub use label::{make_volume_label, Label, LabelVolume};
pub use time::Time;
pub use types::{
    DataPlacementPolicy, Directory, DirectoryContents, ExtendedAttribute, ExtendedAttributes,
    ExtentInfo, File, FileExtent, IndexPartitionCriteria, Location, LtfsIndex, CREATOR, VERSION,
};
