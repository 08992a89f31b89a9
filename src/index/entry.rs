//! The binary index's unit of storage (spec §3 "Entry"/"Extent"), ported
//! from `original_source/proto/bltfs.go`'s protobuf `Entry`/`Extent`
//! message pair onto a plain `serde`+`bincode` tagged enum.

use serde::{Deserialize, Serialize};

/// One filesystem node as stored in the binary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: u64,
    pub name: String,

    pub create_time: i64,
    pub change_time: i64,
    pub modify_time: i64,
    pub access_time: i64,
    pub backup_time: i64,

    pub readonly: bool,

    pub payload: Payload,

    /// Set only on entries carried inside a [`crate::log_writer::Log`]
    /// record; absent (`None`) on entries in the live index.
    #[serde(default)]
    pub operation: Option<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    File { length: u64, extents: Vec<ExtentRecord> },
    Directory { entries: Vec<Entry> },
}

/// A change recorded in a log, applied on top of the index it follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Add,
    Rm,
    Ch,
}

/// A contiguous run of bytes belonging to a file (spec §3 "Extent").
/// `partition` is the binary form (0 = index, 1 = data); see
/// [`partition_letter`]/[`partition_id`] for the XML letter mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentRecord {
    pub partition: u32,
    pub block: u64,
    pub length: u64,
    pub block_offset: u64,
    pub file_offset: u64,
}

/// `0` (index) ↔ `"a"`, `1` (data) ↔ `"b"` (spec §4.4).
pub fn partition_letter(partition: u32) -> crate::error::Result<&'static str> {
    match partition {
        0 => Ok("a"),
        1 => Ok("b"),
        other => Err(crate::error::BltfsError::index(format!(
            "no letter mapping for partition {other}"
        ))),
    }
}

/// Inverse of [`partition_letter`], case-insensitive.
pub fn partition_id(letter: &str) -> crate::error::Result<u32> {
    match letter.to_ascii_lowercase().as_str() {
        "a" => Ok(0),
        "b" => Ok(1),
        other => Err(crate::error::BltfsError::index(format!(
            "unknown partition letter '{other}'"
        ))),
    }
}

impl Entry {
    pub fn is_directory(&self) -> bool {
        matches!(self.payload, Payload::Directory { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_mapping_round_trips() {
        assert_eq!(partition_letter(0).unwrap(), "a");
        assert_eq!(partition_letter(1).unwrap(), "b");
        assert_eq!(partition_id("a").unwrap(), 0);
        assert_eq!(partition_id("B").unwrap(), 1);
        assert!(partition_letter(2).is_err());
        assert!(partition_id("c").is_err());
    }
}
