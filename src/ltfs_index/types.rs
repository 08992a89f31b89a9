//! LTFS Index Type Definitions
//!
//! Data structures mirroring the `<ltfsindex>` XML schema (spec §6),
//! ported from `original_source/ltfs/{index,directory,file}.go`.

use super::time::Time;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const VERSION: &str = "2.2.0";
pub const CREATOR: &str = "bltfs 0.1.0-alpha";

/// LTFS Index structure, `<ltfsindex version="2.2.0">`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "ltfsindex")]
pub struct LtfsIndex {
    #[serde(rename = "@version")]
    pub version: String,
    pub creator: String,
    pub volumeuuid: Uuid,
    pub generationnumber: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    pub updatetime: Time,
    pub location: Location,
    #[serde(default)]
    pub previousgenerationlocation: Option<Location>,
    #[serde(default)]
    pub allowpolicyupdate: Option<bool>,
    #[serde(default)]
    pub dataplacementpolicy: Option<DataPlacementPolicy>,
    #[serde(default)]
    pub highestfileuid: Option<u64>,
    #[serde(rename = "directory")]
    pub root_directory: Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub partition: String,
    #[serde(alias = "startBlock", alias = "start_block")]
    pub startblock: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPlacementPolicy {
    #[serde(rename = "indexpartitioncriteria")]
    pub criteria: IndexPartitionCriteria,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPartitionCriteria {
    pub size: u64,
    #[serde(rename = "name", default)]
    pub name: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directory {
    #[serde(rename = "fileuid")]
    pub uid: u64,
    pub name: String,
    #[serde(rename = "creationtime")]
    pub creation_time: Time,
    #[serde(rename = "changetime")]
    pub change_time: Time,
    #[serde(rename = "modifytime")]
    pub modify_time: Time,
    #[serde(rename = "accesstime")]
    pub access_time: Time,
    #[serde(rename = "backuptime")]
    pub backup_time: Time,
    #[serde(rename = "readonly", default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(default)]
    pub contents: DirectoryContents,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryContents {
    #[serde(rename = "file", default)]
    pub files: Vec<File>,
    #[serde(rename = "directory", default)]
    pub directories: Vec<Directory>,
}

impl Directory {
    /// Visits every descendant directory along with the slash-joined path of
    /// its parent (relative to the directory `visit_all` is called on),
    /// ported from `original_source/ltfs/directory.go`'s `VisitAllEntries`.
    pub fn visit_all(&self, mut visit: impl FnMut(&Directory, &str)) {
        self.visit_all_inner(&mut visit, "");
    }

    fn visit_all_inner(&self, visit: &mut dyn FnMut(&Directory, &str), subtree: &str) {
        for dir in &self.contents.directories {
            visit(dir, subtree);
            let next_subtree = join_path(subtree, &self.name);
            dir.visit_all_inner(visit, &next_subtree);
        }
    }
}

fn join_path(subtree: &str, name: &str) -> String {
    if subtree.is_empty() {
        name.to_string()
    } else {
        format!("{subtree}/{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtentInfo {
    #[serde(rename = "extent", default)]
    pub extents: Vec<FileExtent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    #[serde(rename = "fileuid")]
    pub uid: u64,
    pub name: String,
    pub length: u64,
    #[serde(rename = "creationtime")]
    pub creation_time: Time,
    #[serde(rename = "changetime")]
    pub change_time: Time,
    #[serde(rename = "modifytime")]
    pub modify_time: Time,
    #[serde(rename = "accesstime")]
    pub access_time: Time,
    #[serde(rename = "backuptime")]
    pub backup_time: Time,
    #[serde(rename = "readonly", default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(rename = "extendedattributes", default)]
    pub extended_attributes: Option<ExtendedAttributes>,
    #[serde(rename = "extentinfo", default)]
    pub extent_info: ExtentInfo,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// `<extent>`. `partition` is the XML letter form (`"a"` index / `"b"` data);
/// see [`crate::index::entry::partition_letter`] for the binary↔letter map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileExtent {
    pub partition: String,
    #[serde(rename = "startblock", alias = "startBlock", alias = "start_block")]
    pub start_block: u64,
    #[serde(rename = "byteoffset")]
    pub byte_offset: u64,
    #[serde(rename = "bytecount")]
    pub byte_count: u64,
    #[serde(rename = "fileoffset")]
    pub file_offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedAttributes {
    #[serde(rename = "xattr", default)]
    pub attributes: Vec<ExtendedAttribute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedAttribute {
    pub key: String,
    pub value: String,
}
