//! The bijection between the LTFS XML tree and the binary [`Entry`] form
//! (spec §4.4), ported from `original_source/proto/bltfs.go`'s
//! `Marshal{Directory,File}`/`MakeTree`/`MakeFile`/`MakeExtent`.

use super::entry::{partition_id, partition_letter, Entry, ExtentRecord, Payload};
use crate::error::Result;
use crate::ltfs_index::time::Time;
use crate::ltfs_index::types::{Directory, DirectoryContents, ExtentInfo, File, FileExtent};

/// Converts a directory to its shallow `Entry` form (no children): what
/// `MarshalDirectory` does in the reference — children are reattached
/// later by [`crate::index::BinaryIndex::marshal`], not by this function.
pub fn entry_from_directory(d: &Directory) -> Entry {
    Entry {
        id: d.uid,
        name: d.name.clone(),
        create_time: d.creation_time.unix_nanos(),
        change_time: d.change_time.unix_nanos(),
        modify_time: d.modify_time.unix_nanos(),
        access_time: d.access_time.unix_nanos(),
        backup_time: d.backup_time.unix_nanos(),
        readonly: d.read_only,
        payload: Payload::Directory { entries: Vec::new() },
        operation: None,
    }
}

/// Converts a file to its `Entry` form, including its extents.
pub fn entry_from_file(f: &File) -> Result<Entry> {
    let mut extents = Vec::with_capacity(f.extent_info.extents.len());
    for extent in &f.extent_info.extents {
        extents.push(extent_to_record(extent)?);
    }

    Ok(Entry {
        id: f.uid,
        name: f.name.clone(),
        create_time: f.creation_time.unix_nanos(),
        change_time: f.change_time.unix_nanos(),
        modify_time: f.modify_time.unix_nanos(),
        access_time: f.access_time.unix_nanos(),
        backup_time: f.backup_time.unix_nanos(),
        readonly: f.read_only,
        payload: Payload::File {
            length: f.length,
            extents,
        },
        operation: None,
    })
}

/// `FileExtent` (XML, letter partition) → `ExtentRecord` (binary, integer
/// partition).
pub fn extent_to_record(extent: &FileExtent) -> Result<ExtentRecord> {
    Ok(ExtentRecord {
        partition: partition_id(&extent.partition)?,
        block: extent.start_block,
        length: extent.byte_count,
        block_offset: extent.byte_offset,
        file_offset: extent.file_offset,
    })
}

/// `ExtentRecord` (binary) → `FileExtent` (XML).
pub fn extent_from_record(record: &ExtentRecord) -> Result<FileExtent> {
    Ok(FileExtent {
        partition: partition_letter(record.partition)?.to_string(),
        start_block: record.block,
        byte_offset: record.block_offset,
        byte_count: record.length,
        file_offset: record.file_offset,
    })
}

/// Rebuilds a full `Directory` subtree from a nested `Entry`
/// (`MakeTree` in the reference). The `Entry` must already carry its
/// children — this is the counterpart to [`crate::index::BinaryIndex::marshal`],
/// not a replacement for it.
pub fn directory_from_entry(entry: &Entry) -> Result<Directory> {
    let Payload::Directory { entries } = &entry.payload else {
        return Err(crate::error::BltfsError::index(format!(
            "entry '{}' is not a directory",
            entry.name
        )));
    };

    let mut contents = DirectoryContents::default();
    for child in entries {
        match &child.payload {
            Payload::Directory { .. } => contents.directories.push(directory_from_entry(child)?),
            Payload::File { .. } => contents.files.push(file_from_entry(child)?),
        }
    }

    Ok(Directory {
        uid: entry.id,
        name: entry.name.clone(),
        creation_time: Time::from_unix_nanos(entry.create_time),
        change_time: Time::from_unix_nanos(entry.change_time),
        modify_time: Time::from_unix_nanos(entry.modify_time),
        access_time: Time::from_unix_nanos(entry.access_time),
        backup_time: Time::from_unix_nanos(entry.backup_time),
        read_only: entry.readonly,
        contents,
    })
}

/// `MakeFile` in the reference.
pub fn file_from_entry(entry: &Entry) -> Result<File> {
    let Payload::File { length, extents } = &entry.payload else {
        return Err(crate::error::BltfsError::index(format!(
            "entry '{}' is not a file",
            entry.name
        )));
    };

    let mut extent_info = ExtentInfo::default();
    for record in extents {
        extent_info.extents.push(extent_from_record(record)?);
    }

    Ok(File {
        uid: entry.id,
        name: entry.name.clone(),
        length: *length,
        creation_time: Time::from_unix_nanos(entry.create_time),
        change_time: Time::from_unix_nanos(entry.change_time),
        modify_time: Time::from_unix_nanos(entry.modify_time),
        access_time: Time::from_unix_nanos(entry.access_time),
        backup_time: Time::from_unix_nanos(entry.backup_time),
        read_only: entry.readonly,
        extended_attributes: None,
        extent_info,
    })
}

/// Builds a fully nested `Entry` tree directly from a `Directory`,
/// bypassing the binary index entirely — for whole-tree dumps (spec §4.4),
/// as opposed to the index's default non-recursive per-path marshalling.
pub fn marshal_recursive(d: &Directory) -> Result<Entry> {
    let mut entry = entry_from_directory(d);

    let mut entries = Vec::with_capacity(d.contents.files.len() + d.contents.directories.len());
    for file in &d.contents.files {
        entries.push(entry_from_file(file)?);
    }
    for subdir in &d.contents.directories {
        entries.push(marshal_recursive(subdir)?);
    }

    entry.payload = Payload::Directory { entries };
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltfs_index::types::{ExtentInfo, FileExtent};

    fn sample_file() -> File {
        File {
            uid: 7,
            name: "data.bin".to_string(),
            length: 10,
            creation_time: Time::now(),
            change_time: Time::now(),
            modify_time: Time::now(),
            access_time: Time::now(),
            backup_time: Time::now(),
            read_only: false,
            extended_attributes: None,
            extent_info: ExtentInfo {
                extents: vec![FileExtent {
                    partition: "b".to_string(),
                    start_block: 42,
                    byte_offset: 0,
                    byte_count: 10,
                    file_offset: 0,
                }],
            },
        }
    }

    #[test]
    fn file_round_trips_through_entry() {
        let file = sample_file();
        let entry = entry_from_file(&file).unwrap();
        let back = file_from_entry(&entry).unwrap();

        assert_eq!(back.uid, file.uid);
        assert_eq!(back.length, file.length);
        assert_eq!(back.extent_info.extents.len(), 1);
        assert_eq!(back.extent_info.extents[0].partition, "b");
        assert_eq!(back.extent_info.extents[0].start_block, 42);
    }

    #[test]
    fn marshal_recursive_nests_children() {
        let mut root = Directory {
            uid: 0,
            name: String::new(),
            creation_time: Time::now(),
            change_time: Time::now(),
            modify_time: Time::now(),
            access_time: Time::now(),
            backup_time: Time::now(),
            read_only: false,
            contents: DirectoryContents::default(),
        };
        root.contents.files.push(sample_file());

        let entry = marshal_recursive(&root).unwrap();
        match entry.payload {
            Payload::Directory { entries } => assert_eq!(entries.len(), 1),
            _ => panic!("expected directory payload"),
        }
    }
}
