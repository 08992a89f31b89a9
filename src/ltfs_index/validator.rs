//! LTFS Index Validation
//!
//! Structural sanity checks run before parsing (raw XML) and after
//! (parsed tree), ported from the teacher's validator with its error
//! type swapped and its checks brought in line with the current schema.

use super::types::*;
use crate::error::{BltfsError, Result};
use tracing::{debug, warn};

impl LtfsIndex {
    /// Validate XML structure before parsing
    pub(super) fn validate_xml_structure(xml_content: &str) -> Result<()> {
        debug!("Validating XML structure");

        if xml_content.len() < 50 {
            return Err(BltfsError::xml("XML content too short"));
        }

        if !xml_content.contains("<ltfsindex") {
            return Err(BltfsError::xml("missing LTFS index root element"));
        }

        if !xml_content.contains("</ltfsindex>") {
            return Err(BltfsError::xml(
                "XML appears incomplete - missing closing tag",
            ));
        }

        if !xml_content.trim_start().starts_with("<?xml") {
            warn!("XML missing declaration, this may cause parsing issues");
        }

        // Count opening vs closing tags for basic balance check, accounting
        // for self-closing tags like `<name />`.
        let mut open_count = 0;
        let mut self_closing_count = 0;

        for tag_match in xml_content.match_indices('<') {
            let start_pos = tag_match.0;
            if let Some(end_pos) = xml_content[start_pos..].find('>') {
                let tag = &xml_content[start_pos..start_pos + end_pos + 1];

                if tag.starts_with("<?xml") || tag.starts_with("<!--") {
                    continue;
                }
                if tag.starts_with("</") {
                    continue;
                }

                if tag.ends_with("/>") {
                    self_closing_count += 1;
                } else {
                    open_count += 1;
                }
            }
        }

        let close_count = xml_content.matches("</").count();

        if open_count != close_count {
            return Err(BltfsError::xml(format!(
                "XML structure imbalanced: {} opening tags vs {} closing tags (with {} self-closing tags)",
                open_count, close_count, self_closing_count
            )));
        }

        debug!("XML structure validation passed");
        Ok(())
    }

    /// Validate parsed index for consistency
    pub(super) fn validate_parsed_index(index: &LtfsIndex) -> Result<()> {
        debug!("Validating parsed LTFS index");

        if !index.version.starts_with("2.") {
            warn!("LTFS version {} may not be fully supported", index.version);
        }

        if index.generationnumber == 0 {
            return Err(BltfsError::xml("invalid generation number"));
        }

        if !index.root_directory.name.is_empty() {
            return Err(BltfsError::xml("root directory must have empty name"));
        }

        Self::validate_directory_structure(&index.root_directory)?;
        Self::validate_file_extents(&index.root_directory)?;
        Self::validate_uid_uniqueness(index)?;

        debug!("Parsed index validation passed");
        Ok(())
    }

    /// Validate directory structure recursively
    fn validate_directory_structure(directory: &Directory) -> Result<()> {
        debug!("Validating directory structure: {}", directory.name);

        let mut file_names = std::collections::HashSet::new();
        let mut dir_names = std::collections::HashSet::new();

        for file in &directory.contents.files {
            if file.name.is_empty() {
                return Err(BltfsError::xml("file with empty name found"));
            }

            if !file_names.insert(&file.name) {
                return Err(BltfsError::xml(format!(
                    "duplicate file name '{}' in directory '{}'",
                    file.name, directory.name
                )));
            }
        }

        for subdir in &directory.contents.directories {
            if subdir.name.is_empty() {
                return Err(BltfsError::xml("directory with empty name found"));
            }

            if !dir_names.insert(&subdir.name) {
                return Err(BltfsError::xml(format!(
                    "duplicate directory name '{}' in directory '{}'",
                    subdir.name, directory.name
                )));
            }

            if file_names.contains(&subdir.name) {
                return Err(BltfsError::xml(format!(
                    "name conflict: '{}' exists as both file and directory",
                    subdir.name
                )));
            }

            Self::validate_directory_structure(subdir)?;
        }

        Ok(())
    }

    /// Validate file extents for consistency
    fn validate_file_extents(directory: &Directory) -> Result<()> {
        debug!("Validating file extents in directory: {}", directory.name);

        for file in &directory.contents.files {
            if file.length > 0 && file.extent_info.extents.is_empty() {
                return Err(BltfsError::xml(format!(
                    "file '{}' has size {} but no extents",
                    file.name, file.length
                )));
            }

            if file.length == 0 && !file.extent_info.extents.is_empty() {
                warn!("file '{}' has zero size but contains extents", file.name);
            }

            let mut total_extent_size = 0u64;
            let mut last_file_offset = 0u64;

            for extent in &file.extent_info.extents {
                if !matches!(extent.partition.as_str(), "a" | "b" | "A" | "B") {
                    return Err(BltfsError::xml(format!(
                        "invalid partition '{}' in file '{}'",
                        extent.partition, file.name
                    )));
                }

                if extent.byte_count == 0 {
                    return Err(BltfsError::xml(format!(
                        "zero-size extent in file '{}'",
                        file.name
                    )));
                }

                if extent.file_offset < last_file_offset {
                    return Err(BltfsError::xml(format!(
                        "extents not ordered by file offset in file '{}'",
                        file.name
                    )));
                }

                last_file_offset = extent.file_offset + extent.byte_count;
                total_extent_size += extent.byte_count;
            }

            if total_extent_size != file.length {
                return Err(BltfsError::xml(format!(
                    "file '{}': declared size {} doesn't match extent total {}",
                    file.name, file.length, total_extent_size
                )));
            }
        }

        for subdir in &directory.contents.directories {
            Self::validate_file_extents(subdir)?;
        }

        Ok(())
    }

    /// Validate UID uniqueness across the entire index
    fn validate_uid_uniqueness(index: &LtfsIndex) -> Result<()> {
        debug!("Validating UID uniqueness");

        let mut used_uids = std::collections::HashSet::new();
        used_uids.insert(index.root_directory.uid);

        Self::collect_and_validate_uids(&index.root_directory, &mut used_uids)?;

        debug!(
            "UID validation passed, found {} unique UIDs",
            used_uids.len()
        );
        Ok(())
    }

    fn collect_and_validate_uids(
        directory: &Directory,
        used_uids: &mut std::collections::HashSet<u64>,
    ) -> Result<()> {
        for subdir in &directory.contents.directories {
            if !used_uids.insert(subdir.uid) {
                return Err(BltfsError::xml(format!(
                    "duplicate UID {} found in directory '{}'",
                    subdir.uid, subdir.name
                )));
            }
            Self::collect_and_validate_uids(subdir, used_uids)?;
        }

        for file in &directory.contents.files {
            if !used_uids.insert(file.uid) {
                return Err(BltfsError::xml(format!(
                    "duplicate UID {} found in file '{}'",
                    file.uid, file.name
                )));
            }
        }

        Ok(())
    }

    /// Count total files in index for diagnostics
    pub(super) fn count_files_in_index(index: &LtfsIndex) -> usize {
        Self::count_files_in_directory(&index.root_directory)
    }

    fn count_files_in_directory(directory: &Directory) -> usize {
        let mut count = directory.contents.files.len();

        for subdir in &directory.contents.directories {
            count += Self::count_files_in_directory(subdir);
        }

        count
    }
}
