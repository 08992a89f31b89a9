//! LTFS Index XML Parser

use super::types::*;
use crate::error::{BltfsError, Result};
use tracing::{debug, info};

impl LtfsIndex {
    /// Parses an LTFS index from XML content. Tolerates content that also
    /// carries an adjacent `<ltfslabel>` block by extracting just the
    /// `<ltfsindex>...</ltfsindex>` span first.
    pub fn from_xml(xml_content: &str) -> Result<Self> {
        debug!("parsing LTFS index XML, length: {}", xml_content.len());

        let index_xml = Self::extract_ltfs_index_section(xml_content)?;

        Self::validate_xml_structure(&index_xml)?;

        let index: LtfsIndex = quick_xml::de::from_str(&index_xml)
            .map_err(|e| BltfsError::xml(format!("failed to parse LTFS index XML: {e}")))?;

        Self::validate_parsed_index(&index)?;

        info!(
            "parsed LTFS index: version {}, generation {}, files {}",
            index.version,
            index.generationnumber,
            Self::count_files_in_index(&index)
        );

        Ok(index)
    }

    fn extract_ltfs_index_section(xml_content: &str) -> Result<String> {
        if let Some(start) = xml_content.find("<ltfsindex") {
            if let Some(end) = xml_content.find("</ltfsindex>") {
                let mut section = xml_content[start..end + "</ltfsindex>".len()].to_string();
                if !section.trim_start().starts_with("<?xml") {
                    section = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{section}");
                }
                return Ok(section);
            }
        }

        Err(BltfsError::xml("no <ltfsindex> section found in XML content"))
    }
}
