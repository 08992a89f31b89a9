//! LTFS Index XML Serializer

use super::types::LtfsIndex;
use crate::error::{BltfsError, Result};
use tracing::debug;

impl LtfsIndex {
    /// Serializes the index back to XML, prefixed with the XML declaration.
    /// Byte-for-byte stable modulo timestamp precision (spec §3 invariants).
    pub fn to_xml(&self) -> Result<String> {
        let body = quick_xml::se::to_string(self)
            .map_err(|e| BltfsError::xml(format!("failed to serialize LTFS index: {e}")))?;

        let complete = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}");
        debug!("serialized LTFS index to XML ({} bytes)", complete.len());
        Ok(complete)
    }
}
