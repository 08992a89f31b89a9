//! The `filedebug_tc_conf.xml` sidecar (§4.2), ported from
//! `original_source/backend/file/cartridge_config.go`.

use crate::error::{BltfsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CARTRIDGE_CONFIG_FILE: &str = "filedebug_tc_conf.xml";
pub const DEFAULT_CAPACITY_MB: u64 = 3 * 1024;
pub const DEFAULT_BLOCK_SIZE: u64 = 512 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "filedebug_cartridge_config")]
pub struct CartridgeConfig {
    #[serde(rename = "dummy_id")]
    pub dummy_io: bool,
    pub emulate_readonly: bool,
    #[serde(rename = "capacity_mb")]
    pub capacity: u64,
    #[serde(rename = "cart_type")]
    pub cartridge_type: String,
    pub density_code: i32,
}

impl Default for CartridgeConfig {
    fn default() -> Self {
        Self {
            dummy_io: false,
            emulate_readonly: false,
            capacity: DEFAULT_CAPACITY_MB,
            cartridge_type: "L5".to_string(),
            density_code: 0x58,
        }
    }
}

impl CartridgeConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let buf = std::fs::read_to_string(path)?;
        quick_xml::de::from_str(&buf)
            .map_err(|e| BltfsError::xml(format!("failed to parse cartridge config: {e}")))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let body = quick_xml::se::to_string(self)
            .map_err(|e| BltfsError::xml(format!("failed to serialize cartridge config: {e}")))?;
        let complete = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n");
        std::fs::write(path, complete)?;
        Ok(())
    }
}
