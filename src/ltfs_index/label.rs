//! ANSI volume label and `<ltfslabel>` XML construct (spec §6), ported from
//! `original_source/ltfs/label.go`. The CLI's use of this is an external
//! collaborator (spec §1); the data type and construction function live in
//! the core crate so any caller, including the CLI, can build a label.

use super::time::Time;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The 80-byte ANSI `VOL1` label record.
pub type LabelVolume = [u8; 80];

/// Builds the ANSI volume label record described in spec §6:
/// `"VOL1"` + 6-char serial + `"L"` + 13 spaces + `"LTFS"` padded to 13 +
/// `"TEST"` padded to 14 + 28 spaces + `"4"`.
///
/// Panics if `serial` is not exactly 6 bytes, matching the reference's
/// `makeLabelVolume` which treats a wrong-length serial as a programmer
/// error rather than a recoverable one.
pub fn make_volume_label(serial: &str) -> LabelVolume {
    assert_eq!(serial.len(), 6, "volume serial must be exactly 6 bytes");

    let mut s = String::with_capacity(80);
    s.push_str("VOL1");
    s.push_str(serial);
    s.push('L');
    s.push_str(&" ".repeat(13));
    s.push_str("LTFS");
    s.push_str(&" ".repeat(13 - "LTFS".len()));
    s.push_str("TEST");
    s.push_str(&" ".repeat(14 - "TEST".len()));
    s.push_str(&" ".repeat(28));
    s.push('4');

    let mut label = [0u8; 80];
    let bytes = s.as_bytes();
    label[..bytes.len()].copy_from_slice(bytes);
    label
}

/// `<ltfslabel>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "ltfslabel")]
pub struct Label {
    #[serde(rename = "@version")]
    pub version: String,
    pub creator: String,
    pub formattime: Time,
    pub volumeuuid: Uuid,
    pub location: Location,
    pub partitions: Partitions,
    pub blocksize: u64,
    pub compression: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub partition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partitions {
    pub index: String,
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_label_matches_reference_layout() {
        let label = make_volume_label("A00001");
        let expected =
            "VOL1A00001L             LTFS         TEST                                      4";
        assert_eq!(std::str::from_utf8(&label).unwrap(), expected);
    }
}
