//! ISO-8601-with-nanoseconds timestamp newtype used throughout the LTFS XML
//! schema, ported from the original `xmlutil.Time` (nanosecond round-trip,
//! `"2006-01-02T15:04:05.999999999Z"` layout).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const FORMAT_ISO8601: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// A UTC timestamp that (de)serializes to the strict ISO-8601 nanosecond
/// format LTFS indexes use, and flattens to/from nanoseconds-since-epoch for
/// the binary `Entry` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time(DateTime<Utc>);

impl Time {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_unix_nanos(nanos: i64) -> Self {
        let secs = nanos.div_euclid(1_000_000_000);
        let subnanos = nanos.rem_euclid(1_000_000_000) as u32;
        Self(DateTime::from_timestamp(secs, subnanos).unwrap_or_else(|| Utc::now()))
    }

    pub fn unix_nanos(&self) -> i64 {
        self.0.timestamp_nanos_opt().unwrap_or(0)
    }

    pub fn inner(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT_ISO8601))
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_str(&s, FORMAT_ISO8601)
            .map(|dt| Time(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let t0 = Time::from_unix_nanos(1_488_893_258_192_689_471);
        let s = t0.to_string();
        assert_eq!(s, "2017-03-07T13:27:38.192689471Z");

        let buf = quick_xml::se::to_string(&Wrap { time: t0 }).unwrap();
        let back: Wrap = quick_xml::de::from_str(&buf).unwrap();
        assert_eq!(back.time, t0);
        assert_eq!(back.time.unix_nanos(), t0.unix_nanos());
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrap {
        time: Time,
    }
}
