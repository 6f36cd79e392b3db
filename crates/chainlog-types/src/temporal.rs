use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// UTC instant at millisecond precision with exactly one textual form.
///
/// Entry hashes cover the rendered timestamp byte-for-byte, so the value is
/// truncated to milliseconds on construction and always rendered as
/// `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryTimestamp(DateTime<Utc>);

impl EntryTimestamp {
    /// The current wall-clock instant, truncated to milliseconds.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Truncate an arbitrary instant to millisecond precision.
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        let millis = instant.timestamp_millis();
        // In-range millis always map back to a valid instant.
        Self(DateTime::from_timestamp_millis(millis).unwrap_or(instant))
    }

    /// Build from milliseconds since the UNIX epoch.
    pub fn from_millis(millis: i64) -> Result<Self, TypeError> {
        DateTime::from_timestamp_millis(millis)
            .map(Self)
            .ok_or_else(|| TypeError::InvalidTimestamp(format!("{millis}ms out of range")))
    }

    /// Parse the canonical rendering. Any other RFC 3339 spelling of the
    /// same instant (offsets, other precisions) is rejected.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let parsed = DateTime::parse_from_rfc3339(s)
            .map_err(|e| TypeError::InvalidTimestamp(format!("{s}: {e}")))?;
        let stamp = Self::from_datetime(parsed.with_timezone(&Utc));
        if stamp.to_canonical() != s {
            return Err(TypeError::InvalidTimestamp(format!(
                "{s}: not in canonical form {}",
                stamp.to_canonical()
            )));
        }
        Ok(stamp)
    }

    /// Milliseconds since the UNIX epoch.
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// The canonical string used for hashing and storage.
    pub fn to_canonical(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Debug for EntryTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryTimestamp({})", self.to_canonical())
    }
}

impl fmt::Display for EntryTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

impl Serialize for EntryTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical())
    }
}

impl<'de> Deserialize<'de> for EntryTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
