//! Log timestamp timezone
//!
//! Access log timestamps are rendered in a configured zone: an IANA name
//! such as `Asia/Jakarta`, `UTC`, or `Local` for the host's zone.

use chrono::{DateTime, FixedOffset, Local, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Timezone {
    Local,
    Named(Tz),
}

impl Timezone {
    /// Current time in this zone
    pub fn now(self) -> DateTime<FixedOffset> {
        self.convert(Utc::now())
    }

    /// Convert a UTC instant into this zone
    pub fn convert(self, time: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Self::Local => time.with_timezone(&Local).fixed_offset(),
            Self::Named(tz) => time.with_timezone(&tz).fixed_offset(),
        }
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self::Named(chrono_tz::UTC)
    }
}

impl FromStr for Timezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        name.parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| format!("unknown timezone '{name}'"))
    }
}

impl TryFrom<String> for Timezone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}
