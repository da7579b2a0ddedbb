//! Duration wire format.
//!
//! All durations in the API surface are strings like `"5s"`, `"222ms"` or
//! `"5m33s"`: a chain of integer-and-unit segments, largest unit first.
//! [`ApiDuration`] wraps [`std::time::Duration`] with a serde codec for that
//! format, plus the formatting rules the deprecated second/millisecond
//! integer fields are migrated through.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A duration carried as a unit-suffixed string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ApiDuration(pub Duration);

impl ApiDuration {
    pub fn from_secs(secs: u64) -> Self {
        ApiDuration(Duration::from_secs(secs))
    }

    pub fn from_millis(millis: u64) -> Self {
        ApiDuration(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for ApiDuration {
    fn from(d: Duration) -> Self {
        ApiDuration(d)
    }
}

impl From<ApiDuration> for Duration {
    fn from(d: ApiDuration) -> Self {
        d.0
    }
}

impl fmt::Display for ApiDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        if d.is_zero() {
            return write!(f, "0s");
        }
        let nanos = d.as_nanos();
        if nanos < 1_000_000_000 {
            // Sub-second: largest unit that divides evenly.
            return if nanos % 1_000_000 == 0 {
                write!(f, "{}ms", nanos / 1_000_000)
            } else if nanos % 1_000 == 0 {
                write!(f, "{}us", nanos / 1_000)
            } else {
                write!(f, "{}ns", nanos)
            };
        }
        let total_secs = d.as_secs();
        let subsec_millis = d.subsec_millis();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let secs = total_secs % 60;
        if hours > 0 {
            write!(f, "{}h", hours)?;
        }
        if hours > 0 || minutes > 0 {
            write!(f, "{}m", minutes)?;
        }
        if subsec_millis > 0 {
            let mut frac = format!("{:03}", subsec_millis);
            while frac.ends_with('0') {
                frac.pop();
            }
            write!(f, "{}.{}s", secs, frac)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

/// Parse errors for the duration string format.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid duration string '{0}'")]
pub struct ParseDurationError(String);

impl FromStr for ApiDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let original = s;
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseDurationError(original.to_string()));
        }
        let mut total = Duration::ZERO;
        let mut rest = s;
        while !rest.is_empty() {
            let num_end = rest
                .find(|c: char| !c.is_ascii_digit() && c != '.')
                .ok_or_else(|| ParseDurationError(original.to_string()))?;
            if num_end == 0 {
                return Err(ParseDurationError(original.to_string()));
            }
            let value: f64 = rest[..num_end]
                .parse()
                .map_err(|_| ParseDurationError(original.to_string()))?;
            rest = &rest[num_end..];
            let unit_end = rest
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(rest.len());
            let unit = &rest[..unit_end];
            rest = &rest[unit_end..];
            let unit_nanos: f64 = match unit {
                "ns" => 1.0,
                "us" | "µs" => 1_000.0,
                "ms" => 1_000_000.0,
                "s" => 1_000_000_000.0,
                "m" => 60.0 * 1_000_000_000.0,
                "h" => 3600.0 * 1_000_000_000.0,
                _ => return Err(ParseDurationError(original.to_string())),
            };
            total += Duration::from_nanos((value * unit_nanos) as u64);
        }
        Ok(ApiDuration(total))
    }
}

impl Serialize for ApiDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ApiDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
