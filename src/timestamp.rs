//! UTC timestamps in the INDI wire format (YYYY-MM-DDTHH:MM:SS[.f])

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A UTC timestamp as carried on the wire.
///
/// The fractional seconds are kept as the exact digit string received,
/// so parse-then-serialize round-trips byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    datetime: DateTime<Utc>,
    fraction: Option<String>,
}

impl Timestamp {
    /// Current UTC time with the given number of fractional digits.
    pub fn now(precision: Option<u8>) -> Self {
        Self::from_datetime(Utc::now(), precision)
    }

    /// Build from a `DateTime<Utc>` with the given number of fractional digits.
    pub fn from_datetime(datetime: DateTime<Utc>, precision: Option<u8>) -> Self {
        let fraction = precision.map(|p| {
            let nanos = datetime.timestamp_subsec_nanos() as f64;
            let subsec = (nanos / 1_000_000_000.0 * 10f64.powi(p as i32)).trunc() as u32;
            format!("{:0>width$}", subsec, width = p as usize)
        });
        Self { datetime, fraction }
    }

    /// The underlying `DateTime<Utc>`, fraction digits not included.
    pub fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now(None)
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !s.chars().all(|c| c.is_ascii_digit() || ".:-T".contains(c)) {
            return Err(Error::Parse(format!("invalid characters in timestamp: {s}")));
        }
        let (whole, fraction) = match s.split_once('.') {
            Some((w, f)) => {
                if f.is_empty() || !f.chars().all(|c| c.is_ascii_digit()) {
                    return Err(Error::Parse(format!("invalid fraction in timestamp: {s}")));
                }
                (w, Some(f.to_string()))
            }
            None => (s, None),
        };
        let naive = NaiveDateTime::parse_from_str(whole, "%Y-%m-%dT%H:%M:%S")
            .map_err(|e| Error::Parse(format!("invalid timestamp {s}: {e}")))?;
        Ok(Self {
            datetime: DateTime::from_naive_utc_and_offset(naive, Utc),
            fraction,
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.datetime.format("%Y-%m-%dT%H:%M:%S");
        match &self.fraction {
            Some(fraction) => write!(f, "{}.{}", base, fraction),
            None => write!(f, "{}", base),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for s in ["2026-03-01T19:30:00", "2026-03-01T19:30:00.5", "2026-03-01T19:30:00.500"] {
            let ts = Timestamp::from_str(s).unwrap();
            assert_eq!(ts.to_string(), s);
        }
    }

    #[test]
    fn test_from_datetime_precision() {
        let dt = DateTime::parse_from_rfc3339("2026-02-21T19:30:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            Timestamp::from_datetime(dt, Some(1)).to_string(),
            "2026-02-21T19:30:00.1"
        );
        assert_eq!(
            Timestamp::from_datetime(dt, Some(3)).to_string(),
            "2026-02-21T19:30:00.123"
        );
        assert_eq!(
            Timestamp::from_datetime(dt, None).to_string(),
            "2026-02-21T19:30:00"
        );
    }

    #[test]
    fn test_now_not_in_future() {
        let ts = Timestamp::now(Some(2));
        assert!(ts.datetime() <= Utc::now());
    }

    #[test]
    fn test_invalid() {
        assert!(Timestamp::from_str("not a time").is_err());
        assert!(Timestamp::from_str("2026-02-21 19:30:00").is_err());
        assert!(Timestamp::from_str("2026-02-21T19:30:00.").is_err());
        assert!(Timestamp::from_str("2026-02-21T19:30:00.abc").is_err());
    }
}
