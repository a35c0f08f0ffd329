//! Number vector elements: defNumberVector, setNumberVector, newNumberVector
//!
//! Number values are carried as strings end to end; `format.rs` parses
//! them on demand. That is a protocol requirement, not a convenience:
//! clients may send sexagesimal forms that cannot survive a float
//! round-trip.

use crate::error::Result;
use crate::format::parse_number;
use crate::message::common::{PropertyPerm, PropertyState};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// One member of a number vector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defNumber")]
pub struct DefNumber {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// GUI label, name by default
    #[serde(rename = "@label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// printf-style display format, `%<w>.<f>m` selects sexagesimal
    #[serde(rename = "@format")]
    pub format: String,
    /// Minimum value
    #[serde(rename = "@min")]
    pub min: String,
    /// Maximum value; equal to min means the range is unused
    #[serde(rename = "@max")]
    pub max: String,
    /// Allowed increment, zero if unused
    #[serde(rename = "@step")]
    pub step: String,
    /// Number value
    #[serde(rename = "$text", default)]
    pub value: String,
}

impl DefNumber {
    /// The member value as a float.
    pub fn value(&self) -> Result<f64> {
        parse_number(&self.value)
    }
}

/// One member of a set or new number vector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "oneNumber")]
pub struct OneNumber {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// Number value
    #[serde(rename = "$text", default)]
    pub value: String,
}

impl OneNumber {
    /// The member value as a float.
    pub fn value(&self) -> Result<f64> {
        parse_number(&self.value)
    }
}

/// Number vector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defNumberVector")]
pub struct DefNumberVector {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name
    #[serde(rename = "@name")]
    pub name: String,
    /// GUI label, name by default
    #[serde(rename = "@label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Group membership, blank by default
    #[serde(rename = "@group", skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Current state
    #[serde(rename = "@state")]
    pub state: PropertyState,
    /// Client controlability
    #[serde(rename = "@perm")]
    pub perm: PropertyPerm,
    /// Worst-case seconds to effect a change
    #[serde(rename = "@timeout", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Moment these data were valid
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Commentary
    #[serde(rename = "@message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Number members
    #[serde(rename = "defNumber", default)]
    pub numbers: Vec<DefNumber>,
}

/// Number vector value update, device to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "setNumberVector")]
pub struct SetNumberVector {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name
    #[serde(rename = "@name")]
    pub name: String,
    /// Current state
    #[serde(rename = "@state", skip_serializing_if = "Option::is_none")]
    pub state: Option<PropertyState>,
    /// Worst-case seconds to effect a change
    #[serde(rename = "@timeout", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Moment these data were valid
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Commentary
    #[serde(rename = "@message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Number members
    #[serde(rename = "oneNumber", default)]
    pub numbers: Vec<OneNumber>,
}

/// Number vector value submission, client to device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "newNumberVector")]
pub struct NewNumberVector {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name
    #[serde(rename = "@name")]
    pub name: String,
    /// Moment of the submission
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Number members
    #[serde(rename = "oneNumber", default)]
    pub numbers: Vec<OneNumber>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::de::from_str;
    use quick_xml::se::to_string;

    #[test]
    fn test_def_round_trip() {
        let def = DefNumberVector {
            device: "Thermostat".to_string(),
            name: "temperaturevector".to_string(),
            label: Some("Temperature".to_string()),
            group: None,
            state: PropertyState::Ok,
            perm: PropertyPerm::Ro,
            timeout: None,
            timestamp: Some("2026-01-01T00:00:00".parse().unwrap()),
            message: None,
            numbers: vec![DefNumber {
                name: "temperature".to_string(),
                label: None,
                format: "%3.1f".to_string(),
                min: "-50".to_string(),
                max: "99".to_string(),
                step: "0".to_string(),
                value: "20".to_string(),
            }],
        };
        let xml = to_string(&def).unwrap();
        let back: DefNumberVector = from_str(&xml).unwrap();
        assert_eq!(back.numbers[0].format, "%3.1f");
        assert_eq!(back.numbers[0].min, "-50");
        assert_eq!(back.numbers[0].value().unwrap(), 20.0);
    }

    #[test]
    fn test_new_parse_sexagesimal_value() {
        let xml = r#"<newNumberVector device="Telescope" name="radec">
            <oneNumber name="ra">12:30:00</oneNumber>
        </newNumberVector>"#;
        let new: NewNumberVector = from_str(xml).unwrap();
        assert_eq!(new.numbers[0].value().unwrap(), 12.5);
    }

    #[test]
    fn test_member_value_error_is_deferred() {
        // parse keeps the raw string, only value() fails
        let xml = r#"<newNumberVector device="T" name="v">
            <oneNumber name="n">pi-ish</oneNumber>
        </newNumberVector>"#;
        let new: NewNumberVector = from_str(xml).unwrap();
        assert!(new.numbers[0].value().is_err());
    }
}
