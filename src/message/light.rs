//! Light vector elements: defLightVector, setLightVector
//!
//! Lights are read-only status indicators; there is no newLightVector
//! and the definition carries neither perm nor timeout.

use crate::message::common::PropertyState;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// One member of a light vector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defLight")]
pub struct DefLight {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// GUI label, name by default
    #[serde(rename = "@label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Light state
    #[serde(rename = "$text")]
    pub value: PropertyState,
}

/// One member of a set light vector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "oneLight")]
pub struct OneLight {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// Light state
    #[serde(rename = "$text")]
    pub value: PropertyState,
}

/// Light vector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defLightVector")]
pub struct DefLightVector {
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
    /// Moment these data were valid
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Commentary
    #[serde(rename = "@message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Light members
    #[serde(rename = "defLight", default)]
    pub lights: Vec<DefLight>,
}

/// Light vector value update, device to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "setLightVector")]
pub struct SetLightVector {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name
    #[serde(rename = "@name")]
    pub name: String,
    /// Current state
    #[serde(rename = "@state", skip_serializing_if = "Option::is_none")]
    pub state: Option<PropertyState>,
    /// Moment these data were valid
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Commentary
    #[serde(rename = "@message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Light members
    #[serde(rename = "oneLight", default)]
    pub lights: Vec<OneLight>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::de::from_str;
    use quick_xml::se::to_string;

    #[test]
    fn test_def_has_no_perm_attribute() {
        let def = DefLightVector {
            device: "Weather".to_string(),
            name: "alarms".to_string(),
            label: None,
            group: None,
            state: PropertyState::Ok,
            timestamp: None,
            message: None,
            lights: vec![DefLight {
                name: "rain".to_string(),
                label: None,
                value: PropertyState::Alert,
            }],
        };
        let xml = to_string(&def).unwrap();
        assert!(!xml.contains("perm="));
        assert!(!xml.contains("timeout="));
        assert!(xml.contains(">Alert<"));
    }

    #[test]
    fn test_set_parse() {
        let xml = r#"<setLightVector device="Weather" name="alarms" state="Ok">
            <oneLight name="rain">Idle</oneLight>
            <oneLight name="wind">Busy</oneLight>
        </setLightVector>"#;
        let set: SetLightVector = from_str(xml).unwrap();
        assert_eq!(set.lights.len(), 2);
        assert_eq!(set.lights[1].value, PropertyState::Busy);
    }

    #[test]
    fn test_set_rejects_invalid_light_state() {
        let xml = r#"<setLightVector device="W" name="a">
            <oneLight name="rain">Wet</oneLight>
        </setLightVector>"#;
        assert!(from_str::<SetLightVector>(xml).is_err());
    }
}
