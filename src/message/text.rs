//! Text vector elements: defTextVector, setTextVector, newTextVector

use crate::message::common::{PropertyPerm, PropertyState};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// One member of a text vector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defText")]
pub struct DefText {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// GUI label, name by default
    #[serde(rename = "@label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Text value
    #[serde(rename = "$text", default)]
    pub value: String,
}

/// One member of a set or new text vector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "oneText")]
pub struct OneText {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// Text value
    #[serde(rename = "$text", default)]
    pub value: String,
}

/// Text vector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defTextVector")]
pub struct DefTextVector {
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
    /// Text members
    #[serde(rename = "defText", default)]
    pub texts: Vec<DefText>,
}

/// Text vector value update, device to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "setTextVector")]
pub struct SetTextVector {
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
    /// Text members
    #[serde(rename = "oneText", default)]
    pub texts: Vec<OneText>,
}

/// Text vector value submission, client to device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "newTextVector")]
pub struct NewTextVector {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name
    #[serde(rename = "@name")]
    pub name: String,
    /// Moment of the submission
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Text members
    #[serde(rename = "oneText", default)]
    pub texts: Vec<OneText>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::de::from_str;
    use quick_xml::se::to_string;

    #[test]
    fn test_def_round_trip() {
        let def = DefTextVector {
            device: "Dome".to_string(),
            name: "statusvector".to_string(),
            label: None,
            group: None,
            state: PropertyState::Idle,
            perm: PropertyPerm::Ro,
            timeout: None,
            timestamp: None,
            message: None,
            texts: vec![DefText {
                name: "status".to_string(),
                label: Some("Status".to_string()),
                value: "closed".to_string(),
            }],
        };
        let xml = to_string(&def).unwrap();
        let back: DefTextVector = from_str(&xml).unwrap();
        assert_eq!(back.perm, PropertyPerm::Ro);
        assert_eq!(back.texts[0].value, "closed");
        assert_eq!(back.texts[0].label.as_deref(), Some("Status"));
    }

    #[test]
    fn test_set_parse_empty_value() {
        let xml = r#"<setTextVector device="Dome" name="statusvector" state="Ok">
            <oneText name="status"></oneText>
        </setTextVector>"#;
        let set: SetTextVector = from_str(xml).unwrap();
        assert_eq!(set.texts[0].value, "");
        assert_eq!(set.state, Some(PropertyState::Ok));
    }
}
