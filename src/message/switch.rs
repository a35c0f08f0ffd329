//! Switch vector elements: defSwitchVector, setSwitchVector, newSwitchVector

use crate::error::{Error, Result};
use crate::message::common::{PropertyPerm, PropertyState, SwitchRule, SwitchState};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// One member of a switch vector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defSwitch")]
pub struct DefSwitch {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// GUI label, name by default
    #[serde(rename = "@label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Switch state
    #[serde(rename = "$text")]
    pub value: SwitchState,
}

/// One member of a set or new switch vector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "oneSwitch")]
pub struct OneSwitch {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// Switch state
    #[serde(rename = "$text")]
    pub value: SwitchState,
}

/// Switch vector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defSwitchVector")]
pub struct DefSwitchVector {
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
    /// Member combination rule
    #[serde(rename = "@rule")]
    pub rule: SwitchRule,
    /// Worst-case seconds to effect a change
    #[serde(rename = "@timeout", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Moment these data were valid
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Commentary
    #[serde(rename = "@message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Switch members
    #[serde(rename = "defSwitch", default)]
    pub switches: Vec<DefSwitch>,
}

impl DefSwitchVector {
    /// Check the member states against the vector rule.
    pub fn validate(&self) -> Result<()> {
        let on_count = self
            .switches
            .iter()
            .filter(|s| s.value == SwitchState::On)
            .count();
        match self.rule {
            SwitchRule::OneOfMany if on_count != 1 => Err(Error::InvalidArgument(format!(
                "OneOfMany vector {} has {} members On",
                self.name, on_count
            ))),
            SwitchRule::AtMostOne if on_count > 1 => Err(Error::InvalidArgument(format!(
                "AtMostOne vector {} has {} members On",
                self.name, on_count
            ))),
            _ => Ok(()),
        }
    }
}

/// Switch vector value update, device to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "setSwitchVector")]
pub struct SetSwitchVector {
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
    /// Switch members
    #[serde(rename = "oneSwitch", default)]
    pub switches: Vec<OneSwitch>,
}

/// Switch vector value submission, client to device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "newSwitchVector")]
pub struct NewSwitchVector {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name
    #[serde(rename = "@name")]
    pub name: String,
    /// Moment of the submission
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Switch members
    #[serde(rename = "oneSwitch", default)]
    pub switches: Vec<OneSwitch>,
}
