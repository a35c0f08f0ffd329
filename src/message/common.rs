//! Enumerations shared by every vector kind

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Property state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PropertyState {
    /// Property is idle
    Idle,
    /// Property is in its normal state
    Ok,
    /// Property is changing
    Busy,
    /// Property has an error
    Alert,
}

impl FromStr for PropertyState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Idle" => Ok(PropertyState::Idle),
            "Ok" => Ok(PropertyState::Ok),
            "Busy" => Ok(PropertyState::Busy),
            "Alert" => Ok(PropertyState::Alert),
            _ => Err(Error::Parse(format!("invalid property state: {s}"))),
        }
    }
}

impl fmt::Display for PropertyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyState::Idle => write!(f, "Idle"),
            PropertyState::Ok => write!(f, "Ok"),
            PropertyState::Busy => write!(f, "Busy"),
            PropertyState::Alert => write!(f, "Alert"),
        }
    }
}

/// Property permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyPerm {
    /// Read-only property
    Ro,
    /// Write-only property
    Wo,
    /// Read-write property
    Rw,
}

impl FromStr for PropertyPerm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ro" => Ok(PropertyPerm::Ro),
            "wo" => Ok(PropertyPerm::Wo),
            "rw" => Ok(PropertyPerm::Rw),
            _ => Err(Error::Parse(format!("invalid property permission: {s}"))),
        }
    }
}

impl fmt::Display for PropertyPerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyPerm::Ro => write!(f, "ro"),
            PropertyPerm::Wo => write!(f, "wo"),
            PropertyPerm::Rw => write!(f, "rw"),
        }
    }
}

/// Switch state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SwitchState {
    /// Switch is on
    On,
    /// Switch is off
    Off,
}

impl FromStr for SwitchState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "On" => Ok(SwitchState::On),
            "Off" => Ok(SwitchState::Off),
            _ => Err(Error::Parse(format!("invalid switch state: {s}"))),
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::On => write!(f, "On"),
            SwitchState::Off => write!(f, "Off"),
        }
    }
}

/// Switch vector rule, a hint to clients on how members may combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SwitchRule {
    /// Exactly one member is On
    OneOfMany,
    /// One or no member is On
    AtMostOne,
    /// Any combination of members may be On
    AnyOfMany,
}

impl FromStr for SwitchRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OneOfMany" => Ok(SwitchRule::OneOfMany),
            "AtMostOne" => Ok(SwitchRule::AtMostOne),
            "AnyOfMany" => Ok(SwitchRule::AnyOfMany),
            _ => Err(Error::Parse(format!("invalid switch rule: {s}"))),
        }
    }
}

impl fmt::Display for SwitchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchRule::OneOfMany => write!(f, "OneOfMany"),
            SwitchRule::AtMostOne => write!(f, "AtMostOne"),
            SwitchRule::AnyOfMany => write!(f, "AnyOfMany"),
        }
    }
}

/// BLOB transfer policy carried by `enableBLOB`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BlobPolicy {
    /// BLOBs are not sent on this link
    #[default]
    Never,
    /// BLOBs are sent along with other traffic
    Also,
    /// Only BLOB traffic is sent
    Only,
}

impl FromStr for BlobPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Never" => Ok(BlobPolicy::Never),
            "Also" => Ok(BlobPolicy::Also),
            "Only" => Ok(BlobPolicy::Only),
            _ => Err(Error::Parse(format!("invalid BLOB policy: {s}"))),
        }
    }
}

impl fmt::Display for BlobPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobPolicy::Never => write!(f, "Never"),
            BlobPolicy::Also => write!(f, "Also"),
            BlobPolicy::Only => write!(f, "Only"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_state_round_trip() {
        for s in ["Idle", "Ok", "Busy", "Alert"] {
            assert_eq!(s.parse::<PropertyState>().unwrap().to_string(), s);
        }
        assert!("Invalid".parse::<PropertyState>().is_err());
    }

    #[test]
    fn test_perm_round_trip() {
        for s in ["ro", "wo", "rw"] {
            assert_eq!(s.parse::<PropertyPerm>().unwrap().to_string(), s);
        }
        assert!("rx".parse::<PropertyPerm>().is_err());
    }

    #[test]
    fn test_switch_state() {
        assert_eq!("On".parse::<SwitchState>().unwrap(), SwitchState::On);
        assert_eq!("Off".parse::<SwitchState>().unwrap(), SwitchState::Off);
        assert!("on".parse::<SwitchState>().is_err());
    }

    #[test]
    fn test_blob_policy() {
        assert_eq!("Also".parse::<BlobPolicy>().unwrap(), BlobPolicy::Also);
        assert_eq!(" Only ".parse::<BlobPolicy>().unwrap(), BlobPolicy::Only);
        assert_eq!(BlobPolicy::default(), BlobPolicy::Never);
        assert!("Sometimes".parse::<BlobPolicy>().is_err());
    }
}
