//! INDI protocol wire model
//!
//! One serde struct per top-level element, serialized with quick-xml,
//! and [`ProtocolMessage`], the tagged union the router moves around.
//! The element set is closed; anything else on the wire is noise the
//! framer discards.

use crate::error::{Error, Result};
use quick_xml::de::from_str;
use quick_xml::se::to_string;
use std::str::FromStr;

pub mod basic;
pub mod blob;
pub mod common;
pub mod light;
pub mod number;
pub mod switch;
pub mod text;

pub use basic::{DelProperty, EnableBlob, GetProperties, MessageElement};
pub use blob::{DefBlob, DefBlobVector, NewBlobVector, OneBlob, SetBlobVector, BLOB_CHUNK_SIZE};
pub use common::{BlobPolicy, PropertyPerm, PropertyState, SwitchRule, SwitchState};
pub use light::{DefLight, DefLightVector, OneLight, SetLightVector};
pub use number::{DefNumber, DefNumberVector, NewNumberVector, OneNumber, SetNumberVector};
pub use switch::{DefSwitch, DefSwitchVector, NewSwitchVector, OneSwitch, SetSwitchVector};
pub use text::{DefText, DefTextVector, NewTextVector, OneText, SetTextVector};

/// Every tag a conforming peer may send at the top level.
pub const TAGS: [&str; 18] = [
    "getProperties",
    "enableBLOB",
    "message",
    "delProperty",
    "defSwitchVector",
    "defLightVector",
    "defTextVector",
    "defNumberVector",
    "defBLOBVector",
    "setSwitchVector",
    "setLightVector",
    "setTextVector",
    "setNumberVector",
    "setBLOBVector",
    "newSwitchVector",
    "newTextVector",
    "newNumberVector",
    "newBLOBVector",
];

/// A parsed top-level INDI element
#[derive(Debug, Clone)]
pub enum ProtocolMessage {
    /// getProperties
    GetProperties(GetProperties),
    /// enableBLOB
    EnableBlob(EnableBlob),
    /// message
    Message(MessageElement),
    /// delProperty
    DelProperty(DelProperty),
    /// defSwitchVector
    DefSwitch(DefSwitchVector),
    /// defLightVector
    DefLight(DefLightVector),
    /// defTextVector
    DefText(DefTextVector),
    /// defNumberVector
    DefNumber(DefNumberVector),
    /// defBLOBVector
    DefBlob(DefBlobVector),
    /// setSwitchVector
    SetSwitch(SetSwitchVector),
    /// setLightVector
    SetLight(SetLightVector),
    /// setTextVector
    SetText(SetTextVector),
    /// setNumberVector
    SetNumber(SetNumberVector),
    /// setBLOBVector
    SetBlob(SetBlobVector),
    /// newSwitchVector
    NewSwitch(NewSwitchVector),
    /// newTextVector
    NewText(NewTextVector),
    /// newNumberVector
    NewNumber(NewNumberVector),
    /// newBLOBVector
    NewBlob(NewBlobVector),
}

/// Extract the tag name from the first element in `xml`, if any.
pub(crate) fn sniff_tag(xml: &str) -> Option<&str> {
    let rest = xml.trim_start().strip_prefix('<')?;
    let end = rest.find(|c: char| c.is_whitespace() || c == '>' || c == '/')?;
    Some(&rest[..end])
}

impl ProtocolMessage {
    /// The element's tag name.
    pub fn tag(&self) -> &'static str {
        match self {
            ProtocolMessage::GetProperties(_) => "getProperties",
            ProtocolMessage::EnableBlob(_) => "enableBLOB",
            ProtocolMessage::Message(_) => "message",
            ProtocolMessage::DelProperty(_) => "delProperty",
            ProtocolMessage::DefSwitch(_) => "defSwitchVector",
            ProtocolMessage::DefLight(_) => "defLightVector",
            ProtocolMessage::DefText(_) => "defTextVector",
            ProtocolMessage::DefNumber(_) => "defNumberVector",
            ProtocolMessage::DefBlob(_) => "defBLOBVector",
            ProtocolMessage::SetSwitch(_) => "setSwitchVector",
            ProtocolMessage::SetLight(_) => "setLightVector",
            ProtocolMessage::SetText(_) => "setTextVector",
            ProtocolMessage::SetNumber(_) => "setNumberVector",
            ProtocolMessage::SetBlob(_) => "setBLOBVector",
            ProtocolMessage::NewSwitch(_) => "newSwitchVector",
            ProtocolMessage::NewText(_) => "newTextVector",
            ProtocolMessage::NewNumber(_) => "newNumberVector",
            ProtocolMessage::NewBlob(_) => "newBLOBVector",
        }
    }

    /// The device attribute, if the element carries one.
    pub fn device(&self) -> Option<&str> {
        match self {
            ProtocolMessage::GetProperties(m) => m.device.as_deref(),
            ProtocolMessage::EnableBlob(m) => Some(&m.device),
            ProtocolMessage::Message(m) => m.device.as_deref(),
            ProtocolMessage::DelProperty(m) => Some(&m.device),
            ProtocolMessage::DefSwitch(m) => Some(&m.device),
            ProtocolMessage::DefLight(m) => Some(&m.device),
            ProtocolMessage::DefText(m) => Some(&m.device),
            ProtocolMessage::DefNumber(m) => Some(&m.device),
            ProtocolMessage::DefBlob(m) => Some(&m.device),
            ProtocolMessage::SetSwitch(m) => Some(&m.device),
            ProtocolMessage::SetLight(m) => Some(&m.device),
            ProtocolMessage::SetText(m) => Some(&m.device),
            ProtocolMessage::SetNumber(m) => Some(&m.device),
            ProtocolMessage::SetBlob(m) => Some(&m.device),
            ProtocolMessage::NewSwitch(m) => Some(&m.device),
            ProtocolMessage::NewText(m) => Some(&m.device),
            ProtocolMessage::NewNumber(m) => Some(&m.device),
            ProtocolMessage::NewBlob(m) => Some(&m.device),
        }
    }

    /// The name attribute, if the element carries one.
    pub fn name(&self) -> Option<&str> {
        match self {
            ProtocolMessage::GetProperties(m) => m.name.as_deref(),
            ProtocolMessage::EnableBlob(m) => m.name.as_deref(),
            ProtocolMessage::Message(_) => None,
            ProtocolMessage::DelProperty(m) => m.name.as_deref(),
            ProtocolMessage::DefSwitch(m) => Some(&m.name),
            ProtocolMessage::DefLight(m) => Some(&m.name),
            ProtocolMessage::DefText(m) => Some(&m.name),
            ProtocolMessage::DefNumber(m) => Some(&m.name),
            ProtocolMessage::DefBlob(m) => Some(&m.name),
            ProtocolMessage::SetSwitch(m) => Some(&m.name),
            ProtocolMessage::SetLight(m) => Some(&m.name),
            ProtocolMessage::SetText(m) => Some(&m.name),
            ProtocolMessage::SetNumber(m) => Some(&m.name),
            ProtocolMessage::SetBlob(m) => Some(&m.name),
            ProtocolMessage::NewSwitch(m) => Some(&m.name),
            ProtocolMessage::NewText(m) => Some(&m.name),
            ProtocolMessage::NewNumber(m) => Some(&m.name),
            ProtocolMessage::NewBlob(m) => Some(&m.name),
        }
    }

    /// True for new*Vector elements (client to device only).
    pub fn is_new(&self) -> bool {
        matches!(
            self,
            ProtocolMessage::NewSwitch(_)
                | ProtocolMessage::NewText(_)
                | ProtocolMessage::NewNumber(_)
                | ProtocolMessage::NewBlob(_)
        )
    }

    /// True for def*Vector elements.
    pub fn is_def(&self) -> bool {
        matches!(
            self,
            ProtocolMessage::DefSwitch(_)
                | ProtocolMessage::DefLight(_)
                | ProtocolMessage::DefText(_)
                | ProtocolMessage::DefNumber(_)
                | ProtocolMessage::DefBlob(_)
        )
    }

    /// True for set*Vector elements.
    pub fn is_set(&self) -> bool {
        matches!(
            self,
            ProtocolMessage::SetSwitch(_)
                | ProtocolMessage::SetLight(_)
                | ProtocolMessage::SetText(_)
                | ProtocolMessage::SetNumber(_)
                | ProtocolMessage::SetBlob(_)
        )
    }

    /// True for elements that never carry member children.
    pub fn is_childless(&self) -> bool {
        matches!(
            self,
            ProtocolMessage::GetProperties(_)
                | ProtocolMessage::EnableBlob(_)
                | ProtocolMessage::Message(_)
                | ProtocolMessage::DelProperty(_)
        )
    }

    /// Serialize to its wire form.
    pub fn to_xml(&self) -> Result<String> {
        let xml = match self {
            ProtocolMessage::GetProperties(m) => to_string(m)?,
            ProtocolMessage::EnableBlob(m) => to_string(m)?,
            ProtocolMessage::Message(m) => to_string(m)?,
            ProtocolMessage::DelProperty(m) => to_string(m)?,
            ProtocolMessage::DefSwitch(m) => to_string(m)?,
            ProtocolMessage::DefLight(m) => to_string(m)?,
            ProtocolMessage::DefText(m) => to_string(m)?,
            ProtocolMessage::DefNumber(m) => to_string(m)?,
            ProtocolMessage::DefBlob(m) => to_string(m)?,
            ProtocolMessage::SetSwitch(m) => to_string(m)?,
            ProtocolMessage::SetLight(m) => to_string(m)?,
            ProtocolMessage::SetText(m) => to_string(m)?,
            ProtocolMessage::SetNumber(m) => to_string(m)?,
            ProtocolMessage::SetBlob(m) => to_string(m)?,
            ProtocolMessage::NewSwitch(m) => to_string(m)?,
            ProtocolMessage::NewText(m) => to_string(m)?,
            ProtocolMessage::NewNumber(m) => to_string(m)?,
            ProtocolMessage::NewBlob(m) => to_string(m)?,
        };
        Ok(xml)
    }

    /// A form safe for DEBUG logging: BLOB payloads elided.
    pub fn to_log_string(&self) -> String {
        match self {
            ProtocolMessage::SetBlob(m) => format!(
                "<setBLOBVector device=\"{}\" name=\"{}\" blobs={} (payload not logged)/>",
                m.device,
                m.name,
                m.blobs.len()
            ),
            ProtocolMessage::NewBlob(m) => format!(
                "<newBLOBVector device=\"{}\" name=\"{}\" blobs={} (payload not logged)/>",
                m.device,
                m.name,
                m.blobs.len()
            ),
            other => other.to_xml().unwrap_or_else(|_| other.tag().to_string()),
        }
    }
}

impl FromStr for ProtocolMessage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tag = sniff_tag(s).ok_or_else(|| Error::Parse("no element found".to_string()))?;
        let parsed = match tag {
            "getProperties" => ProtocolMessage::GetProperties(from_str(s)?),
            "enableBLOB" => ProtocolMessage::EnableBlob(from_str(s)?),
            "message" => ProtocolMessage::Message(from_str(s)?),
            "delProperty" => ProtocolMessage::DelProperty(from_str(s)?),
            "defSwitchVector" => ProtocolMessage::DefSwitch(from_str(s)?),
            "defLightVector" => ProtocolMessage::DefLight(from_str(s)?),
            "defTextVector" => ProtocolMessage::DefText(from_str(s)?),
            "defNumberVector" => ProtocolMessage::DefNumber(from_str(s)?),
            "defBLOBVector" => ProtocolMessage::DefBlob(from_str(s)?),
            "setSwitchVector" => ProtocolMessage::SetSwitch(from_str(s)?),
            "setLightVector" => ProtocolMessage::SetLight(from_str(s)?),
            "setTextVector" => ProtocolMessage::SetText(from_str(s)?),
            "setNumberVector" => ProtocolMessage::SetNumber(from_str(s)?),
            "setBLOBVector" => ProtocolMessage::SetBlob(from_str(s)?),
            "newSwitchVector" => ProtocolMessage::NewSwitch(from_str(s)?),
            "newTextVector" => ProtocolMessage::NewText(from_str(s)?),
            "newNumberVector" => ProtocolMessage::NewNumber(from_str(s)?),
            "newBLOBVector" => ProtocolMessage::NewBlob(from_str(s)?),
            other => return Err(Error::Parse(format!("unrecognized tag: {other}"))),
        };
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_tag() {
        assert_eq!(sniff_tag(r#"<getProperties version="1.7"/>"#), Some("getProperties"));
        assert_eq!(sniff_tag("  \n<message/>"), Some("message"));
        assert_eq!(sniff_tag("no xml here"), None);
    }

    #[test]
    fn test_dispatch_by_tag() {
        let msg: ProtocolMessage = r#"<getProperties version="1.7" device="Cam"/>"#.parse().unwrap();
        assert!(matches!(msg, ProtocolMessage::GetProperties(_)));
        assert_eq!(msg.device(), Some("Cam"));
        assert!(msg.is_childless());

        let msg: ProtocolMessage = r#"<newNumberVector device="Thermostat" name="targetvector">
            <oneNumber name="target">22</oneNumber>
        </newNumberVector>"#
            .parse()
            .unwrap();
        assert!(msg.is_new());
        assert_eq!(msg.name(), Some("targetvector"));
    }

    #[test]
    fn test_unknown_tag_is_parse_error() {
        let err = "<defFancyVector device=\"X\"/>".parse::<ProtocolMessage>().unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_serialize_parse_round_trip() {
        let msg: ProtocolMessage = r#"<setNumberVector device="Thermostat" name="temperaturevector" state="Ok" timestamp="2026-01-01T00:00:00"><oneNumber name="temperature">21.5</oneNumber></setNumberVector>"#
            .parse()
            .unwrap();
        let xml = msg.to_xml().unwrap();
        let back: ProtocolMessage = xml.parse().unwrap();
        assert_eq!(back.tag(), "setNumberVector");
        assert_eq!(back.device(), Some("Thermostat"));
        match back {
            ProtocolMessage::SetNumber(v) => {
                assert_eq!(v.numbers[0].value, "21.5");
                assert_eq!(v.state, Some(PropertyState::Ok));
            }
            _ => panic!("wrong arm"),
        }
    }

    #[test]
    fn test_blob_log_string_elides_payload() {
        let msg: ProtocolMessage = r#"<setBLOBVector device="Cam" name="image" state="Ok"><oneBLOB name="frame" size="3" format=".raw">AAEC</oneBLOB></setBLOBVector>"#
            .parse()
            .unwrap();
        let logged = msg.to_log_string();
        assert!(!logged.contains("AAEC"));
        assert!(logged.contains("not logged"));
    }
}
