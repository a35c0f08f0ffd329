//! Childless protocol elements: getProperties, enableBLOB, message, delProperty

use crate::message::common::BlobPolicy;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Properties request, also the snoop-subscription verb
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "getProperties")]
pub struct GetProperties {
    /// Protocol version, "1.7" on everything this crate emits
    #[serde(rename = "@version", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Device to get properties for, absent means all
    #[serde(rename = "@device", skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Vector to get properties for, absent means all of the device
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GetProperties {
    /// Build a version-1.7 request for the given target set.
    pub fn new(device: Option<&str>, name: Option<&str>) -> Self {
        Self {
            version: Some(crate::PROTOCOL_VERSION.to_string()),
            device: device.map(str::to_string),
            name: name.map(str::to_string),
        }
    }
}

/// BLOB transfer control from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "enableBLOB")]
pub struct EnableBlob {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// BLOB vector name, absent means the whole device
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Requested policy
    #[serde(rename = "$text")]
    pub policy: BlobPolicy,
}

/// Commentary associated with a device or the whole system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "message")]
pub struct MessageElement {
    /// Device name; absent means system-wide
    #[serde(rename = "@device", skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Moment the message was generated
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Message text
    #[serde(rename = "@message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Withdraws a device or one of its vectors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "delProperty")]
pub struct DelProperty {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name, absent means the whole device
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Moment of withdrawal
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Commentary
    #[serde(rename = "@message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::de::from_str;
    use quick_xml::se::to_string;

    #[test]
    fn test_get_properties_versioned() {
        let props = GetProperties::new(Some("Thermostat"), None);
        assert_eq!(props.version.as_deref(), Some("1.7"));
        let xml = to_string(&props).unwrap();
        assert!(xml.contains(r#"version="1.7""#));
        assert!(xml.contains(r#"device="Thermostat""#));
        assert!(!xml.contains("name="));
    }

    #[test]
    fn test_enable_blob_parse() {
        let e: EnableBlob = from_str(r#"<enableBLOB device="Cam">Also</enableBLOB>"#).unwrap();
        assert_eq!(e.device, "Cam");
        assert!(e.name.is_none());
        assert_eq!(e.policy, BlobPolicy::Also);
    }

    #[test]
    fn test_del_property_round_trip() {
        let del = DelProperty {
            device: "Cam".to_string(),
            name: Some("image".to_string()),
            timestamp: Some("2026-01-01T00:00:00".parse().unwrap()),
            message: None,
        };
        let xml = to_string(&del).unwrap();
        let back: DelProperty = from_str(&xml).unwrap();
        assert_eq!(back.device, "Cam");
        assert_eq!(back.name.as_deref(), Some("image"));
        assert_eq!(back.timestamp.unwrap().to_string(), "2026-01-01T00:00:00");
    }
}
