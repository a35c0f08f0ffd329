//! Per-client BLOB send policy
//!
//! Each client connection carries one [`BlobGate`] tracking the
//! `enableBLOB` rules it has requested: a per-device default plus
//! per-vector overrides, all `Never` until the client says otherwise.
//! The gate decides which outbound elements may traverse the link.

use crate::message::{BlobPolicy, EnableBlob, ProtocolMessage};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct DeviceGate {
    default: BlobPolicy,
    vectors: HashMap<String, BlobPolicy>,
}

impl DeviceGate {
    fn has_only(&self) -> bool {
        self.default == BlobPolicy::Only || self.vectors.values().any(|p| *p == BlobPolicy::Only)
    }
}

/// The `enableBLOB` rule table for one client connection.
#[derive(Debug, Default)]
pub struct BlobGate {
    devices: HashMap<String, DeviceGate>,
}

impl BlobGate {
    /// A fresh gate: everything defaults to `Never`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an `enableBLOB` element. The caller verifies the claims
    /// first: `device_known` that the device exists somewhere in the
    /// registry, `known_blob_vector` that a named vector is a BLOB
    /// vector of that device. Invalid requests are ignored.
    pub fn apply(&mut self, request: &EnableBlob, device_known: bool, known_blob_vector: bool) {
        if !device_known {
            debug!(device = %request.device, "enableBLOB for unknown device ignored");
            return;
        }
        let gate = self.devices.entry(request.device.clone()).or_default();
        match &request.name {
            None => gate.default = request.policy,
            Some(name) => {
                if known_blob_vector {
                    gate.vectors.insert(name.clone(), request.policy);
                } else {
                    debug!(
                        device = %request.device,
                        vector = %name,
                        "enableBLOB for unknown BLOB vector ignored"
                    );
                }
            }
        }
    }

    /// May this element traverse the link?
    pub fn allowed(&self, msg: &ProtocolMessage) -> bool {
        // new* travels client to server only
        if msg.is_new() {
            return false;
        }
        let Some(device) = msg.device() else {
            // device-less broadcast traffic is suppressed while any
            // entry demands BLOBs only
            return !self.any_only();
        };
        if let ProtocolMessage::SetBlob(set) = msg {
            return self.blob_policy(device, &set.name) != BlobPolicy::Never;
        }
        // non-BLOB element for a device in BLOB-only mode is blocked
        !self
            .devices
            .get(device)
            .map(DeviceGate::has_only)
            .unwrap_or(false)
    }

    fn blob_policy(&self, device: &str, vector: &str) -> BlobPolicy {
        match self.devices.get(device) {
            Some(gate) => gate.vectors.get(vector).copied().unwrap_or(gate.default),
            None => BlobPolicy::Never,
        }
    }

    fn any_only(&self) -> bool {
        self.devices.values().any(DeviceGate::has_only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{
        MessageElement, OneBlob, PropertyState, SetBlobVector, SetNumberVector,
    };

    fn set_blob(device: &str, name: &str) -> ProtocolMessage {
        ProtocolMessage::SetBlob(SetBlobVector {
            device: device.to_string(),
            name: name.to_string(),
            state: PropertyState::Ok,
            timeout: None,
            timestamp: None,
            message: None,
            blobs: vec![OneBlob::from_bytes("frame", &[1, 2, 3], 0, ".raw")],
        })
    }

    fn set_number(device: &str, name: &str) -> ProtocolMessage {
        ProtocolMessage::SetNumber(SetNumberVector {
            device: device.to_string(),
            name: name.to_string(),
            state: Some(PropertyState::Ok),
            timeout: None,
            timestamp: None,
            message: None,
            numbers: vec![],
        })
    }

    fn enable(device: &str, name: Option<&str>, policy: BlobPolicy) -> EnableBlob {
        EnableBlob {
            device: device.to_string(),
            name: name.map(str::to_string),
            policy,
        }
    }

    #[test]
    fn test_default_blocks_blobs_allows_rest() {
        let gate = BlobGate::new();
        assert!(!gate.allowed(&set_blob("Cam", "image")));
        assert!(gate.allowed(&set_number("Cam", "exposure")));
    }

    #[test]
    fn test_also_admits_blobs_and_rest() {
        let mut gate = BlobGate::new();
        gate.apply(&enable("Cam", None, BlobPolicy::Also), true, false);
        assert!(gate.allowed(&set_blob("Cam", "image")));
        assert!(gate.allowed(&set_number("Cam", "exposure")));
    }

    #[test]
    fn test_only_blocks_non_blob_traffic() {
        let mut gate = BlobGate::new();
        gate.apply(&enable("Cam", None, BlobPolicy::Only), true, false);
        assert!(gate.allowed(&set_blob("Cam", "image")));
        assert!(!gate.allowed(&set_number("Cam", "exposure")));
        // device-less broadcast suppressed too
        let broadcast = ProtocolMessage::Message(MessageElement {
            device: None,
            timestamp: None,
            message: Some("hello".to_string()),
        });
        assert!(!gate.allowed(&broadcast));
        // other devices are unaffected
        assert!(gate.allowed(&set_number("Scope", "radec")));
    }

    #[test]
    fn test_vector_entry_overrides_device_default() {
        let mut gate = BlobGate::new();
        gate.apply(&enable("Cam", None, BlobPolicy::Never), true, false);
        gate.apply(&enable("Cam", Some("image"), BlobPolicy::Also), true, true);
        assert!(gate.allowed(&set_blob("Cam", "image")));
        assert!(!gate.allowed(&set_blob("Cam", "thumbnail")));
    }

    #[test]
    fn test_unknown_claims_rejected() {
        let mut gate = BlobGate::new();
        gate.apply(&enable("Ghost", None, BlobPolicy::Also), false, false);
        assert!(!gate.allowed(&set_blob("Ghost", "image")));
        gate.apply(&enable("Cam", Some("notablob"), BlobPolicy::Also), true, false);
        assert!(!gate.allowed(&set_blob("Cam", "notablob")));
    }

    #[test]
    fn test_new_never_goes_to_clients() {
        let gate = BlobGate::new();
        let new: ProtocolMessage = r#"<newNumberVector device="T" name="v"><oneNumber name="n">1</oneNumber></newNumberVector>"#
            .parse()
            .unwrap();
        assert!(!gate.allowed(&new));
    }
}
