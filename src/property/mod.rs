//! Driver-side property model: devices, vectors, members
//!
//! A [`Device`] owns its vectors for the life of its driver; vectors
//! own their members. Serialization goes through the wire structs in
//! [`crate::message`].

mod member;
mod vector;

pub use member::{BlobMember, LightMember, NumberMember, SwitchMember, TextMember};
pub use vector::{
    BlobVector, LightVector, NumberVector, PropertyVector, SetFilter, SetOptions, SwitchVector,
    TextVector,
};

use crate::error::{Error, Result};
use crate::message::ProtocolMessage;
use crate::timestamp::Timestamp;

/// A named instrument abstraction exposing property vectors.
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    enabled: bool,
    vectors: Vec<PropertyVector>,
}

impl Device {
    /// Build a device from its vectors. Names must be ASCII and vector
    /// names unique within the device.
    pub fn new(name: &str, mut vectors: Vec<PropertyVector>) -> Result<Self> {
        member::check_ascii("device", name)?;
        let mut seen = std::collections::HashSet::new();
        for vector in &vectors {
            if !seen.insert(vector.name().to_string()) {
                return Err(Error::InvalidArgument(format!(
                    "vector name {} duplicated in device {name}",
                    vector.name()
                )));
            }
        }
        for vector in &mut vectors {
            vector.set_device(name);
        }
        Ok(Self {
            name: name.to_string(),
            enabled: true,
            vectors,
        })
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Is the device participating in traffic?
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the device. A disabled device is inert to
    /// inbound traffic and emits nothing except `delProperty`.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            // mark everything changed so re-enabling resends all values
            for vector in &mut self.vectors {
                let was_enabled = vector.is_enabled();
                vector.set_enabled(false);
                vector.set_enabled(was_enabled);
            }
        }
    }

    /// A vector by name.
    pub fn vector(&self, name: &str) -> Option<&PropertyVector> {
        self.vectors.iter().find(|v| v.name() == name)
    }

    /// A vector by name, mutably.
    pub fn vector_mut(&mut self, name: &str) -> Option<&mut PropertyVector> {
        self.vectors.iter_mut().find(|v| v.name() == name)
    }

    /// All vectors in definition order.
    pub fn vectors(&self) -> &[PropertyVector] {
        &self.vectors
    }

    /// Definition elements for every enabled vector, empty while the
    /// device is disabled.
    pub fn def_messages(&self, timestamp: Option<Timestamp>) -> Vec<ProtocolMessage> {
        if !self.enabled {
            return Vec::new();
        }
        self.vectors
            .iter()
            .filter_map(|v| v.def_message(None, timestamp.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{PropertyPerm, PropertyState};

    fn thermostat() -> Device {
        Device::new(
            "Thermostat",
            vec![
                PropertyVector::Number(
                    NumberVector::new(
                        "temperaturevector",
                        None,
                        "",
                        PropertyPerm::Ro,
                        PropertyState::Ok,
                        vec![NumberMember::new(
                            "temperature",
                            None,
                            "%3.1f",
                            "-50",
                            "99",
                            "0",
                            "20",
                        )
                        .unwrap()],
                    )
                    .unwrap(),
                ),
                PropertyVector::Number(
                    NumberVector::new(
                        "targetvector",
                        None,
                        "",
                        PropertyPerm::Rw,
                        PropertyState::Ok,
                        vec![NumberMember::new("target", None, "%3.1f", "-50", "99", "0", "15")
                            .unwrap()],
                    )
                    .unwrap(),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_vector_name_refused() {
        let make = |name: &str| {
            PropertyVector::Number(
                NumberVector::new(name, None, "", PropertyPerm::Ro, PropertyState::Idle, vec![])
                    .unwrap(),
            )
        };
        assert!(Device::new("D", vec![make("v"), make("v")]).is_err());
    }

    #[test]
    fn test_non_ascii_device_name_refused() {
        assert!(Device::new("Caméra", vec![]).is_err());
    }

    #[test]
    fn test_def_messages_carry_device_name() {
        let device = thermostat();
        let defs = device.def_messages(None);
        assert_eq!(defs.len(), 2);
        for def in &defs {
            assert_eq!(def.device(), Some("Thermostat"));
        }
    }

    #[test]
    fn test_disabled_device_defines_nothing() {
        let mut device = thermostat();
        device.set_enabled(false);
        assert!(device.def_messages(None).is_empty());
        device.set_enabled(true);
        assert_eq!(device.def_messages(None).len(), 2);
    }
}
