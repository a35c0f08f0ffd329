//! Typed events delivered to driver callbacks
//!
//! The router hands a driver two event streams: [`ClientEvent`] for
//! traffic addressed to devices the driver owns, and [`SnoopEvent`]
//! for traffic from devices it subscribed to with `getProperties`.
//! Payloads are the wire structs themselves.

use crate::message::{
    DefBlobVector, DefLightVector, DefNumberVector, DefSwitchVector, DefTextVector, DelProperty,
    GetProperties, MessageElement, NewBlobVector, NewNumberVector, NewSwitchVector, NewTextVector,
    ProtocolMessage, SetBlobVector, SetLightVector, SetNumberVector, SetSwitchVector,
    SetTextVector,
};

/// An event originating from a client of this server.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A client asked for definitions and `auto_send_def` is off
    GetProperties(GetProperties),
    /// New switch values submitted
    NewSwitch(NewSwitchVector),
    /// New text values submitted
    NewText(NewTextVector),
    /// New number values submitted
    NewNumber(NewNumberVector),
    /// New BLOB values submitted
    NewBlob(NewBlobVector),
}

impl ClientEvent {
    /// The targeted device, if the event names one.
    pub fn device(&self) -> Option<&str> {
        match self {
            ClientEvent::GetProperties(e) => e.device.as_deref(),
            ClientEvent::NewSwitch(e) => Some(&e.device),
            ClientEvent::NewText(e) => Some(&e.device),
            ClientEvent::NewNumber(e) => Some(&e.device),
            ClientEvent::NewBlob(e) => Some(&e.device),
        }
    }

    /// The targeted vector, if the event names one.
    pub fn name(&self) -> Option<&str> {
        match self {
            ClientEvent::GetProperties(e) => e.name.as_deref(),
            ClientEvent::NewSwitch(e) => Some(&e.name),
            ClientEvent::NewText(e) => Some(&e.name),
            ClientEvent::NewNumber(e) => Some(&e.name),
            ClientEvent::NewBlob(e) => Some(&e.name),
        }
    }
}

/// An event observed on a snooped device.
#[derive(Debug, Clone)]
pub enum SnoopEvent {
    /// Commentary from the snooped side
    Message(MessageElement),
    /// The snooped device withdrew a vector or itself
    DelProperty(DelProperty),
    /// Switch vector defined
    DefSwitch(DefSwitchVector),
    /// Light vector defined
    DefLight(DefLightVector),
    /// Text vector defined
    DefText(DefTextVector),
    /// Number vector defined
    DefNumber(DefNumberVector),
    /// BLOB vector defined
    DefBlob(DefBlobVector),
    /// Switch values updated
    SetSwitch(SetSwitchVector),
    /// Light values updated
    SetLight(SetLightVector),
    /// Text values updated
    SetText(SetTextVector),
    /// Number values updated
    SetNumber(SetNumberVector),
    /// BLOB values updated
    SetBlob(SetBlobVector),
}

impl SnoopEvent {
    /// Build from a routed element; `None` for kinds that never
    /// become snoop events.
    pub(crate) fn from_message(msg: ProtocolMessage) -> Option<Self> {
        match msg {
            ProtocolMessage::Message(m) => Some(SnoopEvent::Message(m)),
            ProtocolMessage::DelProperty(m) => Some(SnoopEvent::DelProperty(m)),
            ProtocolMessage::DefSwitch(m) => Some(SnoopEvent::DefSwitch(m)),
            ProtocolMessage::DefLight(m) => Some(SnoopEvent::DefLight(m)),
            ProtocolMessage::DefText(m) => Some(SnoopEvent::DefText(m)),
            ProtocolMessage::DefNumber(m) => Some(SnoopEvent::DefNumber(m)),
            ProtocolMessage::DefBlob(m) => Some(SnoopEvent::DefBlob(m)),
            ProtocolMessage::SetSwitch(m) => Some(SnoopEvent::SetSwitch(m)),
            ProtocolMessage::SetLight(m) => Some(SnoopEvent::SetLight(m)),
            ProtocolMessage::SetText(m) => Some(SnoopEvent::SetText(m)),
            ProtocolMessage::SetNumber(m) => Some(SnoopEvent::SetNumber(m)),
            ProtocolMessage::SetBlob(m) => Some(SnoopEvent::SetBlob(m)),
            _ => None,
        }
    }

    /// The device the event concerns, if named.
    pub fn device(&self) -> Option<&str> {
        match self {
            SnoopEvent::Message(e) => e.device.as_deref(),
            SnoopEvent::DelProperty(e) => Some(&e.device),
            SnoopEvent::DefSwitch(e) => Some(&e.device),
            SnoopEvent::DefLight(e) => Some(&e.device),
            SnoopEvent::DefText(e) => Some(&e.device),
            SnoopEvent::DefNumber(e) => Some(&e.device),
            SnoopEvent::DefBlob(e) => Some(&e.device),
            SnoopEvent::SetSwitch(e) => Some(&e.device),
            SnoopEvent::SetLight(e) => Some(&e.device),
            SnoopEvent::SetText(e) => Some(&e.device),
            SnoopEvent::SetNumber(e) => Some(&e.device),
            SnoopEvent::SetBlob(e) => Some(&e.device),
        }
    }

    /// The vector the event concerns, if named.
    pub fn name(&self) -> Option<&str> {
        match self {
            SnoopEvent::Message(_) => None,
            SnoopEvent::DelProperty(e) => e.name.as_deref(),
            SnoopEvent::DefSwitch(e) => Some(&e.name),
            SnoopEvent::DefLight(e) => Some(&e.name),
            SnoopEvent::DefText(e) => Some(&e.name),
            SnoopEvent::DefNumber(e) => Some(&e.name),
            SnoopEvent::DefBlob(e) => Some(&e.name),
            SnoopEvent::SetSwitch(e) => Some(&e.name),
            SnoopEvent::SetLight(e) => Some(&e.name),
            SnoopEvent::SetText(e) => Some(&e.name),
            SnoopEvent::SetNumber(e) => Some(&e.name),
            SnoopEvent::SetBlob(e) => Some(&e.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snoop_event_from_set() {
        let msg: ProtocolMessage = r#"<setNumberVector device="Thermostat" name="temperaturevector"><oneNumber name="temperature">21</oneNumber></setNumberVector>"#
            .parse()
            .unwrap();
        let event = SnoopEvent::from_message(msg).unwrap();
        assert_eq!(event.device(), Some("Thermostat"));
        assert_eq!(event.name(), Some("temperaturevector"));
        assert!(matches!(event, SnoopEvent::SetNumber(_)));
    }

    #[test]
    fn test_new_is_not_a_snoop_event() {
        let msg: ProtocolMessage = r#"<newNumberVector device="T" name="v"><oneNumber name="n">1</oneNumber></newNumberVector>"#
            .parse()
            .unwrap();
        assert!(SnoopEvent::from_message(msg).is_none());
    }
}
