//! Typed property vectors and their def/set serialization

use crate::error::{Error, Result};
use crate::message::{
    DefBlobVector, DefLightVector, DefNumberVector, DefSwitchVector, DefTextVector,
    ProtocolMessage, PropertyPerm, PropertyState, SetBlobVector, SetLightVector, SetNumberVector,
    SetSwitchVector, SetTextVector, SwitchRule, SwitchState,
};
use crate::property::member::{
    check_ascii, BlobMember, LightMember, NumberMember, SwitchMember, TextMember,
};
use crate::timestamp::Timestamp;

/// Attributes every vector kind shares.
#[derive(Debug, Clone)]
pub(crate) struct VectorCore {
    pub(crate) device: String,
    pub(crate) name: String,
    pub(crate) label: String,
    pub(crate) group: String,
    pub(crate) state: PropertyState,
    pub(crate) timeout: f64,
    pub(crate) enabled: bool,
}

impl VectorCore {
    fn new(name: &str, label: Option<&str>, group: &str, state: PropertyState) -> Result<Self> {
        check_ascii("vector", name)?;
        Ok(Self {
            device: String::new(),
            name: name.to_string(),
            label: label.unwrap_or(name).to_string(),
            group: group.to_string(),
            state,
            timeout: 0.0,
            enabled: true,
        })
    }
}

/// Which members a set transmission includes.
#[derive(Debug, Clone, Copy, Default)]
pub enum SetFilter<'a> {
    /// Every member
    #[default]
    All,
    /// Only members whose value changed since the last send; nothing
    /// is emitted when no member changed
    Changed,
    /// Exactly the named members; an empty list still emits the
    /// vector, carrying state or message alone
    Members(&'a [&'a str]),
}

/// Optional attributes for a set transmission.
#[derive(Debug, Clone, Default)]
pub struct SetOptions<'a> {
    /// Commentary for the client
    pub message: Option<&'a str>,
    /// Explicit timestamp; `None` means now
    pub timestamp: Option<Timestamp>,
    /// New worst-case seconds hint; `None` leaves it unchanged
    pub timeout: Option<f64>,
    /// New vector state; `None` leaves it unchanged
    pub state: Option<PropertyState>,
    /// Member selection
    pub filter: SetFilter<'a>,
}

fn unique_names<T>(kind: &str, names: impl Iterator<Item = T>) -> Result<()>
where
    T: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name.as_ref().to_string()) {
            return Err(Error::InvalidArgument(format!(
                "duplicate {kind} member name {}",
                name.as_ref()
            )));
        }
    }
    Ok(())
}

macro_rules! vector_common {
    () => {
        /// Vector name.
        pub fn name(&self) -> &str {
            &self.core.name
        }

        /// GUI label.
        pub fn label(&self) -> &str {
            &self.core.label
        }

        /// Group membership.
        pub fn group(&self) -> &str {
            &self.core.group
        }

        /// Current vector state.
        pub fn state(&self) -> PropertyState {
            self.core.state
        }

        /// Set the vector state.
        pub fn set_state(&mut self, state: PropertyState) {
            self.core.state = state;
        }

        /// Is the vector participating in traffic?
        pub fn is_enabled(&self) -> bool {
            self.core.enabled
        }

        /// Enable or disable the vector. Disabling marks every member
        /// changed so a re-enabled vector retransmits all values.
        pub fn set_enabled(&mut self, enabled: bool) {
            self.core.enabled = enabled;
            if !enabled {
                for member in &mut self.members {
                    member.mark_changed();
                }
            }
        }

        pub(crate) fn set_device(&mut self, device: &str) {
            self.core.device = device.to_string();
        }

        fn apply_set_options(&mut self, opts: &SetOptions<'_>) {
            if let Some(state) = opts.state {
                self.core.state = state;
            }
            if let Some(timeout) = opts.timeout {
                self.core.timeout = timeout;
            }
        }
    };
}

/// Pick member indices for a set transmission. `changed_flags` must
/// parallel the member list.
fn select_members(
    filter: &SetFilter<'_>,
    names: &[&str],
    changed: &[bool],
) -> Result<Option<Vec<usize>>> {
    match filter {
        SetFilter::All => Ok(Some((0..names.len()).collect())),
        SetFilter::Changed => {
            let picked: Vec<usize> = (0..names.len()).filter(|i| changed[*i]).collect();
            if picked.is_empty() {
                Ok(None)
            } else {
                Ok(Some(picked))
            }
        }
        SetFilter::Members(wanted) => {
            let mut picked = Vec::with_capacity(wanted.len());
            for want in *wanted {
                let index = names
                    .iter()
                    .position(|n| n == want)
                    .ok_or_else(|| Error::InvalidArgument(format!("unknown member {want}")))?;
                picked.push(index);
            }
            Ok(Some(picked))
        }
    }
}

/// A vector of switches with a combination rule.
#[derive(Debug, Clone)]
pub struct SwitchVector {
    core: VectorCore,
    perm: PropertyPerm,
    rule: SwitchRule,
    members: Vec<SwitchMember>,
}

impl SwitchVector {
    /// Build a switch vector.
    pub fn new(
        name: &str,
        label: Option<&str>,
        group: &str,
        perm: PropertyPerm,
        rule: SwitchRule,
        state: PropertyState,
        members: Vec<SwitchMember>,
    ) -> Result<Self> {
        unique_names("switch", members.iter().map(|m| m.name().to_string()))?;
        Ok(Self {
            core: VectorCore::new(name, label, group, state)?,
            perm,
            rule,
            members,
        })
    }

    vector_common!();

    /// Client controlability.
    pub fn perm(&self) -> PropertyPerm {
        self.perm
    }

    /// Member combination rule.
    pub fn rule(&self) -> SwitchRule {
        self.rule
    }

    /// A member by name.
    pub fn member(&self, name: &str) -> Option<&SwitchMember> {
        self.members.iter().find(|m| m.name() == name)
    }

    /// Set a member value; unknown names are refused.
    pub fn set_member(&mut self, name: &str, value: SwitchState) -> Result<()> {
        self.members
            .iter_mut()
            .find(|m| m.name() == name)
            .map(|m| m.set_value(value))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown member {name}")))
    }

    pub(crate) fn def_message(
        &self,
        message: Option<&str>,
        timestamp: Option<Timestamp>,
    ) -> Option<ProtocolMessage> {
        if !self.core.enabled {
            return None;
        }
        Some(ProtocolMessage::DefSwitch(DefSwitchVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            label: Some(self.core.label.clone()),
            group: Some(self.core.group.clone()),
            state: self.core.state,
            perm: self.perm,
            rule: self.rule,
            timeout: (self.perm != PropertyPerm::Ro).then_some(self.core.timeout),
            timestamp: Some(timestamp.unwrap_or_default()),
            message: message.map(str::to_string),
            switches: self.members.iter().map(|m| m.def_item()).collect(),
        }))
    }

    pub(crate) fn set_message(&mut self, opts: &SetOptions<'_>) -> Result<Option<ProtocolMessage>> {
        self.apply_set_options(opts);
        if !self.core.enabled {
            return Ok(None);
        }
        let names: Vec<&str> = self.members.iter().map(|m| m.name()).collect();
        let changed: Vec<bool> = self.members.iter().map(|m| m.is_changed()).collect();
        let Some(mut picked) = select_members(&opts.filter, &names, &changed)? else {
            return Ok(None);
        };
        if matches!(opts.filter, SetFilter::All | SetFilter::Changed) && picked.is_empty() {
            return Ok(None);
        }
        // clients require Off members before On members for OneOfMany;
        // emit that order for every rule, as it is always acceptable
        picked.sort_by_key(|i| self.members[*i].value() == SwitchState::On);
        let switches = picked
            .iter()
            .map(|i| {
                self.members[*i].clear_changed();
                self.members[*i].one_item()
            })
            .collect();
        Ok(Some(ProtocolMessage::SetSwitch(SetSwitchVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            state: Some(self.core.state),
            timeout: (self.perm != PropertyPerm::Ro).then_some(self.core.timeout),
            timestamp: Some(opts.timestamp.clone().unwrap_or_default()),
            message: opts.message.map(str::to_string),
            switches,
        })))
    }
}

/// A vector of read-only status lights.
#[derive(Debug, Clone)]
pub struct LightVector {
    core: VectorCore,
    members: Vec<LightMember>,
}

impl LightVector {
    /// Build a light vector.
    pub fn new(
        name: &str,
        label: Option<&str>,
        group: &str,
        state: PropertyState,
        members: Vec<LightMember>,
    ) -> Result<Self> {
        unique_names("light", members.iter().map(|m| m.name().to_string()))?;
        Ok(Self {
            core: VectorCore::new(name, label, group, state)?,
            members,
        })
    }

    vector_common!();

    /// A member by name.
    pub fn member(&self, name: &str) -> Option<&LightMember> {
        self.members.iter().find(|m| m.name() == name)
    }

    /// Set a member value; unknown names are refused.
    pub fn set_member(&mut self, name: &str, value: PropertyState) -> Result<()> {
        self.members
            .iter_mut()
            .find(|m| m.name() == name)
            .map(|m| m.set_value(value))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown member {name}")))
    }

    pub(crate) fn def_message(
        &self,
        message: Option<&str>,
        timestamp: Option<Timestamp>,
    ) -> Option<ProtocolMessage> {
        if !self.core.enabled {
            return None;
        }
        Some(ProtocolMessage::DefLight(DefLightVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            label: Some(self.core.label.clone()),
            group: Some(self.core.group.clone()),
            state: self.core.state,
            timestamp: Some(timestamp.unwrap_or_default()),
            message: message.map(str::to_string),
            lights: self.members.iter().map(|m| m.def_item()).collect(),
        }))
    }

    pub(crate) fn set_message(&mut self, opts: &SetOptions<'_>) -> Result<Option<ProtocolMessage>> {
        self.apply_set_options(opts);
        if !self.core.enabled {
            return Ok(None);
        }
        let names: Vec<&str> = self.members.iter().map(|m| m.name()).collect();
        let changed: Vec<bool> = self.members.iter().map(|m| m.is_changed()).collect();
        let Some(picked) = select_members(&opts.filter, &names, &changed)? else {
            return Ok(None);
        };
        if matches!(opts.filter, SetFilter::All | SetFilter::Changed) && picked.is_empty() {
            return Ok(None);
        }
        let lights = picked
            .iter()
            .map(|i| {
                self.members[*i].clear_changed();
                self.members[*i].one_item()
            })
            .collect();
        Ok(Some(ProtocolMessage::SetLight(SetLightVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            state: Some(self.core.state),
            timestamp: Some(opts.timestamp.clone().unwrap_or_default()),
            message: opts.message.map(str::to_string),
            lights,
        })))
    }
}

/// A vector of free-form text members.
#[derive(Debug, Clone)]
pub struct TextVector {
    core: VectorCore,
    perm: PropertyPerm,
    members: Vec<TextMember>,
}

impl TextVector {
    /// Build a text vector.
    pub fn new(
        name: &str,
        label: Option<&str>,
        group: &str,
        perm: PropertyPerm,
        state: PropertyState,
        members: Vec<TextMember>,
    ) -> Result<Self> {
        unique_names("text", members.iter().map(|m| m.name().to_string()))?;
        Ok(Self {
            core: VectorCore::new(name, label, group, state)?,
            perm,
            members,
        })
    }

    vector_common!();

    /// Client controlability.
    pub fn perm(&self) -> PropertyPerm {
        self.perm
    }

    /// A member by name.
    pub fn member(&self, name: &str) -> Option<&TextMember> {
        self.members.iter().find(|m| m.name() == name)
    }

    /// Set a member value; unknown names are refused.
    pub fn set_member(&mut self, name: &str, value: &str) -> Result<()> {
        self.members
            .iter_mut()
            .find(|m| m.name() == name)
            .map(|m| m.set_value(value))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown member {name}")))
    }

    pub(crate) fn def_message(
        &self,
        message: Option<&str>,
        timestamp: Option<Timestamp>,
    ) -> Option<ProtocolMessage> {
        if !self.core.enabled {
            return None;
        }
        Some(ProtocolMessage::DefText(DefTextVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            label: Some(self.core.label.clone()),
            group: Some(self.core.group.clone()),
            state: self.core.state,
            perm: self.perm,
            timeout: (self.perm != PropertyPerm::Ro).then_some(self.core.timeout),
            timestamp: Some(timestamp.unwrap_or_default()),
            message: message.map(str::to_string),
            texts: self.members.iter().map(|m| m.def_item()).collect(),
        }))
    }

    pub(crate) fn set_message(&mut self, opts: &SetOptions<'_>) -> Result<Option<ProtocolMessage>> {
        self.apply_set_options(opts);
        if !self.core.enabled {
            return Ok(None);
        }
        let names: Vec<&str> = self.members.iter().map(|m| m.name()).collect();
        let changed: Vec<bool> = self.members.iter().map(|m| m.is_changed()).collect();
        let Some(picked) = select_members(&opts.filter, &names, &changed)? else {
            return Ok(None);
        };
        if matches!(opts.filter, SetFilter::All | SetFilter::Changed) && picked.is_empty() {
            return Ok(None);
        }
        let texts = picked
            .iter()
            .map(|i| {
                self.members[*i].clear_changed();
                self.members[*i].one_item()
            })
            .collect();
        Ok(Some(ProtocolMessage::SetText(SetTextVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            state: Some(self.core.state),
            timeout: (self.perm != PropertyPerm::Ro).then_some(self.core.timeout),
            timestamp: Some(opts.timestamp.clone().unwrap_or_default()),
            message: opts.message.map(str::to_string),
            texts,
        })))
    }
}

/// A vector of number members.
#[derive(Debug, Clone)]
pub struct NumberVector {
    core: VectorCore,
    perm: PropertyPerm,
    members: Vec<NumberMember>,
}

impl NumberVector {
    /// Build a number vector.
    pub fn new(
        name: &str,
        label: Option<&str>,
        group: &str,
        perm: PropertyPerm,
        state: PropertyState,
        members: Vec<NumberMember>,
    ) -> Result<Self> {
        unique_names("number", members.iter().map(|m| m.name().to_string()))?;
        Ok(Self {
            core: VectorCore::new(name, label, group, state)?,
            perm,
            members,
        })
    }

    vector_common!();

    /// Client controlability.
    pub fn perm(&self) -> PropertyPerm {
        self.perm
    }

    /// A member by name.
    pub fn member(&self, name: &str) -> Option<&NumberMember> {
        self.members.iter().find(|m| m.name() == name)
    }

    /// Set a member value string; unknown names and unparsable values
    /// are refused.
    pub fn set_member(&mut self, name: &str, value: &str) -> Result<()> {
        self.members
            .iter_mut()
            .find(|m| m.name() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown member {name}")))?
            .set_value(value)
    }

    /// Set a member from a float, rendered with its display format.
    pub fn set_member_float(&mut self, name: &str, value: f64) -> Result<()> {
        self.members
            .iter_mut()
            .find(|m| m.name() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown member {name}")))?
            .set_float_value(value)
    }

    pub(crate) fn def_message(
        &self,
        message: Option<&str>,
        timestamp: Option<Timestamp>,
    ) -> Option<ProtocolMessage> {
        if !self.core.enabled {
            return None;
        }
        Some(ProtocolMessage::DefNumber(DefNumberVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            label: Some(self.core.label.clone()),
            group: Some(self.core.group.clone()),
            state: self.core.state,
            perm: self.perm,
            timeout: (self.perm != PropertyPerm::Ro).then_some(self.core.timeout),
            timestamp: Some(timestamp.unwrap_or_default()),
            message: message.map(str::to_string),
            numbers: self.members.iter().map(|m| m.def_item()).collect(),
        }))
    }

    pub(crate) fn set_message(&mut self, opts: &SetOptions<'_>) -> Result<Option<ProtocolMessage>> {
        self.apply_set_options(opts);
        if !self.core.enabled {
            return Ok(None);
        }
        let names: Vec<&str> = self.members.iter().map(|m| m.name()).collect();
        let changed: Vec<bool> = self.members.iter().map(|m| m.is_changed()).collect();
        let Some(picked) = select_members(&opts.filter, &names, &changed)? else {
            return Ok(None);
        };
        if matches!(opts.filter, SetFilter::All | SetFilter::Changed) && picked.is_empty() {
            return Ok(None);
        }
        let numbers = picked
            .iter()
            .map(|i| {
                self.members[*i].clear_changed();
                self.members[*i].one_item()
            })
            .collect();
        Ok(Some(ProtocolMessage::SetNumber(SetNumberVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            state: Some(self.core.state),
            timeout: (self.perm != PropertyPerm::Ro).then_some(self.core.timeout),
            timestamp: Some(opts.timestamp.clone().unwrap_or_default()),
            message: opts.message.map(str::to_string),
            numbers,
        })))
    }
}

/// A vector of BLOB members.
#[derive(Debug, Clone)]
pub struct BlobVector {
    core: VectorCore,
    perm: PropertyPerm,
    members: Vec<BlobMember>,
}

impl BlobVector {
    /// Build a BLOB vector.
    pub fn new(
        name: &str,
        label: Option<&str>,
        group: &str,
        perm: PropertyPerm,
        state: PropertyState,
        members: Vec<BlobMember>,
    ) -> Result<Self> {
        unique_names("BLOB", members.iter().map(|m| m.name().to_string()))?;
        Ok(Self {
            core: VectorCore::new(name, label, group, state)?,
            perm,
            members,
        })
    }

    vector_common!();

    /// Client controlability.
    pub fn perm(&self) -> PropertyPerm {
        self.perm
    }

    /// A member by name.
    pub fn member(&self, name: &str) -> Option<&BlobMember> {
        self.members.iter().find(|m| m.name() == name)
    }

    /// Set a member payload; unknown names are refused.
    pub fn set_member(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
        size: u64,
        format: Option<&str>,
    ) -> Result<()> {
        self.members
            .iter_mut()
            .find(|m| m.name() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown member {name}")))?
            .set_value(bytes, size, format)
    }

    pub(crate) fn def_message(
        &self,
        message: Option<&str>,
        timestamp: Option<Timestamp>,
    ) -> Option<ProtocolMessage> {
        if !self.core.enabled {
            return None;
        }
        Some(ProtocolMessage::DefBlob(DefBlobVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            label: Some(self.core.label.clone()),
            group: Some(self.core.group.clone()),
            state: self.core.state,
            perm: self.perm,
            timeout: (self.perm != PropertyPerm::Ro).then_some(self.core.timeout),
            timestamp: Some(timestamp.unwrap_or_default()),
            message: message.map(str::to_string),
            blobs: self.members.iter().map(|m| m.def_item()).collect(),
        }))
    }

    pub(crate) fn set_message(&mut self, opts: &SetOptions<'_>) -> Result<Option<ProtocolMessage>> {
        self.apply_set_options(opts);
        if !self.core.enabled {
            return Ok(None);
        }
        let names: Vec<&str> = self.members.iter().map(|m| m.name()).collect();
        // BLOBs with no payload cannot be sent; they only count as
        // changed once a payload arrives
        let changed: Vec<bool> = self
            .members
            .iter()
            .map(|m| m.is_changed() && m.value().is_some())
            .collect();
        let Some(picked) = select_members(&opts.filter, &names, &changed)? else {
            return Ok(None);
        };
        let mut blobs = Vec::with_capacity(picked.len());
        for i in &picked {
            match opts.filter {
                SetFilter::Members(_) => blobs.push(self.members[*i].one_item()?),
                _ => {
                    if self.members[*i].value().is_some() {
                        blobs.push(self.members[*i].one_item()?);
                    } else {
                        continue;
                    }
                }
            }
            self.members[*i].clear_changed();
        }
        if matches!(opts.filter, SetFilter::All | SetFilter::Changed) && blobs.is_empty() {
            return Ok(None);
        }
        Ok(Some(ProtocolMessage::SetBlob(SetBlobVector {
            device: self.core.device.clone(),
            name: self.core.name.clone(),
            state: self.core.state,
            timeout: (self.perm != PropertyPerm::Ro).then_some(self.core.timeout),
            timestamp: Some(opts.timestamp.clone().unwrap_or_default()),
            message: opts.message.map(str::to_string),
            blobs,
        })))
    }
}

/// Any property vector, the unit a [`crate::property::Device`] owns.
#[derive(Debug, Clone)]
pub enum PropertyVector {
    /// Switch vector
    Switch(SwitchVector),
    /// Light vector
    Light(LightVector),
    /// Text vector
    Text(TextVector),
    /// Number vector
    Number(NumberVector),
    /// BLOB vector
    Blob(BlobVector),
}

macro_rules! delegate {
    ($self:ident, $v:ident => $body:expr) => {
        match $self {
            PropertyVector::Switch($v) => $body,
            PropertyVector::Light($v) => $body,
            PropertyVector::Text($v) => $body,
            PropertyVector::Number($v) => $body,
            PropertyVector::Blob($v) => $body,
        }
    };
}

impl PropertyVector {
    /// Vector name.
    pub fn name(&self) -> &str {
        delegate!(self, v => v.name())
    }

    /// Current vector state.
    pub fn state(&self) -> PropertyState {
        delegate!(self, v => v.state())
    }

    /// Set the vector state.
    pub fn set_state(&mut self, state: PropertyState) {
        delegate!(self, v => v.set_state(state))
    }

    /// Client controlability; Light vectors are always read-only.
    pub fn perm(&self) -> PropertyPerm {
        match self {
            PropertyVector::Switch(v) => v.perm(),
            PropertyVector::Light(_) => PropertyPerm::Ro,
            PropertyVector::Text(v) => v.perm(),
            PropertyVector::Number(v) => v.perm(),
            PropertyVector::Blob(v) => v.perm(),
        }
    }

    /// Is this a BLOB vector?
    pub fn is_blob(&self) -> bool {
        matches!(self, PropertyVector::Blob(_))
    }

    /// The switch vector inside, if that is the kind.
    pub fn as_switch_mut(&mut self) -> Option<&mut SwitchVector> {
        match self {
            PropertyVector::Switch(v) => Some(v),
            _ => None,
        }
    }

    /// The light vector inside, if that is the kind.
    pub fn as_light_mut(&mut self) -> Option<&mut LightVector> {
        match self {
            PropertyVector::Light(v) => Some(v),
            _ => None,
        }
    }

    /// The text vector inside, if that is the kind.
    pub fn as_text_mut(&mut self) -> Option<&mut TextVector> {
        match self {
            PropertyVector::Text(v) => Some(v),
            _ => None,
        }
    }

    /// The number vector inside, if that is the kind.
    pub fn as_number_mut(&mut self) -> Option<&mut NumberVector> {
        match self {
            PropertyVector::Number(v) => Some(v),
            _ => None,
        }
    }

    /// The BLOB vector inside, if that is the kind.
    pub fn as_blob_mut(&mut self) -> Option<&mut BlobVector> {
        match self {
            PropertyVector::Blob(v) => Some(v),
            _ => None,
        }
    }

    /// Is the vector participating in traffic?
    pub fn is_enabled(&self) -> bool {
        delegate!(self, v => v.is_enabled())
    }

    /// Enable or disable the vector.
    pub fn set_enabled(&mut self, enabled: bool) {
        delegate!(self, v => v.set_enabled(enabled))
    }

    pub(crate) fn set_device(&mut self, device: &str) {
        delegate!(self, v => v.set_device(device))
    }

    /// The vector's definition element, `None` while disabled.
    pub fn def_message(
        &self,
        message: Option<&str>,
        timestamp: Option<Timestamp>,
    ) -> Option<ProtocolMessage> {
        delegate!(self, v => v.def_message(message, timestamp))
    }

    /// The vector's set element per `opts`, `None` when disabled or
    /// when the filter selects nothing.
    pub fn set_message(&mut self, opts: &SetOptions<'_>) -> Result<Option<ProtocolMessage>> {
        delegate!(self, v => v.set_message(opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn park_vector() -> SwitchVector {
        let mut vector = SwitchVector::new(
            "parkstate",
            Some("Park"),
            "Motion",
            PropertyPerm::Rw,
            SwitchRule::OneOfMany,
            PropertyState::Ok,
            vec![
                SwitchMember::new("parked", None, SwitchState::On).unwrap(),
                SwitchMember::new("unparked", None, SwitchState::Off).unwrap(),
            ],
        )
        .unwrap();
        vector.set_device("Telescope");
        vector
    }

    #[test]
    fn test_switch_set_orders_off_before_on() {
        let mut vector = park_vector();
        // first member is On; serialization must still put Off first
        let msg = vector
            .set_message(&SetOptions::default())
            .unwrap()
            .expect("all-members send");
        match msg {
            ProtocolMessage::SetSwitch(set) => {
                assert_eq!(set.switches[0].value, SwitchState::Off);
                assert_eq!(set.switches[1].value, SwitchState::On);
            }
            _ => panic!("wrong arm"),
        }
    }

    #[test]
    fn test_changed_filter_skips_unchanged() {
        let mut vector = park_vector();
        // flush the initial changed flags
        vector.set_message(&SetOptions::default()).unwrap();
        let opts = SetOptions {
            filter: SetFilter::Changed,
            ..Default::default()
        };
        assert!(vector.set_message(&opts).unwrap().is_none());
        vector.set_member("parked", SwitchState::Off).unwrap();
        vector.set_member("unparked", SwitchState::On).unwrap();
        let msg = vector.set_message(&opts).unwrap().expect("changed send");
        match msg {
            ProtocolMessage::SetSwitch(set) => assert_eq!(set.switches.len(), 2),
            _ => panic!("wrong arm"),
        }
    }

    #[test]
    fn test_members_filter_allows_empty_send() {
        let mut vector = park_vector();
        let opts = SetOptions {
            state: Some(PropertyState::Busy),
            filter: SetFilter::Members(&[]),
            ..Default::default()
        };
        let msg = vector.set_message(&opts).unwrap().expect("empty send");
        match msg {
            ProtocolMessage::SetSwitch(set) => {
                assert!(set.switches.is_empty());
                assert_eq!(set.state, Some(PropertyState::Busy));
            }
            _ => panic!("wrong arm"),
        }
        assert_eq!(vector.state(), PropertyState::Busy);
    }

    #[test]
    fn test_members_filter_rejects_unknown() {
        let mut vector = park_vector();
        let opts = SetOptions {
            filter: SetFilter::Members(&["no-such-member"]),
            ..Default::default()
        };
        assert!(vector.set_message(&opts).is_err());
    }

    #[test]
    fn test_disabled_vector_emits_nothing() {
        let mut vector = park_vector();
        vector.set_enabled(false);
        assert!(vector.def_message(None, None).is_none());
        assert!(vector.set_message(&SetOptions::default()).unwrap().is_none());
        // re-enabling marks everything changed, so a Changed send
        // carries all members again
        vector.set_enabled(true);
        let opts = SetOptions {
            filter: SetFilter::Changed,
            ..Default::default()
        };
        let msg = vector.set_message(&opts).unwrap().expect("full resend");
        match msg {
            ProtocolMessage::SetSwitch(set) => assert_eq!(set.switches.len(), 2),
            _ => panic!("wrong arm"),
        }
    }

    #[test]
    fn test_def_round_trips_through_wire_model() {
        let vector = park_vector();
        let msg = vector.def_message(None, None).unwrap();
        let xml = msg.to_xml().unwrap();
        let back: ProtocolMessage = xml.parse().unwrap();
        match back {
            ProtocolMessage::DefSwitch(def) => {
                assert_eq!(def.device, "Telescope");
                assert_eq!(def.name, "parkstate");
                assert_eq!(def.rule, SwitchRule::OneOfMany);
                assert_eq!(def.switches.len(), 2);
            }
            _ => panic!("wrong arm"),
        }
    }

    #[test]
    fn test_ro_vector_omits_timeout() {
        let vector = NumberVector::new(
            "temperaturevector",
            None,
            "",
            PropertyPerm::Ro,
            PropertyState::Ok,
            vec![NumberMember::new("temperature", None, "%3.1f", "-50", "99", "0", "20").unwrap()],
        )
        .unwrap();
        let msg = vector.def_message(None, None).unwrap();
        match msg {
            ProtocolMessage::DefNumber(def) => assert!(def.timeout.is_none()),
            _ => panic!("wrong arm"),
        }
    }

    #[test]
    fn test_blob_set_skips_empty_members() {
        let mut vector = BlobVector::new(
            "image",
            None,
            "",
            PropertyPerm::Ro,
            PropertyState::Ok,
            vec![
                BlobMember::new("frame", None, 0, ".raw").unwrap(),
                BlobMember::new("thumb", None, 0, ".raw").unwrap(),
            ],
        )
        .unwrap();
        vector.set_device("Cam");
        assert!(vector.set_message(&SetOptions::default()).unwrap().is_none());
        vector.set_member("frame", vec![1, 2, 3], 0, None).unwrap();
        let msg = vector
            .set_message(&SetOptions::default())
            .unwrap()
            .expect("one payload ready");
        match msg {
            ProtocolMessage::SetBlob(set) => {
                assert_eq!(set.blobs.len(), 1);
                assert_eq!(set.blobs[0].name, "frame");
            }
            _ => panic!("wrong arm"),
        }
        // explicit request for a payloadless member is refused
        let opts = SetOptions {
            filter: SetFilter::Members(&["thumb"]),
            ..Default::default()
        };
        assert!(vector.set_message(&opts).is_err());
    }
}
