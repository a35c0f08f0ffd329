//! Vector members: the named scalars inside a property vector
//!
//! Every member tracks a `changed` flag so a vector can transmit only
//! the members that moved since the last send. Writing a value equal
//! to the current one does not set the flag.

use crate::error::{Error, Result};
use crate::format::{parse_number, NumberFormat};
use crate::message::{
    DefBlob, DefLight, DefNumber, DefSwitch, DefText, OneBlob, OneLight, OneNumber, OneSwitch,
    OneText, PropertyState, SwitchState,
};

pub(crate) fn check_ascii(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || !name.is_ascii() {
        return Err(Error::InvalidArgument(format!(
            "{kind} name must be non-empty ASCII, got {name:?}"
        )));
    }
    Ok(())
}

macro_rules! member_common {
    () => {
        /// Member name.
        pub fn name(&self) -> &str {
            &self.name
        }

        /// GUI label.
        pub fn label(&self) -> &str {
            &self.label
        }

        /// Has the value changed since the last transmission?
        pub fn is_changed(&self) -> bool {
            self.changed
        }

        pub(crate) fn clear_changed(&mut self) {
            self.changed = false;
        }

        pub(crate) fn mark_changed(&mut self) {
            self.changed = true;
        }
    };
}

/// A switch member, `On` or `Off`
#[derive(Debug, Clone)]
pub struct SwitchMember {
    name: String,
    label: String,
    value: SwitchState,
    changed: bool,
}

impl SwitchMember {
    /// New member; `label` defaults to the name.
    pub fn new(name: &str, label: Option<&str>, value: SwitchState) -> Result<Self> {
        check_ascii("member", name)?;
        Ok(Self {
            name: name.to_string(),
            label: label.unwrap_or(name).to_string(),
            value,
            changed: true,
        })
    }

    member_common!();

    /// Current state.
    pub fn value(&self) -> SwitchState {
        self.value
    }

    /// Update the state, flagging `changed` only on a real change.
    pub fn set_value(&mut self, value: SwitchState) {
        if self.value != value {
            self.value = value;
            self.changed = true;
        }
    }

    pub(crate) fn def_item(&self) -> DefSwitch {
        DefSwitch {
            name: self.name.clone(),
            label: Some(self.label.clone()),
            value: self.value,
        }
    }

    pub(crate) fn one_item(&self) -> OneSwitch {
        OneSwitch {
            name: self.name.clone(),
            value: self.value,
        }
    }
}

/// A light member, a read-only status value
#[derive(Debug, Clone)]
pub struct LightMember {
    name: String,
    label: String,
    value: PropertyState,
    changed: bool,
}

impl LightMember {
    /// New member; `label` defaults to the name.
    pub fn new(name: &str, label: Option<&str>, value: PropertyState) -> Result<Self> {
        check_ascii("member", name)?;
        Ok(Self {
            name: name.to_string(),
            label: label.unwrap_or(name).to_string(),
            value,
            changed: true,
        })
    }

    member_common!();

    /// Current state.
    pub fn value(&self) -> PropertyState {
        self.value
    }

    /// Update the state, flagging `changed` only on a real change.
    pub fn set_value(&mut self, value: PropertyState) {
        if self.value != value {
            self.value = value;
            self.changed = true;
        }
    }

    pub(crate) fn def_item(&self) -> DefLight {
        DefLight {
            name: self.name.clone(),
            label: Some(self.label.clone()),
            value: self.value,
        }
    }

    pub(crate) fn one_item(&self) -> OneLight {
        OneLight {
            name: self.name.clone(),
            value: self.value,
        }
    }
}

/// A free-form text member
#[derive(Debug, Clone)]
pub struct TextMember {
    name: String,
    label: String,
    value: String,
    changed: bool,
}

impl TextMember {
    /// New member; `label` defaults to the name.
    pub fn new(name: &str, label: Option<&str>, value: &str) -> Result<Self> {
        check_ascii("member", name)?;
        Ok(Self {
            name: name.to_string(),
            label: label.unwrap_or(name).to_string(),
            value: value.to_string(),
            changed: true,
        })
    }

    member_common!();

    /// Current text.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Update the text, flagging `changed` only on a real change.
    pub fn set_value(&mut self, value: &str) {
        if self.value != value {
            self.value = value.to_string();
            self.changed = true;
        }
    }

    pub(crate) fn def_item(&self) -> DefText {
        DefText {
            name: self.name.clone(),
            label: Some(self.label.clone()),
            value: self.value.clone(),
        }
    }

    pub(crate) fn one_item(&self) -> OneText {
        OneText {
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }
}

/// A number member; the value stays a string and is parsed on demand
#[derive(Debug, Clone)]
pub struct NumberMember {
    name: String,
    label: String,
    format: String,
    min: String,
    max: String,
    step: String,
    value: String,
    changed: bool,
}

impl NumberMember {
    /// New member. `format` is validated up front; `min`, `max`,
    /// `step` and `value` must parse as INDI numbers.
    pub fn new(
        name: &str,
        label: Option<&str>,
        format: &str,
        min: &str,
        max: &str,
        step: &str,
        value: &str,
    ) -> Result<Self> {
        check_ascii("member", name)?;
        NumberFormat::parse(format)?;
        for (field, raw) in [("min", min), ("max", max), ("step", step), ("value", value)] {
            parse_number(raw)
                .map_err(|e| Error::InvalidArgument(format!("member {name} {field}: {e}")))?;
        }
        Ok(Self {
            name: name.to_string(),
            label: label.unwrap_or(name).to_string(),
            format: format.to_string(),
            min: min.to_string(),
            max: max.to_string(),
            step: step.to_string(),
            value: value.to_string(),
            changed: true,
        })
    }

    member_common!();

    /// The raw value string as it travels on the wire.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The value parsed to a float.
    pub fn float_value(&self) -> Result<f64> {
        parse_number(&self.value)
    }

    /// The value rendered through the member's display format.
    pub fn formatted_value(&self) -> Result<String> {
        NumberFormat::parse(&self.format)?.format(self.float_value()?)
    }

    /// Update the value string, flagging `changed` only on a real change.
    pub fn set_value(&mut self, value: &str) -> Result<()> {
        parse_number(value)?;
        if self.value != value {
            self.value = value.to_string();
            self.changed = true;
        }
        Ok(())
    }

    /// Update from a float, formatting with the member's format.
    pub fn set_float_value(&mut self, value: f64) -> Result<()> {
        let formatted = NumberFormat::parse(&self.format)?.format(value)?;
        let trimmed = formatted.trim_start().to_string();
        if self.value != trimmed {
            self.value = trimmed;
            self.changed = true;
        }
        Ok(())
    }

    pub(crate) fn def_item(&self) -> DefNumber {
        DefNumber {
            name: self.name.clone(),
            label: Some(self.label.clone()),
            format: self.format.clone(),
            min: self.min.clone(),
            max: self.max.clone(),
            step: self.step.clone(),
            value: self.value.clone(),
        }
    }

    pub(crate) fn one_item(&self) -> OneNumber {
        OneNumber {
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }
}

/// A BLOB member; definitions never carry the payload
#[derive(Debug, Clone)]
pub struct BlobMember {
    name: String,
    label: String,
    value: Option<Vec<u8>>,
    size: u64,
    format: String,
    changed: bool,
}

impl BlobMember {
    /// New member. `size` is the uncompressed byte count; zero means
    /// "use the payload length". `format` is a file-suffix hint.
    pub fn new(name: &str, label: Option<&str>, size: u64, format: &str) -> Result<Self> {
        check_ascii("member", name)?;
        Ok(Self {
            name: name.to_string(),
            label: label.unwrap_or(name).to_string(),
            value: None,
            size,
            format: format.to_string(),
            changed: true,
        })
    }

    member_common!();

    /// Current payload, if one has been set.
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Set the payload. BLOB payloads always count as changed.
    pub fn set_value(&mut self, bytes: Vec<u8>, size: u64, format: Option<&str>) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "BLOB member {} payload cannot be empty",
                self.name
            )));
        }
        self.size = if size == 0 { bytes.len() as u64 } else { size };
        if let Some(format) = format {
            self.format = format.to_string();
        }
        self.value = Some(bytes);
        self.changed = true;
        Ok(())
    }

    pub(crate) fn def_item(&self) -> DefBlob {
        DefBlob {
            name: self.name.clone(),
            label: Some(self.label.clone()),
        }
    }

    pub(crate) fn one_item(&self) -> Result<OneBlob> {
        let bytes = self.value.as_deref().ok_or_else(|| {
            Error::InvalidArgument(format!("BLOB member {} has no payload to send", self.name))
        })?;
        Ok(OneBlob::from_bytes(&self.name, bytes, self.size, &self.format))
    }
}
