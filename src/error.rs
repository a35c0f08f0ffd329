//! Error types for the INDI server framework

use quick_xml::de::DeError as XmlDeError;
use quick_xml::errors::serialize::SeError as XmlSeError;
use quick_xml::Error as XmlError;
use std::io;
use thiserror::Error;

/// Result type for the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for INDI server operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unrecognized inbound XML; the offending element is dropped
    #[error("Parse error: {0}")]
    Parse(String),

    /// Caller-side misuse; the individual operation is refused
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A liveness or snoop-subscription timer expired
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Two producers defined the same device name; the whole server stops
    #[error("Duplicate device: {0}")]
    DuplicateDevice(String),

    /// XML error
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    /// XML deserialization error
    #[error("XML deserialization error: {0}")]
    XmlDe(#[from] XmlDeError),

    /// XML serialization error
    #[error("XML serialization error: {0}")]
    XmlSe(#[from] XmlSeError),

    /// UTF-8 conversion error
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl Error {
    /// True for conditions that must stop the whole server rather than
    /// a single connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::DuplicateDevice(_))
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::DuplicateDevice("Thermostat".into()).is_fatal());
        assert!(!Error::Parse("bad tag".into()).is_fatal());
        assert!(!Error::Timeout("keepalive".into()).is_fatal());
    }
}
