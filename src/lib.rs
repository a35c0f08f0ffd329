#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! INDI Server and Driver Framework in Rust
//!
//! This crate implements the server side of the INDI (Instrument
//! Neutral Distributed Interface) protocol, used in astronomy to
//! connect instrument control software to clients.
//!
//! A [`server::Server`] hosts any number of in-process
//! [`driver::Driver`]s, external subprocess drivers and links to
//! upstream INDI servers, and multiplexes all of them to TCP clients:
//! routing elements by device ownership, fanning def/set traffic out
//! to snooping drivers, gating BLOBs per client, and keeping idle
//! links alive.
//!
//! # Features
//! - Typed property model (Switch, Light, Text, Number, BLOB)
//! - Streaming XML framer tolerant of noise and chunked delivery
//! - Cross-driver snooping with automatic re-subscription
//! - Per-client `enableBLOB` policy enforcement
//! - External drivers over stdio, remote servers over TCP

/// Shared channel and socket plumbing
pub mod comms;
/// Driver host and user logic trait
pub mod driver;
/// Error types and handling
pub mod error;
/// Typed events delivered to drivers
pub mod event;
/// External subprocess driver adapter
pub mod exdriver;
/// INDI number parsing and formatting
pub mod format;
/// Streaming XML framer
pub mod framer;
/// Wire message types
pub mod message;
/// Per-client BLOB send policy
pub mod policy;
/// Property model: devices, vectors, members
pub mod property;
/// Remote upstream server connection
pub mod remote;
/// The router and TCP server
pub mod server;
pub(crate) mod snoop;
/// Wire-format timestamps
pub mod timestamp;

/// Common types and traits
pub mod prelude {
    pub use crate::driver::{Driver, DriverLogic};
    pub use crate::error::Error;
    pub use crate::event::{ClientEvent, SnoopEvent};
    pub use crate::exdriver::ExDriverConfig;
    pub use crate::message::{
        BlobPolicy, ProtocolMessage, PropertyPerm, PropertyState, SwitchRule, SwitchState,
    };
    pub use crate::property::{
        BlobMember, BlobVector, Device, LightMember, LightVector, NumberMember, NumberVector,
        PropertyVector, SetFilter, SetOptions, SwitchMember, SwitchVector, TextMember, TextVector,
    };
    pub use crate::remote::RemoteConfig;
    pub use crate::server::{Server, ServerConfig, ServerHandle};
    pub use crate::timestamp::Timestamp;
}

/// Result type for INDI operations
pub type Result<T> = std::result::Result<T, error::Error>;

/// Version of the INDI protocol implemented by this library
pub const PROTOCOL_VERSION: &str = "1.7";
