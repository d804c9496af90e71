//! seatlock protocol - wire protocol for daemon communication
//!
//! This crate provides the message types exchanged between booking clients
//! (web front-ends, kiosks, test harnesses) and the `seatd` daemon.

pub mod message;
pub mod version;

pub use message::{ClientMessage, MessageType, ServerMessage};
pub use version::{ProtocolVersion, VersionError};
