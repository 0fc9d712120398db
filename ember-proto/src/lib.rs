//! Wire formats for the Ember game server.
//!
//! Everything the client puts on the wire, layer by layer:
//! - [`tcp`] — the length-prefixed TCP frame and the message header that
//!   rides inside it (Login and Auth services)
//! - [`rudp`] — the reliable-UDP packet header with its 12-bit packed
//!   ack counters (Game service)
//! - [`fragment`] — the fragmentation header above reliable UDP
//! - [`message`] — the game-message header above fragments
//! - [`handoff`] — the 184-byte Auth→Game handoff struct
//! - [`records`] — protobuf-wire structured records
//! - [`tables`] — per-title opcode tables
//!
//! Header integers are big-endian on the wire except the two request
//! counters (`request_index`, `msg_index`), which the client emits
//! little-endian. A protocol quirk, kept byte-exact.

#![deny(unsafe_code)]

pub mod cursor;
pub mod fragment;
pub mod handoff;
pub mod message;
pub mod records;
pub mod rudp;
pub mod tables;
pub mod tcp;
pub mod titles;

pub use cursor::{Cursor, DecodeError};
pub use records::Record;
pub use tables::{HasOpcode, OpcodeEntry, OpcodeKind, OpcodeTable};
