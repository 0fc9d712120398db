//! Per-title opcode tables.
//!
//! Every title declares its message alphabet in one [`message_types!`]
//! invocation: request/response pairs, fire-and-forget client messages,
//! and server→client pushes. The macro produces both directions of the
//! mapping (a static opcode table for the receive path, a [`HasOpcode`]
//! impl for the send path), so adding an opcode touches exactly one
//! declaration.

use crate::records::Record;

/// How an opcode participates in the message flow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpcodeKind {
    /// Client request; the server answers with a `Reply`.
    RequestResponse,
    /// Client message with no response expected.
    Message,
    /// Server→client only; the client never sends it.
    Push,
}

/// One row of a title's table.
#[derive(Clone, Copy, Debug)]
pub struct OpcodeEntry {
    pub opcode: u32,
    /// Name of the (request) record type, for logging.
    pub name: &'static str,
    pub kind: OpcodeKind,
}

/// A title's complete opcode alphabet.
#[derive(Clone, Copy, Debug)]
pub struct OpcodeTable {
    pub entries: &'static [OpcodeEntry],
}

impl OpcodeTable {
    pub fn lookup(&self, opcode: u32) -> Option<&'static OpcodeEntry> {
        self.entries.iter().find(|e| e.opcode == opcode)
    }

    /// Whether a sent message with this opcode should be recorded in the
    /// outstanding-response table.
    pub fn expects_response(&self, opcode: u32) -> bool {
        matches!(
            self.lookup(opcode),
            Some(OpcodeEntry { kind: OpcodeKind::RequestResponse, .. })
        )
    }
}

/// The compile-time record→opcode direction of a title table.
pub trait HasOpcode: Record {
    const OPCODE: u32;
}

/// Declare a title's opcode table. See [`crate::titles`] for the shape.
#[macro_export]
macro_rules! message_types {
    (
        $(#[$meta:meta])*
        pub static $table:ident: OpcodeTable = {
            $( $kind:ident ( $opcode:literal, $first:ident $(, $rest:ident)* ) ),* $(,)?
        };
    ) => {
        $(
            impl $crate::tables::HasOpcode for $first {
                const OPCODE: u32 = $opcode;
            }
        )*

        $(#[$meta])*
        pub static $table: $crate::tables::OpcodeTable = $crate::tables::OpcodeTable {
            entries: &[
                $(
                    $crate::tables::OpcodeEntry {
                        opcode: $opcode,
                        name: stringify!($first),
                        kind: $crate::message_types!(@kind $kind),
                    },
                )*
            ],
        };
    };

    (@kind request_response) => { $crate::tables::OpcodeKind::RequestResponse };
    (@kind message)          => { $crate::tables::OpcodeKind::Message };
    (@kind push)             => { $crate::tables::OpcodeKind::Push };
}
