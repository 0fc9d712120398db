//! Sans-IO session state for the game channel.
//!
//! Three streams stack bottom-up, mirroring the layers on the wire:
//!
//! * [`PacketStream`] — the TCP-like reliable-datagram lifecycle over UDP:
//!   sequence numbers, acknowledgements, retransmission, in-order delivery
//! * [`FragmentStream`] — splits and reassembles application payloads,
//!   deflating large ones
//! * [`MessageStream`] — opcode-keyed messages with request/reply pairing
//!
//! No sockets anywhere: callers feed received datagrams in with a
//! timestamp, drive timers through `tick`, and drain wire-ready datagrams
//! out through `poll_transmit`. The tokio layer in `ember-server` is one
//! driver; unit tests are another.

#![deny(unsafe_code)]

pub mod fragment_stream;
pub mod message_stream;
pub mod packet_stream;

pub use fragment_stream::{FragmentStream, ReceivedPayload};
pub use message_stream::{MessageStream, ReceivedMessage};
pub use packet_stream::{PacketStream, StreamConfig, StreamError, StreamState};
