//! Request/reply message pairing above the fragment layer.
//!
//! Outgoing server-initiated messages allocate a fresh `msg_index`;
//! replies reuse the request's index with `msg_type = Reply` and inherit
//! its ack hint so the underlying packet acknowledges in-band. Sent
//! messages whose opcode expects a response are remembered in
//! `outstanding_responses` until the reply arrives; stray replies are
//! dropped.

use std::collections::HashMap;
use std::time::Instant;

use ember_proto::cursor::DecodeError;
use ember_proto::message::{GameMessage, REPLY};
use ember_proto::records::Record;
use ember_proto::tables::{HasOpcode, OpcodeTable};
use tracing::{debug, warn};

use crate::fragment_stream::FragmentStream;
use crate::packet_stream::{StreamConfig, StreamError, StreamState};

/// One message delivered to the dispatch layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// The table opcode. For replies this is the opcode of the request
    /// being answered, already resolved through `outstanding_responses`.
    pub opcode: u32,
    pub msg_index: u32,
    pub is_reply: bool,
    /// Packet sequence to acknowledge once dispatch completes.
    pub ack_sequence: u16,
    pub payload: Vec<u8>,
}

/// The message layer, owning its [`FragmentStream`].
pub struct MessageStream {
    fragments: FragmentStream,
    table: &'static OpcodeTable,
    sent_message_counter: u32,
    /// `msg_index → opcode` of sent messages awaiting a reply.
    outstanding_responses: HashMap<u32, u32>,
}

impl MessageStream {
    pub fn new(
        game_key: &[u8; 16],
        auth_token: u64,
        table: &'static OpcodeTable,
        config: StreamConfig,
    ) -> Self {
        Self {
            fragments: FragmentStream::new(game_key, auth_token, config),
            table,
            sent_message_counter: 0,
            outstanding_responses: HashMap::new(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.fragments.state()
    }

    pub fn is_errored(&self) -> bool {
        self.fragments.is_errored()
    }

    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.fragments.poll_transmit()
    }

    pub fn pending_transmit_bytes(&self) -> usize {
        self.fragments.pending_transmit_bytes()
    }

    pub fn tick(&mut self, now: Instant) {
        self.fragments.tick(now);
    }

    pub fn disconnect(&mut self, now: Instant) {
        self.fragments.disconnect(now);
    }

    /// Acknowledge a dispatched message unless its reply already did.
    pub fn handled(&mut self, message: &ReceivedMessage, now: Instant) {
        self.fragments.handled(message.ack_sequence, now);
    }

    // ── Send ───────────────────────────────────────────────────────────────

    /// Send a server-initiated message (a push, or a request when the
    /// title has server→client request/response traffic).
    pub fn send<R: HasOpcode>(&mut self, record: &R, now: Instant) -> Result<(), StreamError> {
        let msg_index = self.sent_message_counter;
        self.sent_message_counter += 1;

        let message = GameMessage {
            msg_type: R::OPCODE,
            msg_index,
            payload: record.to_bytes(),
        };
        self.fragments.send(&message.to_bytes(), 0, now)?;

        if self.table.expects_response(R::OPCODE) {
            self.outstanding_responses.insert(msg_index, R::OPCODE);
        }
        Ok(())
    }

    /// Reply to a received request, reusing its message index and
    /// acknowledging its packet in-band.
    pub fn send_reply<R: Record>(
        &mut self,
        record: &R,
        reply_to: &ReceivedMessage,
        now: Instant,
    ) -> Result<(), StreamError> {
        let message = GameMessage {
            msg_type: REPLY,
            msg_index: reply_to.msg_index,
            payload: record.to_bytes(),
        };
        self.fragments.send(&message.to_bytes(), reply_to.ack_sequence, now)
    }

    // ── Receive ────────────────────────────────────────────────────────────

    /// Absorb one datagram.
    pub fn handle_datagram(&mut self, datagram: &[u8], now: Instant) -> Result<(), StreamError> {
        self.fragments.handle_datagram(datagram, now)
    }

    /// Pop the next message for dispatch. Stray replies are dropped here;
    /// unknown opcodes error the stream.
    pub fn recv(&mut self) -> Option<Result<ReceivedMessage, StreamError>> {
        loop {
            let payload = self.fragments.recv()?;
            let message = match GameMessage::parse(&payload.payload) {
                Ok(m) => m,
                Err(e) => return Some(Err(e.into())),
            };

            let (opcode, is_reply) = if message.is_reply() {
                match self.outstanding_responses.remove(&message.msg_index) {
                    Some(opcode) => (opcode, true),
                    None => {
                        warn!(
                            msg_index = message.msg_index,
                            "dropping reply to unknown message index"
                        );
                        continue;
                    }
                }
            } else {
                match self.table.lookup(message.msg_type) {
                    Some(entry) => {
                        debug!(name = entry.name, msg_index = message.msg_index, "received message");
                        (message.msg_type, false)
                    }
                    None => {
                        return Some(Err(StreamError::Decode(DecodeError::UnknownMessageType {
                            msg_type: message.msg_type,
                        })));
                    }
                }
            };

            return Some(Ok(ReceivedMessage {
                opcode,
                msg_index: message.msg_index,
                is_reply,
                ack_sequence: payload.ack_sequence,
                payload: message.payload,
            }));
        }
    }
}
