//! Message dispatch: a static opcode → handler table.
//!
//! Title modules register one [`MessageHandler`] per opcode at startup.
//! Handlers run on the session task with exclusive access to that
//! session's stream and player state, plus the shared pools.

use std::collections::HashMap;
use std::time::Instant;

use ember_proto::records::Record;
use ember_session::{MessageStream, ReceivedMessage};
use tracing::warn;

use crate::game::state::{PlayerState, SharedState};

/// Handler verdict. `Error` destroys the session; `Unhandled` is a
/// programming error that keeps it (logged upstream).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Handled,
    Unhandled,
    Error,
}

/// What a handler sees: its session, exclusively, and the shared world.
pub struct SessionContext<'a> {
    pub stream: &'a mut MessageStream,
    pub player: &'a mut PlayerState,
    pub shared: &'a SharedState,
    pub now: Instant,
}

impl SessionContext<'_> {
    /// Decode a request record; a malformed payload is a handler error.
    pub fn decode<R: Record>(&self, message: &ReceivedMessage) -> Result<R, Outcome> {
        R::decode(&message.payload).map_err(|e| {
            warn!(opcode = format_args!("{:#06x}", message.opcode), error = %e,
                "malformed request payload");
            Outcome::Error
        })
    }

    /// Serialize and send a reply, converting failures to `Error`.
    pub fn reply<R: Record>(&mut self, to: &ReceivedMessage, record: &R) -> Outcome {
        match self.stream.send_reply(record, to, self.now) {
            Ok(()) => Outcome::Handled,
            Err(e) => {
                warn!(error = %e, "failed to send reply");
                Outcome::Error
            }
        }
    }
}

/// One title message handler.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome;
}

/// The opcode → handler table for one title.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<u32, Box<dyn MessageHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, opcode: u32, handler: impl MessageHandler + 'static) {
        let replaced = self.handlers.insert(opcode, Box::new(handler));
        debug_assert!(replaced.is_none(), "duplicate handler for {opcode:#06x}");
    }

    pub fn dispatch(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        match self.handlers.get(&message.opcode) {
            Some(handler) => handler.handle(ctx, message),
            None => Outcome::Unhandled,
        }
    }
}
