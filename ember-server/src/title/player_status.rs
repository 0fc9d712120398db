//! Player-status telemetry. The blob is the client's own serialization;
//! the server keeps the latest copy per session for matchmaking filters.

use ember_proto::records::{RequestUpdatePlayerStatus, RequestUpdatePlayerStatusResponse};
use ember_session::ReceivedMessage;

use crate::game::dispatch::{MessageHandler, Outcome, SessionContext};

pub struct Update;

impl MessageHandler for Update {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestUpdatePlayerStatus = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        ctx.player.status_data = request.status_data;
        ctx.reply(message, &RequestUpdatePlayerStatusResponse {})
    }
}
