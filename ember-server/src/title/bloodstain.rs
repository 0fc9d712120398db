//! Death stains and their replay ghosts.

use std::sync::Arc;

use ember_proto::records::{
    Bloodstain, RequestCreateBloodstain, RequestGetBloodstainList,
    RequestGetBloodstainListResponse,
};
use ember_session::ReceivedMessage;

use crate::game::dispatch::{MessageHandler, Outcome, SessionContext};

/// Fire-and-forget: the client never waits for stain creation.
pub struct Create;

impl MessageHandler for Create {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestCreateBloodstain = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        let record = Bloodstain {
            bloodstain_id: ctx.shared.allocate_entry_id(),
            online_area_id: request.online_area_id,
            player_id: ctx.player.player_id as u64,
            data: request.data,
            ghost_data: request.ghost_data,
        };
        ctx.shared
            .pools
            .bloodstains
            .lock()
            .unwrap()
            .add(record.online_area_id, record.bloodstain_id, Arc::new(record));
        Outcome::Handled
    }
}

pub struct List;

impl MessageHandler for List {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestGetBloodstainList = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        let bloodstains = ctx
            .shared
            .pools
            .bloodstains
            .lock()
            .unwrap()
            .random_set(request.online_area_id, request.max_entries as usize)
            .iter()
            .map(|s| (**s).clone())
            .collect();

        ctx.reply(message, &RequestGetBloodstainListResponse { bloodstains })
    }
}
