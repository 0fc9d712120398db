//! Wandering-ghost replays.

use std::sync::Arc;

use ember_proto::records::{
    Ghost, RequestCreateGhostData, RequestGetGhostDataList, RequestGetGhostDataListResponse,
};
use ember_session::ReceivedMessage;

use crate::game::dispatch::{MessageHandler, Outcome, SessionContext};

/// Fire-and-forget, like stain creation.
pub struct Create;

impl MessageHandler for Create {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestCreateGhostData = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        let record = Ghost {
            ghost_id: ctx.shared.allocate_entry_id(),
            online_area_id: request.online_area_id,
            player_id: ctx.player.player_id as u64,
            replay_data: request.replay_data,
        };
        ctx.shared
            .pools
            .ghosts
            .lock()
            .unwrap()
            .add(record.online_area_id, record.ghost_id, Arc::new(record));
        Outcome::Handled
    }
}

pub struct List;

impl MessageHandler for List {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestGetGhostDataList = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        // Freshest replays first, and never the player's own.
        let own_id = ctx.player.player_id as u64;
        let ghosts = ctx
            .shared
            .pools
            .ghosts
            .lock()
            .unwrap()
            .recent_set(request.online_area_id, request.max_entries as usize, |g| {
                g.player_id != own_id
            })
            .iter()
            .map(|g| (**g).clone())
            .collect();

        ctx.reply(message, &RequestGetGhostDataListResponse { ghosts })
    }
}
