//! Summon signs: the live half of matchmaking.
//!
//! Signs are ephemeral: they live in the pool only while their owner's
//! session does, and the session teardown removes them. A summon routes a
//! push to the sign's owner; the actual peer-to-peer connection that
//! follows is the clients' business.

use std::sync::Arc;

use ember_proto::records::{
    PushRequestSummonSign, RequestCreateSign, RequestCreateSignResponse, RequestGetSignList,
    RequestGetSignListResponse, RequestRemoveSign, RequestRemoveSignResponse, RequestSummonSign,
    RequestSummonSignResponse, SummonSign,
};
use ember_session::ReceivedMessage;
use tracing::debug;

use crate::game::dispatch::{MessageHandler, Outcome, SessionContext};
use crate::game::state::PushMessage;

pub struct Create;

impl MessageHandler for Create {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestCreateSign = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        let record = SummonSign {
            sign_id: ctx.shared.allocate_entry_id(),
            online_area_id: request.online_area_id,
            player_id: ctx.player.player_id as u64,
            player_steam_id: ctx.player.steam_id.clone(),
            sign_data: request.sign_data,
            is_red: request.is_red,
        };
        let sign_id = record.sign_id;

        ctx.shared
            .pools
            .signs
            .lock()
            .unwrap()
            .add(record.online_area_id, sign_id, Arc::new(record));
        ctx.player.placed_signs.push((request.online_area_id, sign_id));

        debug!(sign_id, red = request.is_red, "summon sign placed");
        ctx.reply(message, &RequestCreateSignResponse { sign_id })
    }
}

pub struct Remove;

impl MessageHandler for Remove {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestRemoveSign = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        ctx.shared
            .pools
            .signs
            .lock()
            .unwrap()
            .remove(request.online_area_id, request.sign_id);
        ctx.player
            .placed_signs
            .retain(|&(area, id)| (area, id) != (request.online_area_id, request.sign_id));

        ctx.reply(message, &RequestRemoveSignResponse {})
    }
}

pub struct List;

impl MessageHandler for List {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestGetSignList = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        let signs = ctx
            .shared
            .pools
            .signs
            .lock()
            .unwrap()
            .random_set(request.online_area_id, request.max_signs as usize)
            .iter()
            .map(|s| (**s).clone())
            .collect();

        ctx.reply(message, &RequestGetSignListResponse { signs })
    }
}

pub struct Summon;

impl MessageHandler for Summon {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestSummonSign = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        let owner = ctx
            .shared
            .pools
            .signs
            .lock()
            .unwrap()
            .find(request.online_area_id, request.sign_id)
            .map(|sign| sign.player_id as u32);

        match owner {
            Some(owner) => {
                ctx.shared.directory.push_to_player(
                    owner,
                    PushMessage::SummonSign(PushRequestSummonSign {
                        sign_id: request.sign_id,
                        summoner_player_id: ctx.player.player_id as u64,
                        player_struct: request.player_struct,
                    }),
                );
            }
            // The sign evaporated between listing and summoning; the
            // client treats the empty reply as "try another".
            None => debug!(sign_id = request.sign_id, "summon raced sign removal"),
        }

        ctx.reply(message, &RequestSummonSignResponse {})
    }
}
