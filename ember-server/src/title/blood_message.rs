//! Player-written messages: create, remove, list, rate.

use std::sync::Arc;

use ember_proto::records::{
    BloodMessage, PushBloodMessageEvaluated, RequestCreateBloodMessage,
    RequestCreateBloodMessageResponse, RequestEvaluateBloodMessage,
    RequestEvaluateBloodMessageResponse, RequestGetBloodMessageList,
    RequestGetBloodMessageListResponse, RequestRemoveBloodMessage,
    RequestRemoveBloodMessageResponse,
};
use ember_session::ReceivedMessage;
use tracing::debug;

use crate::game::dispatch::{MessageHandler, Outcome, SessionContext};
use crate::game::state::PushMessage;

pub struct Create;

impl MessageHandler for Create {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestCreateBloodMessage = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        let record = BloodMessage {
            message_id: ctx.shared.allocate_entry_id(),
            online_area_id: request.online_area_id,
            player_id: ctx.player.player_id as u64,
            player_steam_id: ctx.player.steam_id.clone(),
            character_id: request.character_id,
            message_data: request.message_data,
            rating_good: 0,
            rating_bad: 0,
        };
        let message_id = record.message_id;

        ctx.shared.store.save_blood_message(&record);
        ctx.shared
            .pools
            .blood_messages
            .lock()
            .unwrap()
            .add(record.online_area_id, message_id, Arc::new(record));

        debug!(message_id, "blood message created");
        ctx.reply(message, &RequestCreateBloodMessageResponse { message_id })
    }
}

pub struct Remove;

impl MessageHandler for Remove {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestRemoveBloodMessage = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        ctx.shared
            .pools
            .blood_messages
            .lock()
            .unwrap()
            .remove(request.online_area_id, request.message_id);
        ctx.shared.store.delete_blood_message(request.message_id);

        ctx.reply(message, &RequestRemoveBloodMessageResponse {})
    }
}

pub struct List;

impl MessageHandler for List {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestGetBloodMessageList = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        // The two count fields have no known individual meaning; their sum
        // is the limit, applied once.
        let limit = (request.max_type_1 + request.max_type_2) as usize;
        let messages = ctx
            .shared
            .pools
            .blood_messages
            .lock()
            .unwrap()
            .random_set(request.online_area_id, limit)
            .iter()
            .map(|m| (**m).clone())
            .collect();

        ctx.reply(message, &RequestGetBloodMessageListResponse { messages })
    }
}

pub struct Evaluate;

impl MessageHandler for Evaluate {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestEvaluateBloodMessage = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        let author = {
            let mut pool = ctx.shared.pools.blood_messages.lock().unwrap();
            match pool.find(request.online_area_id, request.message_id) {
                Some(found) => {
                    let mut updated = (*found).clone();
                    if request.was_poor {
                        updated.rating_bad += 1;
                    } else {
                        updated.rating_good += 1;
                    }
                    let author = updated.player_id as u32;
                    pool.replace(request.online_area_id, request.message_id, Arc::new(updated));
                    Some(author)
                }
                None => None,
            }
        };

        // Best-effort nudge to the author, if they are still online.
        if let Some(author) = author {
            ctx.shared.directory.push_to_player(
                author,
                PushMessage::BloodMessageEvaluated(PushBloodMessageEvaluated {
                    message_id: request.message_id,
                    was_poor: request.was_poor,
                }),
            );
        } else {
            debug!(message_id = request.message_id, "evaluated message no longer pooled");
        }

        ctx.reply(message, &RequestEvaluateBloodMessageResponse {})
    }
}
