//! Login-screen announcements, straight from the configuration.

use ember_proto::records::{
    AnnounceMessageData, RequestGetAnnounceMessageList, RequestGetAnnounceMessageListResponse,
};
use ember_session::ReceivedMessage;

use crate::game::dispatch::{MessageHandler, Outcome, SessionContext};

pub struct GetAnnouncements;

impl MessageHandler for GetAnnouncements {
    fn handle(&self, ctx: &mut SessionContext<'_>, message: &ReceivedMessage) -> Outcome {
        let request: RequestGetAnnounceMessageList = match ctx.decode(message) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };

        let notices = ctx
            .shared
            .config
            .announcements
            .iter()
            .take(request.max_entries.max(1) as usize)
            .enumerate()
            .map(|(i, a)| AnnounceMessageData {
                order: i as u32 + 1,
                header: a.header.clone(),
                message: a.message.clone(),
                datetime: 0,
            })
            .collect();

        let response = RequestGetAnnounceMessageListResponse {
            changes: Vec::new(),
            notices,
        };
        ctx.reply(message, &response)
    }
}
