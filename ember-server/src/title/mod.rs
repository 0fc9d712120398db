//! Title-specific game logic: the handlers behind the opcode table.
//!
//! One module per subsystem, the way the artifacts present in the game:
//! announcements, blood messages, bloodstains, ghosts, summon signs, and
//! the player-status telemetry. Each module owns the handlers for its
//! opcodes; [`dispatcher`] wires the full revision-115 table.

pub mod announce;
pub mod blood_message;
pub mod bloodstain;
pub mod ghost;
pub mod player_status;
pub mod sign;

use ember_proto::records::*;
use ember_proto::tables::HasOpcode;

use crate::game::dispatch::Dispatcher;

/// Build the dispatch table for revision-115 clients.
pub fn dispatcher() -> Dispatcher {
    let mut d = Dispatcher::new();

    d.register(RequestGetAnnounceMessageList::OPCODE, announce::GetAnnouncements);

    d.register(RequestCreateBloodMessage::OPCODE, blood_message::Create);
    d.register(RequestRemoveBloodMessage::OPCODE, blood_message::Remove);
    d.register(RequestGetBloodMessageList::OPCODE, blood_message::List);
    d.register(RequestEvaluateBloodMessage::OPCODE, blood_message::Evaluate);

    d.register(RequestCreateBloodstain::OPCODE, bloodstain::Create);
    d.register(RequestGetBloodstainList::OPCODE, bloodstain::List);

    d.register(RequestCreateGhostData::OPCODE, ghost::Create);
    d.register(RequestGetGhostDataList::OPCODE, ghost::List);

    d.register(RequestCreateSign::OPCODE, sign::Create);
    d.register(RequestRemoveSign::OPCODE, sign::Remove);
    d.register(RequestGetSignList::OPCODE, sign::List);
    d.register(RequestSummonSign::OPCODE, sign::Summon);

    d.register(RequestUpdatePlayerStatus::OPCODE, player_status::Update);

    d
}
