//! The opcode tables of the supported titles.
//!
//! The family shares one protocol stack; titles differ in their message
//! alphabets. Tables are named after the client protocol revision they
//! serve.

pub mod v115 {
    //! The revision-115 client alphabet.

    use crate::message_types;
    use crate::records::*;

    message_types! {
        /// Opcode table for revision-115 clients.
        pub static TABLE: OpcodeTable = {
            request_response(0x044C, RequestGetAnnounceMessageList, RequestGetAnnounceMessageListResponse),
            request_response(0x04B0, RequestCreateBloodMessage, RequestCreateBloodMessageResponse),
            request_response(0x04B1, RequestGetBloodMessageList, RequestGetBloodMessageListResponse),
            request_response(0x04B2, RequestEvaluateBloodMessage, RequestEvaluateBloodMessageResponse),
            request_response(0x04B3, RequestRemoveBloodMessage, RequestRemoveBloodMessageResponse),
            message(0x0514, RequestCreateBloodstain),
            request_response(0x0515, RequestGetBloodstainList, RequestGetBloodstainListResponse),
            message(0x0578, RequestCreateGhostData),
            request_response(0x0579, RequestGetGhostDataList, RequestGetGhostDataListResponse),
            request_response(0x05DC, RequestCreateSign, RequestCreateSignResponse),
            request_response(0x05DD, RequestRemoveSign, RequestRemoveSignResponse),
            request_response(0x05DE, RequestGetSignList, RequestGetSignListResponse),
            request_response(0x05DF, RequestSummonSign, RequestSummonSignResponse),
            request_response(0x0640, RequestUpdatePlayerStatus, RequestUpdatePlayerStatusResponse),
            push(0x0320, PushRequestSummonSign),
            push(0x0321, PushBloodMessageEvaluated),
        };
    }
}
