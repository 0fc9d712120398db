//! Structured records on the protobuf wire format.
//!
//! The client serializes every message payload with protocol buffers.
//! The core itself routes on opcodes and never inspects record contents,
//! but the services and title handlers need concrete types, declared here
//! with the [`records!`] macro. Adding a field touches exactly one line.
//!
//! Unknown fields are skipped on decode, missing fields default, matching
//! proto3 semantics.

use crate::cursor::{Cursor, DecodeError};

// ─── Varint / field plumbing ─────────────────────────────────────────────────

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_BYTES: u8 = 2;
const WIRE_FIXED32: u8 = 5;

pub(crate) fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

pub(crate) fn read_varint(cur: &mut Cursor<'_>) -> Result<u64, DecodeError> {
    let mut v = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = cur.read_byte()?;
        v |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(v);
        }
    }
    Err(DecodeError::BadVarint)
}

fn put_tag(buf: &mut Vec<u8>, field: u32, wire_type: u8) {
    put_varint(buf, ((field as u64) << 3) | wire_type as u64);
}

/// One decoded field value, borrowed from the record buffer.
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

/// Read the next `(field_number, value)` pair.
pub fn read_field<'a>(cur: &mut Cursor<'a>) -> Result<(u32, WireValue<'a>), DecodeError> {
    let tag = read_varint(cur)?;
    let field = (tag >> 3) as u32;
    let value = match (tag & 0x7) as u8 {
        WIRE_VARINT => WireValue::Varint(read_varint(cur)?),
        WIRE_FIXED64 => WireValue::Fixed64(cur.read_u64_le()?),
        WIRE_BYTES => {
            let len = read_varint(cur)? as usize;
            WireValue::Bytes(cur.read_slice(len)?)
        }
        WIRE_FIXED32 => WireValue::Fixed32(cur.read_u32_le()?),
        other => return Err(DecodeError::UnsupportedWireType { wire_type: other }),
    };
    Ok((field, value))
}

// ─── Record / FieldValue ─────────────────────────────────────────────────────

/// A structured record that can cross the wire as a message payload.
pub trait Record: Sized {
    /// Append the serialized form of `self` to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Decode from a payload slice.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError>;

    /// Convenience: allocate a fresh `Vec<u8>` and encode into it.
    fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.encode(&mut v);
        v
    }
}

/// One field of a record: knows how to emit itself (skipping defaults)
/// and how to absorb a decoded wire value.
pub trait FieldValue: Default {
    fn emit(&self, field: u32, buf: &mut Vec<u8>);
    fn absorb(&mut self, value: WireValue<'_>) -> Result<(), DecodeError>;
}

impl FieldValue for u32 {
    fn emit(&self, field: u32, buf: &mut Vec<u8>) {
        if *self != 0 {
            put_tag(buf, field, WIRE_VARINT);
            put_varint(buf, *self as u64);
        }
    }

    fn absorb(&mut self, value: WireValue<'_>) -> Result<(), DecodeError> {
        match value {
            WireValue::Varint(v) => { *self = v as u32; Ok(()) }
            WireValue::Fixed32(v) => { *self = v; Ok(()) }
            _ => Err(DecodeError::UnsupportedWireType { wire_type: WIRE_BYTES }),
        }
    }
}

impl FieldValue for u64 {
    fn emit(&self, field: u32, buf: &mut Vec<u8>) {
        if *self != 0 {
            put_tag(buf, field, WIRE_VARINT);
            put_varint(buf, *self);
        }
    }

    fn absorb(&mut self, value: WireValue<'_>) -> Result<(), DecodeError> {
        match value {
            WireValue::Varint(v) | WireValue::Fixed64(v) => { *self = v; Ok(()) }
            _ => Err(DecodeError::UnsupportedWireType { wire_type: WIRE_BYTES }),
        }
    }
}

impl FieldValue for bool {
    fn emit(&self, field: u32, buf: &mut Vec<u8>) {
        if *self {
            put_tag(buf, field, WIRE_VARINT);
            put_varint(buf, 1);
        }
    }

    fn absorb(&mut self, value: WireValue<'_>) -> Result<(), DecodeError> {
        match value {
            WireValue::Varint(v) => { *self = v != 0; Ok(()) }
            _ => Err(DecodeError::UnsupportedWireType { wire_type: WIRE_BYTES }),
        }
    }
}

impl FieldValue for String {
    fn emit(&self, field: u32, buf: &mut Vec<u8>) {
        if !self.is_empty() {
            put_tag(buf, field, WIRE_BYTES);
            put_varint(buf, self.len() as u64);
            buf.extend_from_slice(self.as_bytes());
        }
    }

    fn absorb(&mut self, value: WireValue<'_>) -> Result<(), DecodeError> {
        match value {
            WireValue::Bytes(b) => {
                *self = std::str::from_utf8(b).map_err(|_| DecodeError::BadString)?.to_string();
                Ok(())
            }
            _ => Err(DecodeError::UnsupportedWireType { wire_type: WIRE_VARINT }),
        }
    }
}

impl FieldValue for Vec<u8> {
    fn emit(&self, field: u32, buf: &mut Vec<u8>) {
        if !self.is_empty() {
            put_tag(buf, field, WIRE_BYTES);
            put_varint(buf, self.len() as u64);
            buf.extend_from_slice(self);
        }
    }

    fn absorb(&mut self, value: WireValue<'_>) -> Result<(), DecodeError> {
        match value {
            WireValue::Bytes(b) => { *self = b.to_vec(); Ok(()) }
            _ => Err(DecodeError::UnsupportedWireType { wire_type: WIRE_VARINT }),
        }
    }
}

/// Repeated embedded messages: one length-delimited field per element.
impl<T: Record> FieldValue for Vec<T> {
    fn emit(&self, field: u32, buf: &mut Vec<u8>) {
        for item in self {
            let body = item.to_bytes();
            put_tag(buf, field, WIRE_BYTES);
            put_varint(buf, body.len() as u64);
            buf.extend_from_slice(&body);
        }
    }

    fn absorb(&mut self, value: WireValue<'_>) -> Result<(), DecodeError> {
        match value {
            WireValue::Bytes(b) => { self.push(T::decode(b)?); Ok(()) }
            _ => Err(DecodeError::UnsupportedWireType { wire_type: WIRE_VARINT }),
        }
    }
}

// ─── records! ────────────────────────────────────────────────────────────────

/// Declare record structs with their field numbers.
///
/// ```ignore
/// records! {
///     pub struct RequestHandshake {
///         1 => aes_cwc_key: Vec<u8>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! records {
    ($(
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $field_no:literal => $field:ident : $ty:ty ),* $(,)?
        }
    )*) => {$(
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq)]
        pub struct $name {
            $( pub $field: $ty, )*
        }

        impl $crate::records::Record for $name {
            fn encode(&self, buf: &mut Vec<u8>) {
                $( $crate::records::FieldValue::emit(&self.$field, $field_no, buf); )*
                let _ = buf;
            }

            fn decode(bytes: &[u8]) -> Result<Self, $crate::cursor::DecodeError> {
                #[allow(unused_mut)]
                let mut out = Self::default();
                let mut cur = $crate::cursor::Cursor::from_slice(bytes);
                while cur.remaining() > 0 {
                    let (field, value) = $crate::records::read_field(&mut cur)?;
                    match field {
                        $( $field_no => $crate::records::FieldValue::absorb(&mut out.$field, value)?, )*
                        _ => {} // unknown field, skipped
                    }
                }
                Ok(out)
            }
        }
    )*};
}

// ─── Login / Auth records ────────────────────────────────────────────────────

records! {
    /// The only message the Login service accepts.
    pub struct RequestQueryLoginServerInfo {
        1 => steam_id: String,
        2 => app_version: u64,
    }

    /// Where to find the Auth service.
    pub struct RequestQueryLoginServerInfoResponse {
        1 => server_ip: String,
        2 => port: u64,
    }

    /// First Auth message; carries the CWC key the channel switches to.
    pub struct RequestHandshake {
        1 => aes_cwc_key: Vec<u8>,
    }

    pub struct GetServiceStatus {
        1 => id: u64,
        2 => steam_id: String,
        3 => app_version: u64,
    }

    pub struct GetServiceStatusResponse {
        1 => id: u64,
        2 => steam_id: String,
        3 => unknown_1: u64,
        4 => network_protocol: u64,
    }
}

// ─── Game records ────────────────────────────────────────────────────────────

records! {
    pub struct AnnounceMessageData {
        1 => order: u32,
        2 => header: String,
        3 => message: String,
        4 => datetime: u64,
    }

    pub struct RequestGetAnnounceMessageList {
        1 => max_entries: u32,
    }

    pub struct RequestGetAnnounceMessageListResponse {
        1 => changes: Vec<AnnounceMessageData>,
        2 => notices: Vec<AnnounceMessageData>,
    }

    /// A player-written message artifact.
    pub struct BloodMessage {
        1 => message_id: u32,
        2 => online_area_id: u32,
        3 => player_id: u64,
        4 => player_steam_id: String,
        5 => character_id: u32,
        6 => message_data: Vec<u8>,
        7 => rating_good: u32,
        8 => rating_bad: u32,
    }

    pub struct RequestCreateBloodMessage {
        1 => online_area_id: u32,
        2 => character_id: u32,
        3 => message_data: Vec<u8>,
    }

    pub struct RequestCreateBloodMessageResponse {
        1 => message_id: u32,
    }

    pub struct RequestRemoveBloodMessage {
        1 => online_area_id: u32,
        2 => message_id: u32,
    }

    pub struct RequestRemoveBloodMessageResponse {}

    pub struct RequestGetBloodMessageList {
        1 => online_area_id: u32,
        2 => max_type_1: u32,
        3 => max_type_2: u32,
    }

    pub struct RequestGetBloodMessageListResponse {
        1 => messages: Vec<BloodMessage>,
    }

    pub struct RequestEvaluateBloodMessage {
        1 => online_area_id: u32,
        2 => message_id: u32,
        3 => was_poor: bool,
    }

    pub struct RequestEvaluateBloodMessageResponse {}

    /// Server→author notification that someone rated their message.
    pub struct PushBloodMessageEvaluated {
        1 => message_id: u32,
        2 => was_poor: bool,
    }

    /// A death-location artifact with its replay ghost.
    pub struct Bloodstain {
        1 => bloodstain_id: u32,
        2 => online_area_id: u32,
        3 => player_id: u64,
        4 => data: Vec<u8>,
        5 => ghost_data: Vec<u8>,
    }

    pub struct RequestCreateBloodstain {
        1 => online_area_id: u32,
        2 => data: Vec<u8>,
        3 => ghost_data: Vec<u8>,
    }

    pub struct RequestGetBloodstainList {
        1 => online_area_id: u32,
        2 => max_entries: u32,
    }

    pub struct RequestGetBloodstainListResponse {
        1 => bloodstains: Vec<Bloodstain>,
    }

    /// A wandering-ghost replay artifact.
    pub struct Ghost {
        1 => ghost_id: u32,
        2 => online_area_id: u32,
        3 => player_id: u64,
        4 => replay_data: Vec<u8>,
    }

    pub struct RequestCreateGhostData {
        1 => online_area_id: u32,
        2 => replay_data: Vec<u8>,
    }

    pub struct RequestGetGhostDataList {
        1 => online_area_id: u32,
        2 => max_entries: u32,
    }

    pub struct RequestGetGhostDataListResponse {
        1 => ghosts: Vec<Ghost>,
    }

    /// A cooperative or adversarial summon sign.
    pub struct SummonSign {
        1 => sign_id: u32,
        2 => online_area_id: u32,
        3 => player_id: u64,
        4 => player_steam_id: String,
        5 => sign_data: Vec<u8>,
        6 => is_red: bool,
    }

    pub struct RequestCreateSign {
        1 => online_area_id: u32,
        2 => sign_data: Vec<u8>,
        3 => is_red: bool,
    }

    pub struct RequestCreateSignResponse {
        1 => sign_id: u32,
    }

    pub struct RequestRemoveSign {
        1 => online_area_id: u32,
        2 => sign_id: u32,
    }

    pub struct RequestRemoveSignResponse {}

    pub struct RequestGetSignList {
        1 => online_area_id: u32,
        2 => max_signs: u32,
    }

    pub struct RequestGetSignListResponse {
        1 => signs: Vec<SummonSign>,
    }

    pub struct RequestSummonSign {
        1 => online_area_id: u32,
        2 => sign_id: u32,
        3 => player_struct: Vec<u8>,
    }

    pub struct RequestSummonSignResponse {}

    /// Server→sign-owner notification that a summon is underway.
    pub struct PushRequestSummonSign {
        1 => sign_id: u32,
        2 => summoner_player_id: u64,
        3 => player_struct: Vec<u8>,
    }

    /// Player-status telemetry; the server keeps the latest blob.
    pub struct RequestUpdatePlayerStatus {
        1 => status_data: Vec<u8>,
    }

    pub struct RequestUpdatePlayerStatusResponse {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_record_round_trip() {
        let req = RequestQueryLoginServerInfo {
            steam_id: "76561198000000001".into(),
            app_version: 115,
        };
        let decoded = RequestQueryLoginServerInfo::decode(&req.to_bytes()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn defaults_are_omitted_from_the_wire() {
        let empty = RequestQueryLoginServerInfo::default();
        assert!(empty.to_bytes().is_empty());
        assert_eq!(
            RequestQueryLoginServerInfo::decode(&[]).unwrap(),
            empty
        );
    }

    #[test]
    fn repeated_message_round_trip() {
        let resp = RequestGetSignListResponse {
            signs: vec![
                SummonSign { sign_id: 1, online_area_id: 4000, player_id: 77, ..Default::default() },
                SummonSign { sign_id: 2, online_area_id: 4000, is_red: true, ..Default::default() },
            ],
        };
        let decoded = RequestGetSignListResponse::decode(&resp.to_bytes()).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut wire = RequestHandshake { aes_cwc_key: vec![0xAA; 16] }.to_bytes();
        // Append field 15, varint 300; not in the schema.
        put_varint(&mut wire, (15 << 3) | 0);
        put_varint(&mut wire, 300);
        let decoded = RequestHandshake::decode(&wire).unwrap();
        assert_eq!(decoded.aes_cwc_key, vec![0xAA; 16]);
    }

    #[test]
    fn varint_boundaries() {
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            put_varint(&mut buf, v);
            let mut cur = Cursor::from_slice(&buf);
            assert_eq!(read_varint(&mut cur).unwrap(), v);
        }
    }

    #[test]
    fn truncated_field_errors() {
        let mut wire = Vec::new();
        put_varint(&mut wire, (1 << 3) | 2); // field 1, bytes
        put_varint(&mut wire, 10);           // claims 10 bytes
        wire.extend_from_slice(&[1, 2, 3]);  // delivers 3
        assert!(RequestHandshake::decode(&wire).is_err());
    }
}
