//! Fragmentation and compression above the reliable packet stream.
//!
//! Outgoing payloads at least `MIN_COMPRESS_SIZE` long are deflated, then
//! split into fragments of at most `MAX_FRAGMENT_LEN` bytes. The first
//! fragment inherits the caller's ack hint so the reply rides a DAT_ACK;
//! the rest carry none. Reassembly leans on the packet stream's strict
//! per-session ordering: fragments of one payload are never interleaved
//! with another's.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Instant;

use ember_proto::fragment::Fragment;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tracing::warn;

use crate::packet_stream::{PacketStream, StreamConfig, StreamError, StreamState};

/// One fully reassembled (and decompressed) application payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedPayload {
    /// Sequence of the first fragment's packet; replies acknowledge it.
    pub ack_sequence: u16,
    pub payload: Vec<u8>,
}

struct Partial {
    ack_sequence: u16,
    compressed: bool,
    total_len: usize,
    uncompressed_size: u32,
    buffer: Vec<u8>,
}

/// The fragment layer, owning its [`PacketStream`].
pub struct FragmentStream {
    packets: PacketStream,
    fragment_max_len: usize,
    min_compress_size: usize,
    sent_fragment_counter: u16,
    partial: Option<Partial>,
    recv_queue: VecDeque<ReceivedPayload>,
}

impl FragmentStream {
    pub fn new(game_key: &[u8; 16], auth_token: u64, config: StreamConfig) -> Self {
        let fragment_max_len = config.fragment_max_len;
        let min_compress_size = config.min_compress_size;
        Self {
            packets: PacketStream::new(game_key, auth_token, config),
            fragment_max_len,
            min_compress_size,
            sent_fragment_counter: 0,
            partial: None,
            recv_queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.packets.state()
    }

    pub fn is_errored(&self) -> bool {
        self.packets.is_errored()
    }

    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.packets.poll_transmit()
    }

    pub fn pending_transmit_bytes(&self) -> usize {
        self.packets.pending_transmit_bytes()
    }

    pub fn tick(&mut self, now: Instant) {
        self.packets.tick(now);
    }

    pub fn disconnect(&mut self, now: Instant) {
        self.packets.disconnect(now);
    }

    /// See [`PacketStream::handled_packet`].
    pub fn handled(&mut self, ack_sequence: u16, now: Instant) {
        self.packets.handled_packet(ack_sequence, now);
    }

    // ── Send ───────────────────────────────────────────────────────────────

    /// Fragment (and maybe compress) one payload onto the wire.
    pub fn send(&mut self, payload: &[u8], ack_hint: u16, now: Instant) -> Result<(), StreamError> {
        let uncompressed_size = payload.len() as u32;
        let compressed = payload.len() >= self.min_compress_size;

        let wire_payload: Vec<u8> = if compressed {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            // Writing to a Vec cannot fail.
            enc.write_all(payload).expect("deflate to memory");
            enc.finish().expect("deflate to memory")
        } else {
            payload.to_vec()
        };

        let counter = self.sent_fragment_counter;
        self.sent_fragment_counter = self.sent_fragment_counter.wrapping_add(1);

        let chunks: Vec<&[u8]> = if wire_payload.is_empty() {
            vec![&[]]
        } else {
            wire_payload.chunks(self.fragment_max_len).collect()
        };

        for (index, chunk) in chunks.iter().enumerate() {
            let fragment = Fragment {
                fragment_counter: counter,
                compressed,
                total_payload_length: wire_payload.len() as u16,
                fragment_index: index as u8,
                fragment_length: chunk.len() as u16,
                uncompressed_size: if index == 0 { uncompressed_size } else { 0 },
                payload: chunk.to_vec(),
            };
            // Only the head fragment acknowledges the request.
            let hint = if index == 0 { ack_hint } else { 0 };
            self.packets.send_data(fragment.to_bytes(), hint, now);
        }
        Ok(())
    }

    // ── Receive ────────────────────────────────────────────────────────────

    /// Absorb one datagram and run reassembly.
    pub fn handle_datagram(&mut self, datagram: &[u8], now: Instant) -> Result<(), StreamError> {
        self.packets.handle_datagram(datagram, now)?;

        while let Some(packet) = self.packets.recv() {
            let fragment = Fragment::parse(&packet.payload)?;
            self.absorb(fragment, packet.local)?;
        }
        Ok(())
    }

    /// Pop the next complete payload.
    pub fn recv(&mut self) -> Option<ReceivedPayload> {
        self.recv_queue.pop_front()
    }

    fn absorb(&mut self, fragment: Fragment, ack_sequence: u16) -> Result<(), StreamError> {
        let partial = self.partial.get_or_insert_with(|| Partial {
            ack_sequence,
            compressed: fragment.compressed,
            total_len: fragment.total_payload_length as usize,
            uncompressed_size: fragment.uncompressed_size,
            buffer: Vec::with_capacity(fragment.total_payload_length as usize),
        });
        partial.buffer.extend_from_slice(&fragment.payload);

        if partial.buffer.len() < partial.total_len {
            return Ok(());
        }

        let partial = self.partial.take().expect("just inserted");
        let payload = if partial.compressed {
            let mut out = Vec::with_capacity(partial.uncompressed_size as usize);
            let mut dec = ZlibDecoder::new(partial.buffer.as_slice());
            if dec.read_to_end(&mut out).is_err() {
                warn!("failed to inflate reassembled payload");
                return Err(StreamError::Decode(
                    ember_proto::cursor::DecodeError::ImpossibleLength {
                        length: partial.buffer.len(),
                    },
                ));
            }
            out
        } else {
            partial.buffer
        };

        self.recv_queue.push_back(ReceivedPayload {
            ack_sequence: partial.ack_sequence,
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::{Cipher, ClientUdpCipher, ServerUdpCipher};
    use ember_proto::fragment::{MAX_FRAGMENT_LEN, MIN_COMPRESS_SIZE};
    use ember_proto::rudp::{Opcode, RudpPacket, SYN_PAYLOAD};

    const KEY: [u8; 16] = [0x37; 16];
    const TOKEN: u64 = 77;

    struct Peer {
        to_server: ClientUdpCipher,
        from_server: ServerUdpCipher,
        seq: u16,
    }

    impl Peer {
        fn new() -> Self {
            Self {
                to_server: ClientUdpCipher::new(&KEY, TOKEN),
                from_server: ServerUdpCipher::new(&KEY),
                seq: 1,
            }
        }

        fn establish(&mut self, stream: &mut FragmentStream, now: Instant) {
            let syn = RudpPacket {
                local: self.seq,
                remote: 0,
                opcode: Opcode::Syn,
                payload: SYN_PAYLOAD.to_vec(),
            };
            stream
                .handle_datagram(&self.to_server.encrypt(&syn.to_bytes()).unwrap(), now)
                .unwrap();
            while stream.poll_transmit().is_some() {}
            let ack = RudpPacket::bare(Opcode::Ack, self.seq);
            stream
                .handle_datagram(&self.to_server.encrypt(&ack.to_bytes()).unwrap(), now)
                .unwrap();
        }

        /// Send one application payload to the server, pre-fragmented.
        fn send_fragments(&mut self, stream: &mut FragmentStream, payload: &[u8], now: Instant) {
            let chunks: Vec<&[u8]> = if payload.is_empty() {
                vec![&[]]
            } else {
                payload.chunks(MAX_FRAGMENT_LEN).collect()
            };
            for (index, chunk) in chunks.iter().enumerate() {
                let fragment = Fragment {
                    fragment_counter: 0,
                    compressed: false,
                    total_payload_length: payload.len() as u16,
                    fragment_index: index as u8,
                    fragment_length: chunk.len() as u16,
                    uncompressed_size: 0,
                    payload: chunk.to_vec(),
                };
                self.seq += 1;
                let packet = RudpPacket {
                    local: self.seq,
                    remote: 0,
                    opcode: Opcode::Dat,
                    payload: fragment.to_bytes(),
                };
                stream
                    .handle_datagram(&self.to_server.encrypt(&packet.to_bytes()).unwrap(), now)
                    .unwrap();
            }
        }

        /// Collect the server's outgoing fragments back into one payload.
        fn reassemble_outgoing(&mut self, stream: &mut FragmentStream) -> Vec<u8> {
            let mut head: Option<Fragment> = None;
            let mut buffer = Vec::new();
            while let Some(datagram) = stream.poll_transmit() {
                let packet =
                    RudpPacket::parse(&self.from_server.decrypt(&datagram).unwrap()).unwrap();
                if !matches!(packet.opcode, Opcode::Dat | Opcode::DatAck) {
                    continue;
                }
                let fragment = Fragment::parse(&packet.payload).unwrap();
                assert!(fragment.payload.len() <= MAX_FRAGMENT_LEN);
                buffer.extend_from_slice(&fragment.payload);
                if fragment.fragment_index == 0 {
                    head = Some(fragment);
                }
            }
            let head = head.expect("no head fragment");
            assert_eq!(buffer.len(), head.total_payload_length as usize);
            if head.compressed {
                let mut out = Vec::new();
                ZlibDecoder::new(buffer.as_slice()).read_to_end(&mut out).unwrap();
                assert_eq!(out.len(), head.uncompressed_size as usize);
                out
            } else {
                buffer
            }
        }
    }

    fn established() -> (FragmentStream, Peer, Instant) {
        let mut stream = FragmentStream::new(&KEY, TOKEN, StreamConfig::default());
        let mut peer = Peer::new();
        let now = Instant::now();
        peer.establish(&mut stream, now);
        (stream, peer, now)
    }

    #[test]
    fn small_payload_is_one_uncompressed_fragment() {
        let (mut stream, mut peer, now) = established();
        stream.send(b"short reply", 0, now).unwrap();
        stream.tick(now);
        assert_eq!(peer.reassemble_outgoing(&mut stream), b"short reply");
    }

    #[test]
    fn large_payload_compresses_and_round_trips() {
        let (mut stream, mut peer, now) = established();
        let payload: Vec<u8> = (0..MIN_COMPRESS_SIZE * 3).map(|i| (i % 7) as u8).collect();
        stream.send(&payload, 0, now).unwrap();
        stream.tick(now);
        assert_eq!(peer.reassemble_outgoing(&mut stream), payload);
    }

    #[test]
    fn incompressible_payload_still_round_trips() {
        let (mut stream, mut peer, now) = established();
        // Pseudo-random bytes deflate poorly; multiple fragments after
        // compression.
        let payload: Vec<u8> = (0..4096u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();
        stream.send(&payload, 0, now).unwrap();
        stream.tick(now);
        assert_eq!(peer.reassemble_outgoing(&mut stream), payload);
    }

    #[test]
    fn first_fragment_carries_the_ack_hint() {
        let (mut stream, mut peer, now) = established();
        let payload = vec![0xAB; MAX_FRAGMENT_LEN + 10]; // compresses small, but hint rides fragment 0
        stream.send(&payload, 9, now).unwrap();
        stream.tick(now);

        let datagram = stream.poll_transmit().unwrap();
        let packet = RudpPacket::parse(&peer.from_server.decrypt(&datagram).unwrap()).unwrap();
        assert_eq!(packet.opcode, Opcode::DatAck);
        assert_eq!(packet.remote, 9);
    }

    #[test]
    fn inbound_multi_fragment_payload_reassembles() {
        let (mut stream, mut peer, now) = established();
        let payload: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        peer.send_fragments(&mut stream, &payload, now);

        let received = stream.recv().unwrap();
        assert_eq!(received.payload, payload);
        // The ack sequence is the first fragment's packet sequence.
        assert_eq!(received.ack_sequence, 2);
        assert!(stream.recv().is_none());
    }

    #[test]
    fn inbound_compressed_payload_inflates() {
        let (mut stream, mut peer, now) = established();
        let original = vec![b'z'; 5000];

        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&original).unwrap();
        let deflated = enc.finish().unwrap();

        let chunks: Vec<&[u8]> = deflated.chunks(MAX_FRAGMENT_LEN).collect();
        for (index, chunk) in chunks.iter().enumerate() {
            let fragment = Fragment {
                fragment_counter: 3,
                compressed: true,
                total_payload_length: deflated.len() as u16,
                fragment_index: index as u8,
                fragment_length: chunk.len() as u16,
                uncompressed_size: if index == 0 { original.len() as u32 } else { 0 },
                payload: chunk.to_vec(),
            };
            peer.seq += 1;
            let packet = RudpPacket {
                local: peer.seq,
                remote: 0,
                opcode: Opcode::Dat,
                payload: fragment.to_bytes(),
            };
            stream
                .handle_datagram(&peer.to_server.encrypt(&packet.to_bytes()).unwrap(), now)
                .unwrap();
        }

        assert_eq!(stream.recv().unwrap().payload, original);
    }
}
