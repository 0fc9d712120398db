//! The reliable-datagram state machine: a crude reimplementation of most
//! of TCP, shared with the client by the game's own design.
//!
//! Server role only: we listen, the client connects. The lifecycle runs
//! `Listening → SynReceived → Established → Closing → Closed`, with RST
//! dropping back to `Listening` at any point.
//!
//! Sequenced opcodes (DAT, DAT_ACK, SYN_ACK, FIN_ACK) consume a sequence
//! number and travel through `send_queue` → wire → `retransmit_buffer`;
//! everything else bypasses both. A packet is never in more than one of
//! those buffers.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use ember_crypto::{Cipher, CipherError, ClientUdpCipher, ServerUdpCipher};
use ember_proto::cursor::DecodeError;
use ember_proto::rudp::{Opcode, RudpPacket, SYN_ACK_PAYLOAD};
use tracing::{debug, warn};

// ─── Config / errors ─────────────────────────────────────────────────────────

/// Tunables of one reliable stream. Defaults match the client's.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Cap on sent-but-unacknowledged sequenced packets.
    pub max_in_flight: usize,
    /// Quiet time on the oldest unacked packet before it is resent.
    pub retransmit_interval: Duration,
    /// Minimum spacing of duplicate-triggered ACK resends.
    pub min_ack_resend_interval: Duration,
    /// How long a Closing stream waits for its send queue to drain.
    pub close_grace: Duration,
    /// Quiet time before the server probes the peer with a heartbeat.
    pub heartbeat_interval: Duration,
    /// Largest payload slice one fragment may carry.
    pub fragment_max_len: usize,
    /// Payloads at least this large are deflated before fragmentation.
    pub min_compress_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 10,
            retransmit_interval: Duration::from_millis(500),
            min_ack_resend_interval: Duration::from_millis(100),
            close_grace: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(10),
            fragment_max_len: ember_proto::fragment::MAX_FRAGMENT_LEN,
            min_compress_size: ember_proto::fragment::MIN_COMPRESS_SIZE,
        }
    }
}

/// A fault that marks the stream errored; the owning session is destroyed
/// on the next pump.
#[derive(Debug)]
pub enum StreamError {
    Cipher(CipherError),
    Decode(DecodeError),
    /// A packet legal on the wire but not in this state.
    Protocol(&'static str),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cipher(e)   => write!(f, "cipher: {e}"),
            Self::Decode(e)   => write!(f, "decode: {e}"),
            Self::Protocol(m) => write!(f, "protocol: {m}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<CipherError> for StreamError {
    fn from(e: CipherError) -> Self { Self::Cipher(e) }
}

impl From<DecodeError> for StreamError {
    fn from(e: DecodeError) -> Self { Self::Decode(e) }
}

/// Connection lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamState {
    Listening,
    SynReceived,
    Established,
    Closing,
    Closed,
}

struct QueuedPacket {
    packet: RudpPacket,
    send_time: Instant,
}

// ─── Stream ──────────────────────────────────────────────────────────────────

/// One client's reliable-datagram state.
pub struct PacketStream {
    config: StreamConfig,
    inbound: ClientUdpCipher,
    outbound: ServerUdpCipher,

    state: StreamState,
    /// Next sequence to assign; 0 is reserved for "no sequence".
    send_seq: u16,
    /// Highest of our sequences the peer has acknowledged.
    send_seq_acked: u16,
    /// Highest peer sequence delivered upward in order.
    recv_seq: u16,
    /// Highest peer sequence we have acknowledged back.
    recv_seq_acked: u16,

    /// Out-of-order arrivals, kept sorted by sequence.
    pending_recv: Vec<RudpPacket>,
    /// In-order DAT/DAT_ACK packets ready for the fragment layer.
    recv_queue: VecDeque<RudpPacket>,
    /// Sequenced packets not yet on the wire.
    send_queue: VecDeque<QueuedPacket>,
    /// On the wire, awaiting acknowledgement.
    retransmit_buffer: VecDeque<QueuedPacket>,
    /// Encrypted datagrams ready for the socket.
    transmit_queue: VecDeque<Vec<u8>>,

    retransmitting: bool,
    retransmit_head: u16,
    /// Peer sequences already acknowledged by an outgoing DAT_ACK, so the
    /// post-dispatch ACK can be skipped.
    dat_ack_covered: HashSet<u16>,

    last_received: Option<Instant>,
    last_ack_sent: Option<Instant>,
    last_heartbeat_sent: Option<Instant>,
    close_started: Option<Instant>,
    /// Tolerated protocol slips (wrong-state packets and the like). The
    /// stream errors only once these repeat past [`PROTOCOL_FAULT_LIMIT`].
    protocol_faults: u32,
    errored: bool,
}

/// Protocol slips tolerated before the stream is torn down.
const PROTOCOL_FAULT_LIMIT: u32 = 8;

impl PacketStream {
    pub fn new(game_key: &[u8; 16], auth_token: u64, config: StreamConfig) -> Self {
        Self {
            config,
            inbound: ClientUdpCipher::new(game_key, auth_token),
            outbound: ServerUdpCipher::new(game_key),
            state: StreamState::Listening,
            send_seq: 1,
            send_seq_acked: 0,
            recv_seq: 0,
            recv_seq_acked: 0,
            pending_recv: Vec::new(),
            recv_queue: VecDeque::new(),
            send_queue: VecDeque::new(),
            retransmit_buffer: VecDeque::new(),
            transmit_queue: VecDeque::new(),
            retransmitting: false,
            retransmit_head: 0,
            dat_ack_covered: HashSet::new(),
            last_received: None,
            last_ack_sent: None,
            last_heartbeat_sent: None,
            close_started: None,
            protocol_faults: 0,
            errored: false,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Pop the next wire-ready datagram.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.transmit_queue.pop_front()
    }

    /// Bytes queued for the socket; drivers close the session when this
    /// saturates.
    pub fn pending_transmit_bytes(&self) -> usize {
        self.transmit_queue.iter().map(Vec::len).sum()
    }

    /// Pop the next in-order data packet for the fragment layer.
    pub fn recv(&mut self) -> Option<RudpPacket> {
        self.recv_queue.pop_front()
    }

    // ── Receive path ───────────────────────────────────────────────────────

    /// Decrypt and absorb one datagram, then deliver whatever became
    /// in-order. Errors mark the stream; callers destroy it on next pump.
    pub fn handle_datagram(&mut self, datagram: &[u8], now: Instant) -> Result<(), StreamError> {
        let result = self.handle_datagram_inner(datagram, now);
        if result.is_err() {
            self.errored = true;
        }
        result
    }

    fn handle_datagram_inner(&mut self, datagram: &[u8], now: Instant) -> Result<(), StreamError> {
        let payload = self.inbound.decrypt(datagram)?;
        let packet = RudpPacket::parse(&payload)?;
        self.last_received = Some(now);

        debug!(
            opcode = ?packet.opcode,
            local = packet.local,
            remote = packet.remote,
            "received packet"
        );

        // Every packet acknowledges; remote == 0 is a no-op under max().
        self.update_send_ack(packet.remote);

        if packet.opcode.is_sequenced() {
            self.handle_sequenced(packet, now)?;
        } else {
            self.process_packet(packet, now)?;
        }

        // Deliver anything that is now in order.
        while let Some(next) = self.pending_recv.first() {
            if next.local != self.recv_seq.wrapping_add(1) {
                break;
            }
            let packet = self.pending_recv.remove(0);
            self.recv_seq = packet.local;
            self.process_packet(packet, now)?;
        }

        Ok(())
    }

    /// Log a tolerated slip; errors only when they repeat past the limit.
    fn protocol_fault(&mut self, what: &'static str) -> Result<(), StreamError> {
        warn!(fault = what, "dropping packet");
        self.protocol_faults += 1;
        if self.protocol_faults > PROTOCOL_FAULT_LIMIT {
            return Err(StreamError::Protocol(what));
        }
        Ok(())
    }

    fn handle_sequenced(&mut self, packet: RudpPacket, now: Instant) -> Result<(), StreamError> {
        if self.state != StreamState::Established {
            return self.protocol_fault("sequenced packet before connection established");
        }

        let duplicate = packet.local <= self.recv_seq
            || self.pending_recv.iter().any(|p| p.local == packet.local);

        if duplicate {
            // The peer is likely retransmitting because our ACK dropped.
            let ack_due = self
                .last_ack_sent
                .is_none_or(|t| now.duration_since(t) >= self.config.min_ack_resend_interval);
            if ack_due {
                debug!(seq = self.recv_seq_acked, "duplicate packet, refreshing ack");
                self.send_ack(self.recv_seq_acked, now);
            }
            return Ok(());
        }

        let at = self
            .pending_recv
            .partition_point(|p| p.local < packet.local);
        self.pending_recv.insert(at, packet);
        Ok(())
    }

    fn process_packet(&mut self, packet: RudpPacket, now: Instant) -> Result<(), StreamError> {
        match packet.opcode {
            Opcode::Syn => self.handle_syn(packet, now),
            Opcode::Ack => {
                if self.state == StreamState::SynReceived {
                    debug!("handshake complete, connection established");
                    self.state = StreamState::Established;
                }
                Ok(())
            }
            Opcode::Dat | Opcode::DatAck => {
                self.recv_queue.push_back(packet);
                Ok(())
            }
            Opcode::Hbt => {
                self.send_bare(Opcode::Hbt, self.recv_seq_acked, now);
                Ok(())
            }
            Opcode::Fin => {
                debug!("peer closed, entering Closing");
                self.enqueue_sequenced(Some(Opcode::FinAck), packet.local, Vec::new(), now);
                self.state = StreamState::Closing;
                self.close_started = Some(now);
                Ok(())
            }
            Opcode::Rst => {
                debug!("reset, back to Listening");
                self.reset();
                Ok(())
            }
            Opcode::SynAck | Opcode::FinAck => {
                // Only outgoing connections would see these; we never dial.
                self.protocol_fault("connect-side opcode")
            }
            Opcode::Rack | Opcode::PtDatFrag | Opcode::PtDatFragAck => {
                self.protocol_fault("unused opcode")
            }
        }
    }

    fn handle_syn(&mut self, packet: RudpPacket, now: Instant) -> Result<(), StreamError> {
        debug!(seq = packet.local, "SYN received");
        self.state = StreamState::SynReceived;
        self.recv_seq = packet.local;

        // SYN_ACK first, then the bare ACK for the same sequence. The ACK
        // looks redundant but the client sends its next packet only after
        // both, so keep the pair.
        self.enqueue_sequenced(Some(Opcode::SynAck), packet.local, SYN_ACK_PAYLOAD.to_vec(), now);
        self.pump_send_queue(now);
        self.send_ack(packet.local, now);
        Ok(())
    }

    fn update_send_ack(&mut self, remote: u16) {
        if remote > self.send_seq_acked {
            self.send_seq_acked = remote;
        }
        let acked = self.send_seq_acked;
        self.retransmit_buffer.retain(|q| q.packet.local > acked);
        if self.retransmitting && self.send_seq_acked >= self.retransmit_head {
            debug!("recovered from retransmit");
            self.retransmitting = false;
        }
    }

    // ── Send path ──────────────────────────────────────────────────────────

    /// Queue an application payload as a sequenced packet. A non-zero
    /// `ack_hint` makes it a DAT_ACK acknowledging that peer sequence.
    pub fn send_data(&mut self, payload: Vec<u8>, ack_hint: u16, now: Instant) {
        self.enqueue_sequenced(None, ack_hint, payload, now);
    }

    fn enqueue_sequenced(
        &mut self,
        opcode: Option<Opcode>,
        remote: u16,
        payload: Vec<u8>,
        now: Instant,
    ) {
        // Swallow sends while closing; the peer is no longer listening.
        if matches!(self.state, StreamState::Closing | StreamState::Closed) {
            return;
        }

        let opcode = opcode.unwrap_or(if remote > 0 { Opcode::DatAck } else { Opcode::Dat });
        if opcode == Opcode::DatAck {
            self.dat_ack_covered.insert(remote);
            self.recv_seq_acked = self.recv_seq_acked.max(remote);
        }

        let local = self.send_seq;
        self.send_seq += 1;

        self.send_queue.push_back(QueuedPacket {
            packet: RudpPacket { local, remote, opcode, payload },
            send_time: now,
        });
    }

    fn send_bare(&mut self, opcode: Opcode, remote: u16, now: Instant) {
        let packet = RudpPacket::bare(opcode, remote);
        self.transmit_raw(&packet);
        if opcode == Opcode::Ack {
            self.recv_seq_acked = self.recv_seq_acked.max(remote);
            self.last_ack_sent = Some(now);
        }
    }

    fn send_ack(&mut self, remote: u16, now: Instant) {
        self.send_bare(Opcode::Ack, remote, now);
    }

    fn transmit_raw(&mut self, packet: &RudpPacket) {
        debug!(
            opcode = ?packet.opcode,
            local = packet.local,
            remote = packet.remote,
            "sending packet"
        );
        match self.outbound.encrypt(&packet.to_bytes()) {
            Ok(datagram) => self.transmit_queue.push_back(datagram),
            // CWC encryption cannot fail with a valid key; treat it as fatal.
            Err(e) => {
                warn!(error = %e, "encrypt failed, marking stream errored");
                self.errored = true;
            }
        }
    }

    /// Acknowledge a fully dispatched message, unless an outgoing DAT_ACK
    /// already covered its sequence.
    pub fn handled_packet(&mut self, ack_sequence: u16, now: Instant) {
        if self.dat_ack_covered.remove(&ack_sequence) {
            return;
        }
        self.send_ack(ack_sequence, now);
    }

    /// Begin a local graceful close.
    pub fn disconnect(&mut self, now: Instant) {
        if self.state != StreamState::Established {
            return;
        }
        let packet = RudpPacket {
            local: self.send_seq,
            remote: 0,
            opcode: Opcode::Fin,
            payload: Vec::new(),
        };
        self.transmit_raw(&packet);
        self.state = StreamState::Closing;
        self.close_started = Some(now);
    }

    // ── Timers ─────────────────────────────────────────────────────────────

    /// Advance retransmission, close and heartbeat timers. Call at least
    /// every pump interval.
    pub fn tick(&mut self, now: Instant) {
        if self.errored {
            return;
        }

        if self.state == StreamState::Closing {
            let drained = self.send_queue.is_empty();
            let overdue = self
                .close_started
                .is_some_and(|t| now.duration_since(t) >= self.config.close_grace);
            if drained || overdue {
                debug!(drained, "connection closed");
                self.state = StreamState::Closed;
                self.reset_buffers();
                return;
            }
        }
        if self.state == StreamState::Closed {
            return;
        }

        self.pump_retransmit(now);
        self.pump_send_queue(now);
        self.pump_heartbeat(now);
    }

    fn pump_retransmit(&mut self, now: Instant) {
        let interval = self.config.retransmit_interval;
        let head = match self.retransmit_buffer.front_mut() {
            Some(q) if now.duration_since(q.send_time) >= interval => q,
            _ => return,
        };

        // Single-packet policy, no backoff: resend the oldest and hold new
        // sends until it is acknowledged. MAX_IN_FLIGHT caps the burst.
        head.send_time = now;
        let seq = head.packet.local;
        let packet = head.packet.clone();
        debug!(seq, "retransmitting oldest unacked packet");
        self.transmit_raw(&packet);
        self.retransmitting = true;
        self.retransmit_head = seq;
    }

    fn pump_send_queue(&mut self, now: Instant) {
        while !self.retransmitting
            && self.retransmit_buffer.len() < self.config.max_in_flight
        {
            let Some(mut queued) = self.send_queue.pop_front() else { break };
            queued.send_time = now;
            self.transmit_raw(&queued.packet);
            self.retransmit_buffer.push_back(queued);
        }
    }

    fn pump_heartbeat(&mut self, now: Instant) {
        if self.state != StreamState::Established {
            return;
        }
        let quiet = self
            .last_received
            .is_some_and(|t| now.duration_since(t) >= self.config.heartbeat_interval);
        let already_probing = self
            .last_heartbeat_sent
            .is_some_and(|t| now.duration_since(t) < self.config.heartbeat_interval);
        if quiet && !already_probing {
            self.send_bare(Opcode::Hbt, self.recv_seq_acked, now);
            self.last_heartbeat_sent = Some(now);
        }
    }

    // ── Reset ──────────────────────────────────────────────────────────────

    fn reset_buffers(&mut self) {
        self.pending_recv.clear();
        self.recv_queue.clear();
        self.send_queue.clear();
        self.retransmit_buffer.clear();
        self.dat_ack_covered.clear();
        self.retransmitting = false;
    }

    /// RST: drop every counter and buffer, return to Listening.
    fn reset(&mut self) {
        self.state = StreamState::Listening;
        self.send_seq = 1;
        self.send_seq_acked = 0;
        self.recv_seq = 0;
        self.recv_seq_acked = 0;
        self.close_started = None;
        self.reset_buffers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [0x42; 16];
    const TOKEN: u64 = 0x0123_4567_89AB_CDEF;

    /// Client-side cipher pair for crafting and reading test datagrams.
    struct Peer {
        to_server: ClientUdpCipher,
        from_server: ServerUdpCipher,
    }

    impl Peer {
        fn new() -> Self {
            Self {
                to_server: ClientUdpCipher::new(&KEY, TOKEN),
                from_server: ServerUdpCipher::new(&KEY),
            }
        }

        fn datagram(&mut self, packet: &RudpPacket) -> Vec<u8> {
            self.to_server.encrypt(&packet.to_bytes()).unwrap()
        }

        fn open(&mut self, datagram: &[u8]) -> RudpPacket {
            RudpPacket::parse(&self.from_server.decrypt(datagram).unwrap()).unwrap()
        }
    }

    fn stream() -> PacketStream {
        PacketStream::new(&KEY, TOKEN, StreamConfig::default())
    }

    fn establish(stream: &mut PacketStream, peer: &mut Peer, now: Instant) {
        let syn = RudpPacket {
            local: 1,
            remote: 0,
            opcode: Opcode::Syn,
            payload: ember_proto::rudp::SYN_PAYLOAD.to_vec(),
        };
        stream.handle_datagram(&peer.datagram(&syn), now).unwrap();

        let syn_ack = peer.open(&stream.poll_transmit().unwrap());
        assert_eq!(syn_ack.opcode, Opcode::SynAck);
        assert_eq!((syn_ack.local, syn_ack.remote), (1, 1));
        assert_eq!(syn_ack.payload, SYN_ACK_PAYLOAD);

        let ack = peer.open(&stream.poll_transmit().unwrap());
        assert_eq!(ack.opcode, Opcode::Ack);
        assert_eq!((ack.local, ack.remote), (0, 1));

        let client_ack = RudpPacket::bare(Opcode::Ack, 1);
        stream.handle_datagram(&peer.datagram(&client_ack), now).unwrap();
        assert_eq!(stream.state(), StreamState::Established);
    }

    fn dat(local: u16, payload: &[u8]) -> RudpPacket {
        RudpPacket { local, remote: 0, opcode: Opcode::Dat, payload: payload.to_vec() }
    }

    #[test]
    fn handshake_reaches_established() {
        let mut s = stream();
        let mut peer = Peer::new();
        establish(&mut s, &mut peer, Instant::now());
    }

    #[test]
    fn out_of_order_delivery_is_reordered() {
        let mut s = stream();
        let mut peer = Peer::new();
        let now = Instant::now();
        establish(&mut s, &mut peer, now);

        // 4, 3, 2 arrive reversed; nothing delivers until 2 closes the gap.
        s.handle_datagram(&peer.datagram(&dat(4, b"c")), now).unwrap();
        s.handle_datagram(&peer.datagram(&dat(3, b"b")), now).unwrap();
        assert!(s.recv().is_none());

        s.handle_datagram(&peer.datagram(&dat(2, b"a")), now).unwrap();
        let order: Vec<Vec<u8>> = std::iter::from_fn(|| s.recv()).map(|p| p.payload).collect();
        assert_eq!(order, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn duplicate_is_dropped_and_acked_once_interval_passes() {
        let mut s = stream();
        let mut peer = Peer::new();
        let t0 = Instant::now();
        establish(&mut s, &mut peer, t0);

        s.handle_datagram(&peer.datagram(&dat(2, b"x")), t0).unwrap();
        assert!(s.recv().is_some());
        s.handled_packet(2, t0);
        let ack = peer.open(&s.poll_transmit().unwrap());
        assert_eq!((ack.opcode, ack.remote), (Opcode::Ack, 2));

        // Same packet again, immediately: dropped, no fresh ACK yet.
        s.handle_datagram(&peer.datagram(&dat(2, b"x")), t0).unwrap();
        assert!(s.recv().is_none());
        assert!(s.poll_transmit().is_none());

        // And again after the resend interval: dropped, but re-acked.
        let t1 = t0 + Duration::from_millis(150);
        s.handle_datagram(&peer.datagram(&dat(2, b"x")), t1).unwrap();
        assert!(s.recv().is_none());
        let ack = peer.open(&s.poll_transmit().unwrap());
        assert_eq!((ack.opcode, ack.remote), (Opcode::Ack, 2));
    }

    #[test]
    fn retransmits_oldest_unacked_after_interval() {
        let mut s = stream();
        let mut peer = Peer::new();
        let t0 = Instant::now();
        establish(&mut s, &mut peer, t0);

        s.send_data(b"lost".to_vec(), 0, t0);
        s.tick(t0);
        let first = peer.open(&s.poll_transmit().unwrap());
        assert_eq!(first.opcode, Opcode::Dat);

        // No ack arrives; half a second later the same packet reappears.
        let t1 = t0 + Duration::from_millis(600);
        s.tick(t1);
        let again = peer.open(&s.poll_transmit().unwrap());
        assert_eq!(again, first);

        // New sends are held while retransmitting…
        s.send_data(b"queued".to_vec(), 0, t1);
        s.tick(t1);
        assert!(s.poll_transmit().is_none());

        // …and released once the peer acknowledges the head.
        s.handle_datagram(&peer.datagram(&RudpPacket::bare(Opcode::Ack, first.local)), t1)
            .unwrap();
        s.tick(t1);
        let released = peer.open(&s.poll_transmit().unwrap());
        assert_eq!(released.payload, b"queued");
    }

    #[test]
    fn in_flight_cap_holds_sends() {
        let mut s = stream();
        let mut peer = Peer::new();
        let now = Instant::now();
        establish(&mut s, &mut peer, now);

        for i in 0..15u8 {
            s.send_data(vec![i], 0, now);
        }
        s.tick(now);

        let mut sent = Vec::new();
        while let Some(d) = s.poll_transmit() {
            sent.push(peer.open(&d));
        }
        assert_eq!(sent.len(), 10);

        // Acking the first releases exactly one more.
        s.handle_datagram(&peer.datagram(&RudpPacket::bare(Opcode::Ack, sent[0].local)), now)
            .unwrap();
        s.tick(now);
        assert!(s.poll_transmit().is_some());
        assert!(s.poll_transmit().is_none());
    }

    #[test]
    fn dat_ack_suppresses_follow_up_ack() {
        let mut s = stream();
        let mut peer = Peer::new();
        let now = Instant::now();
        establish(&mut s, &mut peer, now);

        s.handle_datagram(&peer.datagram(&dat(2, b"request")), now).unwrap();
        let request = s.recv().unwrap();

        // The reply rides a DAT_ACK that acknowledges sequence 2…
        s.send_data(b"reply".to_vec(), request.local, now);
        s.tick(now);
        let reply = peer.open(&s.poll_transmit().unwrap());
        assert_eq!(reply.opcode, Opcode::DatAck);
        assert_eq!(reply.remote, 2);

        // …so dispatch completion adds no bare ACK.
        s.handled_packet(request.local, now);
        assert!(s.poll_transmit().is_none());
    }

    #[test]
    fn fin_is_acked_and_stream_closes() {
        let mut s = stream();
        let mut peer = Peer::new();
        let now = Instant::now();
        establish(&mut s, &mut peer, now);

        let fin = RudpPacket { local: 2, remote: 0, opcode: Opcode::Fin, payload: vec![] };
        s.handle_datagram(&peer.datagram(&fin), now).unwrap();
        assert_eq!(s.state(), StreamState::Closing);

        s.tick(now);
        let fin_ack = peer.open(&s.poll_transmit().unwrap());
        assert_eq!(fin_ack.opcode, Opcode::FinAck);
        assert_eq!(fin_ack.remote, 2);

        s.tick(now + Duration::from_millis(10));
        assert_eq!(s.state(), StreamState::Closed);
    }

    #[test]
    fn local_close_times_out_within_grace() {
        let mut s = stream();
        let mut peer = Peer::new();
        let t0 = Instant::now();
        establish(&mut s, &mut peer, t0);

        // Queue data the peer never acknowledges, then close.
        s.send_data(b"tail".to_vec(), 0, t0);
        s.disconnect(t0);
        let fin = peer.open(&s.poll_transmit().unwrap());
        assert_eq!(fin.opcode, Opcode::Fin);
        assert_eq!(s.state(), StreamState::Closing);

        s.tick(t0 + Duration::from_secs(6));
        assert_eq!(s.state(), StreamState::Closed);
    }

    #[test]
    fn rst_returns_to_listening() {
        let mut s = stream();
        let mut peer = Peer::new();
        let now = Instant::now();
        establish(&mut s, &mut peer, now);

        s.handle_datagram(&peer.datagram(&RudpPacket::bare(Opcode::Rst, 0)), now).unwrap();
        assert_eq!(s.state(), StreamState::Listening);

        // A new handshake works from scratch.
        establish(&mut s, &mut peer, now);
    }

    #[test]
    fn sequenced_before_established_is_tolerated_then_fatal() {
        let mut s = stream();
        let mut peer = Peer::new();
        let now = Instant::now();

        // A stray sequenced packet is dropped, not fatal…
        s.handle_datagram(&peer.datagram(&dat(1, b"early")), now).unwrap();
        assert!(!s.is_errored());

        // …until it repeats past tolerance.
        let mut last = Ok(());
        for _ in 0..PROTOCOL_FAULT_LIMIT + 1 {
            last = s.handle_datagram(&peer.datagram(&dat(1, b"early")), now);
        }
        assert!(matches!(last, Err(StreamError::Protocol(_))));
        assert!(s.is_errored());
    }

    #[test]
    fn heartbeat_is_answered() {
        let mut s = stream();
        let mut peer = Peer::new();
        let now = Instant::now();
        establish(&mut s, &mut peer, now);

        s.handle_datagram(&peer.datagram(&RudpPacket::bare(Opcode::Hbt, 0)), now).unwrap();
        let hbt = peer.open(&s.poll_transmit().unwrap());
        assert_eq!(hbt.opcode, Opcode::Hbt);
    }

    #[test]
    fn quiet_established_stream_probes_with_heartbeat() {
        let mut s = stream();
        let mut peer = Peer::new();
        let t0 = Instant::now();
        establish(&mut s, &mut peer, t0);

        s.tick(t0 + Duration::from_secs(11));
        let hbt = peer.open(&s.poll_transmit().unwrap());
        assert_eq!(hbt.opcode, Opcode::Hbt);

        // Not re-sent every tick.
        s.tick(t0 + Duration::from_secs(12));
        assert!(s.poll_transmit().is_none());
    }

    #[test]
    fn garbage_datagram_errors_the_stream() {
        let mut s = stream();
        let now = Instant::now();
        assert!(s.handle_datagram(&[0u8; 40], now).is_err());
        assert!(s.is_errored());
    }
}
