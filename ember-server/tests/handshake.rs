//! End-to-end handshake and game-session scenarios over real sockets:
//! login → auth → reliable-UDP data exchange → graceful close, driven by
//! a minimal scripted client.

use std::sync::Arc;
use std::time::Duration;

use ember_crypto::{
    Cipher, ClientMessageCipher, ClientUdpCipher, CwcCipher, ServerUdpCipher,
    parse_private_key_pem, parse_public_key_pem,
};
use ember_proto::fragment::Fragment;
use ember_proto::handoff::GameServerInfo;
use ember_proto::message::{GameMessage, REPLY};
use ember_proto::records::*;
use ember_proto::rudp::{Opcode, RudpPacket, SYN_ACK_PAYLOAD, SYN_PAYLOAD};
use ember_proto::tables::HasOpcode;
use ember_server::auth::AuthService;
use ember_server::config::ServerConfig;
use ember_server::game::state::SharedState;
use ember_server::game::{GameService, TokenRegistry};
use ember_server::login::LoginService;
use ember_server::store::NullStore;
use ember_server::{MessageChannel, title};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

const PRIVATE_PEM: &str = include_str!("data/test_private.pem");
const PUBLIC_PEM: &str = include_str!("data/test_public.pem");

const STEAM_ID: &str = "76561198000000001";
const APP_VERSION: u64 = 115;

const WAIT: Duration = Duration::from_secs(2);

struct TestServer {
    login_port: u16,
    auth_port: u16,
    game_port: u16,
}

async fn start_server() -> TestServer {
    let login_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let auth_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let game_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let config = Arc::new(ServerConfig {
        server_hostname: "127.0.0.1".into(),
        login_port: login_listener.local_addr().unwrap().port(),
        auth_port: auth_listener.local_addr().unwrap().port(),
        game_port: game_socket.local_addr().unwrap().port(),
        ..ServerConfig::default()
    });

    let key = parse_private_key_pem(PRIVATE_PEM).unwrap();
    let registry = Arc::new(TokenRegistry::new());
    let shared = Arc::new(SharedState::new(config.clone(), Arc::new(NullStore)));
    let dispatcher = Arc::new(title::dispatcher());

    let login = Arc::new(LoginService::new(config.clone(), key.clone()));
    let auth = Arc::new(AuthService::new(config.clone(), key, registry.clone()));
    let game = Arc::new(GameService::new(config.clone(), registry, shared, dispatcher));

    tokio::spawn(login.serve(login_listener));
    tokio::spawn(auth.serve(auth_listener));
    tokio::spawn(game.serve(game_socket));

    TestServer {
        login_port: config.login_port,
        auth_port: config.auth_port,
        game_port: config.game_port,
    }
}

async fn rsa_channel(port: u16) -> MessageChannel {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let public = parse_public_key_pem(PUBLIC_PEM).unwrap();
    MessageChannel::new(stream, Box::new(ClientMessageCipher::new(public)))
}

/// Run the full login + auth flow; returns `(auth_token, game_key, game_port)`.
async fn authenticate(server: &TestServer) -> (u64, [u8; 16], u16) {
    // ── Login: where is auth? ──────────────────────────────────────────
    let mut login = rsa_channel(server.login_port).await;
    let request = RequestQueryLoginServerInfo {
        steam_id: STEAM_ID.into(),
        app_version: APP_VERSION,
    };
    login.send_request(1, request.to_bytes()).await.unwrap();
    let reply = timeout(WAIT, login.recv_message()).await.unwrap().unwrap();
    assert!(reply.is_response);
    assert_eq!(reply.request_index, 1);
    let info = RequestQueryLoginServerInfoResponse::decode(&reply.payload).unwrap();
    assert_eq!(info.server_ip, "127.0.0.1");
    assert_eq!(info.port, server.auth_port as u64);

    // ── Auth step 1: handshake, switch to CWC ──────────────────────────
    let mut auth = rsa_channel(info.port as u16).await;
    let cwc_key = [0xAA_u8; 16];
    auth.send_request(1, RequestHandshake { aes_cwc_key: cwc_key.to_vec() }.to_bytes())
        .await
        .unwrap();

    auth.set_cipher(None); // the 27-byte fill comes back in plaintext
    let fill = timeout(WAIT, auth.recv_message()).await.unwrap().unwrap();
    assert_eq!(fill.payload.len(), 27);
    assert_eq!(&fill.payload[11..], &[0u8; 16]);
    auth.set_cipher(Some(Box::new(CwcCipher::new(&cwc_key))));

    // ── Auth step 2: service status ────────────────────────────────────
    let status = GetServiceStatus {
        id: 1,
        steam_id: STEAM_ID.into(),
        app_version: APP_VERSION,
    };
    auth.send_request(2, status.to_bytes()).await.unwrap();
    let reply = timeout(WAIT, auth.recv_message()).await.unwrap().unwrap();
    let status = GetServiceStatusResponse::decode(&reply.payload).unwrap();
    assert_eq!(status.id, 2);

    // ── Auth step 3: key exchange ──────────────────────────────────────
    let client_half: Vec<u8> = (1..=8).collect();
    auth.send_request(3, client_half.clone()).await.unwrap();
    let reply = timeout(WAIT, auth.recv_message()).await.unwrap().unwrap();
    assert_eq!(reply.payload.len(), 16);
    assert_eq!(&reply.payload[..8], &client_half[..]);
    let game_key: [u8; 16] = reply.payload.as_slice().try_into().unwrap();

    // ── Auth step 4: ticket → game-server info ─────────────────────────
    auth.send_request(4, b"fake identity ticket".to_vec()).await.unwrap();
    let reply = timeout(WAIT, auth.recv_message()).await.unwrap().unwrap();
    assert_eq!(reply.payload.len(), 184);
    let handoff = GameServerInfo::parse(&reply.payload).unwrap();
    assert_ne!(handoff.auth_token, 0);
    assert_eq!(handoff.game_server_ip, "127.0.0.1");
    assert_eq!(handoff.game_port, server.game_port);

    (handoff.auth_token, game_key, handoff.game_port)
}

/// Scripted reliable-UDP client.
struct UdpClient {
    socket: UdpSocket,
    to_server: ClientUdpCipher,
    from_server: ServerUdpCipher,
    seq: u16,
    msg_index: u32,
}

impl UdpClient {
    async fn connect(port: u16, token: u64, key: &[u8; 16]) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(("127.0.0.1", port)).await.unwrap();
        Self {
            socket,
            to_server: ClientUdpCipher::new(key, token),
            from_server: ServerUdpCipher::new(key),
            seq: 0,
            msg_index: 0,
        }
    }

    async fn send(&mut self, packet: &RudpPacket) {
        let datagram = self.to_server.encrypt(&packet.to_bytes()).unwrap();
        self.socket.send(&datagram).await.unwrap();
    }

    async fn recv(&mut self) -> RudpPacket {
        let mut buf = vec![0u8; 64 * 1024];
        let len = timeout(WAIT, self.socket.recv(&mut buf)).await.unwrap().unwrap();
        RudpPacket::parse(&self.from_server.decrypt(&buf[..len]).unwrap()).unwrap()
    }

    /// SYN / SYN_ACK+ACK / ACK.
    async fn establish(&mut self) {
        self.seq += 1;
        self.send(&RudpPacket {
            local: self.seq,
            remote: 0,
            opcode: Opcode::Syn,
            payload: SYN_PAYLOAD.to_vec(),
        })
        .await;

        let syn_ack = self.recv().await;
        assert_eq!(syn_ack.opcode, Opcode::SynAck);
        assert_eq!((syn_ack.local, syn_ack.remote), (1, 1));
        assert_eq!(syn_ack.payload, SYN_ACK_PAYLOAD);

        let ack = self.recv().await;
        assert_eq!(ack.opcode, Opcode::Ack);
        assert_eq!((ack.local, ack.remote), (0, 1));

        self.send(&RudpPacket::bare(Opcode::Ack, 1)).await;
    }

    /// Send one request record as a single DAT fragment.
    async fn send_request<R: HasOpcode>(&mut self, record: &R) -> u32 {
        let msg_index = self.msg_index;
        self.msg_index += 1;

        let message = GameMessage {
            msg_type: R::OPCODE,
            msg_index,
            payload: record.to_bytes(),
        };
        let body = message.to_bytes();
        let fragment = Fragment {
            fragment_counter: 0,
            compressed: false,
            total_payload_length: body.len() as u16,
            fragment_index: 0,
            fragment_length: body.len() as u16,
            uncompressed_size: 0,
            payload: body,
        };
        self.seq += 1;
        self.send(&RudpPacket {
            local: self.seq,
            remote: 0,
            opcode: Opcode::Dat,
            payload: fragment.to_bytes(),
        })
        .await;
        msg_index
    }

    /// Wait for the next DAT/DAT_ACK, acknowledge it, return the message.
    async fn recv_message(&mut self) -> (RudpPacket, GameMessage) {
        loop {
            let packet = self.recv().await;
            match packet.opcode {
                Opcode::Dat | Opcode::DatAck => {
                    self.send(&RudpPacket::bare(Opcode::Ack, packet.local)).await;
                    let fragment = Fragment::parse(&packet.payload).unwrap();
                    assert_eq!(fragment.fragment_index, 0, "multi-fragment replies unexpected here");
                    let message = GameMessage::parse(&fragment.payload).unwrap();
                    return (packet, message);
                }
                // Bare ACKs and heartbeats are fine to skip.
                _ => continue,
            }
        }
    }
}

#[tokio::test]
async fn full_handshake_and_announcement_exchange() {
    let server = start_server().await;
    let (token, game_key, game_port) = authenticate(&server).await;

    let mut client = UdpClient::connect(game_port, token, &game_key).await;
    client.establish().await;

    let request = RequestGetAnnounceMessageList { max_entries: 10 };
    let msg_index = client.send_request(&request).await;

    let (packet, message) = client.recv_message().await;
    assert_eq!(packet.opcode, Opcode::DatAck);
    assert_eq!(packet.remote, client.seq); // acknowledges our DAT in-band
    assert_eq!(message.msg_type, REPLY);
    assert_eq!(message.msg_index, msg_index);

    let response = RequestGetAnnounceMessageListResponse::decode(&message.payload).unwrap();
    assert!(!response.notices.is_empty());
    assert_eq!(response.notices[0].header, "Welcome");
}

#[tokio::test]
async fn graceful_close_gets_fin_ack() {
    let server = start_server().await;
    let (token, game_key, game_port) = authenticate(&server).await;

    let mut client = UdpClient::connect(game_port, token, &game_key).await;
    client.establish().await;

    client.seq += 1;
    client
        .send(&RudpPacket {
            local: client.seq,
            remote: 0,
            opcode: Opcode::Fin,
            payload: Vec::new(),
        })
        .await;

    let fin_ack = client.recv().await;
    assert_eq!(fin_ack.opcode, Opcode::FinAck);
    assert_eq!(fin_ack.remote, client.seq);
}

#[tokio::test]
async fn unregistered_token_is_ignored() {
    let server = start_server().await;

    let key = [0x55_u8; 16];
    let mut client = UdpClient::connect(server.game_port, 0xBAD_F00D, &key).await;
    client.seq = 1;
    client
        .send(&RudpPacket {
            local: 1,
            remote: 0,
            opcode: Opcode::Syn,
            payload: SYN_PAYLOAD.to_vec(),
        })
        .await;

    let mut buf = [0u8; 1500];
    let silent = timeout(Duration::from_millis(500), client.socket.recv(&mut buf)).await;
    assert!(silent.is_err(), "server must drop datagrams with unknown tokens");
}

#[tokio::test]
async fn duplicate_dat_is_dispatched_once() {
    let server = start_server().await;
    let (token, game_key, game_port) = authenticate(&server).await;

    let mut client = UdpClient::connect(game_port, token, &game_key).await;
    client.establish().await;

    let request = RequestGetAnnounceMessageList { max_entries: 1 };
    client.send_request(&request).await;
    let (_, first) = client.recv_message().await;
    assert_eq!(first.msg_type, REPLY);

    // Replay the exact same DAT: the server must not dispatch it again
    // (no second reply), only refresh its ACK.
    let message = GameMessage {
        msg_type: RequestGetAnnounceMessageList::OPCODE,
        msg_index: 0,
        payload: request.to_bytes(),
    };
    let body = message.to_bytes();
    let fragment = Fragment {
        fragment_counter: 0,
        compressed: false,
        total_payload_length: body.len() as u16,
        fragment_index: 0,
        fragment_length: body.len() as u16,
        uncompressed_size: 0,
        payload: body,
    };
    let dup = RudpPacket {
        local: client.seq,
        remote: 0,
        opcode: Opcode::Dat,
        payload: fragment.to_bytes(),
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    client.send(&dup).await;

    let next = client.recv().await;
    assert_eq!(next.opcode, Opcode::Ack, "duplicate must yield an ACK, not a reply");
}
