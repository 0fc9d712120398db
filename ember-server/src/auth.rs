//! The Auth service: a four-step TCP state machine that negotiates the
//! game session key and hands the client its UDP endpoint.
//!
//! | State              | Input                         | Output                         |
//! |--------------------|-------------------------------|--------------------------------|
//! | AwaitHandshake     | `RequestHandshake` (RSA)      | 27-byte plaintext fill         |
//! | AwaitServiceStatus | `GetServiceStatus` (CWC)      | `GetServiceStatusResponse`     |
//! | AwaitKeyExchange   | 8-byte client key half        | 16-byte full key               |
//! | AwaitTicket        | identity ticket               | 184-byte game-server info      |
//!
//! Each state accepts exactly one message kind; anything else, or a
//! timeout, closes the connection silently. Completing the last step
//! registers `(auth_token, game_key)` with the game service.

use std::sync::Arc;

use ember_crypto::{CwcCipher, RsaPrivateKey, ServerMessageCipher, fill_random, random_u64};
use ember_proto::handoff::GameServerInfo;
use ember_proto::records::{GetServiceStatus, GetServiceStatusResponse, Record, RequestHandshake};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::channel::{ChannelError, MessageChannel};
use crate::config::ServerConfig;
use crate::game::TokenRegistry;

/// Largest identity ticket we accept.
const MAX_TICKET_LEN: usize = 2048;

pub struct AuthService {
    config: Arc<ServerConfig>,
    key: RsaPrivateKey,
    registry: Arc<TokenRegistry>,
}

impl AuthService {
    pub fn new(config: Arc<ServerConfig>, key: RsaPrivateKey, registry: Arc<TokenRegistry>) -> Self {
        Self { config, key, registry }
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "auth service listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(e) = service.handle_client(stream).await {
                    debug!(%peer, error = %e, "auth client dropped");
                }
            });
        }
    }

    async fn recv(
        &self,
        channel: &mut MessageChannel,
    ) -> Result<Option<ember_proto::tcp::TcpMessage>, ChannelError> {
        match timeout(self.config.client_timeout(), channel.recv_message()).await {
            Ok(result) => result.map(Some),
            Err(_elapsed) => {
                debug!("auth client timed out");
                Ok(None)
            }
        }
    }

    async fn handle_client(&self, stream: TcpStream) -> Result<(), ChannelError> {
        let mut channel =
            MessageChannel::new(stream, Box::new(ServerMessageCipher::new(self.key.clone())));

        // ── AwaitHandshake ─────────────────────────────────────────────
        let Some(message) = self.recv(&mut channel).await? else { return Ok(()) };
        let handshake = RequestHandshake::decode(&message.payload)?;
        let Ok(cwc_key) = <[u8; 16]>::try_from(handshake.aes_cwc_key.as_slice()) else {
            debug!(len = handshake.aes_cwc_key.len(), "handshake key has wrong length");
            return Ok(());
        };
        debug!("handshake received, switching to cwc");

        // The acknowledgement is hardcoded plaintext: 11 random bytes and
        // 16 zeroes. The cipher swap happens on either side of it.
        let mut fill = vec![0u8; 27];
        fill_random(&mut fill[..11]);
        fill[11..].fill(0);

        channel.set_cipher(None);
        channel.send_response(message.request_index, fill).await?;
        channel.set_cipher(Some(Box::new(CwcCipher::new(&cwc_key))));

        // ── AwaitServiceStatus ─────────────────────────────────────────
        let Some(message) = self.recv(&mut channel).await? else { return Ok(()) };
        let status = GetServiceStatus::decode(&message.payload)?;
        debug!(steam_id = %status.steam_id, app_version = status.app_version, "service status");

        let response = GetServiceStatusResponse {
            id: 2,
            steam_id: "\0".into(),
            unknown_1: 0,
            network_protocol: 0,
        };
        channel
            .send_response(message.request_index, response.to_bytes())
            .await?;

        // ── AwaitKeyExchange ───────────────────────────────────────────
        let Some(message) = self.recv(&mut channel).await? else { return Ok(()) };
        let Ok(client_half) = <[u8; 8]>::try_from(message.payload.as_slice()) else {
            debug!(len = message.payload.len(), "key exchange has wrong length");
            return Ok(());
        };

        // Full key: the client's 8 bytes, then 8 of ours.
        let mut game_key = [0u8; 16];
        game_key[..8].copy_from_slice(&client_half);
        fill_random(&mut game_key[8..]);
        channel
            .send_response(message.request_index, game_key.to_vec())
            .await?;

        // ── AwaitTicket ────────────────────────────────────────────────
        let Some(message) = self.recv(&mut channel).await? else { return Ok(()) };
        if message.payload.is_empty() || message.payload.len() > MAX_TICKET_LEN {
            debug!(len = message.payload.len(), "rejecting identity ticket");
            return Ok(());
        }
        // The ticket itself is an opaque byte string here; validation
        // against the identity provider is outside this service.

        let mut auth_token = random_u64();
        while auth_token == 0 {
            auth_token = random_u64();
        }
        let info = GameServerInfo {
            auth_token,
            game_server_ip: self.config.server_hostname.clone(),
            game_port: self.config.game_port,
        };
        channel
            .send_response(message.request_index, info.to_bytes().to_vec())
            .await?;

        self.registry
            .register(info.auth_token, game_key, status.steam_id.clone());
        info!(
            steam_id = %status.steam_id,
            token = format_args!("{:#018x}", info.auth_token),
            "auth complete, game session registered"
        );
        Ok(())
    }
}
