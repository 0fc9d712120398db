//! The Login service: one RSA-framed question, one answer, goodbye.
//!
//! Clients connect here first with the public key from their patch and
//! ask where the Auth service lives. Anything else (timeout, malformed
//! message, undecryptable payload) closes the connection silently.

use std::sync::Arc;

use ember_crypto::{RsaPrivateKey, ServerMessageCipher};
use ember_proto::records::{
    Record, RequestQueryLoginServerInfo, RequestQueryLoginServerInfoResponse,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, MessageChannel};
use crate::config::ServerConfig;

pub struct LoginService {
    config: Arc<ServerConfig>,
    key: RsaPrivateKey,
}

impl LoginService {
    pub fn new(config: Arc<ServerConfig>, key: RsaPrivateKey) -> Self {
        Self { config, key }
    }

    /// Accept loop; runs until the listener errors.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "login service listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(e) = service.handle_client(stream).await {
                    debug!(%peer, error = %e, "login client dropped");
                }
            });
        }
    }

    async fn handle_client(&self, stream: TcpStream) -> Result<(), ChannelError> {
        let mut channel =
            MessageChannel::new(stream, Box::new(ServerMessageCipher::new(self.key.clone())));

        let message = match timeout(self.config.client_timeout(), channel.recv_message()).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                debug!("login client timed out");
                return Ok(());
            }
        };

        let request = RequestQueryLoginServerInfo::decode(&message.payload)?;
        info!(
            steam_id = %request.steam_id,
            app_version = request.app_version,
            "login query"
        );

        if request.steam_id.is_empty() {
            warn!("login query without an identity, closing");
            return Ok(());
        }

        let response = RequestQueryLoginServerInfoResponse {
            server_ip: self.config.server_hostname.clone(),
            port: self.config.auth_port as u64,
        };
        channel
            .send_response(message.request_index, response.to_bytes())
            .await?;

        // One exchange per connection; dropping the channel closes it.
        Ok(())
    }
}
