//! The Game service: one UDP socket multiplexing every client.
//!
//! The receive loop demultiplexes datagrams by source address. A first
//! datagram from an unknown address is only honored when its auth-token
//! prefix matches a registration made by the Auth service; everything
//! else is dropped on the floor. Each accepted client gets a tokio task
//! owning its whole session state; cross-session interaction happens by
//! message passing through the [`state::SessionDirectory`].

pub mod dispatch;
pub mod state;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ember_crypto::peek_auth_token;
use ember_proto::titles::v115;
use ember_session::{MessageStream, StreamState};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use dispatch::{Dispatcher, Outcome, SessionContext};
use state::{PlayerState, PushMessage, SessionCommand, SharedState};

/// Close the session when this much outbound data sits unflushed.
const MAX_OUTBOUND_BUFFER: usize = 512 * 1024;

/// Timer granularity of session tasks.
const TICK_INTERVAL: Duration = Duration::from_millis(10);

// ─── Token registry ──────────────────────────────────────────────────────────

struct TokenEntry {
    game_key: [u8; 16],
    steam_id: String,
    last_refresh: Instant,
}

/// Auth→Game handoff state: tokens registered by the Auth service,
/// waiting to be claimed by a UDP session. Unclaimed tokens expire;
/// receipt of any session packet refreshes them.
#[derive(Default)]
pub struct TokenRegistry {
    entries: Mutex<HashMap<u64, TokenEntry>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: u64, game_key: [u8; 16], steam_id: String) {
        self.entries.lock().unwrap().insert(
            token,
            TokenEntry { game_key, steam_id, last_refresh: Instant::now() },
        );
    }

    pub fn lookup(&self, token: u64) -> Option<([u8; 16], String)> {
        self.entries
            .lock()
            .unwrap()
            .get(&token)
            .map(|e| (e.game_key, e.steam_id.clone()))
    }

    pub fn refresh(&self, token: u64) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&token) {
            entry.last_refresh = Instant::now();
        }
    }

    pub fn remove(&self, token: u64) {
        self.entries.lock().unwrap().remove(&token);
    }

    /// Forget registrations idle past `timeout`.
    pub fn sweep(&self, timeout: Duration) {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .retain(|_, e| now.duration_since(e.last_refresh) < timeout);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Service ─────────────────────────────────────────────────────────────────

struct SessionEntry {
    tx: mpsc::UnboundedSender<SessionCommand>,
    token: u64,
}

pub struct GameService {
    config: Arc<ServerConfig>,
    registry: Arc<TokenRegistry>,
    shared: Arc<SharedState>,
    dispatcher: Arc<Dispatcher>,
}

impl GameService {
    pub fn new(
        config: Arc<ServerConfig>,
        registry: Arc<TokenRegistry>,
        shared: Arc<SharedState>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self { config, registry, shared, dispatcher }
    }

    /// Receive loop; runs until the socket errors.
    pub async fn serve(self: Arc<Self>, socket: UdpSocket) -> std::io::Result<()> {
        let socket = Arc::new(socket);
        info!(addr = %socket.local_addr()?, "game service listening");

        let mut sessions: HashMap<SocketAddr, SessionEntry> = HashMap::new();
        let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<SocketAddr>();
        let mut token_sweep = tokio::time::interval(Duration::from_secs(1));
        let mut maintenance = tokio::time::interval(self.config.database_trim_interval());
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    let (len, peer) = received?;
                    let datagram = buf[..len].to_vec();

                    if let Some(entry) = sessions.get(&peer) {
                        self.registry.refresh(entry.token);
                        // A dead task's entry is removed via closed_rx.
                        let _ = entry.tx.send(SessionCommand::Datagram(datagram));
                        continue;
                    }

                    let Some(token) = peek_auth_token(&datagram) else {
                        debug!(%peer, "runt datagram from unknown peer");
                        continue;
                    };
                    let Some((game_key, steam_id)) = self.registry.lookup(token) else {
                        debug!(%peer, "datagram with unregistered token, dropping");
                        continue;
                    };

                    self.registry.refresh(token);
                    let (tx, rx) = mpsc::unbounded_channel();
                    let _ = tx.send(SessionCommand::Datagram(datagram));
                    sessions.insert(peer, SessionEntry { tx: tx.clone(), token });

                    let service = self.clone();
                    let socket = socket.clone();
                    let closed_tx = closed_tx.clone();
                    tokio::spawn(async move {
                        service
                            .run_session(socket, peer, token, game_key, steam_id, tx, rx)
                            .await;
                        let _ = closed_tx.send(peer);
                    });
                }

                Some(peer) = closed_rx.recv() => {
                    sessions.remove(&peer);
                }

                _ = token_sweep.tick() => {
                    self.registry.sweep(self.config.auth_token_timeout());
                }

                _ = maintenance.tick() => {
                    // Store maintenance may hit disk; keep it off this loop.
                    let store = self.shared.store.clone();
                    tokio::task::spawn_blocking(move || store.maintain());
                }
            }
        }
    }

    // ── Session task ───────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn run_session(
        self: Arc<Self>,
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        token: u64,
        game_key: [u8; 16],
        steam_id: String,
        tx: mpsc::UnboundedSender<SessionCommand>,
        mut rx: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let player_id = self.shared.allocate_player_id();
        let mut player = PlayerState {
            player_id,
            steam_id: steam_id.clone(),
            status_data: Vec::new(),
            placed_signs: Vec::new(),
        };
        let mut stream =
            MessageStream::new(&game_key, token, &v115::TABLE, self.config.stream_config());

        self.shared.directory.register(player_id, tx);
        self.shared.store.player_seen(&steam_id);
        info!(%peer, player_id, %steam_id, "game session started");

        let idle_timeout = self.config.session_idle_timeout();
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        let mut last_activity = Instant::now();

        let reason = loop {
            tokio::select! {
                command = rx.recv() => match command {
                    None => break "service dropped the session",
                    Some(SessionCommand::Datagram(datagram)) => {
                        let now = Instant::now();
                        last_activity = now;
                        if let Err(e) = stream.handle_datagram(&datagram, now) {
                            warn!(%peer, error = %e, "transport error");
                            break "transport error";
                        }
                        if self.pump_messages(&mut stream, &mut player, now).is_err() {
                            break "handler error";
                        }
                    }
                    Some(SessionCommand::Push(push)) => {
                        let now = Instant::now();
                        // Best effort, single attempt.
                        let result = match push {
                            PushMessage::SummonSign(record) => stream.send(&record, now),
                            PushMessage::BloodMessageEvaluated(record) => stream.send(&record, now),
                        };
                        if let Err(e) = result {
                            warn!(%peer, error = %e, "push send failed");
                        }
                    }
                },
                _ = ticker.tick() => {
                    let now = Instant::now();
                    stream.tick(now);
                    if now.duration_since(last_activity) >= idle_timeout {
                        break "idle timeout";
                    }
                }
            }

            if stream.is_errored() {
                break "stream errored";
            }
            if stream.state() == StreamState::Closed {
                break "connection closed";
            }
            if let Err(reason) = flush(&mut stream, &socket, peer).await {
                break reason;
            }
        };

        // Per-title cleanup: live signs die with their owner.
        if !player.placed_signs.is_empty() {
            let mut signs = self.shared.pools.signs.lock().unwrap();
            for (area, id) in player.placed_signs.drain(..) {
                signs.remove(area, id);
            }
        }
        self.shared.directory.unregister(player_id);
        self.registry.remove(token);
        info!(%peer, player_id, reason, "game session ended");
    }

    fn pump_messages(
        &self,
        stream: &mut MessageStream,
        player: &mut PlayerState,
        now: Instant,
    ) -> Result<(), ()> {
        while let Some(received) = stream.recv() {
            let message = match received {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "undecodable message");
                    return Err(());
                }
            };

            let mut ctx = SessionContext {
                stream: &mut *stream,
                player,
                shared: self.shared.as_ref(),
                now,
            };
            match self.dispatcher.dispatch(&mut ctx, &message) {
                Outcome::Handled => {}
                Outcome::Unhandled => {
                    // A hole in the title's table; the session survives.
                    warn!(
                        opcode = format_args!("{:#06x}", message.opcode),
                        "message with no handler"
                    );
                }
                Outcome::Error => return Err(()),
            }
            stream.handled(&message, now);
        }
        Ok(())
    }
}

/// Drain the stream's outgoing datagrams onto the socket.
async fn flush(
    stream: &mut MessageStream,
    socket: &UdpSocket,
    peer: SocketAddr,
) -> Result<(), &'static str> {
    if stream.pending_transmit_bytes() > MAX_OUTBOUND_BUFFER {
        return Err("outbound buffer saturated");
    }
    while let Some(datagram) = stream.poll_transmit() {
        socket
            .send_to(&datagram, peer)
            .await
            .map_err(|_| "socket send failed")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_register_lookup_refresh() {
        let registry = TokenRegistry::new();
        registry.register(7, [1u8; 16], "steam:1".into());
        let (key, steam_id) = registry.lookup(7).unwrap();
        assert_eq!(key, [1u8; 16]);
        assert_eq!(steam_id, "steam:1");
        assert!(registry.lookup(8).is_none());
    }

    #[test]
    fn registry_sweep_drops_stale_entries() {
        let registry = TokenRegistry::new();
        registry.register(1, [0u8; 16], "a".into());
        registry.sweep(Duration::from_secs(0));
        assert!(registry.is_empty());

        registry.register(2, [0u8; 16], "b".into());
        registry.sweep(Duration::from_secs(60));
        assert_eq!(registry.len(), 1);
    }
}
