//! State shared by every game session of one title: the live area pools,
//! the player directory for pushes, and id allocation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use ember_proto::records::{
    BloodMessage, Bloodstain, Ghost, PushBloodMessageEvaluated, PushRequestSummonSign, SummonSign,
};
use tokio::sync::mpsc;
use tracing::debug;

use crate::area_pool::AreaPool;
use crate::config::ServerConfig;
use crate::store::PlayerStore;

/// Server→client notifications, routed through the session directory.
#[derive(Clone, Debug)]
pub enum PushMessage {
    SummonSign(PushRequestSummonSign),
    BloodMessageEvaluated(PushBloodMessageEvaluated),
}

/// Everything a session task can be told from outside.
pub enum SessionCommand {
    Datagram(Vec<u8>),
    Push(PushMessage),
}

/// Per-session player state, owned by the session task.
pub struct PlayerState {
    pub player_id: u32,
    pub steam_id: String,
    /// Latest status telemetry blob; opaque to the core.
    pub status_data: Vec<u8>,
    /// Live signs this player placed, removed again on disconnect.
    pub placed_signs: Vec<(u32, u32)>,
}

/// The live artifact caches. Mutation is serialized per pool.
pub struct GamePools {
    pub blood_messages: Mutex<AreaPool<u32, BloodMessage>>,
    pub bloodstains: Mutex<AreaPool<u32, Bloodstain>>,
    pub ghosts: Mutex<AreaPool<u32, Ghost>>,
    pub signs: Mutex<AreaPool<u32, SummonSign>>,
}

/// Live sessions by player id, for best-effort pushes.
#[derive(Default)]
pub struct SessionDirectory {
    inner: Mutex<HashMap<u32, mpsc::UnboundedSender<SessionCommand>>>,
}

impl SessionDirectory {
    pub fn register(&self, player_id: u32, tx: mpsc::UnboundedSender<SessionCommand>) {
        self.inner.lock().unwrap().insert(player_id, tx);
    }

    pub fn unregister(&self, player_id: u32) {
        self.inner.lock().unwrap().remove(&player_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort, single attempt; a gone or saturated receiver is logged
    /// and forgotten.
    pub fn push_to_player(&self, player_id: u32, message: PushMessage) -> bool {
        let sent = self
            .inner
            .lock()
            .unwrap()
            .get(&player_id)
            .is_some_and(|tx| tx.send(SessionCommand::Push(message)).is_ok());
        if !sent {
            debug!(player_id, "push target not reachable");
        }
        sent
    }
}

/// Shared across all sessions of the service.
pub struct SharedState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn PlayerStore>,
    pub pools: GamePools,
    pub directory: SessionDirectory,
    next_player_id: AtomicU32,
    next_entry_id: AtomicU32,
}

impl SharedState {
    pub fn new(config: Arc<ServerConfig>, store: Arc<dyn PlayerStore>) -> Self {
        let pools = GamePools {
            blood_messages: Mutex::new(AreaPool::new(config.blood_message_max_per_area)),
            bloodstains: Mutex::new(AreaPool::new(config.bloodstain_max_per_area)),
            ghosts: Mutex::new(AreaPool::new(config.ghost_max_per_area)),
            signs: Mutex::new(AreaPool::new(config.sign_max_per_area)),
        };
        let state = Self {
            config,
            store,
            pools,
            directory: SessionDirectory::default(),
            next_player_id: AtomicU32::new(1),
            next_entry_id: AtomicU32::new(1),
        };
        state.prime_pools();
        state
    }

    /// Warm the message pool with persisted artifacts.
    fn prime_pools(&self) {
        let stored = self.store.stored_blood_messages(self.config.prime_count_per_area);
        let mut pool = self.pools.blood_messages.lock().unwrap();
        for message in stored {
            let area = message.online_area_id;
            let id = message.message_id;
            pool.add(area, id, Arc::new(message));
        }
        if pool.total_entries() > 0 {
            debug!(count = pool.total_entries(), "primed blood-message pool");
        }
    }

    pub fn allocate_player_id(&self) -> u32 {
        self.next_player_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn allocate_entry_id(&self) -> u32 {
        self.next_entry_id.fetch_add(1, Ordering::Relaxed)
    }
}
