//! Shared dispatcher state.
//!
//! All mutable core state (queue registry, request table, client table,
//! in-memory cooldowns) lives in [`Core`] behind one mutex that is never
//! held across an await: the scheduler scans the whole request table and
//! needs a consistent snapshot.  Cache I/O, webhook POSTs and the cooldown
//! store run outside the lock.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::CacheStore;
use crate::client::ClientStats;
use crate::cooldown::{self, CooldownStore, StoreError};
use crate::queue::QueueRegistry;
use crate::request::{HandlerId, RequestTable};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Everything the single core lock protects.
pub struct Core {
    pub queues: QueueRegistry,
    pub requests: RequestTable,
    pub clients: HashMap<String, ClientStats>,
    /// Authoritative live cooldowns: `client_id -> queue_name -> unlock_at`.
    /// Loaded from the store at startup, written through on dispatch.
    pub cooldowns: HashMap<String, BTreeMap<String, i64>>,
}

impl Core {
    pub fn new() -> Self {
        Self {
            queues: QueueRegistry::new(),
            requests: RequestTable::new(),
            clients: HashMap::new(),
            cooldowns: HashMap::new(),
        }
    }

    pub fn touch_client(&mut self, client_id: &str, now_ms: i64) {
        self.clients.entry(client_id.to_owned()).or_default().active_at = now_ms;
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    core: Arc<Mutex<Core>>,
    pub cache: CacheStore,
    pub store: CooldownStore,
    pub http: reqwest::Client,
    /// Epoch millis the process started; reported by `GET /status`.
    pub start_at: i64,
}

impl AppState {
    pub fn new(cache: CacheStore, store: CooldownStore) -> Self {
        Self {
            core: Arc::new(Mutex::new(Core::new())),
            cache,
            store,
            http: reqwest::Client::new(),
            start_at: now_ms(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap()
    }

    /// Populate the in-memory cooldown map from the persistent store.
    /// Called once at startup, before the listener accepts traffic.
    pub async fn load_cooldowns(&self) -> Result<(), StoreError> {
        let rows = self.store.load_all().await?;
        let now = now_ms();
        let mut core = self.lock();
        for (client_id, raw) in rows {
            let timers = cooldown::decode_timers(&raw, now);
            if !timers.is_empty() {
                core.cooldowns.insert(client_id, timers);
            }
        }
        Ok(())
    }

    /// Detach a stream handler whose caller went away before delivery.
    pub fn cancel_stream_handler(&self, key: &str, id: HandlerId) {
        let mut core = self.lock();
        core.requests.cancel(key, id);
    }
}
