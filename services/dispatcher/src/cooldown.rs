//! Per-client cooldown timers: codec, persistent store, periodic sweep.
//!
//! Each client's live cooldowns are encoded as a flat comma-separated
//! sequence of alternating `queue_name,unlock_at_ms` tokens and persisted
//! under the client id, so a restart cannot let a client burst past a rate
//! limit.  Decoding tolerates missing or zero values and drops entries
//! whose `unlock_at` has passed; encoding an empty map yields the empty
//! string, which deletes the client's row.  The sweep (startup + hourly)
//! re-encodes every row, which bounds growth.

use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task;
use tracing::{debug, warn};

use crate::state::{AppState, now_ms};

/// Interval of the re-encoding sweep.  The first tick fires at startup.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Encode live timers as `queue,unlock_at,queue,unlock_at,...`.
pub fn encode_timers(timers: &BTreeMap<String, i64>) -> String {
    timers
        .iter()
        .map(|(queue, unlock_at)| format!("{queue},{unlock_at}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a timer string, dropping malformed, zero, and expired entries.
pub fn decode_timers(raw: &str, now_ms: i64) -> BTreeMap<String, i64> {
    let mut timers = BTreeMap::new();
    let mut tokens = raw.split(',');
    while let Some(queue) = tokens.next() {
        let Some(unlock_token) = tokens.next() else {
            break;
        };
        if queue.is_empty() {
            continue;
        }
        let unlock_at = unlock_token.trim().parse::<i64>().unwrap_or(0);
        if unlock_at == 0 || unlock_at <= now_ms {
            continue;
        }
        timers.insert(queue.to_owned(), unlock_at);
    }
    timers
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cooldown store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cooldown store task failed: {0}")]
    Join(#[from] task::JoinError),
}

/// Embedded key-value store: one row per client id, value = codec string.
/// Writes are atomic per key (`INSERT OR REPLACE` / `DELETE`).
#[derive(Clone)]
pub struct CooldownStore {
    conn: Arc<Mutex<Connection>>,
}

impl CooldownStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cooldowns (
                client_id TEXT PRIMARY KEY,
                timers    TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Persist a client's encoded timers.  An empty encoding deletes the row.
    pub async fn put(&self, client_id: String, encoded: String) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            if encoded.is_empty() {
                conn.execute("DELETE FROM cooldowns WHERE client_id = ?1", params![client_id])?;
            } else {
                conn.execute(
                    "INSERT OR REPLACE INTO cooldowns (client_id, timers) VALUES (?1, ?2)",
                    params![client_id, encoded],
                )?;
            }
            Ok(())
        })
        .await?
    }

    pub async fn get(&self, client_id: String) -> Result<Option<String>, StoreError> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let row = conn
                .query_row(
                    "SELECT timers FROM cooldowns WHERE client_id = ?1",
                    params![client_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(row)
        })
        .await?
    }

    pub async fn load_all(&self) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare("SELECT client_id, timers FROM cooldowns")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Spawn the periodic sweep: once at startup, then every [`SWEEP_INTERVAL`].
pub fn spawn_sweeper(state: AppState) -> task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticks.tick().await;
            if let Err(e) = sweep(&state).await {
                warn!(error = %e, "cooldown sweep failed");
            }
        }
    })
}

/// Re-encode every client's entry, dropping expired timers, and prune the
/// in-memory map to match.
pub async fn sweep(state: &AppState) -> Result<(), StoreError> {
    let now = now_ms();
    let rows = state.store.load_all().await?;
    let mut rewritten = 0usize;
    for (client_id, raw) in rows {
        let encoded = encode_timers(&decode_timers(&raw, now));
        if encoded != raw {
            rewritten += 1;
            state.store.put(client_id, encoded).await?;
        }
    }

    let mut core = state.lock();
    for timers in core.cooldowns.values_mut() {
        timers.retain(|_, unlock_at| *unlock_at > now);
    }
    core.cooldowns.retain(|_, timers| !timers.is_empty());
    drop(core);

    debug!(rewritten, "cooldown sweep complete");
    Ok(())
}
