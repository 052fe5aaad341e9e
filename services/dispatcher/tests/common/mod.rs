//! Shared harness: an in-process dispatcher instance on a random port.
#![allow(dead_code)]

use dispatcher::AppState;
use dispatcher::cache::CacheStore;
use dispatcher::cooldown::CooldownStore;
use std::path::Path;
use std::time::Duration;

pub struct TestDispatcher {
    pub base_url: String,
    pub state: AppState,
    server: tokio::task::JoinHandle<()>,
}

impl TestDispatcher {
    /// Start a dispatcher instance over the given cache dir and cooldown
    /// store path.  No local fetcher and no sweeper: tests drive dispatch
    /// themselves.
    pub async fn start(data_dir: &Path, db_path: &Path) -> Self {
        let store = CooldownStore::open(db_path).expect("open cooldown store");
        let state = AppState::new(CacheStore::new(data_dir), store);
        state.load_cooldowns().await.expect("load cooldowns");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = dispatcher::build_router(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("server error");
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            base_url: format!("http://{addr}"),
            state,
            server,
        }
    }

    /// Register a queue with a test-sized delay.
    pub fn register_queue(&self, name: &str, delay_ms: u64) {
        let mut core = self.state.lock();
        core.queues.register(name, delay_ms, &[]);
    }

    /// Simulate a process stop; persisted state stays on disk.
    pub fn stop(self) {
        self.server.abort();
    }
}

/// Poll `GET /status` until the predicate holds, panicking after ~2 s.
pub async fn wait_for_status(
    client: &reqwest::Client,
    base_url: &str,
    what: &str,
    predicate: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..100 {
        let status: serde_json::Value = client
            .get(format!("{base_url}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if predicate(&status) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("status never satisfied: {what}");
}
