use dispatcher::cache::CacheStore;
use dispatcher::cooldown::{self, CooldownStore};
use dispatcher::state::AppState;
use dispatcher::{local_fetch, queue};
use std::env;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| ".".to_owned());
    let db_path =
        env::var("COOLDOWN_DB").unwrap_or_else(|_| format!("{data_dir}/cooldowns.db"));

    let store = CooldownStore::open(Path::new(&db_path)).expect("failed to open cooldown store");
    let state = AppState::new(CacheStore::new(&data_dir), store);

    {
        let mut core = state.lock();
        queue::register_seeds(&mut core.queues);
    }
    for (name, _, _) in queue::SEED_QUEUES {
        state
            .cache
            .ensure_queue_dir(name)
            .await
            .expect("failed to create seed queue cache dir");
    }

    state
        .load_cooldowns()
        .await
        .expect("failed to load persisted cooldowns");
    cooldown::spawn_sweeper(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    let local_addr = listener.local_addr().expect("listener has no local addr");
    local_fetch::spawn(local_addr);

    info!(addr = %bind_addr, data_dir = %data_dir, "dispatcher listening");
    let router = dispatcher::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("dispatcher shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
