use fetch_client::FetcherConfig;
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let dispatcher_url = env::var("DISPATCHER_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8080".to_owned())
        .trim_end_matches('/')
        .to_owned();
    let client_id = env::var("CLIENT_ID").unwrap_or_else(|_| format!("fetcher-{}", std::process::id()));
    let poll_interval_ms = env::var("POLL_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1_000);

    fetch_client::run(FetcherConfig {
        dispatcher_url,
        client_id,
        poll_interval: Duration::from_millis(poll_interval_ms),
    })
    .await;
}
