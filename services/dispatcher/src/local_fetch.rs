//! In-process fetcher.
//!
//! One fetcher loop polling the dispatcher's own listener, so work keeps
//! moving when no remote clients are attached.  It is a plain wire-protocol
//! collaborator — the same loop the remote `fetcher` binary runs — and is
//! rate-limited like any other client under the id `localhost`.

use fetch_client::FetcherConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const LOCAL_CLIENT_ID: &str = "localhost";

const POLL_INTERVAL: Duration = Duration::from_millis(1_000);

pub fn spawn(bind_addr: SocketAddr) -> JoinHandle<()> {
    let mut addr = bind_addr;
    if addr.ip().is_unspecified() {
        addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    tokio::spawn(fetch_client::run(FetcherConfig {
        dispatcher_url: format!("http://{addr}"),
        client_id: LOCAL_CLIENT_ID.to_owned(),
        poll_interval: POLL_INTERVAL,
    }))
}
