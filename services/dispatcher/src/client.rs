//! Client identification and per-client counters.
//!
//! Fetcher clients are untrusted and unauthenticated; the dispatcher only
//! identifies them, by the first non-empty header in the
//! [`dispatch_protocol::CLIENT_ID_HEADERS`] chain.

use axum::http::HeaderMap;
use dispatch_protocol::CLIENT_ID_HEADERS;

/// Per-client bookkeeping.  In-memory only.
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Epoch millis of the last dispatch poll.
    pub active_at: i64,
    /// Dispatches handed out.
    pub started: u64,
    /// Responses delivered.
    pub finished: u64,
}

/// Extract the client id from the identification header chain.
///
/// `x-forwarded-for` may carry a proxy chain; only the first hop counts.
pub fn client_id(headers: &HeaderMap) -> Option<String> {
    for name in CLIENT_ID_HEADERS {
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let value = value.split(',').next().unwrap_or("").trim();
        if !value.is_empty() {
            return Some(value.to_owned());
        }
    }
    None
}
