// dispatch-protocol: dispatcher <-> fetcher wire types and header names.
//
// The dispatcher speaks plain HTTP + JSON; every body shape and custom
// header that crosses a process boundary is defined here so the dispatcher,
// the remote fetcher and the in-process fetcher cannot drift apart.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Header names
// ---------------------------------------------------------------------------

/// Client identity header, first in the identification chain.
pub const X_CLIENT_ID: &str = "x-client-id";

/// Fallback identity headers, tried in order after `x-client-id`.
/// The first non-empty value wins.
pub const CLIENT_ID_HEADERS: [&str; 4] = [
    X_CLIENT_ID,
    "true-client-ip",
    "cf-connecting-ip",
    "x-forwarded-for",
];

/// Upstream HTTP status, sent by a fetcher when delivering a body.
/// `200` is the cache-write gate.
pub const X_STATUS: &str = "x-status";

/// Cache key of the request a response belongs to.
pub const X_REQUEST_KEY: &str = "x-request-key";

/// Original URL of the request, echoed on webhook deliveries.
pub const X_REQUEST_HREF: &str = "x-request-href";

/// Upstream status echoed on webhook deliveries.
pub const X_REQUEST_STATUS: &str = "x-request-status";

/// Set on enqueue responses served straight from the cache.
pub const X_FROM_CACHE: &str = "x-from-cache";

// ---------------------------------------------------------------------------
// Caller -> Dispatcher
// ---------------------------------------------------------------------------

/// Body of `POST /` — a cache-or-fetch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Absolute URL to fetch.
    pub url: String,
    /// Max acceptable cache age in milliseconds.  Absent means any cached
    /// body is fresh enough.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<i64>,
    /// Extra headers forwarded to the upstream fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Webhook URL.  When present the caller gets an immediate 202 and the
    /// body is POSTed here once available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

// ---------------------------------------------------------------------------
// Dispatcher -> Fetcher
// ---------------------------------------------------------------------------

/// Body of a `200` response to `GET /` — one unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOffer {
    /// Cache key; also the delivery path (`POST /<key>`).
    pub key: String,
    /// URL to fetch.
    pub href: String,
    /// Headers to merge into the upstream request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// How many requests were eligible when this one was picked.
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// JSON body of every non-2xx dispatcher response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub message: String,
    pub status: u16,
}

// ---------------------------------------------------------------------------
// Status report (`GET /status`)
// ---------------------------------------------------------------------------

/// Per-client bookkeeping as reported by `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientReport {
    /// Epoch millis of the client's last dispatch poll.
    pub active_at: i64,
    /// Dispatches handed to this client.
    pub started: u64,
    /// Responses delivered by this client.
    pub finished: u64,
}

/// One pending request as reported by `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReport {
    pub key: String,
    pub href: String,
    pub queue: String,
    /// Milliseconds since enqueue (`created_at` is monotonic, so the report
    /// carries an age rather than a timestamp).
    pub age_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    pub attempts: u32,
    /// Number of attached waiters (streams + webhooks).
    pub handlers: usize,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub clients: BTreeMap<String, ClientReport>,
    /// Per-client live cooldowns: `queue -> unlock_at` epoch millis.
    pub timers: BTreeMap<String, BTreeMap<String, i64>>,
    pub requests: Vec<RequestReport>,
    /// Epoch millis the dispatcher process started.
    pub start_at: i64,
}
