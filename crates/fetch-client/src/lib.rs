//! Fetcher client loop.
//!
//! Polls the dispatcher for work, performs the outbound HTTP call with a
//! rotated User-Agent, and POSTs the body back.
//!
//! # Protocol
//! 1. `GET <dispatcher>/` with `x-client-id`
//! 2. `204` — sleep the poll interval and repeat
//! 3. `200` — parse `{key, href, headers?}`, `GET href` with a rotated
//!    User-Agent and merged headers, following redirects, 10 s budget
//! 4. Upstream `429`/`403` — back off `attempts * 750 ms` inside the budget
//! 5. `POST <dispatcher>/<key>` with the body and `x-status`
//!
//! Poll failures (dispatcher unreachable, bad payload) back off
//! exponentially; a delivered job resets the backoff.

pub mod ua;

use dispatch_protocol::{JobOffer, X_CLIENT_ID, X_STATUS};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Wall-clock budget for one upstream fetch, including rate-limit retries.
pub const UPSTREAM_BUDGET: Duration = Duration::from_secs(10);

/// Backoff step applied per attempt after an upstream `429`/`403` or a
/// failed body read.
const RATE_LIMIT_STEP: Duration = Duration::from_millis(750);

/// Poll backoff never exceeds this, however many polls failed in a row.
const MAX_POLL_BACKOFF: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for one fetcher loop.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Dispatcher base URL, e.g. `http://127.0.0.1:8080` (no trailing slash).
    pub dispatcher_url: String,
    /// Value sent as `x-client-id` on every poll and delivery.
    pub client_id: String,
    /// Sleep between polls when the dispatcher has no work.
    pub poll_interval: Duration,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("dispatcher poll failed: {0}")]
    Poll(reqwest::Error),
    #[error("dispatcher poll returned unexpected status {0}")]
    PollStatus(u16),
    #[error("job payload decode failed: {0}")]
    Decode(reqwest::Error),
    #[error("upstream budget exhausted for {0}")]
    Budget(String),
    #[error("upstream transport error: {0}")]
    Upstream(reqwest::Error),
    #[error("delivery failed: {0}")]
    Deliver(reqwest::Error),
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Run the fetcher loop forever.
///
/// Never returns; callers `tokio::spawn` it and let process shutdown tear
/// it down.
pub async fn run(cfg: FetcherConfig) {
    let client = match reqwest::Client::builder().build() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "fetcher http client build failed, loop not started");
            return;
        }
    };
    info!(
        dispatcher = %cfg.dispatcher_url,
        client_id = %cfg.client_id,
        "fetcher loop started"
    );

    let mut consecutive_errors: u32 = 0;
    loop {
        match poll_once(&client, &cfg).await {
            Ok(Some(job)) => {
                consecutive_errors = 0;
                let key = job.key.clone();
                match execute_job(&client, &job).await {
                    Ok((status, body)) => {
                        if let Err(e) = deliver(&client, &cfg, &key, status, body).await {
                            warn!(key = %key, error = %e, "delivery failed");
                        }
                    }
                    Err(e) => {
                        // The dispatcher re-dispatches after its own timeout.
                        debug!(key = %key, error = %e, "job abandoned");
                    }
                }
            }
            Ok(None) => {
                consecutive_errors = 0;
                tokio::time::sleep(cfg.poll_interval).await;
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                let backoff = poll_backoff(consecutive_errors, cfg.poll_interval);
                warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "poll failed");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// One dispatcher poll: `Ok(Some)` = work, `Ok(None)` = nothing eligible.
async fn poll_once(
    client: &reqwest::Client,
    cfg: &FetcherConfig,
) -> Result<Option<JobOffer>, FetchError> {
    let resp = client
        .get(format!("{}/", cfg.dispatcher_url))
        .header(X_CLIENT_ID, &cfg.client_id)
        .send()
        .await
        .map_err(FetchError::Poll)?;

    match resp.status().as_u16() {
        204 => Ok(None),
        200 => {
            let job: JobOffer = resp.json().await.map_err(FetchError::Decode)?;
            debug!(key = %job.key, total = job.total, "job received");
            Ok(Some(job))
        }
        other => Err(FetchError::PollStatus(other)),
    }
}

/// Perform the upstream fetch for a job within [`UPSTREAM_BUDGET`].
///
/// `429`/`403` responses and failed body reads retry with linear backoff
/// until the budget runs out; any other response is returned as-is so the
/// dispatcher can hand the body (and its status) to the waiters.
async fn execute_job(
    client: &reqwest::Client,
    job: &JobOffer,
) -> Result<(u16, Vec<u8>), FetchError> {
    let deadline = Instant::now() + UPSTREAM_BUDGET;
    let mut attempts: u32 = 0;

    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| FetchError::Budget(job.href.clone()))?;

        let ua = ua::pick_user_agent(&mut rand::thread_rng());
        let mut req = client
            .get(&job.href)
            .timeout(remaining)
            .header(reqwest::header::USER_AGENT, ua);
        for (name, value) in job.headers.as_ref().unwrap_or(&BTreeMap::new()) {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(FetchError::Budget(job.href.clone())),
            Err(e) => return Err(FetchError::Upstream(e)),
        };

        let status = resp.status().as_u16();
        if status == 429 || status == 403 {
            attempts += 1;
            warn!(href = %job.href, status, attempts, "upstream rate limit, backing off");
            backoff_within(attempts, deadline, &job.href).await?;
            continue;
        }

        match resp.bytes().await {
            Ok(body) => return Ok((status, body.to_vec())),
            Err(e) => {
                // Body read died mid-stream; the request itself went
                // through, so retry rather than abort.
                attempts += 1;
                warn!(href = %job.href, error = %e, attempts, "body read failed, retrying");
                backoff_within(attempts, deadline, &job.href).await?;
            }
        }
    }
}

/// Sleep `attempts * 750 ms`, failing if that would cross the deadline.
async fn backoff_within(attempts: u32, deadline: Instant, href: &str) -> Result<(), FetchError> {
    let backoff = rate_limit_backoff(attempts);
    if Instant::now() + backoff >= deadline {
        return Err(FetchError::Budget(href.to_owned()));
    }
    tokio::time::sleep(backoff).await;
    Ok(())
}

/// POST the fetched body back to the dispatcher under the job's key.
async fn deliver(
    client: &reqwest::Client,
    cfg: &FetcherConfig,
    key: &str,
    status: u16,
    body: Vec<u8>,
) -> Result<(), FetchError> {
    let resp = client
        .post(format!("{}/{}", cfg.dispatcher_url, key))
        .header(X_CLIENT_ID, &cfg.client_id)
        .header(X_STATUS, status.to_string())
        .body(body)
        .send()
        .await
        .map_err(FetchError::Deliver)?;

    // 404 is expected when the request timed out here and another fetcher
    // delivered first.
    debug!(key = %key, ack = resp.status().as_u16(), "delivered");
    Ok(())
}

/// Linear backoff after an upstream rate limit: `attempts * 750 ms`.
fn rate_limit_backoff(attempts: u32) -> Duration {
    RATE_LIMIT_STEP * attempts
}

/// Exponential backoff for failed dispatcher polls, capped at one minute.
fn poll_backoff(consecutive_errors: u32, base: Duration) -> Duration {
    let doublings = consecutive_errors.saturating_sub(1).min(16);
    (base * 2u32.saturating_pow(doublings)).min(MAX_POLL_BACKOFF)
}
