//! Webhook delivery.
//!
//! A webhook waiter gets the body POSTed with `x-request-key`,
//! `x-request-href` and `x-request-status`.  Any non-500 response is
//! terminal; a 500 retries with `attempts * 750 ms` backoff, capped at
//! [`MAX_ATTEMPTS`].  Transport errors are terminal.

use axum::body::Bytes;
use dispatch_protocol::{X_REQUEST_HREF, X_REQUEST_KEY, X_REQUEST_STATUS};
use std::time::Duration;
use tracing::{debug, warn};

pub const MAX_ATTEMPTS: u32 = 20;

const RETRY_STEP: Duration = Duration::from_millis(750);

/// POST the delivered body to a webhook URL, retrying on recipient 500.
///
/// Spawned from the delivery path; never awaited by the delivering client.
pub async fn deliver(
    http: reqwest::Client,
    hook_url: String,
    key: String,
    href: String,
    status: u16,
    body: Bytes,
) {
    for attempt in 1..=MAX_ATTEMPTS {
        let result = http
            .post(&hook_url)
            .header(X_REQUEST_KEY, &key)
            .header(X_REQUEST_HREF, &href)
            .header(X_REQUEST_STATUS, status.to_string())
            .body(body.clone())
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().as_u16() == 500 => {
                debug!(hook = %hook_url, key = %key, attempt, "webhook returned 500, retrying");
                tokio::time::sleep(RETRY_STEP * attempt).await;
            }
            Ok(resp) => {
                debug!(
                    hook = %hook_url,
                    key = %key,
                    status = resp.status().as_u16(),
                    "webhook delivered"
                );
                return;
            }
            Err(e) => {
                warn!(hook = %hook_url, key = %key, error = %e, "webhook unreachable, giving up");
                return;
            }
        }
    }
    warn!(
        hook = %hook_url,
        key = %key,
        attempts = MAX_ATTEMPTS,
        "webhook kept returning 500, giving up"
    );
}
