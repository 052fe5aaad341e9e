//! `POST /:queue/:digest` — a fetcher delivers a body.
//!
//! A missing table entry is the normal outcome of a timeout race: the
//! request was re-dispatched and another client delivered first; the slow
//! client gets a 404 and its body is dropped, which also suppresses its
//! cache write.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use dispatch_protocol::X_STATUS;
use tracing::warn;

use super::response::{bad_request, not_found};
use crate::client::client_id;
use crate::request::{Delivery, Handler};
use crate::state::AppState;
use crate::webhook;

pub async fn deliver(
    State(state): State<AppState>,
    Path((queue_name, digest)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let status = match headers.get(X_STATUS) {
        None => 200,
        Some(value) => match value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<u16>().ok())
        {
            Some(status) => status,
            None => return bad_request("malformed x-status header"),
        },
    };

    let key = format!("{queue_name}/{digest}");
    let Some(request) = state.lock().requests.take(&key) else {
        return not_found(format!("no pending request for {key}"));
    };

    // Cache write (200 only) overlaps handler notification and is awaited
    // before the final ack.
    let write = (status == 200).then(|| {
        let cache = state.cache.clone();
        let key = key.clone();
        let body = body.clone();
        tokio::spawn(async move { cache.write(&key, &body).await })
    });

    for (_, handler) in request.handlers {
        match handler {
            Handler::Stream(tx) => {
                // A send can only fail if the waiter cancelled in the same
                // instant; its body is simply dropped.
                let _ = tx.send(Delivery {
                    status,
                    body: body.clone(),
                });
            }
            Handler::Webhook(hook_url) => {
                tokio::spawn(webhook::deliver(
                    state.http.clone(),
                    hook_url,
                    key.clone(),
                    request.href.clone(),
                    status,
                    body.clone(),
                ));
            }
        }
    }

    if let Some(write) = write {
        match write.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(key = %key, error = %e, "cache write failed"),
            Err(e) => warn!(key = %key, error = %e, "cache write task failed"),
        }
    }

    if let Some(deliverer) = client_id(&headers) {
        let mut core = state.lock();
        core.clients.entry(deliverer).or_default().finished += 1;
    }

    StatusCode::NO_CONTENT.into_response()
}
