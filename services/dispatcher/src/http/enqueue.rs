//! `POST /` — enqueue a cache-or-fetch request.
//!
//! Order matters: the cache is checked before the request table, so a fresh
//! cached body short-circuits without creating (or touching) any
//! PendingRequest.  Callers without a `reply` webhook hold their response
//! open until the fetch completes; dropping that response detaches the
//! waiter, and the last detach removes the request.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::Response;
use dispatch_protocol::{EnqueueRequest, X_FROM_CACHE, X_REQUEST_KEY};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use url::Url;

use super::response::{bad_request, internal_error};
use crate::cache::CacheHit;
use crate::key::cache_key;
use crate::request::{Delivery, Handler, HandlerId};
use crate::state::AppState;

pub async fn enqueue(State(state): State<AppState>, body: Bytes) -> Response {
    let request: EnqueueRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return bad_request(format!("invalid enqueue body: {e}")),
    };
    let url = match Url::parse(&request.url) {
        Ok(url) => url,
        Err(e) => return bad_request(format!("invalid url: {e}")),
    };
    let Some(host) = url.host_str().map(str::to_owned) else {
        return bad_request("url has no host");
    };

    let (queue, created) = {
        let mut core = state.lock();
        core.queues.resolve_or_register(&host)
    };
    if created {
        if let Err(e) = state.cache.ensure_queue_dir(&queue.name).await {
            return internal_error(e);
        }
    }

    let key = cache_key(&queue.name, url.path(), url.query());
    match state.cache.open_for_read(&key, request.expire).await {
        Ok(Some(hit)) => return cached_response(&key, hit),
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    if let Some(reply) = request.reply.clone() {
        let mut core = state.lock();
        core.requests.attach(
            &key,
            &request.url,
            request.headers.as_ref(),
            &queue.name,
            Handler::Webhook(reply),
        );
        drop(core);
        return accepted_response(&key);
    }

    let (tx, rx) = oneshot::channel();
    let (handler_id, _created) = {
        let mut core = state.lock();
        core.requests.attach(
            &key,
            &request.url,
            request.headers.as_ref(),
            &queue.name,
            Handler::Stream(tx),
        )
    };

    // Dropping this future before delivery (caller went away) must detach
    // the waiter; the guard fires on drop unless delivery disarms it.
    let mut guard = CancelGuard {
        state: state.clone(),
        key: key.clone(),
        id: handler_id,
        armed: true,
    };
    match rx.await {
        Ok(delivery) => {
            guard.disarm();
            delivered_response(&key, delivery)
        }
        Err(_) => {
            guard.disarm();
            internal_error("fetch aborted before delivery")
        }
    }
}

struct CancelGuard {
    state: AppState,
    key: String,
    id: HandlerId,
    armed: bool,
}

impl CancelGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.state.cancel_stream_handler(&self.key, self.id);
        }
    }
}

fn cached_response(key: &str, hit: CacheHit) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(X_FROM_CACHE, key)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, hit.len)
        .body(Body::from_stream(ReaderStream::new(hit.file)))
        .unwrap()
}

fn delivered_response(key: &str, delivery: Delivery) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(X_REQUEST_KEY, key)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(delivery.body))
        .unwrap()
}

fn accepted_response(key: &str) -> Response {
    Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(X_REQUEST_KEY, key)
        .body(Body::empty())
        .unwrap()
}
