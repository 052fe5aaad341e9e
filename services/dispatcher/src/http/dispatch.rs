//! `GET /` — hand the next eligible request to a polling client.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use super::response::bad_request;
use crate::client::client_id;
use crate::state::{AppState, now_ms};

pub async fn next_request(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(client_id) = client_id(&headers) else {
        return bad_request("missing client id");
    };

    let now = now_ms();
    let dispatch = {
        let mut core = state.lock();
        core.touch_client(&client_id, now);
        core.next_for(&client_id, now)
    };
    let Some(dispatch) = dispatch else {
        return StatusCode::NO_CONTENT.into_response();
    };

    // Persist before replying so a restart cannot forget the cooldown the
    // client was just charged.  Failure is logged, never fatal.
    if let Err(e) = state
        .store
        .put(client_id.clone(), dispatch.timers_encoded)
        .await
    {
        warn!(client_id = %client_id, error = %e, "cooldown persist failed");
    }

    Json(dispatch.offer).into_response()
}
