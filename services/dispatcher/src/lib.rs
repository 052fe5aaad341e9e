pub mod cache;
pub mod client;
pub mod cooldown;
pub mod http;
pub mod key;
pub mod local_fetch;
pub mod queue;
pub mod request;
pub mod scheduler;
pub mod state;
pub mod webhook;

pub use state::AppState;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            post(http::enqueue::enqueue)
                .get(http::dispatch::next_request)
                .fallback(fallback_404),
        )
        .route(
            "/status",
            get(http::status::status_report).fallback(fallback_404),
        )
        .route(
            "/:queue/:digest",
            post(http::deliver::deliver).fallback(fallback_404),
        )
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "Not Found: Error 404" })),
    )
        .into_response()
}
