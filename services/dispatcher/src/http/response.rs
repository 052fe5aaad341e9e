use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dispatch_protocol::ErrorEnvelope;
use std::fmt::Display;

pub(crate) fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorEnvelope {
            stack: None,
            message: message.into(),
            status: status.as_u16(),
        }),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, message)
}

pub fn not_found(message: impl Into<String>) -> Response {
    json_error(StatusCode::NOT_FOUND, message)
}

pub fn internal_error(err: impl Display) -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_envelope(response: Response, status: StatusCode, message: &str) {
        assert_eq!(response.status(), status);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        let parsed: ErrorEnvelope =
            serde_json::from_slice(&body).expect("body should be valid error json");
        assert_eq!(parsed.message, message);
        assert_eq!(parsed.status, status.as_u16());
        assert_eq!(parsed.stack, None);
    }

    #[tokio::test]
    async fn bad_request_carries_the_envelope() {
        assert_envelope(
            bad_request("invalid url"),
            StatusCode::BAD_REQUEST,
            "invalid url",
        )
        .await;
    }

    #[tokio::test]
    async fn not_found_carries_the_envelope() {
        assert_envelope(
            not_found("no pending request"),
            StatusCode::NOT_FOUND,
            "no pending request",
        )
        .await;
    }

    #[tokio::test]
    async fn internal_error_carries_the_envelope() {
        assert_envelope(
            internal_error("disk on fire"),
            StatusCode::INTERNAL_SERVER_ERROR,
            "disk on fire",
        )
        .await;
    }
}
