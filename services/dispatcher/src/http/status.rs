//! `GET /status` — introspection snapshot.

use axum::Json;
use axum::extract::State;
use dispatch_protocol::{ClientReport, RequestReport, StatusReport};

use crate::state::AppState;

pub async fn status_report(State(state): State<AppState>) -> Json<StatusReport> {
    let core = state.lock();

    let clients = core
        .clients
        .iter()
        .map(|(id, stats)| {
            (
                id.clone(),
                ClientReport {
                    active_at: stats.active_at,
                    started: stats.started,
                    finished: stats.finished,
                },
            )
        })
        .collect();

    let timers = core
        .cooldowns
        .iter()
        .filter(|(_, timers)| !timers.is_empty())
        .map(|(id, timers)| (id.clone(), timers.clone()))
        .collect();

    let mut requests: Vec<RequestReport> = core
        .requests
        .iter()
        .map(|(key, request)| RequestReport {
            key: key.clone(),
            href: request.href.clone(),
            queue: request.queue_name.clone(),
            age_ms: request.created_at.elapsed().as_millis() as u64,
            started_at: request.started_at,
            attempts: request.attempts,
            handlers: request.handlers.len(),
        })
        .collect();
    requests.sort_by(|a, b| b.age_ms.cmp(&a.age_ms));

    Json(StatusReport {
        clients,
        timers,
        requests,
        start_at: state.start_at,
    })
}
