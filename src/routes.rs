use crate::infrastructure::queue::pool::ConsumerState;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

pub fn configure_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: &'static str,
    pub consumers: BTreeMap<&'static str, ConsumerState>,
}

pub fn health_report(state: &AppState) -> (StatusCode, HealthResponse) {
    let consumers: BTreeMap<_, _> = state
        .consumers
        .iter()
        .map(|c| (c.queue, *c.state.borrow()))
        .collect();

    let healthy = !consumers.is_empty() && consumers.values().all(|s| *s == ConsumerState::Consuming);
    let (code, status) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        HealthResponse {
            status,
            environment: state.environment.as_str(),
            consumers,
        },
    )
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, body) = health_report(&state);
    (code, Json(body))
}
