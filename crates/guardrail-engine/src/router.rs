//! Axum router wiring.

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;
use crate::{api, ops};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/evaluate", post(api::evaluate))
        .route("/v1/traces/:tenant/:request_id", get(api::get_trace))
        .route("/v1/guardrails", post(api::register_guardrail))
        .route("/v1/policies", post(api::compile_policy))
        .route("/v1/policies/:id/status", post(api::set_policy_status))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
