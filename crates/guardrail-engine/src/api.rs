//! JSON API: evaluation, trace lookup and catalog/policy administration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use guardrail_core::error::{ErrorCode, GuardrailError};
use guardrail_core::model::{ExecutionTrace, Guardrail, Policy, PolicyStatus};

use crate::app_state::AppState;
use crate::engine::{EvaluateRequest, EvaluateResponse};

/// Error body `{"error": CODE, "message": text}` with a status derived from
/// the error code.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub GuardrailError);

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Config | ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::GuardTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::GuardInvocation => StatusCode::BAD_GATEWAY,
        ErrorCode::Aggregation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::Persistence => StatusCode::SERVICE_UNAVAILABLE,
        // nginx's "client closed request"
        ErrorCode::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        if code == ErrorCode::Internal {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = json!({ "error": code.as_str(), "message": self.0.to_string() });
        (status_for(code), Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub async fn evaluate(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> ApiResult<Json<EvaluateResponse>> {
    Ok(Json(state.engine().evaluate(req).await?))
}

pub async fn get_trace(
    State(state): State<AppState>,
    Path((tenant, request_id)): Path<(String, String)>,
) -> ApiResult<Json<ExecutionTrace>> {
    Ok(Json(state.engine().trace(&tenant, &request_id).await?))
}

pub async fn register_guardrail(
    State(state): State<AppState>,
    Json(guard): Json<Guardrail>,
) -> ApiResult<(StatusCode, Json<Guardrail>)> {
    let stored = state.engine().register_guardrail(guard)?;
    Ok((StatusCode::CREATED, Json(Guardrail::clone(&stored))))
}

pub async fn compile_policy(
    State(state): State<AppState>,
    Json(policy): Json<Policy>,
) -> ApiResult<impl IntoResponse> {
    let compiled = state.engine().compile_policy(policy)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": compiled.id(),
            "version": compiled.policy.version,
            "status": compiled.policy.status,
            "hash": compiled.hash,
            "compiled_at": compiled.compiled_at,
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusChange {
    pub status: PolicyStatus,
}

pub async fn set_policy_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(change): Json<StatusChange>,
) -> ApiResult<impl IntoResponse> {
    let compiled = state.engine().set_policy_status(&id, change.status)?;
    Ok(Json(json!({
        "id": compiled.id(),
        "status": compiled.policy.status,
        "hash": compiled.hash,
    })))
}
