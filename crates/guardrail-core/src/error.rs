//! Shared error type across guardrail crates.

use thiserror::Error;

/// Stable, machine-readable error codes (admin UI / proxy facing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed or ambiguous policy/guard configuration.
    Config,
    /// Unknown guardrail, policy or trace.
    NotFound,
    /// A guard exceeded its effective budget.
    GuardTimeout,
    /// A guard body failed.
    GuardInvocation,
    /// A phase verdict could not be aggregated.
    Aggregation,
    /// Trace persistence failed.
    Persistence,
    /// Duplicate write or illegal mutation of immutable state.
    Conflict,
    /// Invalid input.
    BadRequest,
    /// The phase was cancelled by the caller.
    Cancelled,
    /// Internal engine error.
    Internal,
}

impl ErrorCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Config => "CONFIG_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::GuardTimeout => "GUARD_TIMEOUT",
            ErrorCode::GuardInvocation => "GUARD_INVOCATION",
            ErrorCode::Aggregation => "AGGREGATION_ERROR",
            ErrorCode::Persistence => "PERSISTENCE_ERROR",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, GuardrailError>;

/// Unified error type used by core and engine.
#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("config error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("guard {guard} timed out after {budget_ms}ms")]
    GuardTimeout { guard: String, budget_ms: u64 },
    #[error("guard invocation failed: {0}")]
    GuardInvocation(String),
    #[error("aggregation error: {0}")]
    Aggregation(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("cancelled")]
    Cancelled,
    #[error("internal: {0}")]
    Internal(String),
}

impl GuardrailError {
    /// Map internal error to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            GuardrailError::Config(_) => ErrorCode::Config,
            GuardrailError::NotFound(_) => ErrorCode::NotFound,
            GuardrailError::GuardTimeout { .. } => ErrorCode::GuardTimeout,
            GuardrailError::GuardInvocation(_) => ErrorCode::GuardInvocation,
            GuardrailError::Aggregation(_) => ErrorCode::Aggregation,
            GuardrailError::Persistence(_) => ErrorCode::Persistence,
            GuardrailError::Conflict(_) => ErrorCode::Conflict,
            GuardrailError::BadRequest(_) => ErrorCode::BadRequest,
            GuardrailError::Cancelled => ErrorCode::Cancelled,
            GuardrailError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Errors a phase must not survive: the request fails closed on these.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GuardrailError::Config(_)
                | GuardrailError::NotFound(_)
                | GuardrailError::Aggregation(_)
                | GuardrailError::Internal(_)
        )
    }
}
