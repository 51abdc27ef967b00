//! Guard invocation seam.
//!
//! Guard bodies (PII detectors, toxicity models, ONNX scorers) live behind
//! `GuardInvoker`. The engine ships `LocalInvoker`, an in-process registry of
//! `GuardHandler`s keyed by guard key, for embedding and tests.

pub mod cancel;
pub mod local;

use async_trait::async_trait;
use serde_json::Value;

use guardrail_core::error::Result;
use guardrail_core::model::GuardOutcome;

pub use cancel::CancelToken;
pub use local::{GuardHandler, LocalInvoker};

/// One guard call as seen by the guard-execution service.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub guard_key: String,
    pub version: u32,
    pub params: Value,
    pub payload: String,
    pub budget_ms: u64,
}

/// External guard-execution service.
///
/// Implementations should watch `cancel` and abandon in-flight work once it
/// fires; the executor stops waiting at the budget either way.
#[async_trait]
pub trait GuardInvoker: Send + Sync {
    async fn invoke(&self, req: InvokeRequest, cancel: CancelToken) -> Result<GuardOutcome>;
}
