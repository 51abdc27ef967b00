use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::GuardOutcome;

use super::{CancelToken, GuardInvoker, InvokeRequest};

/// In-process guard body.
#[async_trait]
pub trait GuardHandler: Send + Sync {
    fn key(&self) -> &str;
    async fn check(
        &self,
        params: &Value,
        payload: &str,
        cancel: &CancelToken,
    ) -> Result<GuardOutcome>;
}

/// Registry and dispatcher for in-process guard handlers.
#[derive(Default)]
pub struct LocalInvoker {
    handlers: DashMap<String, Arc<dyn GuardHandler>>,
}

impl LocalInvoker {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    pub fn register(&self, handler: Arc<dyn GuardHandler>) {
        self.handlers.insert(handler.key().to_string(), handler);
    }

    pub fn registered_keys(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }
}

#[async_trait]
impl GuardInvoker for LocalInvoker {
    async fn invoke(&self, req: InvokeRequest, cancel: CancelToken) -> Result<GuardOutcome> {
        let handler = self
            .handlers
            .get(&req.guard_key)
            .ok_or_else(|| {
                GuardrailError::GuardInvocation(format!("no handler for guard {}", req.guard_key))
            })?
            .value()
            .clone();
        handler.check(&req.params, &req.payload, &cancel).await
    }
}
