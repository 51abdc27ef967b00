//! Decision recording: one immutable trace per `(tenant_id, request_id)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::{Decision, ExecutionTrace, PhaseResult};

use crate::config::RecorderSection;
use crate::obs::EngineMetrics;
use crate::policy::CompiledPolicy;

/// Durable storage for traces. `append` must refuse a second trace for the
/// same `(tenant_id, request_id)` with [`GuardrailError::Conflict`].
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn append(&self, trace: &ExecutionTrace) -> Result<()>;
    async fn get(&self, tenant_id: &str, request_id: &str) -> Result<Option<ExecutionTrace>>;
    async fn list(&self, tenant_id: &str) -> Result<Vec<ExecutionTrace>>;
}

#[derive(Default)]
pub struct InMemoryTraceSink {
    traces: DashMap<(String, String), Arc<ExecutionTrace>>,
}

impl InMemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

#[async_trait]
impl TraceSink for InMemoryTraceSink {
    async fn append(&self, trace: &ExecutionTrace) -> Result<()> {
        let key = (trace.tenant_id.clone(), trace.request_id.clone());
        match self.traces.entry(key) {
            Entry::Occupied(_) => Err(GuardrailError::Conflict(format!(
                "trace for request {} already recorded",
                trace.request_id
            ))),
            Entry::Vacant(v) => {
                v.insert(Arc::new(trace.clone()));
                Ok(())
            }
        }
    }

    async fn get(&self, tenant_id: &str, request_id: &str) -> Result<Option<ExecutionTrace>> {
        Ok(self
            .traces
            .get(&(tenant_id.to_string(), request_id.to_string()))
            .map(|e| ExecutionTrace::clone(e.value())))
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<ExecutionTrace>> {
        let mut out: Vec<ExecutionTrace> = self
            .traces
            .iter()
            .filter(|e| e.key().0 == tenant_id)
            .map(|e| ExecutionTrace::clone(e.value()))
            .collect();
        out.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        Ok(out)
    }
}

/// What happened to a trace handed to the recorder.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub trace: ExecutionTrace,
    pub persisted: bool,
}

pub struct DecisionRecorder {
    sink: Arc<dyn TraceSink>,
    max_retries: u32,
    backoff: Duration,
    metrics: Arc<EngineMetrics>,
}

impl DecisionRecorder {
    pub fn new(
        sink: Arc<dyn TraceSink>,
        cfg: &RecorderSection,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            sink,
            max_retries: cfg.max_retries,
            backoff: Duration::from_millis(cfg.backoff_ms),
            metrics,
        }
    }

    pub fn sink(&self) -> &Arc<dyn TraceSink> {
        &self.sink
    }

    /// Build and append the trace for one request.
    ///
    /// A duplicate request id is returned as `Conflict`. Any other sink
    /// failure is retried with exponential backoff; once retries run out the
    /// decision is still returned, with `persisted = false`.
    pub async fn record(
        &self,
        request_id: &str,
        tenant_id: &str,
        policy: &CompiledPolicy,
        phases: Vec<PhaseResult>,
        total_execution_time_ms: u64,
    ) -> Result<Recorded> {
        let trace = build_trace(request_id, tenant_id, policy, phases, total_execution_time_ms);

        let mut delay = self.backoff;
        let mut attempt = 0;
        loop {
            match self.sink.append(&trace).await {
                Ok(()) => {
                    tracing::debug!(request_id, tenant = tenant_id, attempt, "trace recorded");
                    return Ok(Recorded { trace, persisted: true });
                }
                Err(e @ GuardrailError::Conflict(_)) => return Err(e),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(request_id, error = %e, attempt, "trace write failed; retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    self.metrics.trace_write_failures.inc(&[]);
                    tracing::error!(
                        alert = true,
                        request_id,
                        tenant = tenant_id,
                        policy = %policy.id(),
                        error = %e,
                        "trace could not be persisted; decision returned without audit record"
                    );
                    return Ok(Recorded { trace, persisted: false });
                }
            }
        }
    }
}

fn build_trace(
    request_id: &str,
    tenant_id: &str,
    policy: &CompiledPolicy,
    phases: Vec<PhaseResult>,
    total_execution_time_ms: u64,
) -> ExecutionTrace {
    let policy_decision = Decision::combine(phases.iter().map(|p| p.decision));
    let results = phases
        .iter()
        .flat_map(|p| p.results.iter().cloned())
        .collect();

    ExecutionTrace {
        request_id: request_id.to_string(),
        tenant_id: tenant_id.to_string(),
        policy_id: policy.id().to_string(),
        policy_version: policy.policy.version,
        policy_hash: policy.hash.clone(),
        phases,
        results,
        total_execution_time_ms,
        policy_decision,
        recorded_at: Utc::now(),
    }
}
