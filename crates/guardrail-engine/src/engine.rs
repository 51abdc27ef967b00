//! `GuardrailEngine`: registry, policy store, composer, executor and
//! recorder wired together behind one `evaluate` call.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::{
    Decision, ExecutionTrace, Guardrail, Phase, PhaseResult, Policy, PolicyStatus,
};

use crate::composer::Composer;
use crate::config::{EngineConfig, ExecutorSection};
use crate::executor::Executor;
use crate::invoke::{CancelToken, GuardInvoker};
use crate::obs::EngineMetrics;
use crate::policy::{CompiledPolicy, PolicyStore};
use crate::recorder::{DecisionRecorder, TraceSink};
use crate::registry::{GuardDescriptor, GuardRegistry};

/// Which policy a request is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRef {
    /// A specific compiled policy, whatever its status.
    Id(String),
    /// The tenant's selected version of a named policy.
    Name(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluateRequest {
    pub request_id: String,
    pub tenant_id: String,
    pub policy: PolicyRef,
    pub phases: Vec<Phase>,
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_payload: Option<String>,
    pub trace: ExecutionTrace,
    /// False when the trace could not be written after all retries.
    pub persisted: bool,
}

pub struct GuardrailEngine {
    registry: Arc<GuardRegistry>,
    store: Arc<PolicyStore>,
    composer: Composer,
    executor: Executor,
    recorder: DecisionRecorder,
    executor_cfg: ExecutorSection,
    metrics: Arc<EngineMetrics>,
}

impl GuardrailEngine {
    /// Build an engine and load the configured catalog and policies.
    pub fn from_config(
        cfg: EngineConfig,
        invoker: Arc<dyn GuardInvoker>,
        sink: Arc<dyn TraceSink>,
    ) -> Result<Self> {
        cfg.validate()?;
        let metrics = Arc::new(EngineMetrics::default());

        let registry = Arc::new(GuardRegistry::from_catalog(
            cfg.guardrails,
            cfg.registry.max_fallback_depth,
        )?);
        let store = Arc::new(PolicyStore::new());
        let snapshot = registry.snapshot();
        for policy in cfg.policies {
            store.compile(policy, &snapshot)?;
        }

        let composer = Composer::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            cfg.tiers.clone(),
            cfg.executor.unresolved_strategy,
            Arc::clone(&metrics),
        );
        let executor = Executor::new(
            invoker,
            cfg.executor.max_concurrency,
            cfg.executor.short_circuit,
            Arc::clone(&metrics),
        );
        let recorder = DecisionRecorder::new(sink, &cfg.recorder, Arc::clone(&metrics));

        tracing::info!(
            guardrails = snapshot.len(),
            policies = store.len(),
            "guardrail engine ready"
        );

        Ok(Self {
            registry,
            store,
            composer,
            executor,
            recorder,
            executor_cfg: cfg.executor,
            metrics,
        })
    }

    pub fn registry(&self) -> &Arc<GuardRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn register_guardrail(&self, guard: Guardrail) -> Result<GuardDescriptor> {
        self.registry.register(guard)
    }

    pub fn compile_policy(&self, policy: Policy) -> Result<Arc<CompiledPolicy>> {
        let compiled = self.store.compile(policy, &self.registry.snapshot())?;
        self.composer.invalidate(compiled.id());
        Ok(compiled)
    }

    pub fn set_policy_status(&self, id: &str, status: PolicyStatus) -> Result<Arc<CompiledPolicy>> {
        let compiled = self.store.set_status(id, status)?;
        self.composer.invalidate(id);
        Ok(compiled)
    }

    pub async fn trace(&self, tenant_id: &str, request_id: &str) -> Result<ExecutionTrace> {
        self.recorder
            .sink()
            .get(tenant_id, request_id)
            .await?
            .ok_or_else(|| GuardrailError::NotFound(format!("trace {request_id}")))
    }

    pub async fn evaluate(&self, req: EvaluateRequest) -> Result<EvaluateResponse> {
        self.evaluate_with_cancel(req, &CancelToken::new()).await
    }

    /// Run the requested phases in order, threading the payload through.
    /// A blocked phase ends the request. Exactly one trace is recorded.
    pub async fn evaluate_with_cancel(
        &self,
        req: EvaluateRequest,
        cancel: &CancelToken,
    ) -> Result<EvaluateResponse> {
        let started = Instant::now();
        if req.request_id.trim().is_empty() || req.tenant_id.trim().is_empty() {
            return Err(GuardrailError::BadRequest(
                "request_id and tenant_id are required".into(),
            ));
        }
        if req.phases.is_empty() {
            return Err(GuardrailError::BadRequest("at least one phase is required".into()));
        }

        let policy = self.resolve_policy(&req.tenant_id, &req.policy)?;
        if self.recorder.sink().get(&req.tenant_id, &req.request_id).await?.is_some() {
            return Err(GuardrailError::Conflict(format!(
                "request {} was already evaluated",
                req.request_id
            )));
        }

        let mut payload = req.payload;
        let mut modified = false;
        let mut phases: Vec<PhaseResult> = Vec::with_capacity(req.phases.len());

        for phase in req.phases {
            let res = match self.composer.compose_compiled(&policy, phase) {
                Ok(plan) => self.executor.execute(&plan, &payload, cancel).await,
                Err(e) => Err(e),
            };
            let result = match res {
                Ok(r) => r,
                Err(e) if e.is_fatal() && self.executor_cfg.is_fail_closed(phase) => {
                    tracing::warn!(
                        request_id = %req.request_id,
                        policy = %policy.id(),
                        %phase,
                        error = %e,
                        "phase failed; denying"
                    );
                    PhaseResult::denied(phase, e.to_string())
                }
                Err(e) => return Err(e),
            };

            if let Some(next) = &result.modified_payload {
                payload = next.clone();
                modified = true;
            }
            let blocked = result.decision == Decision::Block;
            phases.push(result);
            if blocked {
                break;
            }
        }

        let total_ms = started.elapsed().as_millis() as u64;
        let recorded = self
            .recorder
            .record(&req.request_id, &req.tenant_id, &policy, phases, total_ms)
            .await?;

        let decision = recorded.trace.policy_decision;
        tracing::info!(
            request_id = %req.request_id,
            tenant = %req.tenant_id,
            policy = %policy.id(),
            decision = decision.as_str(),
            persisted = recorded.persisted,
            total_ms,
            "request evaluated"
        );

        Ok(EvaluateResponse {
            decision,
            modified_payload: modified.then_some(payload),
            trace: recorded.trace,
            persisted: recorded.persisted,
        })
    }

    fn resolve_policy(&self, tenant_id: &str, policy: &PolicyRef) -> Result<Arc<CompiledPolicy>> {
        match policy {
            PolicyRef::Id(id) => {
                let p = self.store.get(id)?;
                // policies are tenant-scoped; another tenant's id reads as unknown
                if p.policy.tenant_id != tenant_id {
                    return Err(GuardrailError::NotFound(format!("policy {id}")));
                }
                if p.policy.status == PolicyStatus::Archived {
                    return Err(GuardrailError::BadRequest(format!("policy {id} is archived")));
                }
                Ok(p)
            }
            PolicyRef::Name(name) => self.store.select(tenant_id, name, Utc::now()),
        }
    }
}
