//! Executor: runs an execution plan against a payload.
//!
//! Entries are grouped into stages. A maximal run of non-mutating guards is
//! one concurrent stage; each payload-mutating guard is a stage of its own,
//! and its output is the payload every later stage observes. Every call is
//! bounded by the entry's effective budget and by the phase cancel token.
//! A failing guard degrades to its fallback guard and then to its fallback
//! strategy; it never fails the phase.

mod aggregate;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant as TokioInstant};

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::{
    CompositionStrategy, Decision, FallbackStrategy, GuardOutcome, GuardResult, GuardStatus,
    PhaseResult,
};

use crate::composer::{ExecutionPlan, PlanEntry, PlanTarget};
use crate::invoke::{CancelToken, GuardInvoker, InvokeRequest};
use crate::obs::EngineMetrics;
use crate::registry::GuardDescriptor;

pub use aggregate::aggregate;

pub struct Executor {
    invoker: Arc<dyn GuardInvoker>,
    permits: Arc<Semaphore>,
    short_circuit: bool,
    metrics: Arc<EngineMetrics>,
}

enum Attempt {
    Done(GuardOutcome),
    Failed(GuardrailError),
    Cancelled,
}

impl Executor {
    pub fn new(
        invoker: Arc<dyn GuardInvoker>,
        max_concurrency: usize,
        short_circuit: bool,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            invoker,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            short_circuit,
            metrics,
        }
    }

    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        payload: &str,
        cancel: &CancelToken,
    ) -> Result<PhaseResult> {
        let started = Instant::now();
        let entries = &plan.entries;
        let mut results: Vec<Option<GuardResult>> = vec![None; entries.len()];
        let mut current = payload.to_string();
        let mut mutated = false;
        let mut idx = 0;

        while idx < entries.len() {
            if cancel.is_cancelled() {
                break;
            }
            if self.short_circuit
                && plan.strategy == CompositionStrategy::AllOf
                && results.iter().flatten().any(GuardResult::is_hard_failure)
            {
                tracing::debug!(
                    policy = %plan.policy_id,
                    phase = %plan.phase,
                    "all_of short-circuit"
                );
                break;
            }

            let end = stage_end(entries, idx);
            let mut stage = FuturesUnordered::new();
            for (i, entry) in entries.iter().enumerate().take(end).skip(idx) {
                let payload = current.as_str();
                stage.push(async move { (i, self.run_entry(entry, payload, cancel).await) });
            }

            let mut finished = Vec::with_capacity(end - idx);
            while let Some((i, res)) = stage.next().await {
                finished.push((i, res?));
            }
            drop(stage);

            for (i, mut r) in finished {
                if let Some(next) = r.1.take() {
                    if entries[i].mutates_payload() {
                        current = next;
                        mutated = true;
                    } else {
                        tracing::debug!(
                            guard = %entries[i].guardrail_id,
                            "non-mutating guard returned a payload; ignored"
                        );
                    }
                }
                results[i] = Some(r.0);
            }
            idx = end;
        }

        let cancelled = cancel.is_cancelled();
        let results: Vec<GuardResult> = results
            .into_iter()
            .zip(entries)
            .map(|(r, e)| r.unwrap_or_else(|| base_result(e, GuardStatus::NotRun)))
            .collect();

        let passed = aggregate(plan, &results)?;
        let decision = match (cancelled, passed, mutated) {
            (true, _, _) | (false, false, _) => Decision::Block,
            (false, true, true) => Decision::Modify,
            (false, true, false) => Decision::Allow,
        };

        self.metrics.phase_decisions.inc(&[
            ("phase", plan.phase.as_str()),
            ("decision", decision.as_str()),
        ]);
        tracing::debug!(
            policy = %plan.policy_id,
            phase = %plan.phase,
            decision = decision.as_str(),
            cancelled,
            "phase evaluated"
        );

        Ok(PhaseResult {
            phase: plan.phase,
            decision,
            strategy: plan.strategy.as_str().to_string(),
            results,
            modified_payload: mutated.then_some(current),
            execution_time_ms: started.elapsed().as_millis() as u64,
            cancelled,
            unresolved: plan.unresolved.clone(),
            error: None,
        })
    }

    /// One plan entry, degraded through its fallback chain. The second
    /// element is a payload produced by the guard that answered.
    ///
    /// The entry's budget runs from the moment it is scheduled, so time spent
    /// waiting for an executor slot counts against it.
    async fn run_entry(
        &self,
        entry: &PlanEntry,
        payload: &str,
        cancel: &CancelToken,
    ) -> Result<(GuardResult, Option<String>)> {
        let (guard, params, fallback) = match &entry.target {
            PlanTarget::Substituted { reason, .. } => {
                let r = self.degrade(
                    entry,
                    base_result(entry, GuardStatus::Substituted),
                    reason.clone(),
                    "unresolved",
                );
                return Ok((r, None));
            }
            PlanTarget::Invoke { guard, params, fallback } => (guard, params, fallback),
        };

        let started = Instant::now();
        let budget_ms = entry.effective_budget_ms;
        let deadline = TokioInstant::now() + Duration::from_millis(budget_ms);

        let queued = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok((base_result(entry, GuardStatus::NotRun), None)),
            p = timeout_at(deadline, self.permits.acquire()) => p,
        };
        let (_permit, first) = match queued {
            Ok(p) => {
                let p = p.map_err(|_| GuardrailError::Internal("executor pool closed".into()))?;
                let first = self
                    .attempt(guard, params, payload, budget_ms, deadline, cancel)
                    .await;
                (Some(p), first)
            }
            Err(_) => {
                tracing::warn!(
                    guard = %guard.id,
                    budget_ms,
                    "budget spent waiting for an executor slot"
                );
                self.metrics
                    .guard_invocations
                    .inc(&[("guard", guard.key.as_str()), ("outcome", "timeout")]);
                let e = GuardrailError::GuardTimeout { guard: guard.key.clone(), budget_ms };
                (None, Attempt::Failed(e))
            }
        };

        let cancelled = || -> Result<(GuardResult, Option<String>)> {
            Ok((elapsed(base_result(entry, GuardStatus::Cancelled), started), None))
        };
        let (outcome, answered_by, err) = match first {
            Attempt::Done(o) => (Some(o), None, None),
            Attempt::Cancelled => return cancelled(),
            Attempt::Failed(e @ GuardrailError::GuardTimeout { .. }) => {
                (None, None, Some((e.to_string(), true)))
            }
            Attempt::Failed(e) => match fallback {
                Some(fb) => {
                    tracing::warn!(
                        guard = %guard.id,
                        fallback = %fb.guard.id,
                        error = %e,
                        "guard failed; retrying with fallback guard"
                    );
                    let fb_deadline = TokioInstant::now() + Duration::from_millis(fb.budget_ms);
                    match self
                        .attempt(&fb.guard, &fb.params, payload, fb.budget_ms, fb_deadline, cancel)
                        .await
                    {
                        Attempt::Done(o) => (Some(o), Some(fb.guard.id.clone()), None),
                        Attempt::Cancelled => return cancelled(),
                        Attempt::Failed(e2) => {
                            let timed_out = matches!(e2, GuardrailError::GuardTimeout { .. });
                            let msg = format!("{e}; fallback {}: {e2}", fb.guard.id);
                            (None, None, Some((msg, timed_out)))
                        }
                    }
                }
                None => (None, None, Some((e.to_string(), false))),
            },
        };

        let mut r = base_result(entry, GuardStatus::Completed);
        let produced = match (outcome, err) {
            (Some(o), _) => {
                r.passed = o.passed;
                r.score = o.score;
                r.details = o.details;
                r.fallback_guardrail_id = answered_by;
                if o.passed {
                    o.modified_payload
                } else {
                    None
                }
            }
            (None, err) => {
                let (err, timed_out) = err.unwrap_or_else(|| ("no verdict".into(), false));
                let details = if timed_out { "timeout" } else { "error" };
                r.status = GuardStatus::Fallback;
                r.error = Some(err);
                r = self.degrade(entry, r, details.to_string(), details);
                None
            }
        };
        Ok((elapsed(r, started), produced))
    }

    /// One invocation, bounded by `deadline` and the phase token.
    async fn attempt(
        &self,
        guard: &GuardDescriptor,
        params: &Value,
        payload: &str,
        budget_ms: u64,
        deadline: TokioInstant,
        cancel: &CancelToken,
    ) -> Attempt {
        let started = Instant::now();
        let call_token = cancel.child();
        let req = InvokeRequest {
            guard_key: guard.key.clone(),
            version: guard.version,
            params: params.clone(),
            payload: payload.to_string(),
            budget_ms: deadline
                .saturating_duration_since(TokioInstant::now())
                .as_millis() as u64,
        };

        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                call_token.cancel();
                Attempt::Cancelled
            }
            r = timeout_at(deadline, self.invoker.invoke(req, call_token.clone())) => match r {
                Ok(Ok(o)) => Attempt::Done(o),
                Ok(Err(e)) => Attempt::Failed(e),
                Err(_) => {
                    call_token.cancel();
                    Attempt::Failed(GuardrailError::GuardTimeout {
                        guard: guard.key.clone(),
                        budget_ms,
                    })
                }
            },
        };

        let outcome = match &res {
            Attempt::Done(o) if o.passed => "pass",
            Attempt::Done(_) => "fail",
            Attempt::Failed(GuardrailError::GuardTimeout { .. }) => "timeout",
            Attempt::Failed(_) => "error",
            Attempt::Cancelled => "cancelled",
        };
        self.metrics
            .guard_invocations
            .inc(&[("guard", guard.key.as_str()), ("outcome", outcome)]);
        self.metrics
            .guard_duration
            .observe(&[("tier", guard.tier.as_str())], started.elapsed());
        res
    }

    /// Apply the entry's fallback strategy to a result that has no verdict.
    fn degrade(
        &self,
        entry: &PlanEntry,
        mut r: GuardResult,
        details: String,
        cause: &str,
    ) -> GuardResult {
        let strategy = entry.fallback_strategy;
        match strategy {
            FallbackStrategy::Skip => {
                r.status = GuardStatus::Skipped;
                r.passed = false;
            }
            FallbackStrategy::Allow => r.passed = true,
            FallbackStrategy::Block => r.passed = false,
            FallbackStrategy::Warn => {
                r.passed = true;
                r.flagged = true;
            }
        }
        r.fallback_strategy = Some(strategy);
        r.details = Some(Value::String(details));

        self.metrics.guard_fallbacks.inc(&[
            ("guard", entry.key()),
            ("strategy", strategy.as_str()),
        ]);
        tracing::warn!(
            guard = %entry.guardrail_id,
            key = %entry.key(),
            cause,
            strategy = strategy.as_str(),
            "guard degraded to fallback strategy"
        );
        r
    }
}

/// Exclusive end of the stage starting at `start`.
fn stage_end(entries: &[PlanEntry], start: usize) -> usize {
    if entries[start].mutates_payload() {
        return start + 1;
    }
    entries[start..]
        .iter()
        .position(PlanEntry::mutates_payload)
        .map_or(entries.len(), |p| start + p)
}

fn base_result(entry: &PlanEntry, status: GuardStatus) -> GuardResult {
    GuardResult {
        guardrail_id: entry.guardrail_id.clone(),
        key: entry.key().to_string(),
        version: entry.version(),
        order_index: entry.order_index,
        tier: entry.effective_tier,
        execution_time_ms: 0,
        passed: false,
        status,
        flagged: false,
        weight: entry.weight,
        score: None,
        details: None,
        fallback_strategy: None,
        fallback_guardrail_id: None,
        error: None,
    }
}

fn elapsed(mut r: GuardResult, started: Instant) -> GuardResult {
    r.execution_time_ms = started.elapsed().as_millis() as u64;
    r
}
