use std::collections::HashMap;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::{CompositionStrategy, GuardResult};

use crate::composer::ExecutionPlan;

/// Combine per-guard results into the phase verdict.
///
/// Only results that count (completed, fallback-resolved or substituted)
/// take part. Skipped, cancelled and never-run guards are omitted. A plan
/// with no entries passes; otherwise `any_of`, `custom` and `weighted` need
/// at least one counted verdict to pass.
pub fn aggregate(plan: &ExecutionPlan, results: &[GuardResult]) -> Result<bool> {
    if plan.entries.is_empty() {
        return Ok(true);
    }
    let counted = || results.iter().filter(|r| r.counts());

    match &plan.strategy {
        CompositionStrategy::AllOf => Ok(counted().all(|r| r.passed)),
        CompositionStrategy::AnyOf => Ok(counted().any(|r| r.passed)),
        CompositionStrategy::Custom { expression } => {
            let expr = plan.expression.as_ref().ok_or_else(|| {
                GuardrailError::Aggregation(format!(
                    "phase {} of policy {} has no compiled expression for {expression}",
                    plan.phase, plan.policy_id
                ))
            })?;

            let mut outcomes: HashMap<String, Option<bool>> =
                HashMap::with_capacity(results.len() * 2);
            for r in results {
                let v = r.counts().then_some(r.passed);
                outcomes.insert(r.guardrail_id.clone(), v);
                outcomes.entry(r.key.clone()).or_insert(v);
            }
            Ok(expr.evaluate(&outcomes)?.unwrap_or(false))
        }
        CompositionStrategy::Weighted { threshold } => {
            let (total, passed) = counted().fold((0.0_f64, 0.0_f64), |(t, p), r| {
                let w = r.weight.unwrap_or(1.0);
                (t + w, if r.passed { p + w } else { p })
            });
            if total <= 0.0 {
                return Ok(false);
            }
            Ok(passed / total >= *threshold)
        }
    }
}
