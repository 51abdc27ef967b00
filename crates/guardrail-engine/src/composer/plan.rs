//! Execution plan types produced by the composer and consumed by the executor.

use serde_json::{Map, Value};

use guardrail_core::expr::Expr;
use guardrail_core::model::{
    CompositionStrategy, FallbackStrategy, Phase, Tier, UnresolvedBinding,
};

use crate::registry::GuardDescriptor;

/// Ordered, fully-resolved plan for one `(policy, phase)`.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub policy_id: String,
    pub policy_version: u32,
    pub policy_hash: String,
    pub registry_generation: u64,
    pub phase: Phase,
    pub strategy: CompositionStrategy,
    pub expression: Option<Expr>,
    /// Ascending `order_index`.
    pub entries: Vec<PlanEntry>,
    pub unresolved: Vec<UnresolvedBinding>,
}

impl ExecutionPlan {
    /// `(order_index, effective_budget_ms)` per entry; stable across recompositions.
    pub fn signature(&self) -> Vec<(u32, u64)> {
        self.entries
            .iter()
            .map(|e| (e.order_index, e.effective_budget_ms))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub guardrail_id: String,
    pub order_index: u32,
    pub threshold: Option<f64>,
    pub weight: Option<f64>,
    pub effective_tier: Tier,
    pub effective_budget_ms: u64,
    pub fallback_strategy: FallbackStrategy,
    pub target: PlanTarget,
}

impl PlanEntry {
    pub fn key(&self) -> &str {
        match &self.target {
            PlanTarget::Invoke { guard, .. } => &guard.key,
            PlanTarget::Substituted { key, .. } => key,
        }
    }

    pub fn version(&self) -> u32 {
        match &self.target {
            PlanTarget::Invoke { guard, .. } => guard.version,
            PlanTarget::Substituted { version, .. } => *version,
        }
    }

    /// Payload-mutating entries are synchronization points.
    pub fn mutates_payload(&self) -> bool {
        matches!(&self.target, PlanTarget::Invoke { guard, .. } if guard.mutates_payload)
    }
}

#[derive(Debug, Clone)]
pub enum PlanTarget {
    Invoke {
        guard: GuardDescriptor,
        params: Value,
        fallback: Option<FallbackTarget>,
    },
    /// Resolved at compose time to the binding's fallback strategy.
    Substituted {
        key: String,
        version: u32,
        reason: String,
    },
}

/// Guard retried once when the primary errors.
#[derive(Debug, Clone)]
pub struct FallbackTarget {
    pub guard: GuardDescriptor,
    pub params: Value,
    pub budget_ms: u64,
}

/// Guard defaults overlaid with binding params; `threshold` is injected when set.
pub fn merge_params(defaults: &Value, overrides: Option<&Value>, threshold: Option<f64>) -> Value {
    let mut merged = match (defaults, overrides) {
        (_, Some(o)) if !o.is_object() && !o.is_null() => o.clone(),
        (Value::Object(d), Some(Value::Object(o))) => {
            let mut m = d.clone();
            m.extend(o.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::Object(m)
        }
        (Value::Null, Some(o @ Value::Object(_))) => o.clone(),
        (d, _) => d.clone(),
    };

    if let Some(t) = threshold {
        if merged.is_null() {
            merged = Value::Object(Map::new());
        }
        if let Value::Object(m) = &mut merged {
            m.insert("threshold".into(), Value::from(t));
        }
    }
    merged
}
