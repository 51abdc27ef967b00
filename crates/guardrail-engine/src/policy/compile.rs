//! Policy compilation: validation, expression parsing and content hashing.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::expr::Expr;
use guardrail_core::model::{CompositionStrategy, Phase, Policy, PolicyGuardrail};

use crate::registry::RegistrySnapshot;

/// A policy that passed validation. Immutable; replaced, never mutated.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub policy: Policy,
    /// Hex SHA-256 of the compiled guardrail set (bindings + composition).
    pub hash: String,
    pub compiled_at: DateTime<Utc>,
    expressions: BTreeMap<Phase, Expr>,
}

impl CompiledPolicy {
    pub fn id(&self) -> &str {
        &self.policy.id
    }

    pub fn expression(&self, phase: Phase) -> Option<&Expr> {
        self.expressions.get(&phase)
    }

    /// Same compiled content with different lifecycle metadata.
    pub(crate) fn with_policy(&self, policy: Policy) -> Self {
        Self {
            policy,
            hash: self.hash.clone(),
            compiled_at: self.compiled_at,
            expressions: self.expressions.clone(),
        }
    }
}

pub fn compile(policy: Policy, registry: &RegistrySnapshot) -> Result<CompiledPolicy> {
    if policy.id.trim().is_empty()
        || policy.tenant_id.trim().is_empty()
        || policy.name.trim().is_empty()
    {
        return Err(GuardrailError::Config(
            "policy id, tenant_id and name must not be empty".into(),
        ));
    }
    if let (Some(from), Some(to)) = (policy.valid_from, policy.valid_to) {
        if to <= from {
            return Err(cfg_err(&policy, "valid_to must be after valid_from"));
        }
    }

    for b in &policy.guardrails {
        check_unit(&policy, b, "threshold", b.threshold)?;
        check_unit(&policy, b, "weight", b.weight)?;
        check_scope(&policy, b, registry)?;
    }

    let mut expressions = BTreeMap::new();
    for phase in Phase::ALL {
        check_order(&policy, phase)?;

        match policy.strategy_for(phase) {
            CompositionStrategy::Custom { expression } => {
                let expr = Expr::parse(&expression)?;
                check_references(&policy, phase, &expr, registry)?;
                expressions.insert(phase, expr);
            }
            CompositionStrategy::Weighted { threshold } => {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(cfg_err(
                        &policy,
                        format!("weighted threshold for phase {phase} must be within 0..=1"),
                    ));
                }
            }
            CompositionStrategy::AllOf | CompositionStrategy::AnyOf => {}
        }
    }

    let hash = content_hash(&policy)?;
    Ok(CompiledPolicy {
        policy,
        hash,
        compiled_at: Utc::now(),
        expressions,
    })
}

/// Digest over composition + bindings in a canonical order.
pub fn content_hash(policy: &Policy) -> Result<String> {
    #[derive(Serialize)]
    struct Canonical<'a> {
        composition: &'a BTreeMap<Phase, CompositionStrategy>,
        bindings: Vec<&'a PolicyGuardrail>,
    }

    let mut bindings: Vec<&PolicyGuardrail> = policy.guardrails.iter().collect();
    bindings.sort_by(|a, b| {
        (a.phase, a.order_index, &a.guardrail_id).cmp(&(b.phase, b.order_index, &b.guardrail_id))
    });

    let bytes = serde_json::to_vec(&Canonical {
        composition: &policy.composition,
        bindings,
    })
    .map_err(|e| GuardrailError::Internal(format!("policy hash encode failed: {e}")))?;

    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn cfg_err(policy: &Policy, msg: impl std::fmt::Display) -> GuardrailError {
    GuardrailError::Config(format!("policy {} v{}: {msg}", policy.name, policy.version))
}

fn check_unit(policy: &Policy, b: &PolicyGuardrail, field: &str, v: Option<f64>) -> Result<()> {
    match v {
        Some(x) if !(0.0..=1.0).contains(&x) => Err(cfg_err(
            policy,
            format!(
                "{field} of {} in phase {} must be within 0..=1",
                b.guardrail_id, b.phase
            ),
        )),
        _ => Ok(()),
    }
}

/// A binding may name a global guardrail or one of the policy's own tenant.
fn check_scope(policy: &Policy, b: &PolicyGuardrail, registry: &RegistrySnapshot) -> Result<()> {
    let Some(g) = registry.get(&b.guardrail_id) else {
        return Ok(());
    };
    match g.tenant_id.as_deref() {
        Some(owner) if owner != policy.tenant_id => Err(cfg_err(
            policy,
            format!(
                "guardrail {} in phase {} is scoped to another tenant",
                b.guardrail_id, b.phase
            ),
        )),
        _ => Ok(()),
    }
}

fn check_order(policy: &Policy, phase: Phase) -> Result<()> {
    let mut seen: HashMap<u32, &str> = HashMap::new();
    for b in policy.guardrails.iter().filter(|b| b.phase == phase) {
        if let Some(other) = seen.insert(b.order_index, &b.guardrail_id) {
            return Err(cfg_err(
                policy,
                format!(
                    "order_index {} is shared by {other} and {} in phase {phase}",
                    b.order_index, b.guardrail_id
                ),
            ));
        }
    }
    Ok(())
}

/// Expressions may name a bound guard by key or by guardrail id.
fn check_references(
    policy: &Policy,
    phase: Phase,
    expr: &Expr,
    registry: &RegistrySnapshot,
) -> Result<()> {
    let mut names: HashSet<String> = HashSet::new();
    for b in policy.bindings(phase) {
        names.insert(b.guardrail_id.clone());
        if let Some(g) = registry.get(&b.guardrail_id) {
            if !names.insert(g.key.clone()) && g.key != b.guardrail_id {
                return Err(cfg_err(
                    policy,
                    format!("guard key {} is bound twice in custom phase {phase}", g.key),
                ));
            }
        }
    }

    for name in expr.guards() {
        if !names.contains(name) {
            return Err(cfg_err(
                policy,
                format!(
                    "expression for phase {phase} references {name}, \
                     which is not bound in that phase"
                ),
            ));
        }
    }
    Ok(())
}
