//! Composer: turns a compiled policy into a per-phase execution plan.
//!
//! Plans are cached per `(policy_id, phase)` and reused while both the
//! policy hash and the registry generation they were built from are
//! unchanged. A stale entry is recomputed and swapped, never edited.

pub mod plan;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::{FallbackStrategy, Phase, UnresolvedBinding};

use crate::config::TierBudgets;
use crate::obs::EngineMetrics;
use crate::policy::{CompiledPolicy, PolicyStore};
use crate::registry::{GuardRegistry, RegistrySnapshot};

pub use plan::{merge_params, ExecutionPlan, FallbackTarget, PlanEntry, PlanTarget};

pub struct Composer {
    registry: Arc<GuardRegistry>,
    store: Arc<PolicyStore>,
    tiers: TierBudgets,
    unresolved_strategy: FallbackStrategy,
    cache: DashMap<(String, Phase), Arc<ExecutionPlan>>,
    metrics: Arc<EngineMetrics>,
}

impl Composer {
    pub fn new(
        registry: Arc<GuardRegistry>,
        store: Arc<PolicyStore>,
        tiers: TierBudgets,
        unresolved_strategy: FallbackStrategy,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            registry,
            store,
            tiers,
            unresolved_strategy,
            cache: DashMap::new(),
            metrics,
        }
    }

    pub fn compose(&self, policy_id: &str, phase: Phase) -> Result<Arc<ExecutionPlan>> {
        let policy = self.store.get(policy_id)?;
        self.compose_compiled(&policy, phase)
    }

    pub fn compose_compiled(
        &self,
        policy: &CompiledPolicy,
        phase: Phase,
    ) -> Result<Arc<ExecutionPlan>> {
        let snapshot = self.registry.snapshot();
        let key = (policy.id().to_string(), phase);

        if let Some(cached) = self.cache.get(&key) {
            if cached.policy_hash == policy.hash
                && cached.registry_generation == snapshot.generation()
            {
                self.metrics.plan_cache.inc(&[("result", "hit")]);
                tracing::debug!(policy = %policy.id(), %phase, "plan cache hit");
                return Ok(Arc::clone(cached.value()));
            }
        }

        self.metrics.plan_cache.inc(&[("result", "miss")]);
        let plan = Arc::new(self.build(policy, phase, &snapshot)?);
        self.cache.insert(key, Arc::clone(&plan));
        Ok(plan)
    }

    /// Drop cached plans of one policy.
    pub fn invalidate(&self, policy_id: &str) {
        self.cache.retain(|(id, _), _| id != policy_id);
    }

    pub fn cached_plans(&self) -> usize {
        self.cache.len()
    }

    fn budget_ms(&self, tier: guardrail_core::model::Tier, own: Option<u64>) -> u64 {
        let tier_budget = self.tiers.budget_for(tier);
        own.map_or(tier_budget, |b| b.min(tier_budget))
    }

    fn build(
        &self,
        policy: &CompiledPolicy,
        phase: Phase,
        snapshot: &RegistrySnapshot,
    ) -> Result<ExecutionPlan> {
        let mut entries = Vec::new();
        let mut unresolved = Vec::new();

        for b in policy.policy.bindings(phase) {
            let resolved = snapshot.get(&b.guardrail_id);
            let foreign = resolved
                .as_ref()
                .and_then(|g| g.tenant_id.as_deref())
                .is_some_and(|owner| owner != policy.policy.tenant_id);

            let Some(guard) = resolved.as_ref().filter(|g| g.is_active() && !foreign) else {
                let (reason, strategy, key, version) = match &resolved {
                    Some(_) if foreign => (
                        "other tenant",
                        b.fallback_strategy.unwrap_or(self.unresolved_strategy),
                        b.guardrail_id.clone(),
                        0,
                    ),
                    Some(g) => (
                        "disabled",
                        b.fallback_strategy.unwrap_or(g.fallback_strategy),
                        g.key.clone(),
                        g.version,
                    ),
                    None => (
                        "not found",
                        b.fallback_strategy.unwrap_or(self.unresolved_strategy),
                        b.guardrail_id.clone(),
                        0,
                    ),
                };
                tracing::warn!(
                    policy = %policy.id(),
                    %phase,
                    guard = %b.guardrail_id,
                    reason,
                    strategy = strategy.as_str(),
                    "binding unresolved; substituting fallback strategy"
                );
                unresolved.push(UnresolvedBinding {
                    guardrail_id: b.guardrail_id.clone(),
                    order_index: b.order_index,
                    reason: reason.to_string(),
                    strategy,
                });
                let tier = b.tier_override.unwrap_or_default();
                entries.push(PlanEntry {
                    guardrail_id: b.guardrail_id.clone(),
                    order_index: b.order_index,
                    threshold: b.threshold,
                    weight: b.weight,
                    effective_tier: tier,
                    effective_budget_ms: self.tiers.budget_for(tier),
                    fallback_strategy: strategy,
                    target: PlanTarget::Substituted {
                        key,
                        version,
                        reason: reason.to_string(),
                    },
                });
                continue;
            };

            let effective_tier = b.tier_override.unwrap_or(guard.tier);
            let effective_budget_ms = if b.tier_override.is_some() {
                self.tiers.budget_for(effective_tier)
            } else {
                self.budget_ms(effective_tier, guard.performance_budget_ms)
            };

            let fallback = snapshot.resolve_fallback(&guard.id).map(|fg| FallbackTarget {
                params: merge_params(&fg.default_params, None, b.threshold),
                budget_ms: self.budget_ms(fg.tier, fg.performance_budget_ms),
                guard: fg,
            });

            entries.push(PlanEntry {
                guardrail_id: guard.id.clone(),
                order_index: b.order_index,
                threshold: b.threshold,
                weight: b.weight,
                effective_tier,
                effective_budget_ms,
                fallback_strategy: b.fallback_strategy.unwrap_or(guard.fallback_strategy),
                target: PlanTarget::Invoke {
                    params: merge_params(&guard.default_params, b.params.as_ref(), b.threshold),
                    guard: Arc::clone(guard),
                    fallback,
                },
            });
        }

        let expression = policy.expression(phase).cloned();
        if let Some(expr) = &expression {
            let names: HashSet<&str> = entries
                .iter()
                .flat_map(|e| [e.guardrail_id.as_str(), e.key()])
                .collect();
            if let Some(missing) = expr.guards().into_iter().find(|g| !names.contains(g)) {
                return Err(GuardrailError::Config(format!(
                    "policy {} phase {phase}: expression references {missing}, \
                     which is not in the plan",
                    policy.id()
                )));
            }
        }

        Ok(ExecutionPlan {
            policy_id: policy.id().to_string(),
            policy_version: policy.policy.version,
            policy_hash: policy.hash.clone(),
            registry_generation: snapshot.generation(),
            phase,
            strategy: policy.policy.strategy_for(phase),
            expression,
            entries,
            unresolved,
        })
    }
}
