use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::{Phase, Policy, PolicyGuardrail, PolicyStatus};

use super::compile::{compile, CompiledPolicy};
use crate::registry::RegistrySnapshot;

/// Compiled policies keyed by id.
#[derive(Default)]
pub struct PolicyStore {
    policies: DashMap<String, Arc<CompiledPolicy>>,
    write: Mutex<()>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, hash and store a policy.
    ///
    /// Identical content is a no-op. Changed content is only accepted while
    /// the stored version is still a draft; compiled non-draft policies are
    /// immutable.
    pub fn compile(
        &self,
        policy: Policy,
        registry: &RegistrySnapshot,
    ) -> Result<Arc<CompiledPolicy>> {
        let _w = self.write.lock().unwrap_or_else(PoisonError::into_inner);

        let dup = self.policies.iter().find(|e| {
            let p = &e.value().policy;
            p.id != policy.id
                && p.tenant_id == policy.tenant_id
                && p.name == policy.name
                && p.version == policy.version
        });
        if let Some(dup) = dup {
            return Err(GuardrailError::Conflict(format!(
                "policy {} v{} already exists for tenant {} as {}",
                policy.name,
                policy.version,
                policy.tenant_id,
                dup.key()
            )));
        }

        let compiled = compile(policy, registry).map_err(|e| {
            tracing::warn!(error = %e, "policy compile rejected");
            e
        })?;

        let existing = self.policies.get(compiled.id()).map(|e| Arc::clone(e.value()));
        let next = match existing {
            Some(old) if old.policy == compiled.policy => return Ok(old),
            Some(old) if old.hash == compiled.hash => {
                if !old.policy.status.can_transition_to(compiled.policy.status) {
                    return Err(GuardrailError::Conflict(format!(
                        "policy {} cannot move from {} to {}",
                        old.id(),
                        old.policy.status.as_str(),
                        compiled.policy.status.as_str()
                    )));
                }
                Arc::new(old.with_policy(compiled.policy))
            }
            Some(old) if old.policy.status != PolicyStatus::Draft => {
                return Err(GuardrailError::Conflict(format!(
                    "policy {} is {} and its guardrail set is immutable",
                    old.id(),
                    old.policy.status.as_str()
                )));
            }
            _ => Arc::new(compiled),
        };

        tracing::info!(
            policy = %next.id(),
            tenant = %next.policy.tenant_id,
            version = next.policy.version,
            hash = %next.hash,
            "policy compiled"
        );
        self.policies.insert(next.id().to_string(), Arc::clone(&next));
        Ok(next)
    }

    pub fn set_status(&self, id: &str, status: PolicyStatus) -> Result<Arc<CompiledPolicy>> {
        let _w = self.write.lock().unwrap_or_else(PoisonError::into_inner);

        let old = self.get(id)?;
        if !old.policy.status.can_transition_to(status) {
            return Err(GuardrailError::Conflict(format!(
                "policy {id} cannot move from {} to {}",
                old.policy.status.as_str(),
                status.as_str()
            )));
        }

        let mut policy = old.policy.clone();
        policy.status = status;
        let next = Arc::new(old.with_policy(policy));
        self.policies.insert(id.to_string(), Arc::clone(&next));
        tracing::info!(policy = %id, status = status.as_str(), "policy status changed");
        Ok(next)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn get(&self, id: &str) -> Result<Arc<CompiledPolicy>> {
        self.policies
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| GuardrailError::NotFound(format!("policy {id}")))
    }

    /// Enabled bindings of one phase, in execution order.
    pub fn bindings(&self, id: &str, phase: Phase) -> Result<Vec<PolicyGuardrail>> {
        Ok(self.get(id)?.policy.bindings(phase).into_iter().cloned().collect())
    }

    /// Tenant's policies ordered by (name, version).
    pub fn list(&self, tenant: &str) -> Vec<Arc<CompiledPolicy>> {
        let mut out: Vec<Arc<CompiledPolicy>> = self
            .policies
            .iter()
            .filter(|e| e.value().policy.tenant_id == tenant)
            .map(|e| Arc::clone(e.value()))
            .collect();
        out.sort_by(|a, b| {
            (&a.policy.name, a.policy.version).cmp(&(&b.policy.name, b.policy.version))
        });
        out
    }

    /// "The" policy for a name: highest version that is `active` and inside
    /// its validity window at `now`.
    pub fn select(
        &self,
        tenant: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<CompiledPolicy>> {
        self.policies
            .iter()
            .filter(|e| {
                let p = &e.value().policy;
                p.tenant_id == tenant
                    && p.name == name
                    && p.status == PolicyStatus::Active
                    && p.is_in_window(now)
            })
            .max_by_key(|e| e.value().policy.version)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| {
                GuardrailError::NotFound(format!("no active policy {name} for tenant {tenant}"))
            })
    }
}
