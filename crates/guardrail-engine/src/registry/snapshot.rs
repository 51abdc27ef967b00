use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::Guardrail;

use super::fallback::validate_fallback_graph;

/// `(tenant, key)`; `None` tenant is the global scope.
type ScopeKey = (Option<String>, String);

/// Immutable view of the guard catalog. Replaced wholesale, never mutated.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    by_id: HashMap<String, Arc<Guardrail>>,
    by_key: HashMap<ScopeKey, BTreeMap<u32, String>>,
}

impl RegistrySnapshot {
    /// Validate and index a full catalog.
    pub fn build(
        guards: impl IntoIterator<Item = Guardrail>,
        generation: u64,
        max_fallback_depth: usize,
    ) -> Result<Self> {
        let mut by_id: HashMap<String, Arc<Guardrail>> = HashMap::new();
        let mut by_key: HashMap<ScopeKey, BTreeMap<u32, String>> = HashMap::new();

        for g in guards {
            g.validate()?;
            if by_id.contains_key(&g.id) {
                return Err(GuardrailError::Config(format!("duplicate guardrail id: {}", g.id)));
            }
            let versions = by_key
                .entry((g.tenant_id.clone(), g.key.clone()))
                .or_default();
            if let Some(other) = versions.get(&g.version) {
                return Err(GuardrailError::Config(format!(
                    "guardrail {} duplicates (tenant={}, key={}, version={}) of {other}",
                    g.id,
                    g.tenant_id.as_deref().unwrap_or("global"),
                    g.key,
                    g.version
                )));
            }
            versions.insert(g.version, g.id.clone());
            by_id.insert(g.id.clone(), Arc::new(g));
        }

        validate_fallback_graph(&by_id, max_fallback_depth)?;

        Ok(Self { generation, by_id, by_key })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn guards(&self) -> impl Iterator<Item = &Arc<Guardrail>> {
        self.by_id.values()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Guardrail>> {
        self.by_id.get(id).cloned()
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<Guardrail>> {
        self.get(id)
            .ok_or_else(|| GuardrailError::NotFound(format!("guardrail {id}")))
    }

    /// Tenant-scoped row first, then the global one. `version = None` picks
    /// the highest active version in the first scope that has one.
    pub fn resolve_key(
        &self,
        tenant: Option<&str>,
        key: &str,
        version: Option<u32>,
    ) -> Result<Arc<Guardrail>> {
        let scopes = tenant
            .map(|t| Some(t.to_string()))
            .into_iter()
            .chain(std::iter::once(None));

        for scope in scopes {
            let Some(versions) = self.by_key.get(&(scope, key.to_string())) else {
                continue;
            };
            let found = match version {
                Some(v) => versions.get(&v).and_then(|id| self.get(id)),
                None => versions
                    .values()
                    .rev()
                    .filter_map(|id| self.get(id))
                    .find(|g| g.is_active()),
            };
            if let Some(g) = found {
                return Ok(g);
            }
        }

        Err(GuardrailError::NotFound(format!(
            "guardrail key {key} (tenant={}, version={})",
            tenant.unwrap_or("global"),
            version.map_or_else(|| "latest".to_string(), |v| v.to_string())
        )))
    }

    /// The active guard to retry with when `id` errors.
    pub fn resolve_fallback(&self, id: &str) -> Option<Arc<Guardrail>> {
        let g = self.by_id.get(id)?;
        let target = g.fallback_guardrail_id.as_deref()?;
        self.by_id.get(target).filter(|t| t.is_active()).cloned()
    }

    /// Full fallback chain starting after `id`. Acyclic by construction.
    pub fn fallback_chain(&self, id: &str) -> Vec<Arc<Guardrail>> {
        let mut out = Vec::new();
        let mut cur = self.by_id.get(id);
        while let Some(g) = cur {
            let Some(next) = g
                .fallback_guardrail_id
                .as_deref()
                .and_then(|t| self.by_id.get(t))
            else {
                break;
            };
            out.push(Arc::clone(next));
            cur = Some(next);
            if out.len() > self.by_id.len() {
                break;
            }
        }
        out
    }
}
