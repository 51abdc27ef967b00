//! Guard Registry.
//!
//! Holds versioned guardrail definitions and resolves ids or
//! `(tenant, key, version)` to descriptors. Readers clone an
//! `Arc<RegistrySnapshot>`; every change builds and validates a complete new
//! snapshot and swaps it in, so concurrent requests never observe a
//! half-updated catalog. Writers are serialized.

mod fallback;
mod snapshot;

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::Guardrail;

pub use fallback::validate_fallback_graph;
pub use snapshot::RegistrySnapshot;

/// Executable view of a guardrail as handed to the composer.
pub type GuardDescriptor = Arc<Guardrail>;

#[derive(Debug)]
pub struct GuardRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    write: Mutex<()>,
    max_fallback_depth: usize,
}

impl GuardRegistry {
    pub fn new(max_fallback_depth: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            write: Mutex::new(()),
            max_fallback_depth,
        }
    }

    pub fn from_catalog(guards: Vec<Guardrail>, max_fallback_depth: usize) -> Result<Self> {
        let reg = Self::new(max_fallback_depth);
        reg.replace_all(guards)?;
        Ok(reg)
    }

    /// Current snapshot. Cheap; hold it for the duration of one composition.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }

    pub fn resolve(&self, id: &str) -> Result<GuardDescriptor> {
        self.snapshot().resolve(id)
    }

    pub fn resolve_key(
        &self,
        tenant: Option<&str>,
        key: &str,
        version: Option<u32>,
    ) -> Result<GuardDescriptor> {
        self.snapshot().resolve_key(tenant, key, version)
    }

    pub fn resolve_fallback(&self, id: &str) -> Option<GuardDescriptor> {
        self.snapshot().resolve_fallback(id)
    }

    pub fn fallback_chain(&self, id: &str) -> Vec<GuardDescriptor> {
        self.snapshot().fallback_chain(id)
    }

    /// Create or replace one guardrail. Rejects duplicate identities and
    /// cyclic or over-long fallback chains before anything is visible.
    pub fn register(&self, guard: Guardrail) -> Result<GuardDescriptor> {
        let id = guard.id.clone();
        self.update(|guards| {
            guards.retain(|g| g.id != id);
            guards.push(guard);
            Ok(())
        })?;
        self.resolve(&id)
    }

    /// Replace the whole catalog (CRUD refresh).
    pub fn replace_all(&self, guards: Vec<Guardrail>) -> Result<()> {
        self.update(move |current| {
            *current = guards;
            Ok(())
        })
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.update(|guards| {
            let g = find_mut(guards, id)?;
            g.is_enabled = enabled;
            Ok(())
        })
    }

    /// Soft delete: the row stays for audit but never resolves as active.
    pub fn soft_delete(&self, id: &str) -> Result<()> {
        self.update(|guards| {
            let g = find_mut(guards, id)?;
            g.deleted_at = Some(Utc::now());
            Ok(())
        })
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Guardrail>) -> Result<()>,
    {
        let _w = self.write.lock().unwrap_or_else(PoisonError::into_inner);

        let base = self.snapshot();
        let mut guards: Vec<Guardrail> = base.guards().map(|g| Guardrail::clone(g)).collect();
        f(&mut guards)?;

        let next = RegistrySnapshot::build(guards, base.generation() + 1, self.max_fallback_depth)
            .map_err(|e| {
                tracing::warn!(error = %e, "guardrail registry update rejected");
                e
            })?;

        let count = next.len();
        let generation = next.generation();
        {
            let mut cur = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *cur = Arc::new(next);
        }
        tracing::info!(generation, guards = count, "guardrail registry swapped");
        Ok(())
    }
}

fn find_mut<'a>(guards: &'a mut [Guardrail], id: &str) -> Result<&'a mut Guardrail> {
    guards
        .iter_mut()
        .find(|g| g.id == id)
        .ok_or_else(|| GuardrailError::NotFound(format!("guardrail {id}")))
}
