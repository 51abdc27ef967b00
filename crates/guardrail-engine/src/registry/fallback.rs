//! Fallback graph validation.
//!
//! Guards are laid out in an arena (index per id) with at most one outgoing
//! edge each (`fallback_guardrail_id`). Every walk is bounded by
//! `max_depth` and tracks a visited set, so a cycle is reported the moment a
//! walk revisits an index.

use std::collections::HashMap;
use std::sync::Arc;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::Guardrail;

pub fn validate_fallback_graph(
    guards: &HashMap<String, Arc<Guardrail>>,
    max_depth: usize,
) -> Result<()> {
    // arena: id -> index, edge[i] = Some(j) when guard i falls back to guard j
    let ids: Vec<&str> = guards.keys().map(String::as_str).collect();
    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut edge: Vec<Option<usize>> = vec![None; ids.len()];
    for (i, id) in ids.iter().enumerate() {
        let Some(g) = guards.get(*id) else { continue };
        let Some(target) = g.fallback_guardrail_id.as_deref() else { continue };

        let j = *index.get(target).ok_or_else(|| {
            GuardrailError::Config(format!(
                "guardrail {id} falls back to unknown guardrail {target}"
            ))
        })?;

        if let Some(t) = guards.get(target) {
            if g.tenant_id.is_none() && t.tenant_id.is_some() {
                return Err(GuardrailError::Config(format!(
                    "global guardrail {id} cannot fall back to tenant-scoped guardrail {target}"
                )));
            }
            if let (Some(a), Some(b)) = (&g.tenant_id, &t.tenant_id) {
                if a != b {
                    return Err(GuardrailError::Config(format!(
                        "guardrail {id} falls back across tenants to {target}"
                    )));
                }
            }
        }
        edge[i] = Some(j);
    }

    for start in 0..ids.len() {
        let mut visited = vec![false; ids.len()];
        visited[start] = true;
        let mut cur = start;
        let mut depth = 0usize;

        while let Some(next) = edge[cur] {
            if visited[next] {
                return Err(GuardrailError::Config(format!(
                    "fallback chain of guardrail {} cycles back to {}",
                    ids[start], ids[next]
                )));
            }
            depth += 1;
            if depth > max_depth {
                return Err(GuardrailError::Config(format!(
                    "fallback chain of guardrail {} exceeds max depth {max_depth}",
                    ids[start]
                )));
            }
            visited[next] = true;
            cur = next;
        }
    }

    Ok(())
}
