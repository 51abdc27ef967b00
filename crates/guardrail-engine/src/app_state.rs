//! Shared HTTP state: a handle to the engine.

use std::sync::Arc;

use crate::engine::GuardrailEngine;
use crate::obs::EngineMetrics;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<GuardrailEngine>,
}

impl AppState {
    pub fn new(engine: Arc<GuardrailEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &GuardrailEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &EngineMetrics {
        self.engine.metrics()
    }

    pub fn is_draining(&self) -> bool {
        self.engine.metrics().is_draining()
    }

    /// Gauges read from engine state at scrape time.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("guardrail_registry_generation", self.engine.registry().generation()),
            ("guardrail_registry_guardrails", self.engine.registry().snapshot().len() as u64),
            ("guardrail_policies", self.engine.store().len() as u64),
            ("guardrail_plan_cache_entries", self.engine.composer().cached_plans() as u64),
        ]
    }
}
