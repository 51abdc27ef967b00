use serde::Deserialize;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::{FallbackStrategy, Guardrail, Phase, Policy, Tier};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub tiers: TierBudgets,

    #[serde(default)]
    pub executor: ExecutorSection,

    #[serde(default)]
    pub registry: RegistrySection,

    #[serde(default)]
    pub recorder: RecorderSection,

    /// Initial guardrail catalog.
    #[serde(default)]
    pub guardrails: Vec<Guardrail>,

    /// Policies compiled at boot.
    #[serde(default)]
    pub policies: Vec<Policy>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(GuardrailError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.tiers.validate()?;
        self.executor.validate()?;
        self.registry.validate()?;
        self.recorder.validate()?;

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSection::default(),
            tiers: TierBudgets::default(),
            executor: ExecutorSection::default(),
            registry: RegistrySection::default(),
            recorder: RecorderSection::default(),
            guardrails: Vec::new(),
            policies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

/// Latency budget per tier.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierBudgets {
    #[serde(default = "default_t0_budget_ms")]
    pub t0_budget_ms: u64,
    #[serde(default = "default_t1_budget_ms")]
    pub t1_budget_ms: u64,
    #[serde(default = "default_t2_budget_ms")]
    pub t2_budget_ms: u64,
}

impl Default for TierBudgets {
    fn default() -> Self {
        Self {
            t0_budget_ms: default_t0_budget_ms(),
            t1_budget_ms: default_t1_budget_ms(),
            t2_budget_ms: default_t2_budget_ms(),
        }
    }
}

impl TierBudgets {
    pub fn budget_for(&self, tier: Tier) -> u64 {
        match tier {
            Tier::T0 => self.t0_budget_ms,
            Tier::T1 => self.t1_budget_ms,
            Tier::T2 => self.t2_budget_ms,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.t0_budget_ms == 0 {
            return Err(GuardrailError::Config("tiers.t0_budget_ms must be positive".into()));
        }
        if self.t0_budget_ms > self.t1_budget_ms || self.t1_budget_ms > self.t2_budget_ms {
            return Err(GuardrailError::Config(
                "tier budgets must be non-decreasing (t0 <= t1 <= t2)".into(),
            ));
        }
        Ok(())
    }
}

fn default_t0_budget_ms() -> u64 {
    50
}
fn default_t1_budget_ms() -> u64 {
    250
}
fn default_t2_budget_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSection {
    /// Concurrent guard invocations per phase.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Stop starting `all_of` stages after the first hard failure.
    #[serde(default = "default_true")]
    pub short_circuit: bool,

    /// Strategy for unresolved bindings without their own.
    #[serde(default)]
    pub unresolved_strategy: FallbackStrategy,

    /// Phases that deny on fatal errors instead of surfacing them.
    #[serde(default = "default_fail_closed_phases")]
    pub fail_closed_phases: Vec<Phase>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            short_circuit: default_true(),
            unresolved_strategy: FallbackStrategy::default(),
            fail_closed_phases: default_fail_closed_phases(),
        }
    }
}

impl ExecutorSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=256).contains(&self.max_concurrency) {
            return Err(GuardrailError::Config(
                "executor.max_concurrency must be between 1 and 256".into(),
            ));
        }
        Ok(())
    }

    pub fn is_fail_closed(&self, phase: Phase) -> bool {
        self.fail_closed_phases.contains(&phase)
    }
}

fn default_max_concurrency() -> usize {
    8
}
fn default_true() -> bool {
    true
}
fn default_fail_closed_phases() -> Vec<Phase> {
    Phase::ALL.to_vec()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    #[serde(default = "default_max_fallback_depth")]
    pub max_fallback_depth: usize,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            max_fallback_depth: default_max_fallback_depth(),
        }
    }
}

impl RegistrySection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=32).contains(&self.max_fallback_depth) {
            return Err(GuardrailError::Config(
                "registry.max_fallback_depth must be between 1 and 32".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_fallback_depth() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecorderSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff; doubles per attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RecorderSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RecorderSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > 10 {
            return Err(GuardrailError::Config(
                "recorder.max_retries must not exceed 10".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    25
}
