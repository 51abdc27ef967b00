//! Policies: named, versioned bundles of guardrail bindings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::guardrail::{default_true, default_version, FallbackStrategy, Phase, Tier};

/// Policy lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    #[default]
    Draft,
    Active,
    Deprecated,
    Archived,
}

impl PolicyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyStatus::Draft => "draft",
            PolicyStatus::Active => "active",
            PolicyStatus::Deprecated => "deprecated",
            PolicyStatus::Archived => "archived",
        }
    }

    /// Lifecycle only moves forward; archived is terminal.
    pub fn can_transition_to(self, next: PolicyStatus) -> bool {
        use PolicyStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Draft, Archived)
                | (Active, Deprecated)
                | (Active, Archived)
                | (Deprecated, Archived)
        ) || self == next
    }
}

/// How per-guard verdicts combine into one phase verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompositionStrategy {
    /// Every counted guard must pass.
    #[default]
    #[serde(alias = "allOf")]
    AllOf,
    /// At least one counted guard must pass.
    #[serde(alias = "anyOf")]
    AnyOf,
    /// Boolean expression over guard keys, e.g. `allOf(pii.detect, anyOf(a, b))`.
    Custom { expression: String },
    /// Weighted pass ratio compared against `threshold`.
    Weighted { threshold: f64 },
}

impl CompositionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositionStrategy::AllOf => "all_of",
            CompositionStrategy::AnyOf => "any_of",
            CompositionStrategy::Custom { .. } => "custom",
            CompositionStrategy::Weighted { .. } => "weighted",
        }
    }
}

/// Binding of a guardrail into a policy phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyGuardrail {
    pub guardrail_id: String,
    pub phase: Phase,
    pub order_index: u32,
    /// Guard-specific cutoff in 0..=1, forwarded to the guard as `params.threshold`.
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Relative importance in 0..=1 for weighted composition (default 1).
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub tier_override: Option<Tier>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides the guard's own fallback strategy for this binding.
    #[serde(default)]
    pub fallback_strategy: Option<FallbackStrategy>,
    /// Merged over the guard's default params; binding keys win.
    #[serde(default)]
    pub params: Option<Value>,
}

impl PolicyGuardrail {
    pub fn new(guardrail_id: impl Into<String>, phase: Phase, order_index: u32) -> Self {
        Self {
            guardrail_id: guardrail_id.into(),
            phase,
            order_index,
            threshold: None,
            weight: None,
            tier_override: None,
            enabled: true,
            fallback_strategy: None,
            params: None,
        }
    }
}

/// A named, versioned policy as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: PolicyStatus,
    /// Per-phase strategy; phases without an entry use `all_of`.
    #[serde(default)]
    pub composition: BTreeMap<Phase, CompositionStrategy>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub guardrails: Vec<PolicyGuardrail>,
}

impl Policy {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            version: default_version(),
            description: None,
            status: PolicyStatus::default(),
            composition: BTreeMap::new(),
            valid_from: None,
            valid_to: None,
            guardrails: Vec::new(),
        }
    }

    pub fn strategy_for(&self, phase: Phase) -> CompositionStrategy {
        self.composition.get(&phase).cloned().unwrap_or_default()
    }

    /// `valid_from <= now < valid_to`, open bounds allowed.
    pub fn is_in_window(&self, now: DateTime<Utc>) -> bool {
        let after_start = self.valid_from.map_or(true, |from| from <= now);
        let before_end = self.valid_to.map_or(true, |to| now < to);
        after_start && before_end
    }

    /// Enabled bindings of one phase, ascending by `order_index`.
    pub fn bindings(&self, phase: Phase) -> Vec<&PolicyGuardrail> {
        let mut out: Vec<&PolicyGuardrail> = self
            .guardrails
            .iter()
            .filter(|b| b.phase == phase && b.enabled)
            .collect();
        out.sort_by_key(|b| b.order_index);
        out
    }
}
