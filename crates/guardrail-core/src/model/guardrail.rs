//! Guardrail definitions: a single versioned check with a tier and budget.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GuardrailError;

/// Execution-budget class. T0 is the cheapest/fastest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Tier {
    #[serde(rename = "T0", alias = "t0")]
    T0,
    #[default]
    #[serde(rename = "T1", alias = "t1")]
    T1,
    #[serde(rename = "T2", alias = "t2")]
    T2,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::T0 => "T0",
            Tier::T1 => "T1",
            Tier::T2 => "T2",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to record when a guard cannot produce a verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Omit the guard from the aggregate.
    Skip,
    /// Record a pass.
    Allow,
    /// Record a failure.
    #[default]
    Block,
    /// Record a pass, flagged for review.
    Warn,
}

impl FallbackStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackStrategy::Skip => "skip",
            FallbackStrategy::Allow => "allow",
            FallbackStrategy::Block => "block",
            FallbackStrategy::Warn => "warn",
        }
    }
}

/// Pipeline stage a guardrail binding applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[serde(alias = "input")]
    Pre,
    #[serde(alias = "output")]
    Post,
    ToolArgs,
    ToolResult,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Pre, Phase::Post, Phase::ToolArgs, Phase::ToolResult];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
            Phase::ToolArgs => "tool_args",
            Phase::ToolResult => "tool_result",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = GuardrailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre" | "input" => Ok(Phase::Pre),
            "post" | "output" => Ok(Phase::Post),
            "tool_args" => Ok(Phase::ToolArgs),
            "tool_result" => Ok(Phase::ToolResult),
            other => Err(GuardrailError::BadRequest(format!("unknown phase: {other}"))),
        }
    }
}

/// A versioned guard definition.
///
/// `tenant_id = None` marks a global row visible to every tenant; a
/// tenant-scoped row with the same key shadows it for that tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Guardrail {
    pub id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub key: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub performance_budget_ms: Option<u64>,
    /// Opaque guard-specific configuration, passed through unvalidated.
    #[serde(default)]
    pub default_params: Value,
    #[serde(default)]
    pub fallback_guardrail_id: Option<String>,
    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,
    /// Redaction/transform guard. Later guards observe its output.
    #[serde(default)]
    pub mutates_payload: bool,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub is_certified: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Guardrail {
    /// Minimal definition; remaining fields take their defaults.
    pub fn new(id: impl Into<String>, key: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            tenant_id: None,
            key: key.into(),
            version: default_version(),
            name: None,
            tier,
            performance_budget_ms: None,
            default_params: Value::Null,
            fallback_guardrail_id: None,
            fallback_strategy: FallbackStrategy::default(),
            mutates_payload: false,
            is_enabled: true,
            is_global: false,
            is_certified: false,
            deleted_at: None,
        }
    }

    /// Enabled and not soft-deleted.
    pub fn is_active(&self) -> bool {
        self.is_enabled && self.deleted_at.is_none()
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.id.trim().is_empty() {
            return Err(GuardrailError::Config("guardrail id must not be empty".into()));
        }
        if self.key.trim().is_empty() {
            return Err(GuardrailError::Config(format!(
                "guardrail {} has an empty key",
                self.id
            )));
        }
        if self.is_global && self.tenant_id.is_some() {
            return Err(GuardrailError::Config(format!(
                "guardrail {} is marked global but scoped to a tenant",
                self.id
            )));
        }
        if self.performance_budget_ms == Some(0) {
            return Err(GuardrailError::Config(format!(
                "guardrail {} has a zero performance budget",
                self.id
            )));
        }
        if self.fallback_guardrail_id.as_deref() == Some(self.id.as_str()) {
            return Err(GuardrailError::Config(format!(
                "guardrail {} falls back to itself",
                self.id
            )));
        }
        Ok(())
    }
}

pub(crate) fn default_version() -> u32 {
    1
}

pub(crate) fn default_true() -> bool {
    true
}
