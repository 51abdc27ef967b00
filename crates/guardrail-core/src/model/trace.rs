//! Verdicts and the per-request execution trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::guardrail::{FallbackStrategy, Phase, Tier};

/// Final allow/block/modify verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Block,
    Modify,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Block => "block",
            Decision::Modify => "modify",
        }
    }

    /// Any block wins, then any modify, otherwise allow.
    pub fn combine<I: IntoIterator<Item = Decision>>(decisions: I) -> Decision {
        let mut out = Decision::Allow;
        for d in decisions {
            match d {
                Decision::Block => return Decision::Block,
                Decision::Modify => out = Decision::Modify,
                Decision::Allow => {}
            }
        }
        out
    }
}

/// What a guard body returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardOutcome {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_payload: Option<String>,
}

impl GuardOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }

    pub fn fail() -> Self {
        Self {
            passed: false,
            ..Self::default()
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.modified_payload = Some(payload.into());
        self
    }
}

/// How a guard's recorded verdict came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardStatus {
    /// The guard (or its fallback guard) answered.
    Completed,
    /// Timeout/error degraded to the fallback strategy.
    Fallback,
    /// Unresolved at compose time; strategy applied without invoking.
    Substituted,
    /// Fallback strategy was `skip`; not counted.
    Skipped,
    /// Phase was cancelled while the guard was in flight.
    Cancelled,
    /// Never started (short-circuit or cancellation before start).
    NotRun,
}

/// One guard's entry in the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardResult {
    pub guardrail_id: String,
    pub key: String,
    pub version: u32,
    pub order_index: u32,
    pub tier: Tier,
    pub execution_time_ms: u64,
    pub passed: bool,
    pub status: GuardStatus,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_strategy: Option<FallbackStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_guardrail_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GuardResult {
    /// Whether this result participates in the phase aggregate.
    pub fn counts(&self) -> bool {
        matches!(
            self.status,
            GuardStatus::Completed | GuardStatus::Fallback | GuardStatus::Substituted
        )
    }

    /// Counted and failed.
    pub fn is_hard_failure(&self) -> bool {
        self.counts() && !self.passed
    }
}

/// A binding the composer could not resolve to an enabled guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedBinding {
    pub guardrail_id: String,
    pub order_index: u32,
    pub reason: String,
    pub strategy: FallbackStrategy,
}

/// Verdict of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub decision: Decision,
    pub strategy: String,
    /// Ordered by configured `order_index`.
    pub results: Vec<GuardResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_payload: Option<String>,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseResult {
    /// Fail-closed verdict for a phase that could not run.
    pub fn denied(phase: Phase, error: impl Into<String>) -> Self {
        Self {
            phase,
            decision: Decision::Block,
            strategy: "none".into(),
            results: Vec::new(),
            modified_payload: None,
            execution_time_ms: 0,
            cancelled: false,
            unresolved: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.results.iter().any(|r| r.flagged)
    }
}

/// Immutable per-request audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub request_id: String,
    pub tenant_id: String,
    pub policy_id: String,
    pub policy_version: u32,
    pub policy_hash: String,
    pub phases: Vec<PhaseResult>,
    /// All guard results across phases, phase order then `order_index`.
    pub results: Vec<GuardResult>,
    pub total_execution_time_ms: u64,
    pub policy_decision: Decision,
    pub recorded_at: DateTime<Utc>,
}
