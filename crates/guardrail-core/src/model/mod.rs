//! Data model shared by the engine and its callers.
//!
//! - `guardrail`: versioned guard definitions, tiers, phases, fallback strategies.
//! - `policy`: policies, bindings and per-phase composition strategies.
//! - `trace`: guard outcomes, phase results and the per-request audit trace.
//!
//! JSON-typed configuration (`default_params`, binding `params`) is carried as
//! opaque `serde_json::Value` and never interpreted here.

pub mod guardrail;
pub mod policy;
pub mod trace;

pub use guardrail::{FallbackStrategy, Guardrail, Phase, Tier};
pub use policy::{CompositionStrategy, Policy, PolicyGuardrail, PolicyStatus};
pub use trace::{
    Decision, ExecutionTrace, GuardOutcome, GuardResult, GuardStatus, PhaseResult,
    UnresolvedBinding,
};
