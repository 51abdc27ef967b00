//! Guardrail policy composition and enforcement engine.
//!
//! Resolves a tenant's policy into per-phase execution plans, runs the
//! bound guards under tier budgets with fallback handling, combines their
//! verdicts into allow/block/modify and records one audit trace per
//! request. The HTTP surface (`router`) is a thin layer over
//! [`engine::GuardrailEngine`].

pub mod api;
pub mod app_state;
pub mod composer;
pub mod config;
pub mod engine;
pub mod executor;
pub mod invoke;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod recorder;
pub mod registry;
pub mod router;

pub use engine::{EvaluateRequest, EvaluateResponse, GuardrailEngine, PolicyRef};
