#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use chrono::{Duration, Utc};
use serde_json::json;

use guardrail_core::model::{
    CompositionStrategy, Decision, FallbackStrategy, Guardrail, Phase, Policy, PolicyGuardrail,
    PolicyStatus, Tier,
};

#[test]
fn guardrail_defaults() {
    let g: Guardrail = serde_json::from_value(json!({
        "id": "g-pii",
        "key": "pii.detect"
    }))
    .unwrap();
    assert_eq!(g.version, 1);
    assert_eq!(g.tier, Tier::T1);
    assert_eq!(g.fallback_strategy, FallbackStrategy::Block);
    assert!(g.is_enabled);
    assert!(g.is_active());
    assert!(!g.mutates_payload);
    assert!(g.validate().is_ok());
}

#[test]
fn guardrail_rejects_unknown_fields() {
    let res: Result<Guardrail, _> = serde_json::from_value(json!({
        "id": "g",
        "key": "k",
        "fallbak_strategy": "skip"
    }));
    assert!(res.is_err());
}

#[test]
fn guardrail_self_fallback_is_invalid() {
    let mut g = Guardrail::new("g1", "prompt.injection", Tier::T0);
    g.fallback_guardrail_id = Some("g1".into());
    assert_eq!(g.validate().unwrap_err().code().as_str(), "CONFIG_ERROR");
}

#[test]
fn soft_deleted_guard_is_inactive() {
    let mut g = Guardrail::new("g1", "pii.detect", Tier::T0);
    g.deleted_at = Some(Utc::now());
    assert!(!g.is_active());
}

#[test]
fn phase_aliases() {
    let p: Phase = serde_json::from_value(json!("input")).unwrap();
    assert_eq!(p, Phase::Pre);
    let p: Phase = serde_json::from_value(json!("output")).unwrap();
    assert_eq!(p, Phase::Post);
    assert_eq!("tool_args".parse::<Phase>().unwrap(), Phase::ToolArgs);
    assert!("sideways".parse::<Phase>().is_err());
}

#[test]
fn composition_strategy_is_tagged() {
    let s: CompositionStrategy = serde_json::from_value(json!({ "type": "allOf" })).unwrap();
    assert_eq!(s, CompositionStrategy::AllOf);
    let s: CompositionStrategy =
        serde_json::from_value(json!({ "type": "weighted", "threshold": 0.6 })).unwrap();
    assert_eq!(s, CompositionStrategy::Weighted { threshold: 0.6 });
    let s: CompositionStrategy =
        serde_json::from_value(json!({ "type": "custom", "expression": "anyOf(a, b)" })).unwrap();
    assert_eq!(s.as_str(), "custom");
}

#[test]
fn policy_bindings_are_phase_filtered_and_ordered() {
    let mut p = Policy::new("p1", "acme", "default");
    p.guardrails = vec![
        PolicyGuardrail::new("b", Phase::Pre, 2),
        PolicyGuardrail::new("a", Phase::Pre, 0),
        PolicyGuardrail::new("c", Phase::Post, 0),
        PolicyGuardrail {
            enabled: false,
            ..PolicyGuardrail::new("d", Phase::Pre, 1)
        },
    ];
    let ids: Vec<&str> = p.bindings(Phase::Pre).iter().map(|b| b.guardrail_id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(p.strategy_for(Phase::Post), CompositionStrategy::AllOf);
}

#[test]
fn policy_window_is_half_open() {
    let now = Utc::now();
    let mut p = Policy::new("p1", "acme", "default");
    assert!(p.is_in_window(now));

    p.valid_from = Some(now);
    p.valid_to = Some(now + Duration::hours(1));
    assert!(p.is_in_window(now));
    assert!(!p.is_in_window(now + Duration::hours(1)));
    assert!(!p.is_in_window(now - Duration::seconds(1)));
}

#[test]
fn status_transitions_move_forward() {
    use PolicyStatus::*;
    assert!(Draft.can_transition_to(Active));
    assert!(Active.can_transition_to(Deprecated));
    assert!(Deprecated.can_transition_to(Archived));
    assert!(!Active.can_transition_to(Draft));
    assert!(!Archived.can_transition_to(Active));
}

#[test]
fn decision_combine() {
    assert_eq!(Decision::combine(std::iter::empty()), Decision::Allow);
    assert_eq!(Decision::combine([Decision::Allow, Decision::Modify]), Decision::Modify);
    assert_eq!(
        Decision::combine([Decision::Modify, Decision::Block, Decision::Allow]),
        Decision::Block
    );
}
