#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use guardrail_core::model::{CompositionStrategy, FallbackStrategy, Phase, Tier};
use guardrail_engine::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
tiers:
  t0_budget_ms: 10
  t9_budget_ms: 99 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG_ERROR");
}

#[test]
fn unknown_guardrail_field_is_rejected() {
    let bad = r#"
version: 1
guardrails:
  - id: g1
    key: pii.detect
    teir: T0
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.server.listen, "0.0.0.0:8080");
    assert_eq!(cfg.tiers.budget_for(Tier::T0), 50);
    assert_eq!(cfg.tiers.budget_for(Tier::T2), 1500);
    assert_eq!(cfg.executor.max_concurrency, 8);
    assert_eq!(cfg.executor.unresolved_strategy, FallbackStrategy::Block);
    assert!(Phase::ALL.iter().all(|p| cfg.executor.is_fail_closed(*p)));
    assert!(cfg.guardrails.is_empty());
}

#[test]
fn wrong_version_is_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG_ERROR");
}

#[test]
fn tier_budgets_must_not_decrease() {
    let bad = r#"
version: 1
tiers: { t0_budget_ms: 300, t1_budget_ms: 200, t2_budget_ms: 1000 }
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn concurrency_out_of_range_is_rejected() {
    assert!(config::load_from_str("version: 1\nexecutor: { max_concurrency: 0 }\n").is_err());
    assert!(config::load_from_str("version: 1\nregistry: { max_fallback_depth: 33 }\n").is_err());
    assert!(config::load_from_str("version: 1\nrecorder: { max_retries: 11 }\n").is_err());
}

#[test]
fn catalog_and_policies_parse() {
    let yaml = r#"
version: 1
executor:
  fail_closed_phases: [pre]
guardrails:
  - id: g-pii
    key: pii.detect
    tier: T0
    mutates_payload: true
    default_params: { entities: [email] }
  - id: g-tox
    key: toxicity
    tier: t2
    performance_budget_ms: 900
    fallback_strategy: warn
policies:
  - id: p1
    tenant_id: acme
    name: default
    status: active
    composition:
      pre: { type: custom, expression: "allOf(pii.detect, toxicity)" }
      post: { type: weighted, threshold: 0.6 }
    guardrails:
      - { guardrail_id: g-pii, phase: pre, order_index: 1, threshold: 0.8 }
      - { guardrail_id: g-tox, phase: input, order_index: 2 }
"#;
    let cfg = config::load_from_str(yaml).expect("must parse");
    assert_eq!(cfg.guardrails.len(), 2);
    assert_eq!(cfg.guardrails[1].tier, Tier::T2);
    assert_eq!(cfg.guardrails[1].fallback_strategy, FallbackStrategy::Warn);
    assert!(!cfg.executor.is_fail_closed(Phase::Post));

    let p = &cfg.policies[0];
    assert_eq!(p.guardrails[1].phase, Phase::Pre);
    assert_eq!(
        p.strategy_for(Phase::Post),
        CompositionStrategy::Weighted { threshold: 0.6 }
    );
    assert_eq!(p.strategy_for(Phase::ToolArgs), CompositionStrategy::AllOf);
}
