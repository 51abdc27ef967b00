#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use chrono::{Duration, Utc};

use guardrail_core::error::ErrorCode;
use guardrail_core::model::{
    CompositionStrategy, Guardrail, Phase, Policy, PolicyGuardrail, PolicyStatus, Tier,
};
use guardrail_engine::policy::{content_hash, PolicyStore};
use guardrail_engine::registry::GuardRegistry;

fn registry() -> GuardRegistry {
    GuardRegistry::from_catalog(
        vec![
            Guardrail::new("g-pii", "pii.detect", Tier::T0),
            Guardrail::new("g-tox", "toxicity", Tier::T1),
            Guardrail::new("g-jb", "jailbreak", Tier::T2),
        ],
        8,
    )
    .unwrap()
}

fn policy(id: &str, version: u32) -> Policy {
    let mut p = Policy::new(id, "acme", "default");
    p.version = version;
    p.guardrails = vec![
        PolicyGuardrail::new("g-pii", Phase::Pre, 1),
        PolicyGuardrail::new("g-tox", Phase::Pre, 2),
        PolicyGuardrail::new("g-jb", Phase::Post, 1),
    ];
    p
}

#[test]
fn duplicate_order_index_in_a_phase_is_rejected() {
    let reg = registry();
    let store = PolicyStore::new();
    let mut p = policy("p1", 1);
    p.guardrails[1].order_index = 1;

    let err = store.compile(p, &reg.snapshot()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Config);
    assert!(store.get("p1").is_err());
}

#[test]
fn same_order_index_in_different_phases_is_fine() {
    let reg = registry();
    let store = PolicyStore::new();
    // g-pii@pre#1 and g-jb@post#1
    assert!(store.compile(policy("p1", 1), &reg.snapshot()).is_ok());
}

#[test]
fn threshold_and_weight_must_be_unit_interval() {
    let reg = registry();
    let store = PolicyStore::new();

    let mut p = policy("p1", 1);
    p.guardrails[0].threshold = Some(1.5);
    assert_eq!(store.compile(p, &reg.snapshot()).unwrap_err().code(), ErrorCode::Config);

    let mut p = policy("p1", 1);
    p.guardrails[0].weight = Some(-0.1);
    assert_eq!(store.compile(p, &reg.snapshot()).unwrap_err().code(), ErrorCode::Config);
}

#[test]
fn custom_expression_must_reference_bound_guards() {
    let reg = registry();
    let store = PolicyStore::new();

    let mut p = policy("p1", 1);
    p.composition.insert(
        Phase::Pre,
        CompositionStrategy::Custom { expression: "allOf(pii.detect, jailbreak)".into() },
    );
    let err = store.compile(p, &reg.snapshot()).unwrap_err();
    assert!(err.to_string().contains("jailbreak"));

    let mut p = policy("p1", 1);
    p.composition.insert(
        Phase::Pre,
        CompositionStrategy::Custom { expression: "anyOf(pii.detect, not(g-tox))".into() },
    );
    let compiled = store.compile(p, &reg.snapshot()).unwrap();
    assert!(compiled.expression(Phase::Pre).is_some());
    assert!(compiled.expression(Phase::Post).is_none());
}

#[test]
fn weighted_threshold_out_of_range_is_rejected() {
    let reg = registry();
    let mut p = policy("p1", 1);
    p.composition.insert(Phase::Post, CompositionStrategy::Weighted { threshold: 2.0 });
    assert!(PolicyStore::new().compile(p, &reg.snapshot()).is_err());
}

#[test]
fn hash_ignores_binding_order_but_not_content() {
    let a = policy("p1", 1);
    let mut b = a.clone();
    b.guardrails.reverse();
    b.description = Some("cosmetic".into());
    assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());

    let mut c = a.clone();
    c.guardrails[0].threshold = Some(0.7);
    assert_ne!(content_hash(&a).unwrap(), content_hash(&c).unwrap());
}

#[test]
fn recompile_identical_is_noop_and_active_policy_is_immutable() {
    let reg = registry();
    let store = PolicyStore::new();

    let first = store.compile(policy("p1", 1), &reg.snapshot()).unwrap();
    let again = store.compile(policy("p1", 1), &reg.snapshot()).unwrap();
    assert_eq!(first.compiled_at, again.compiled_at);

    // drafts may still change
    let mut edited = policy("p1", 1);
    edited.guardrails.pop();
    let edited = store.compile(edited, &reg.snapshot()).unwrap();
    assert_ne!(edited.hash, first.hash);

    store.set_status("p1", PolicyStatus::Active).unwrap();
    let mut changed = policy("p1", 1);
    changed.status = PolicyStatus::Active;
    let err = store.compile(changed, &reg.snapshot()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[test]
fn status_moves_forward_only() {
    let reg = registry();
    let store = PolicyStore::new();
    store.compile(policy("p1", 1), &reg.snapshot()).unwrap();

    store.set_status("p1", PolicyStatus::Active).unwrap();
    store.set_status("p1", PolicyStatus::Deprecated).unwrap();
    let err = store.set_status("p1", PolicyStatus::Active).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
    store.set_status("p1", PolicyStatus::Archived).unwrap();

    assert_eq!(store.set_status("nope", PolicyStatus::Active).unwrap_err().code(), ErrorCode::NotFound);
}

#[test]
fn same_name_and_version_under_another_id_conflicts() {
    let reg = registry();
    let store = PolicyStore::new();
    store.compile(policy("p1", 1), &reg.snapshot()).unwrap();
    let err = store.compile(policy("p2", 1), &reg.snapshot()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[test]
fn select_picks_highest_active_version_in_window() {
    let reg = registry();
    let store = PolicyStore::new();
    let now = Utc::now();

    let mut v1 = policy("p-v1", 1);
    v1.status = PolicyStatus::Active;
    let mut v2 = policy("p-v2", 2);
    v2.status = PolicyStatus::Active;
    v2.valid_from = Some(now + Duration::hours(1));
    let mut v3 = policy("p-v3", 3);
    v3.status = PolicyStatus::Draft;

    for p in [v1, v2, v3] {
        store.compile(p, &reg.snapshot()).unwrap();
    }

    assert_eq!(store.select("acme", "default", now).unwrap().id(), "p-v1");
    assert_eq!(
        store.select("acme", "default", now + Duration::hours(2)).unwrap().id(),
        "p-v2"
    );
    assert_eq!(
        store.select("globex", "default", now).unwrap_err().code(),
        ErrorCode::NotFound
    );
}

#[test]
fn list_and_bindings() {
    let reg = registry();
    let store = PolicyStore::new();
    store.compile(policy("p2", 2), &reg.snapshot()).unwrap();
    store.compile(policy("p1", 1), &reg.snapshot()).unwrap();

    let ids: Vec<String> = store.list("acme").iter().map(|p| p.id().to_string()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);

    let pre = store.bindings("p1", Phase::Pre).unwrap();
    let order: Vec<&str> = pre.iter().map(|b| b.guardrail_id.as_str()).collect();
    assert_eq!(order, vec!["g-pii", "g-tox"]);
}

#[test]
fn binding_another_tenants_guardrail_is_rejected() {
    let mut theirs = Guardrail::new("g-globex", "secret.scan", Tier::T1);
    theirs.tenant_id = Some("globex".into());
    let mut ours = Guardrail::new("g-acme", "secret.scan", Tier::T1);
    ours.tenant_id = Some("acme".into());
    let reg = GuardRegistry::from_catalog(vec![theirs, ours], 8).unwrap();
    let store = PolicyStore::new();

    let mut p = Policy::new("p1", "acme", "default");
    p.guardrails = vec![PolicyGuardrail::new("g-globex", Phase::Pre, 1)];
    let err = store.compile(p.clone(), &reg.snapshot()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Config);
    assert!(err.to_string().contains("g-globex"));

    p.guardrails = vec![PolicyGuardrail::new("g-acme", Phase::Pre, 1)];
    assert!(store.compile(p, &reg.snapshot()).is_ok());
}
