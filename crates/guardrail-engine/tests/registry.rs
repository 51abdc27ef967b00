#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use guardrail_core::error::ErrorCode;
use guardrail_core::model::{Guardrail, Tier};
use guardrail_engine::registry::GuardRegistry;

fn guard(id: &str, key: &str) -> Guardrail {
    Guardrail::new(id, key, Tier::T1)
}

fn with_fallback(id: &str, key: &str, to: &str) -> Guardrail {
    let mut g = guard(id, key);
    g.fallback_guardrail_id = Some(to.to_string());
    g
}

#[test]
fn tenant_row_shadows_global_row() {
    let mut tenant = guard("g-acme", "toxicity");
    tenant.tenant_id = Some("acme".into());
    let mut global = guard("g-global", "toxicity");
    global.is_global = true;

    let reg = GuardRegistry::from_catalog(vec![global, tenant], 8).unwrap();
    assert_eq!(reg.resolve_key(Some("acme"), "toxicity", None).unwrap().id, "g-acme");
    assert_eq!(reg.resolve_key(Some("other"), "toxicity", None).unwrap().id, "g-global");
    assert_eq!(reg.resolve_key(None, "toxicity", None).unwrap().id, "g-global");
}

#[test]
fn latest_version_skips_disabled_rows() {
    let v1 = guard("tox-1", "toxicity");
    let mut v2 = guard("tox-2", "toxicity");
    v2.version = 2;
    v2.is_enabled = false;

    let reg = GuardRegistry::from_catalog(vec![v1, v2], 8).unwrap();
    assert_eq!(reg.resolve_key(None, "toxicity", None).unwrap().id, "tox-1");
    assert_eq!(reg.resolve_key(None, "toxicity", Some(2)).unwrap().id, "tox-2");

    let err = reg.resolve_key(None, "toxicity", Some(3)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn duplicate_key_version_is_rejected() {
    let err = GuardRegistry::from_catalog(vec![guard("a", "pii"), guard("b", "pii")], 8).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Config);
}

#[test]
fn cycle_is_rejected_and_catalog_unchanged() {
    let reg = GuardRegistry::from_catalog(
        vec![with_fallback("a", "ka", "b"), guard("b", "kb")],
        8,
    )
    .unwrap();
    let before = reg.generation();

    let err = reg.register(with_fallback("b", "kb", "a")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Config);
    assert!(err.to_string().contains("cycles"));

    assert_eq!(reg.generation(), before);
    assert!(reg.resolve("b").unwrap().fallback_guardrail_id.is_none());
}

#[test]
fn chain_longer_than_max_depth_is_rejected() {
    let catalog = vec![
        with_fallback("a", "ka", "b"),
        with_fallback("b", "kb", "c"),
        with_fallback("c", "kc", "d"),
        guard("d", "kd"),
    ];
    assert!(GuardRegistry::from_catalog(catalog.clone(), 3).is_ok());

    let err = GuardRegistry::from_catalog(catalog, 2).unwrap_err();
    assert!(err.to_string().contains("max depth"));
}

#[test]
fn unknown_fallback_target_is_rejected() {
    let err = GuardRegistry::from_catalog(vec![with_fallback("a", "ka", "ghost")], 8).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Config);
}

#[test]
fn fallback_chain_and_resolution() {
    let reg = GuardRegistry::from_catalog(
        vec![
            with_fallback("onnx", "toxicity.onnx", "regex"),
            with_fallback("regex", "toxicity.regex", "list"),
            guard("list", "toxicity.list"),
        ],
        8,
    )
    .unwrap();

    let chain: Vec<String> = reg.fallback_chain("onnx").iter().map(|g| g.id.clone()).collect();
    assert_eq!(chain, vec!["regex", "list"]);
    assert_eq!(reg.resolve_fallback("onnx").unwrap().id, "regex");

    reg.set_enabled("regex", false).unwrap();
    assert!(reg.resolve_fallback("onnx").is_none());
}

#[test]
fn soft_delete_keeps_row_but_deactivates_it() {
    let reg = GuardRegistry::from_catalog(vec![guard("a", "ka")], 8).unwrap();
    let g0 = reg.generation();

    reg.soft_delete("a").unwrap();
    let g = reg.resolve("a").unwrap();
    assert!(g.deleted_at.is_some());
    assert!(!g.is_active());
    assert!(reg.generation() > g0);

    assert_eq!(reg.soft_delete("missing").unwrap_err().code(), ErrorCode::NotFound);
}

#[test]
fn readers_keep_their_snapshot() {
    let reg = GuardRegistry::from_catalog(vec![guard("a", "ka")], 8).unwrap();
    let snap = reg.snapshot();

    reg.register(guard("b", "kb")).unwrap();
    assert_eq!(snap.len(), 1);
    assert!(snap.get("b").is_none());
    assert_eq!(reg.snapshot().len(), 2);
}
