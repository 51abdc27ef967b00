//! Scripted guard bodies and engine builders shared by integration tests.
#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use guardrail_core::error::{GuardrailError, Result};
use guardrail_core::model::GuardOutcome;
use guardrail_engine::config;
use guardrail_engine::invoke::{CancelToken, GuardHandler, LocalInvoker};
use guardrail_engine::recorder::{InMemoryTraceSink, TraceSink};
use guardrail_engine::GuardrailEngine;

#[derive(Clone)]
pub enum Script {
    Pass,
    Fail,
    Score(f64),
    /// Sleep, then pass. Stops early when cancelled.
    Sleep(u64),
    Error,
    /// Replace every occurrence of `.0` with `.1`.
    Redact(&'static str, &'static str),
    /// Fail when the payload contains the needle.
    Deny(&'static str),
}

pub struct Fake {
    key: String,
    script: Script,
    pub calls: AtomicUsize,
    pub saw_cancel: AtomicBool,
    pub payloads: Mutex<Vec<String>>,
    pub params: Mutex<Vec<Value>>,
}

impl Fake {
    pub fn new(key: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            script,
            calls: AtomicUsize::new(0),
            saw_cancel: AtomicBool::new(false),
            payloads: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_payload(&self) -> Option<String> {
        self.payloads.lock().unwrap().last().cloned()
    }

    pub fn last_params(&self) -> Option<Value> {
        self.params.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GuardHandler for Fake {
    fn key(&self) -> &str {
        &self.key
    }

    async fn check(&self, params: &Value, payload: &str, cancel: &CancelToken) -> Result<GuardOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.to_string());
        self.params.lock().unwrap().push(params.clone());

        match &self.script {
            Script::Pass => Ok(GuardOutcome::pass()),
            Script::Fail => Ok(GuardOutcome::fail().with_details("flagged")),
            Script::Score(s) => {
                let cutoff = params.get("threshold").and_then(Value::as_f64).unwrap_or(0.5);
                let out = if *s < cutoff { GuardOutcome::pass() } else { GuardOutcome::fail() };
                Ok(out.with_score(*s))
            }
            Script::Sleep(ms) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(*ms)) => Ok(GuardOutcome::pass()),
                    _ = cancel.cancelled() => {
                        self.saw_cancel.store(true, Ordering::SeqCst);
                        Err(GuardrailError::Cancelled)
                    }
                }
            }
            Script::Error => Err(GuardrailError::GuardInvocation(format!("{} crashed", self.key))),
            Script::Redact(from, to) => {
                Ok(GuardOutcome::pass().with_payload(payload.replace(from, to)))
            }
            Script::Deny(needle) => Ok(if payload.contains(needle) {
                GuardOutcome::fail()
            } else {
                GuardOutcome::pass()
            }),
        }
    }
}

pub fn invoker(fakes: &[Arc<Fake>]) -> Arc<LocalInvoker> {
    let inv = LocalInvoker::new();
    for f in fakes {
        inv.register(Arc::clone(f) as Arc<dyn GuardHandler>);
    }
    Arc::new(inv)
}

pub fn engine(yaml: &str, fakes: &[Arc<Fake>]) -> (GuardrailEngine, Arc<InMemoryTraceSink>) {
    let cfg = config::load_from_str(yaml).expect("config");
    let sink = Arc::new(InMemoryTraceSink::new());
    let engine = GuardrailEngine::from_config(cfg, invoker(fakes), Arc::clone(&sink) as Arc<dyn TraceSink>)
        .expect("engine");
    (engine, sink)
}
