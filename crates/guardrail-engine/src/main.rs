//! Guardrail engine server.
//!
//! Reads the config from `GUARDRAIL_CONFIG` (default `guardrail.yaml`),
//! compiles the configured catalog and serves the HTTP API. Guard bodies are
//! registered on the `LocalInvoker` by embedders; a bare server answers every
//! guard through its fallback strategy.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use guardrail_core::error::{GuardrailError, Result};
use guardrail_engine::app_state::AppState;
use guardrail_engine::engine::GuardrailEngine;
use guardrail_engine::invoke::LocalInvoker;
use guardrail_engine::recorder::InMemoryTraceSink;
use guardrail_engine::{config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(code = e.code().as_str(), error = %e, "guardrail-engine stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::var("GUARDRAIL_CONFIG").unwrap_or_else(|_| "guardrail.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .map_err(|e| {
            GuardrailError::Config(format!("server.listen must be a socket address: {e}"))
        })?;

    let engine = GuardrailEngine::from_config(
        cfg,
        Arc::new(LocalInvoker::new()),
        Arc::new(InMemoryTraceSink::new()),
    )?;
    let state = AppState::new(Arc::new(engine));
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config = %path, "guardrail-engine starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| GuardrailError::Internal(format!("bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            state.metrics().set_draining();
            tracing::info!("shutdown requested; draining");
        })
        .await
        .map_err(|e| GuardrailError::Internal(format!("server failed: {e}")))
}
