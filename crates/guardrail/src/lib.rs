//! Guardrail policy composition and enforcement, as one dependency.
//!
//! `core` holds the data model and expression language, `engine` the
//! runtime. Embedders usually only need the prelude:
//!
//! ```ignore
//! use guardrail::prelude::*;
//!
//! let invoker = Arc::new(LocalInvoker::new());
//! invoker.register(Arc::new(MyPiiDetector::default()));
//! let engine = GuardrailEngine::from_config(cfg, invoker, Arc::new(InMemoryTraceSink::new()))?;
//! let out = engine.evaluate(request).await?;
//! ```

pub mod core {
    pub use guardrail_core::*;
}

pub mod engine {
    pub use guardrail_engine::*;
}

pub mod prelude {
    pub use guardrail_core::error::{ErrorCode, GuardrailError, Result};
    pub use guardrail_core::model::{
        CompositionStrategy, Decision, ExecutionTrace, FallbackStrategy, GuardOutcome, Guardrail,
        Phase, Policy, PolicyGuardrail, PolicyStatus, Tier,
    };
    pub use guardrail_engine::config::{load_from_file, load_from_str, EngineConfig};
    pub use guardrail_engine::invoke::{CancelToken, GuardHandler, GuardInvoker, LocalInvoker};
    pub use guardrail_engine::recorder::{InMemoryTraceSink, TraceSink};
    pub use guardrail_engine::{EvaluateRequest, EvaluateResponse, GuardrailEngine, PolicyRef};
}
