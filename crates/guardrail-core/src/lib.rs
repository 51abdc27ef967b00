//! Guardrail core: the data model, verdict/trace types, composition
//! expressions and the error surface shared by the engine and its callers.
//!
//! This crate carries no runtime or transport dependencies so the same
//! contracts can be used by the engine, admin tooling and tests.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `GuardrailError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod expr;
pub mod model;

/// Shared result type.
pub use error::{ErrorCode, GuardrailError, Result};
