//! Policy Store.
//!
//! Compiles authored policies into immutable `CompiledPolicy` values
//! (validated bindings, parsed custom expressions, content hash) and answers
//! lookups by id or by the active-version selection rule.

pub mod compile;
pub mod store;

pub use compile::{compile, content_hash, CompiledPolicy};
pub use store::PolicyStore;
