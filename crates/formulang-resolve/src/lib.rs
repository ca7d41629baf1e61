// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Semantic analysis for Formulang.
//!
//! Orchestrates the middle of the pipeline: module loading and linking, name
//! resolution, block-context typing, and formula composition. The output is
//! a [`Program`], an immutable fully-linked view that the LP builder and the
//! tooling queries both consume.

pub mod resolve;

pub use resolve::compose::{ComposedConstraint, Composer};
pub use resolve::linker::{SourceResolver, SourceSet};
pub use resolve::names::{DeclRef, LookupError, SymbolKind, Symbols};
pub use resolve::pipeline::{analyze, Program};
