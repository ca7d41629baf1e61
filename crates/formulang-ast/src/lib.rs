// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! AST types for the Formulang feed-formulation language.
//!
//! This crate contains the source-location foundation ([`Span`],
//! [`SourceMap`]), all AST node definitions, and the diagnostic types shared
//! by every stage of the pipeline.

pub mod ast;
pub mod error;
pub mod foundation;

pub use error::{Diagnostic, DiagnosticFormatter, DiagnosticKind, Label, Severity};
pub use foundation::{FileId, RefPath, SourceFile, SourceMap, Span};

pub use ast::*;
