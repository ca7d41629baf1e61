//! Foundation types shared across the pipeline.

pub mod path;
pub mod span;

pub use path::RefPath;
pub use span::{FileId, SourceFile, SourceMap, Span};
