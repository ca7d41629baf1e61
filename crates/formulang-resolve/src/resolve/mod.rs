//! Resolution passes.
//!
//! - `linker`: import loading, cycle detection, source set plumbing
//! - `names`: symbol tables and scoped reference resolution
//! - `typing`: block-context checks and property validation
//! - `compose`: composition reference expansion with override collapse
//! - `pipeline`: runs the passes in order and assembles the [`Program`]

pub mod compose;
pub mod linker;
pub mod names;
pub mod pipeline;
pub mod typing;
