//! Dotted reference paths.
//!
//! References in Formulang source are dot-separated identifier chains:
//! `protein`, `base.nutrients`, `vitamins.premix_a`. The resolver walks them
//! segment by segment against namespaces and declarations.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::span::Span;

/// A dotted reference path with its source span.
///
/// Paths are immutable after parse and support cheap comparison and hashing,
/// which the composition engine relies on for constraint identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefPath {
    segments: Vec<String>,
    pub span: Span,
}

impl RefPath {
    /// Create a path from segments.
    pub fn new(segments: Vec<String>, span: Span) -> Self {
        Self { segments, span }
    }

    /// Create a single-segment path.
    pub fn simple(name: impl Into<String>, span: Span) -> Self {
        Self {
            segments: vec![name.into()],
            span,
        }
    }

    /// Get the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if the path is empty.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment (namespace or bare name).
    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Last segment (leaf name).
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// True for a bare, single-segment reference.
    pub fn is_bare(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for RefPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let p = RefPath::new(
            vec!["base".into(), "nutrients".into()],
            Span::new(0, 0, 14),
        );
        assert_eq!(p.to_string(), "base.nutrients");
        assert_eq!(p.first(), Some("base"));
        assert_eq!(p.last(), Some("nutrients"));
        assert!(!p.is_bare());
    }
}
