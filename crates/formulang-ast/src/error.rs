//! Diagnostics shared by every pipeline stage.
//!
//! Expected failures never panic and never use exceptions-as-control-flow:
//! each stage returns its partial result alongside a list of [`Diagnostic`]
//! values. The [`DiagnosticFormatter`] renders them with source snippets for
//! terminal output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::foundation::{SourceMap, Span};

/// A single diagnostic with source location and message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Category of this diagnostic
    pub kind: DiagnosticKind,
    /// Severity level
    pub severity: Severity,
    /// Primary source location
    pub span: Span,
    /// Human-readable message
    pub message: String,
    /// Additional labeled spans ("first defined here")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    /// Additional notes or hints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Category of diagnostic, grouped by the stage that detects it.
///
/// # Invariant
///
/// The discriminant values must match the `DIAGNOSTIC_CODES` array indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    // Lexical
    /// String literal not closed before end of line/input
    UnterminatedString = 0,
    /// Block comment not closed before end of input
    UnterminatedComment = 1,
    /// Malformed numeric literal
    BadNumber = 2,
    /// Unsupported escape sequence in a string literal
    BadEscape = 3,
    /// Character with no token interpretation
    UnexpectedChar = 4,

    // Syntactic
    /// Unexpected token where another was required
    UnexpectedToken = 5,
    /// Input ended mid-construct
    UnexpectedEof = 6,
    /// Structurally invalid construct
    InvalidSyntax = 7,

    // Imports
    /// Import path did not resolve to a source unit
    ImportNotFound = 8,
    /// Cyclic import chain
    ImportCycle = 9,

    // Naming
    /// Reference to an undeclared name
    UnknownName = 10,
    /// Name reachable from more than one wildcard import
    AmbiguousName = 11,
    /// Same name declared twice in one module
    DuplicateName = 12,

    // Typing
    /// Reference of the wrong declaration kind for its block context
    WrongKind = 13,
    /// Percent literal outside an ingredient block
    PercentContext = 14,

    // Composition
    /// Cyclic formula composition chain
    ComposeCycle = 15,
    /// `name.min|max` reference to a bound the base never declares
    MissingBound = 16,

    // Semantic
    /// Ingredient used in a formula without a `cost` property
    MissingCost = 17,
    /// Non-template formula without a `batch_size` property
    MissingBatch = 18,
    /// Property not recognized for the declaration kind
    UnknownProperty = 19,
    /// Expression does not lower to a linear form
    Nonlinear = 20,
    /// Attempt to solve a template formula
    TemplateSolve = 21,
}

/// Stable string codes, indexed by `DiagnosticKind` discriminant.
const DIAGNOSTIC_CODES: &[&str] = &[
    "unterminated-string",  // 0
    "unterminated-comment", // 1
    "bad-number",           // 2
    "bad-escape",           // 3
    "unexpected-char",      // 4
    "unexpected-token",     // 5
    "unexpected-eof",       // 6
    "invalid-syntax",       // 7
    "import-not-found",     // 8
    "import-cycle",         // 9
    "unknown-name",         // 10
    "ambiguous-name",       // 11
    "duplicate-name",       // 12
    "wrong-kind",           // 13
    "percent-context",      // 14
    "compose-cycle",        // 15
    "missing-bound",        // 16
    "missing-cost",         // 17
    "missing-batch",        // 18
    "unknown-property",     // 19
    "nonlinear",            // 20
    "template-solve",       // 21
];

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational note
    Info,
    /// Suspicious but not fatal
    Warning,
    /// Compilation cannot fully proceed
    Error,
}

/// Secondary labeled span in a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Error, span, message.into())
    }

    /// Create a warning diagnostic.
    pub fn warning(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Warning, span, message.into())
    }

    /// Create an informational diagnostic.
    pub fn info(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Info, span, message.into())
    }

    fn with_severity(kind: DiagnosticKind, severity: Severity, span: Span, message: String) -> Self {
        Self {
            kind,
            severity,
            span,
            message,
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Add a secondary labeled span.
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            message: message.into(),
        });
        self
    }

    /// Add a note or hint.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Is this diagnostic an error?
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl DiagnosticKind {
    /// Stable string code for this kind.
    pub fn code(self) -> &'static str {
        DIAGNOSTIC_CODES[self as usize]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {}",
            self.severity,
            self.kind.code(),
            self.message
        )
    }
}

impl std::error::Error for Diagnostic {}

/// Formats diagnostics with source context.
///
/// Produces the familiar compiler layout: header, `--> name:line:col`
/// location, the offending source line, and a caret underline, followed by
/// secondary labels and notes.
pub struct DiagnosticFormatter<'a> {
    sources: &'a SourceMap,
}

impl<'a> DiagnosticFormatter<'a> {
    /// Create a formatter over a source map.
    pub fn new(sources: &'a SourceMap) -> Self {
        Self { sources }
    }

    /// Format a single diagnostic.
    pub fn format(&self, diag: &Diagnostic) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{}[{}]: {}\n",
            diag.severity,
            diag.kind.code(),
            diag.message
        ));

        let file = self.sources.file(&diag.span);
        let (line, col) = self.sources.line_col(&diag.span);
        output.push_str(&format!("  --> {}:{}:{}\n", file.name, line, col));

        if let Some(source_line) = file.line_text(line) {
            let source_line = source_line.trim_end_matches('\n');
            output.push_str("   |\n");
            output.push_str(&format!("{:3} | {}\n", line, source_line));

            let start_col = col as usize;
            let span_len = diag.span.len() as usize;
            let end_col = (start_col + span_len).min(source_line.len() + 1);
            let underline = " ".repeat(start_col.saturating_sub(1))
                + &"^".repeat(end_col.saturating_sub(start_col).max(1));
            output.push_str(&format!("   | {}\n", underline));
        }

        for label in &diag.labels {
            let (l, c) = self.sources.line_col(&label.span);
            let name = &self.sources.file(&label.span).name;
            output.push_str(&format!("   = note: {} (at {}:{}:{})\n", label.message, name, l, c));
        }

        for note in &diag.notes {
            output.push_str(&format!("   = help: {}\n", note));
        }

        output
    }

    /// Format multiple diagnostics separated by blank lines.
    pub fn format_all(&self, diags: &[Diagnostic]) -> String {
        diags
            .iter()
            .map(|d| self.format(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sources() -> SourceMap {
        let mut sources = SourceMap::new();
        sources.add_file("feed.fm", "nutrient protein {}\nnutrient protein {}");
        sources
    }

    #[test]
    fn test_error_creation() {
        let d = Diagnostic::error(
            DiagnosticKind::DuplicateName,
            Span::new(0, 29, 36),
            "duplicate nutrient 'protein'",
        );
        assert_eq!(d.severity, Severity::Error);
        assert!(d.is_error());
        assert_eq!(d.kind.code(), "duplicate-name");
    }

    #[test]
    fn test_builder_chaining() {
        let d = Diagnostic::error(
            DiagnosticKind::DuplicateName,
            Span::new(0, 29, 36),
            "duplicate nutrient 'protein'",
        )
        .with_label(Span::new(0, 9, 16), "first declared here")
        .with_note("rename one of the declarations");
        assert_eq!(d.labels.len(), 1);
        assert_eq!(d.notes.len(), 1);
    }

    #[test]
    fn test_warning_not_error() {
        let d = Diagnostic::warning(
            DiagnosticKind::MissingBound,
            Span::new(0, 0, 1),
            "base declares no lower bound",
        );
        assert!(!d.is_error());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_all_kinds_have_codes() {
        // Exercises the discriminant/table pairing for the boundary variants.
        assert_eq!(DiagnosticKind::UnterminatedString.code(), "unterminated-string");
        assert_eq!(DiagnosticKind::ImportCycle.code(), "import-cycle");
        assert_eq!(DiagnosticKind::PercentContext.code(), "percent-context");
        assert_eq!(DiagnosticKind::TemplateSolve.code(), "template-solve");
    }

    #[test]
    fn test_formatter_snippet() {
        let sources = test_sources();
        let d = Diagnostic::error(
            DiagnosticKind::DuplicateName,
            Span::new(0, 29, 36),
            "duplicate nutrient 'protein'",
        )
        .with_label(Span::new(0, 9, 16), "first declared here");

        let formatted = DiagnosticFormatter::new(&sources).format(&d);
        assert!(formatted.contains("error[duplicate-name]"));
        assert!(formatted.contains("feed.fm:2:10"));
        assert!(formatted.contains("nutrient protein {}"));
        assert!(formatted.contains("^^^^^^^"));
        assert!(formatted.contains("first declared here"));
    }
}
