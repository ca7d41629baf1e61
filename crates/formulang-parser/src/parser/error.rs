//! Parse error types and their diagnostic mapping.

use std::fmt;

use formulang_ast::{Diagnostic, DiagnosticKind, Span};
use formulang_lexer::Token;

/// Parse error with source location and context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
    pub message: String,
}

/// Category of parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A specific token was required and something else appeared
    UnexpectedToken,
    /// Input ended while a construct was incomplete
    UnexpectedEof,
    /// Tokens are present but violate the grammar structurally
    InvalidSyntax,
}

impl ParseError {
    /// "expected X, found Y" at a span.
    pub fn expected(expected: impl fmt::Display, found: Option<&Token>, span: Span) -> Self {
        let message = match found {
            Some(token) => format!("expected {}, found `{}`", expected, token),
            None => format!("expected {}, found end of input", expected),
        };
        Self {
            kind: if found.is_none() {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::UnexpectedToken
            },
            span,
            message,
        }
    }

    /// "unexpected X <context>" at a span.
    pub fn unexpected(found: Option<&Token>, context: &str, span: Span) -> Self {
        let message = match found {
            Some(token) => format!("unexpected `{}` {}", token, context),
            None => format!("unexpected end of input {}", context),
        };
        Self {
            kind: if found.is_none() {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::UnexpectedToken
            },
            span,
            message,
        }
    }

    /// Structural grammar violation.
    pub fn invalid(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::InvalidSyntax,
            span,
            message: message.into(),
        }
    }

    /// Convert into the pipeline-wide diagnostic type.
    pub fn into_diagnostic(self) -> Diagnostic {
        let kind = match self.kind {
            ParseErrorKind::UnexpectedToken => DiagnosticKind::UnexpectedToken,
            ParseErrorKind::UnexpectedEof => DiagnosticKind::UnexpectedEof,
            ParseErrorKind::InvalidSyntax => DiagnosticKind::InvalidSyntax,
        };
        Diagnostic::error(kind, self.span, self.message)
    }
}
