//! Recursive descent parser.
//!
//! ## Architecture
//!
//! - `stream`: token stream wrapper with lookahead and recovery
//! - `error`: [`ParseError`] and its mapping onto diagnostics
//! - `expr`: layered expression parser (additive / multiplicative / primary)
//! - `decl`: declaration parsers, keyword-dispatched, with block items

mod error;
mod stream;

pub use error::ParseError;
use stream::TokenStream;

mod decl;
mod expr;

use std::ops::Range;

use formulang_ast::{Diagnostic, FileId, Module};
use formulang_lexer::Token;

/// Parse a source unit into a module plus diagnostics.
///
/// Lexes, records lexical diagnostics, filters trivia and error tokens, and
/// runs the resilient declaration parser. Never fails outright.
pub fn parse(source: &str, file: FileId) -> (Module, Vec<Diagnostic>) {
    let tokens = formulang_lexer::lex(source);
    let mut diagnostics = formulang_lexer::lex_diagnostics(source, &tokens, file);

    // Error tokens are already diagnosed above; dropping them here gives the
    // grammar the best chance to keep going.
    let significant: Vec<(Token, Range<usize>)> = tokens
        .into_iter()
        .filter(|(t, _)| {
            !t.is_trivia() && !matches!(t, Token::Error | Token::UnterminatedStr)
        })
        .collect();

    let (module, errors) = parse_tokens(&significant, file);
    diagnostics.extend(errors.into_iter().map(ParseError::into_diagnostic));
    (module, diagnostics)
}

/// Parse pre-lexed tokens (trivia already removed) into a module.
pub fn parse_tokens(
    tokens: &[(Token, Range<usize>)],
    file: FileId,
) -> (Module, Vec<ParseError>) {
    let mut stream = TokenStream::new(tokens, file);
    decl::parse_module(&mut stream)
}
