// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Lexical analysis for Formulang.
//!
//! Tokenization of `.fm` source code using logos.
//!
//! # Design
//!
//! - `Token` — all Formulang token types (keywords, operators, literals)
//! - Comments are *tokens*, not skipped: tooling queries (hover, completions)
//!   need their ranges. The parser filters them out.
//! - Newlines are tokens too; blocks accept newline-or-comma as separators.
//! - Unterminated strings and block comments become recoverable tokens so a
//!   broken buffer still lexes to the end.
//!
//! # Examples
//!
//! ```
//! # use formulang_lexer::{lex, Token};
//! let tokens = lex("protein min 20 max 24");
//! assert_eq!(tokens[0].0, Token::Ident("protein".into()));
//! assert_eq!(tokens[1].0, Token::Min);
//! ```

use std::ops::Range;

use logos::{Lexer, Logos};

use formulang_ast::{Diagnostic, DiagnosticKind, FileId, Span};

/// Formulang token.
///
/// Keyword set: `nutrient ingredient formula template import as min max
/// group`. The block aliases `nutrients|nuts` and `ingredients|ings` are
/// *not* reserved; the parser recognizes them contextually, so `nuts` stays
/// a legal user identifier elsewhere.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    // === Keywords ===
    #[token("nutrient")]
    Nutrient,
    #[token("ingredient")]
    Ingredient,
    #[token("formula")]
    Formula,
    #[token("template")]
    Template,
    #[token("import")]
    Import,
    #[token("group")]
    Group,
    #[token("as")]
    As,
    #[token("min")]
    Min,
    #[token("max")]
    Max,

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,

    // === Delimiters ===
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    /// Statement/item separator; blocks accept newline or comma
    #[token("\n")]
    Newline,

    // === Literals ===
    /// Numeric literal. The sign is not part of the token; unary minus is
    /// handled by the parser (and applies to numbers only).
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    /// `%`-suffixed numeric literal, e.g. `50%`
    #[regex(r"[0-9]+(\.[0-9]+)?%", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<f64>().ok()
    })]
    Percent(f64),

    /// Double-quoted string with `\" \\ \n \t \r \xHH \uHHHH` escapes
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    Str(String),

    /// String opened but not closed before end of line/input
    #[regex(r#""([^"\\\n]|\\.)*"#)]
    UnterminatedStr,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    /// `// ...` comment, kept for tooling position mapping
    #[regex(r"//[^\n]*")]
    LineComment,

    /// `/* ... */` comment; an unterminated one fails the callback and
    /// surfaces as an `Error` token spanning to end of input
    #[token("/*", lex_block_comment)]
    BlockComment,

    /// Anything the rules above reject: a number with too many dots, or a
    /// character with no token interpretation
    #[regex(r"[0-9]+(\.[0-9]+){2,}")]
    #[regex(r".", priority = 0)]
    Error,
}

/// Consume a block comment body. Returns false when the comment never closes,
/// which logos turns into an error over the whole remaining input.
fn lex_block_comment(lex: &mut Lexer<Token>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => {
            lex.bump(lex.remainder().len());
            false
        }
    }
}

/// Unescape a string literal body.
fn unescape_string(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 {
                    return None;
                }
                let code = u8::from_str_radix(&hex, 16).ok()?;
                result.push(code as char);
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                result.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(result)
}

impl Token {
    /// Comments carry no syntactic weight; the parser drops them.
    pub fn is_trivia(&self) -> bool {
        matches!(self, Token::LineComment | Token::BlockComment)
    }

    /// Does this token open a top-level declaration?
    pub fn starts_decl(&self) -> bool {
        matches!(
            self,
            Token::Nutrient
                | Token::Ingredient
                | Token::Formula
                | Token::Template
                | Token::Import
                | Token::Group
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Nutrient => write!(f, "nutrient"),
            Token::Ingredient => write!(f, "ingredient"),
            Token::Formula => write!(f, "formula"),
            Token::Template => write!(f, "template"),
            Token::Import => write!(f, "import"),
            Token::Group => write!(f, "group"),
            Token::As => write!(f, "as"),
            Token::Min => write!(f, "min"),
            Token::Max => write!(f, "max"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Newline => write!(f, "newline"),
            Token::Number(n) => write!(f, "{}", n),
            Token::Percent(n) => write!(f, "{}%", n),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::UnterminatedStr => write!(f, "unterminated string"),
            Token::Ident(name) => write!(f, "{}", name),
            Token::LineComment | Token::BlockComment => write!(f, "comment"),
            Token::Error => write!(f, "invalid token"),
        }
    }
}

/// Tokenize a source unit into `(token, byte_range)` pairs.
///
/// Never fails: unrecognized input becomes [`Token::Error`] entries so the
/// stream always covers the whole buffer.
pub fn lex(source: &str) -> Vec<(Token, Range<usize>)> {
    Token::lexer(source)
        .spanned()
        .map(|(result, range)| match result {
            Ok(token) => (token, range),
            Err(()) => (Token::Error, range),
        })
        .collect()
}

/// Classify the recoverable error tokens of a lexed stream into diagnostics.
pub fn lex_diagnostics(
    source: &str,
    tokens: &[(Token, Range<usize>)],
    file: FileId,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (token, range) in tokens {
        let span = Span::new(file, range.start as u32, range.end as u32);
        match token {
            Token::UnterminatedStr => {
                diagnostics.push(Diagnostic::error(
                    DiagnosticKind::UnterminatedString,
                    span,
                    "unterminated string literal",
                ));
            }
            Token::Error => {
                let snippet = &source[range.clone()];
                let diag = if snippet.starts_with("/*") {
                    Diagnostic::error(
                        DiagnosticKind::UnterminatedComment,
                        span,
                        "unterminated block comment",
                    )
                } else if snippet.starts_with('"') {
                    Diagnostic::error(
                        DiagnosticKind::BadEscape,
                        span,
                        "unsupported escape sequence in string literal",
                    )
                } else if snippet.starts_with(|c: char| c.is_ascii_digit()) {
                    Diagnostic::error(
                        DiagnosticKind::BadNumber,
                        span,
                        format!("malformed number `{}`", snippet),
                    )
                } else {
                    Diagnostic::error(
                        DiagnosticKind::UnexpectedChar,
                        span,
                        format!("unexpected character `{}`", snippet),
                    )
                };
                diagnostics.push(diag);
            }
            _ => {}
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test helper: lex and keep tokens only.
    fn toks(source: &str) -> Vec<Token> {
        lex(source).into_iter().map(|(t, _)| t).collect()
    }

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_owned())
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            toks("nutrient ingredient formula template import group as min max"),
            vec![
                Token::Nutrient,
                Token::Ingredient,
                Token::Formula,
                Token::Template,
                Token::Import,
                Token::Group,
                Token::As,
                Token::Min,
                Token::Max,
            ]
        );
    }

    #[test]
    fn test_block_aliases_are_identifiers() {
        assert_eq!(
            toks("nutrients nuts ingredients ings"),
            vec![
                ident("nutrients"),
                ident("nuts"),
                ident("ingredients"),
                ident("ings"),
            ]
        );
    }

    #[test]
    fn test_numbers_and_percents() {
        assert_eq!(
            toks("100 8.5 0.005 50% 12.5%"),
            vec![
                Token::Number(100.0),
                Token::Number(8.5),
                Token::Number(0.005),
                Token::Percent(50.0),
                Token::Percent(12.5),
            ]
        );
    }

    #[test]
    fn test_negative_number_is_minus_then_number() {
        assert_eq!(toks("-20"), vec![Token::Minus, Token::Number(20.0)]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            toks(r#""Crude Protein" "a\nb" "\x41" "A""#),
            vec![
                Token::Str("Crude Protein".into()),
                Token::Str("a\nb".into()),
                Token::Str("A".into()),
                Token::Str("A".into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = lex("name \"oops\nprotein");
        assert_eq!(tokens[1].0, Token::UnterminatedStr);
        // The stream recovers on the next line.
        assert!(tokens.iter().any(|(t, _)| *t == ident("protein")));
    }

    #[test]
    fn test_operators_and_delimiters() {
        assert_eq!(
            toks("+ - * / . : , { } [ ] ( )"),
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::Dot,
                Token::Colon,
                Token::Comma,
                Token::LBrace,
                Token::RBrace,
                Token::LBracket,
                Token::RBracket,
                Token::LParen,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_comments_are_tokens() {
        assert_eq!(
            toks("corn // yellow dent\n/* bulk */ wheat"),
            vec![
                ident("corn"),
                Token::LineComment,
                Token::Newline,
                Token::BlockComment,
                ident("wheat"),
            ]
        );
    }

    #[test]
    fn test_unterminated_block_comment() {
        let source = "corn /* never closed";
        let tokens = lex(source);
        assert_eq!(tokens[0].0, ident("corn"));
        assert_eq!(tokens[1].0, Token::Error);
        assert_eq!(tokens[1].1.end, source.len());

        let diags = lex_diagnostics(source, &tokens, 0);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnterminatedComment);
    }

    #[test]
    fn test_span_roundtrip() {
        // Every token's range must slice back to its lexeme.
        let source = "formula starter {\n  batch 1000\n  nuts { protein min 20 }\n}";
        for (token, range) in lex(source) {
            let slice = &source[range];
            match token {
                Token::Ident(ref name) => assert_eq!(slice, name.as_str()),
                Token::Number(n) => assert_eq!(slice.parse::<f64>().unwrap(), n),
                Token::Min => assert_eq!(slice, "min"),
                Token::LBrace => assert_eq!(slice, "{"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_malformed_number() {
        let source = "protein 1.2.3";
        let tokens = lex(source);
        assert_eq!(tokens[1].0, Token::Error);
        let diags = lex_diagnostics(source, &tokens, 0);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::BadNumber);
    }

    #[test]
    fn test_unexpected_char_diagnostic() {
        let source = "corn @ wheat";
        let tokens = lex(source);
        let diags = lex_diagnostics(source, &tokens, 0);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnexpectedChar);
        assert_eq!(diags[0].span.start, 5);
    }

    #[test]
    fn test_dotted_path() {
        assert_eq!(
            toks("base.nutrients.[protein, energy]"),
            vec![
                ident("base"),
                Token::Dot,
                ident("nutrients"),
                Token::Dot,
                Token::LBracket,
                ident("protein"),
                Token::Comma,
                ident("energy"),
                Token::RBracket,
            ]
        );
    }
}
