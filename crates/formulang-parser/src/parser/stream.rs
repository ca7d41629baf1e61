//! Token stream wrapper for the hand-written parser.

use std::ops::Range;

use formulang_ast::{FileId, Span, SpannedName};
use formulang_lexer::Token;

use super::ParseError;

/// Token stream with lookahead and span tracking.
///
/// Each token is paired with its byte range from the source, so errors and
/// AST nodes carry accurate locations.
pub struct TokenStream<'src> {
    tokens: &'src [(Token, Range<usize>)],
    pos: usize,
    file: FileId,
}

impl<'src> TokenStream<'src> {
    pub fn new(tokens: &'src [(Token, Range<usize>)], file: FileId) -> Self {
        Self {
            tokens,
            pos: 0,
            file,
        }
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    /// Peek at the nth token ahead without consuming.
    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(tok, _)| tok)
    }

    /// Advance and return the consumed token.
    pub fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|(tok, _)| tok);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Does the current token match the expected one (by discriminant)?
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Consume a specific token or fail.
    pub fn expect(&mut self, expected: Token) -> Result<Span, ParseError> {
        if self.check(&expected) {
            let start = self.pos;
            self.advance();
            Ok(self.span_from(start))
        } else {
            Err(ParseError::expected(
                format!("`{}`", expected),
                self.peek(),
                self.current_span(),
            ))
        }
    }

    /// Consume an identifier or fail.
    pub fn expect_ident(&mut self) -> Result<SpannedName, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                let span = self.current_span();
                self.advance();
                Ok(SpannedName::new(name, span))
            }
            other => Err(ParseError::expected("an identifier", other, self.current_span())),
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn current_pos(&self) -> usize {
        self.pos
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    /// Span from a starting token position to the last consumed token.
    pub fn span_from(&self, start: usize) -> Span {
        let start_byte = self
            .tokens
            .get(start)
            .map(|(_, r)| r.start)
            .unwrap_or_else(|| self.eof_offset());

        let end_byte = if self.pos > start {
            self.tokens
                .get(self.pos - 1)
                .map(|(_, r)| r.end)
                .unwrap_or(start_byte)
        } else {
            start_byte
        };

        Span::new(self.file, start_byte as u32, end_byte as u32)
    }

    /// Span of the current token, or a zero-length span at EOF.
    pub fn current_span(&self) -> Span {
        if let Some((_, range)) = self.tokens.get(self.pos) {
            Span::new(self.file, range.start as u32, range.end as u32)
        } else {
            let end = self.eof_offset() as u32;
            Span::new(self.file, end, end)
        }
    }

    fn eof_offset(&self) -> usize {
        self.tokens.last().map(|(_, r)| r.end).unwrap_or(0)
    }

    /// Skip newline and comma separators.
    pub fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Newline) | Some(Token::Comma)) {
            self.advance();
        }
    }

    /// Skip newlines only (commas stay significant, e.g. inside `[a, b]`).
    pub fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.advance();
        }
    }

    /// Recover to the next top-level declaration keyword.
    ///
    /// Tracks brace depth so keywords inside a broken body do not stop the
    /// scan early.
    pub fn synchronize(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::LBrace => {
                    depth += 1;
                    self.advance();
                }
                Token::RBrace => {
                    self.advance();
                    if depth <= 1 {
                        return;
                    }
                    depth -= 1;
                }
                t if depth == 0 && t.starts_decl() => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Recover inside a block: skip to the next newline/comma separator or to
    /// the block's closing brace (which is left unconsumed).
    pub fn recover_in_block(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Newline | Token::Comma if depth == 0 => return,
                Token::RBrace if depth == 0 => return,
                Token::LBrace => {
                    depth += 1;
                    self.advance();
                }
                Token::RBrace => {
                    depth -= 1;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }
}
