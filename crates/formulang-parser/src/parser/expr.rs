//! Expression parser.
//!
//! Layered precedence: unary `-` (numbers only) and atoms, then `* /`, then
//! `+ -`; parentheses group. Newlines end an expression except directly after
//! a binary operator, where continuation is unambiguous.

use formulang_ast::{BinOp, Expr, RefPath};
use formulang_lexer::Token;

use super::{ParseError, TokenStream};

/// Parse a full expression.
pub fn parse_expr(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let left = parse_multiplicative(stream)?;
    parse_additive_tail(stream, left)
}

/// Continue an expression whose leading primary was already parsed by the
/// caller (the block-item parser reads a reference first to classify
/// composition references).
pub fn parse_expr_from(stream: &mut TokenStream, lead: Expr) -> Result<Expr, ParseError> {
    let left = parse_multiplicative_tail(stream, lead)?;
    parse_additive_tail(stream, left)
}

fn parse_additive_tail(stream: &mut TokenStream, mut left: Expr) -> Result<Expr, ParseError> {
    loop {
        let op = match stream.peek() {
            Some(Token::Plus) => BinOp::Add,
            Some(Token::Minus) => BinOp::Sub,
            _ => break,
        };
        stream.advance();
        stream.skip_newlines();
        let right = parse_multiplicative(stream)?;
        let span = left.span().merge(&right.span());
        left = Expr::Binary {
            span,
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_multiplicative(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let left = parse_primary(stream)?;
    parse_multiplicative_tail(stream, left)
}

fn parse_multiplicative_tail(stream: &mut TokenStream, mut left: Expr) -> Result<Expr, ParseError> {
    loop {
        let op = match stream.peek() {
            Some(Token::Star) => BinOp::Mul,
            Some(Token::Slash) => BinOp::Div,
            _ => break,
        };
        stream.advance();
        stream.skip_newlines();
        let right = parse_primary(stream)?;
        let span = left.span().merge(&right.span());
        left = Expr::Binary {
            span,
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_primary(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    match stream.peek() {
        Some(Token::Number(value)) => {
            let value = *value;
            let span = stream.current_span();
            stream.advance();
            Ok(Expr::Num { span, value })
        }
        Some(Token::Percent(value)) => {
            let value = *value;
            let span = stream.current_span();
            stream.advance();
            Ok(Expr::Percent { span, value })
        }
        Some(Token::Minus) => {
            // Unary minus applies to numeric literals only.
            let start = stream.current_pos();
            stream.advance();
            match stream.peek() {
                Some(Token::Number(value)) => {
                    let value = *value;
                    stream.advance();
                    Ok(Expr::Num {
                        span: stream.span_from(start),
                        value: -value,
                    })
                }
                Some(Token::Percent(value)) => {
                    let value = *value;
                    stream.advance();
                    Ok(Expr::Percent {
                        span: stream.span_from(start),
                        value: -value,
                    })
                }
                other => Err(ParseError::expected(
                    "a number after unary `-`",
                    other,
                    stream.current_span(),
                )),
            }
        }
        Some(Token::Ident(_)) => {
            let path = parse_plain_path(stream)?;
            Ok(Expr::Ref(path))
        }
        Some(Token::LParen) => {
            let start = stream.current_pos();
            stream.advance();
            stream.skip_newlines();
            let inner = parse_expr(stream)?;
            stream.skip_newlines();
            stream.expect(Token::RParen)?;
            Ok(Expr::Paren {
                span: stream.span_from(start),
                inner: Box::new(inner),
            })
        }
        other => Err(ParseError::expected(
            "a number, reference, or `(`",
            other,
            stream.current_span(),
        )),
    }
}

/// Parse a dotted identifier path with no selection or bound segments.
pub fn parse_plain_path(stream: &mut TokenStream) -> Result<RefPath, ParseError> {
    let start = stream.current_pos();
    let first = stream.expect_ident()?;
    let mut segments = vec![first.text];

    while stream.check(&Token::Dot) {
        // Only consume the dot when an identifier follows; `x.[...]` and
        // `x.min` are handled by the block-item classifier.
        if !matches!(stream.peek_nth(1), Some(Token::Ident(_))) {
            break;
        }
        stream.advance();
        let next = stream.expect_ident()?;
        segments.push(next.text);
    }

    Ok(RefPath::new(segments, stream.span_from(start)))
}
