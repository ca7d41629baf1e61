//! Declaration parsers.
//!
//! Top level dispatches on the declaration keyword. Inside formula blocks,
//! an item that starts with an identifier is first read as a raw reference
//! path; its shape decides whether it is a composition reference
//! (`base.nutrients`, `base.nutrients.[x,y]`, `base.nutrients.protein.min`,
//! `grains.[corn,wheat]`) or the leading term of a constraint expression.

use formulang_ast::{
    BlockItem, BlockKind, Bound, BoundKind, Bounds, CompositionRef, ConstraintItem, Decl, Expr,
    FormulaDecl, GroupDecl, Import, ImportBinding, IngredientDecl, Module, NutrientDecl,
    NutrientValue, Property, PropertyValue, RefPath, Span, SpannedName,
};
use formulang_lexer::Token;

use super::expr::{parse_expr, parse_expr_from, parse_plain_path};
use super::{ParseError, TokenStream};

/// Parse every declaration in a source unit, recovering per item.
pub fn parse_module(stream: &mut TokenStream) -> (Module, Vec<ParseError>) {
    let mut imports = Vec::new();
    let mut decls = Vec::new();
    let mut errors = Vec::new();

    loop {
        stream.skip_separators();
        match stream.peek() {
            None => break,
            Some(Token::Import) => match parse_import(stream) {
                Ok(import) => imports.push(import),
                Err(e) => {
                    errors.push(e);
                    stream.synchronize();
                }
            },
            Some(Token::Nutrient) => match parse_nutrient(stream) {
                Ok(decl) => decls.push(Decl::Nutrient(decl)),
                Err(e) => {
                    errors.push(e);
                    stream.synchronize();
                }
            },
            Some(Token::Ingredient) => match parse_ingredient(stream) {
                Ok(decl) => decls.push(Decl::Ingredient(decl)),
                Err(e) => {
                    errors.push(e);
                    stream.synchronize();
                }
            },
            Some(Token::Group) => match parse_group(stream) {
                Ok(decl) => decls.push(Decl::Group(decl)),
                Err(e) => {
                    errors.push(e);
                    stream.synchronize();
                }
            },
            Some(Token::Formula) => match parse_formula(stream, false, &mut errors) {
                Ok(decl) => decls.push(Decl::Formula(decl)),
                Err(e) => {
                    errors.push(e);
                    stream.synchronize();
                }
            },
            Some(Token::Template) => {
                stream.advance();
                stream.skip_newlines();
                if stream.check(&Token::Formula) {
                    match parse_formula(stream, true, &mut errors) {
                        Ok(decl) => decls.push(Decl::Formula(decl)),
                        Err(e) => {
                            errors.push(e);
                            stream.synchronize();
                        }
                    }
                } else {
                    errors.push(ParseError::expected(
                        "`formula` after `template`",
                        stream.peek(),
                        stream.current_span(),
                    ));
                    stream.synchronize();
                }
            }
            Some(_) => {
                errors.push(ParseError::unexpected(
                    stream.peek(),
                    "at top level; expected a declaration",
                    stream.current_span(),
                ));
                stream.synchronize();
            }
        }
    }

    (
        Module {
            file: stream.file(),
            imports,
            decls,
        },
        errors,
    )
}

/// `import PATH [as NAME] [{ * } | { a, b }]`
fn parse_import(stream: &mut TokenStream) -> Result<Import, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Import)?;

    let path_start = stream.current_pos();
    let path = if let Some(Token::Str(path)) = stream.peek() {
        let path = path.clone();
        stream.advance();
        path
    } else {
        // Bare path: `./lib/minerals.fm` lexes as dots, slashes, idents.
        let mut path = String::new();
        loop {
            match stream.peek() {
                Some(Token::Ident(name)) => {
                    path.push_str(name);
                    stream.advance();
                }
                Some(Token::Dot) => {
                    path.push('.');
                    stream.advance();
                }
                Some(Token::Slash) => {
                    path.push('/');
                    stream.advance();
                }
                Some(Token::Minus) => {
                    path.push('-');
                    stream.advance();
                }
                _ => break,
            }
        }
        if path.is_empty() {
            return Err(ParseError::expected(
                "an import path",
                stream.peek(),
                stream.current_span(),
            ));
        }
        path
    };
    let path_span = stream.span_from(path_start);

    let binding = if stream.check(&Token::As) {
        stream.advance();
        ImportBinding::Alias(stream.expect_ident()?)
    } else if stream.check(&Token::LBrace) {
        stream.advance();
        stream.skip_separators();
        if stream.check(&Token::Star) {
            stream.advance();
            stream.skip_separators();
            stream.expect(Token::RBrace)?;
            ImportBinding::Wildcard
        } else {
            let mut names = Vec::new();
            loop {
                stream.skip_separators();
                if stream.check(&Token::RBrace) {
                    stream.advance();
                    break;
                }
                names.push(stream.expect_ident()?);
            }
            ImportBinding::Names(names)
        }
    } else {
        ImportBinding::Namespace
    };

    Ok(Import {
        span: stream.span_from(start),
        path,
        path_span,
        binding,
    })
}

/// `nutrient NAME { props }`
fn parse_nutrient(stream: &mut TokenStream) -> Result<NutrientDecl, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Nutrient)?;
    let name = stream.expect_ident()?;
    stream.skip_newlines();
    stream.expect(Token::LBrace)?;

    let mut props = Vec::new();
    loop {
        stream.skip_separators();
        if stream.check(&Token::RBrace) {
            stream.advance();
            break;
        }
        props.push(parse_property(stream)?);
    }

    Ok(NutrientDecl {
        span: stream.span_from(start),
        name,
        props,
    })
}

/// `ingredient NAME { props, nutrients { ref value ... } }`
fn parse_ingredient(stream: &mut TokenStream) -> Result<IngredientDecl, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Ingredient)?;
    let name = stream.expect_ident()?;
    stream.skip_newlines();
    stream.expect(Token::LBrace)?;

    let mut props = Vec::new();
    let mut values = Vec::new();
    loop {
        stream.skip_separators();
        match stream.peek() {
            Some(Token::RBrace) => {
                stream.advance();
                break;
            }
            Some(Token::Ident(text)) => {
                if block_alias(text) == Some(BlockKind::Nutrients)
                    && matches!(stream.peek_nth(1), Some(Token::LBrace))
                {
                    stream.advance();
                    stream.expect(Token::LBrace)?;
                    loop {
                        stream.skip_separators();
                        if stream.check(&Token::RBrace) {
                            stream.advance();
                            break;
                        }
                        values.push(parse_nutrient_value(stream)?);
                    }
                } else {
                    props.push(parse_property(stream)?);
                }
            }
            other => {
                return Err(ParseError::expected(
                    "a property or `nutrients` block",
                    other,
                    stream.current_span(),
                ));
            }
        }
    }

    Ok(IngredientDecl {
        span: stream.span_from(start),
        name,
        props,
        values,
    })
}

/// One `nutrient value` entry in an ingredient's nutrients block.
fn parse_nutrient_value(stream: &mut TokenStream) -> Result<NutrientValue, ParseError> {
    let start = stream.current_pos();
    let nutrient = parse_plain_path(stream)?;
    let value = parse_signed_number(stream)?;
    Ok(NutrientValue {
        span: stream.span_from(start),
        nutrient,
        value,
    })
}

/// `group NAME { a, b, c }`
fn parse_group(stream: &mut TokenStream) -> Result<GroupDecl, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Group)?;
    let name = stream.expect_ident()?;
    stream.skip_newlines();
    stream.expect(Token::LBrace)?;

    let mut members = Vec::new();
    loop {
        stream.skip_separators();
        if stream.check(&Token::RBrace) {
            stream.advance();
            break;
        }
        members.push(stream.expect_ident()?);
    }

    Ok(GroupDecl {
        span: stream.span_from(start),
        name,
        members,
    })
}

/// `[template] formula NAME { props, nutrients { ... }, ingredients { ... } }`
///
/// Item failures inside the constraint blocks are recorded into `errors` and
/// recovery skips to the next separator, so the rest of the formula survives.
fn parse_formula(
    stream: &mut TokenStream,
    is_template: bool,
    errors: &mut Vec<ParseError>,
) -> Result<FormulaDecl, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Formula)?;
    let name = stream.expect_ident()?;
    stream.skip_newlines();
    stream.expect(Token::LBrace)?;

    let mut props = Vec::new();
    let mut nutrient_items = Vec::new();
    let mut ingredient_items = Vec::new();

    loop {
        stream.skip_separators();
        match stream.peek() {
            Some(Token::RBrace) => {
                stream.advance();
                break;
            }
            Some(Token::Ident(text)) => match block_alias(text) {
                Some(block) if matches!(stream.peek_nth(1), Some(Token::LBrace)) => {
                    stream.advance();
                    stream.expect(Token::LBrace)?;
                    let items = match block {
                        BlockKind::Nutrients => &mut nutrient_items,
                        BlockKind::Ingredients => &mut ingredient_items,
                    };
                    loop {
                        stream.skip_separators();
                        if stream.check(&Token::RBrace) {
                            stream.advance();
                            break;
                        }
                        if stream.at_end() {
                            return Err(ParseError::expected(
                                "`}`",
                                None,
                                stream.current_span(),
                            ));
                        }
                        match parse_block_item(stream, block) {
                            Ok(item) => items.push(item),
                            Err(e) => {
                                errors.push(e);
                                stream.recover_in_block();
                            }
                        }
                    }
                }
                _ => props.push(parse_property(stream)?),
            },
            other => {
                return Err(ParseError::expected(
                    "a property, `nutrients`, or `ingredients` block",
                    other,
                    stream.current_span(),
                ));
            }
        }
    }

    Ok(FormulaDecl {
        span: stream.span_from(start),
        name,
        is_template,
        props,
        nutrient_items,
        ingredient_items,
    })
}

/// `name value` with legacy `name: value`.
fn parse_property(stream: &mut TokenStream) -> Result<Property, ParseError> {
    let start = stream.current_pos();
    let name = stream.expect_ident()?;
    if stream.check(&Token::Colon) {
        stream.advance();
    }

    let value = match stream.peek() {
        Some(Token::Str(s)) => {
            let v = PropertyValue::Str(s.clone());
            stream.advance();
            v
        }
        Some(Token::Number(_)) | Some(Token::Minus) => {
            PropertyValue::Num(parse_signed_number(stream)?)
        }
        Some(Token::Ident(s)) => {
            let v = PropertyValue::Ident(s.clone());
            stream.advance();
            v
        }
        other => {
            return Err(ParseError::expected(
                format!("a value for property `{}`", name.text),
                other,
                stream.current_span(),
            ));
        }
    };

    Ok(Property {
        span: stream.span_from(start),
        name: name.text,
        value,
    })
}

/// A number literal with optional leading `-`.
fn parse_signed_number(stream: &mut TokenStream) -> Result<f64, ParseError> {
    let negative = if stream.check(&Token::Minus) {
        stream.advance();
        true
    } else {
        false
    };
    match stream.peek() {
        Some(Token::Number(value)) => {
            let value = *value;
            stream.advance();
            Ok(if negative { -value } else { value })
        }
        other => Err(ParseError::expected("a number", other, stream.current_span())),
    }
}

// === Block items ===

/// A segment of a raw (not yet classified) reference path.
enum RawSegment {
    Ident(SpannedName),
    Selection(Vec<SpannedName>),
    Bound(BoundKind),
}

/// Parse one item of a formula's nutrients/ingredients block.
fn parse_block_item(stream: &mut TokenStream, block: BlockKind) -> Result<BlockItem, ParseError> {
    let start = stream.current_pos();

    if !matches!(stream.peek(), Some(Token::Ident(_))) {
        // Leading number or parenthesis: plain constraint expression.
        let expr = parse_expr(stream)?;
        let bounds = parse_bounds(stream)?;
        return Ok(BlockItem::Constraint(ConstraintItem {
            span: stream.span_from(start),
            expr,
            bounds,
        }));
    }

    let segments = parse_raw_reference(stream)?;

    if let Some(include) = classify_composition(stream, &segments, block, start)? {
        // A composition reference is the whole item; bounds cannot follow.
        if stream.check(&Token::Min) || stream.check(&Token::Max) {
            return Err(ParseError::invalid(
                "composition references take no bounds; restate the constraint instead",
                stream.current_span(),
            ));
        }
        return Ok(BlockItem::Include(include));
    }

    // Plain path: use it as the leading term of a constraint expression.
    let path = plain_path_from(&segments, stream.span_from(start))?;
    let expr = parse_expr_from(stream, Expr::Ref(path))?;
    let bounds = parse_bounds(stream)?;
    Ok(BlockItem::Constraint(ConstraintItem {
        span: stream.span_from(start),
        expr,
        bounds,
    }))
}

/// Parse `ident (. (ident | [list] | min | max))*`.
fn parse_raw_reference(stream: &mut TokenStream) -> Result<Vec<RawSegment>, ParseError> {
    let mut segments = vec![RawSegment::Ident(stream.expect_ident()?)];

    while stream.check(&Token::Dot) {
        stream.advance();
        match stream.peek() {
            Some(Token::Ident(_)) => segments.push(RawSegment::Ident(stream.expect_ident()?)),
            Some(Token::Min) => {
                segments.push(RawSegment::Bound(BoundKind::Min));
                stream.advance();
            }
            Some(Token::Max) => {
                segments.push(RawSegment::Bound(BoundKind::Max));
                stream.advance();
            }
            Some(Token::LBracket) => {
                stream.advance();
                let mut names = Vec::new();
                loop {
                    stream.skip_separators();
                    if stream.check(&Token::RBracket) {
                        stream.advance();
                        break;
                    }
                    names.push(stream.expect_ident()?);
                }
                segments.push(RawSegment::Selection(names));
            }
            other => {
                return Err(ParseError::expected(
                    "an identifier, `[`, `min`, or `max` after `.`",
                    other,
                    stream.current_span(),
                ));
            }
        }
    }

    Ok(segments)
}

/// Decide whether a raw reference is a composition reference.
///
/// Returns `Ok(None)` when the path is a plain dotted identifier chain and
/// should be treated as a constraint expression instead.
fn classify_composition(
    stream: &TokenStream,
    segments: &[RawSegment],
    enclosing: BlockKind,
    start: usize,
) -> Result<Option<CompositionRef>, ParseError> {
    let span = stream.span_from(start);

    // Locate a block keyword among the non-head segments.
    let block_pos = segments.iter().enumerate().skip(1).find_map(|(i, seg)| {
        if let RawSegment::Ident(name) = seg {
            block_alias(&name.text).map(|kind| (i, kind))
        } else {
            None
        }
    });

    if let Some((pos, kind)) = block_pos {
        if kind != enclosing {
            return Err(ParseError::invalid(
                format!(
                    "`{}` reference cannot appear inside a `{}` block",
                    kind.keyword(),
                    enclosing.keyword()
                ),
                span,
            ));
        }
        let base = plain_path_from(&segments[..pos], span)?;
        return match &segments[pos + 1..] {
            [] => Ok(Some(CompositionRef::AllOf {
                span,
                base,
                block: kind,
            })),
            [RawSegment::Selection(names)] => Ok(Some(CompositionRef::Subset {
                span,
                base,
                block: kind,
                names: names.clone(),
            })),
            [RawSegment::Ident(name), RawSegment::Bound(which)] => {
                Ok(Some(CompositionRef::SingleBound {
                    span,
                    base,
                    block: kind,
                    name: name.clone(),
                    which: *which,
                }))
            }
            _ => Err(ParseError::invalid(
                format!(
                    "expected nothing, `[a, b]`, or `name.min|max` after `.{}`",
                    kind.keyword()
                ),
                span,
            )),
        };
    }

    // No block keyword: `name.[a, b]` selects group members.
    if let Some(RawSegment::Selection(names)) = segments.last() {
        let group = plain_path_from(&segments[..segments.len() - 1], span)?;
        return Ok(Some(CompositionRef::GroupSelect {
            span,
            group,
            names: names.clone(),
        }));
    }

    // Selections or bound segments anywhere else are malformed.
    if segments
        .iter()
        .any(|s| !matches!(s, RawSegment::Ident(_)))
    {
        return Err(ParseError::invalid(
            "selection and `min`/`max` segments are only valid at the end of a composition reference",
            span,
        ));
    }

    Ok(None)
}

/// Require every segment to be a plain identifier and build a path.
fn plain_path_from(segments: &[RawSegment], span: Span) -> Result<RefPath, ParseError> {
    let mut parts = Vec::with_capacity(segments.len());
    for seg in segments {
        match seg {
            RawSegment::Ident(name) => parts.push(name.text.clone()),
            _ => {
                return Err(ParseError::invalid(
                    "selection and `min`/`max` segments are only valid at the end of a composition reference",
                    span,
                ));
            }
        }
    }
    if parts.is_empty() {
        return Err(ParseError::invalid("empty reference path", span));
    }
    Ok(RefPath::new(parts, span))
}

/// `[min VALUE] [max VALUE]` in either order.
fn parse_bounds(stream: &mut TokenStream) -> Result<Bounds, ParseError> {
    let mut bounds = Bounds::default();
    loop {
        match stream.peek() {
            Some(Token::Min) => {
                stream.advance();
                bounds.min = Some(parse_bound_value(stream)?);
            }
            Some(Token::Max) => {
                stream.advance();
                bounds.max = Some(parse_bound_value(stream)?);
            }
            _ => break,
        }
    }
    Ok(bounds)
}

fn parse_bound_value(stream: &mut TokenStream) -> Result<Bound, ParseError> {
    let start = stream.current_pos();
    let negative = if stream.check(&Token::Minus) {
        stream.advance();
        true
    } else {
        false
    };
    match stream.peek() {
        Some(Token::Number(value)) => {
            let value = if negative { -*value } else { *value };
            stream.advance();
            Ok(Bound {
                span: stream.span_from(start),
                value,
                is_percent: false,
            })
        }
        Some(Token::Percent(value)) => {
            let value = if negative { -*value } else { *value };
            stream.advance();
            Ok(Bound {
                span: stream.span_from(start),
                value,
                is_percent: true,
            })
        }
        other => Err(ParseError::expected(
            "a bound value",
            other,
            stream.current_span(),
        )),
    }
}

/// Contextual block keyword recognition; `nuts`/`ings` are the short forms.
fn block_alias(text: &str) -> Option<BlockKind> {
    match text {
        "nutrients" | "nuts" => Some(BlockKind::Nutrients),
        "ingredients" | "ings" => Some(BlockKind::Ingredients),
        _ => None,
    }
}
