//! Tooling queries: hover, completions, formula listing, semantic tokens.
//!
//! Every query works on a best-effort partial parse so editors keep getting
//! answers while the buffer is broken mid-edit.

use serde::Serialize;

use formulang_ast::{get_number_prop, get_string_prop, Decl};
use formulang_lexer::{lex, Token};
use formulang_resolve::{Program, SourceSet, SymbolKind};

/// One formula of a source buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormulaInfo {
    pub name: String,
    pub is_template: bool,
}

/// Hover contents for a byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hover {
    /// Markdown-flavored documentation text
    pub contents: String,
    pub start: usize,
    pub end: usize,
}

/// A single completion item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub label: String,
    pub kind: CompletionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Snippet text; `${n:placeholder}` tab stops
    pub insert_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    Keyword,
    Variable,
}

/// A classified token for syntax highlighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemanticToken {
    pub start: usize,
    pub end: usize,
    pub token_type: &'static str,
}

/// Resilient top-level formula listing.
pub fn formulas(source: &str) -> Vec<FormulaInfo> {
    let (module, _diagnostics) = formulang_parser::parse(source, 0);
    module
        .decls
        .iter()
        .filter_map(|decl| match decl {
            Decl::Formula(f) => Some(FormulaInfo {
                name: f.name.text.clone(),
                is_template: f.is_template,
            }),
            _ => None,
        })
        .collect()
}

/// Hover information at a byte offset.
pub fn hover(source: &str, offset: usize) -> Option<Hover> {
    let tokens = lex(source);
    let (token, range) = tokens
        .iter()
        .find(|(_, range)| range.start <= offset && offset <= range.end)?;

    if let Some(doc) = keyword_doc(token) {
        return Some(Hover {
            contents: doc.to_string(),
            start: range.start,
            end: range.end,
        });
    }

    let Token::Ident(name) = token else {
        return None;
    };

    let (program, _diagnostics) = formulang_resolve::analyze("main.fm", source, &SourceSet::new());
    let contents = describe_symbol(&program, name)?;
    Some(Hover {
        contents,
        start: range.start,
        end: range.end,
    })
}

fn keyword_doc(token: &Token) -> Option<&'static str> {
    Some(match token {
        Token::Nutrient => {
            "**nutrient**\n\nDeclares a nutritional parameter that ingredients carry levels of and formulas constrain."
        }
        Token::Ingredient => {
            "**ingredient**\n\nDeclares a material with a cost and per-nutrient levels."
        }
        Token::Formula => {
            "**formula**\n\nDeclares an optimization problem: a batch size plus nutrient and ingredient constraints."
        }
        Token::Template => {
            "**template**\n\nMarks a formula as composition-only; it is never solved."
        }
        Token::Group => "**group**\n\nNames a set of ingredients that can be referenced together.",
        Token::Import => "**import**\n\nBrings declarations from another `.fm` unit into scope.",
        Token::Min => "**min**\n\nLower bound of a constraint.",
        Token::Max => "**max**\n\nUpper bound of a constraint.",
        Token::As => "**as**\n\nBinds an import to a namespace alias.",
        _ => return None,
    })
}

fn describe_symbol(program: &Program, name: &str) -> Option<String> {
    const KINDS: [SymbolKind; 4] = [
        SymbolKind::Nutrient,
        SymbolKind::Ingredient,
        SymbolKind::Group,
        SymbolKind::Formula,
    ];
    for kind in KINDS {
        let Ok(decl_ref) = program.symbols.resolve_name(0, kind, name) else {
            continue;
        };
        let mut lines = Vec::new();
        match program.decl(decl_ref) {
            Decl::Nutrient(d) => {
                lines.push(format!("**Nutrient** `{}`", d.name.text));
                if let Some(display) = get_string_prop(&d.props, "name") {
                    lines.push(display);
                }
                if let Some(unit) = get_string_prop(&d.props, "unit") {
                    lines.push(format!("unit: {}", unit));
                }
                if let Some(desc) = get_string_prop(&d.props, "description") {
                    lines.push(desc);
                }
            }
            Decl::Ingredient(d) => {
                lines.push(format!("**Ingredient** `{}`", d.name.text));
                if let Some(display) = get_string_prop(&d.props, "name") {
                    lines.push(display);
                }
                if let Some(cost) = get_number_prop(&d.props, "cost") {
                    lines.push(format!("cost: {}", cost));
                }
                if let Some(desc) = get_string_prop(&d.props, "description") {
                    lines.push(desc);
                }
            }
            Decl::Group(d) => {
                lines.push(format!("**Group** `{}`", d.name.text));
                let members: Vec<&str> = d.members.iter().map(|m| m.text.as_str()).collect();
                lines.push(members.join(", "));
            }
            Decl::Formula(d) => {
                let marker = if d.is_template { " (template)" } else { "" };
                lines.push(format!("**Formula** `{}`{}", d.name.text, marker));
                if let Some(display) = get_string_prop(&d.props, "name") {
                    lines.push(display);
                }
                if let Some(batch) = get_number_prop(&d.props, "batch_size") {
                    lines.push(format!("batch size: {}", batch));
                }
                if let Some(desc) = get_string_prop(&d.props, "description") {
                    lines.push(desc);
                }
            }
        }
        return Some(lines.join("\n\n"));
    }
    None
}

/// Grammatical contexts a cursor can sit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    TopLevel,
    NutrientDeclBody,
    IngredientDeclBody,
    FormulaDeclBody,
    GroupDeclBody,
    /// nutrients block; true when it belongs to a formula (constraints),
    /// false for an ingredient's level block
    NutrientsBlock(bool),
    IngredientsBlock,
    AfterDot,
    AfterImport,
}

/// Completions at a byte offset.
pub fn completions(source: &str, offset: usize) -> Vec<Completion> {
    let tokens = lex(source);
    let context = classify_context(&tokens, offset);

    let mut out = Vec::new();
    match context {
        Context::AfterImport => {
            out.push(keyword("import path", "\"./${1:file}.fm\"", "Path to another unit"));
        }
        Context::AfterDot => {
            out.push(keyword("nutrients", "nutrients", "Base formula's nutrient constraints"));
            out.push(keyword("ingredients", "ingredients", "Base formula's ingredient constraints"));
            out.push(keyword("min", "min", "Inherit only the lower bound"));
            out.push(keyword("max", "max", "Inherit only the upper bound"));
        }
        Context::TopLevel => {
            out.push(keyword(
                "nutrient",
                "nutrient ${1:name} {\n  name \"${2:Display Name}\"\n  unit \"${3:%}\"\n}",
                "Declare a nutrient",
            ));
            out.push(keyword(
                "ingredient",
                "ingredient ${1:name} {\n  name \"${2:Display Name}\"\n  cost ${3:0}\n  nuts {\n    ${4:nutrient} ${5:0}\n  }\n}",
                "Declare an ingredient",
            ));
            out.push(keyword(
                "formula",
                "formula ${1:name} {\n  batch ${2:1000}\n\n  nuts {\n    ${3:nutrient} min ${4:0}\n  }\n\n  ings {\n    ${5:ingredient}\n  }\n}",
                "Declare a formula",
            ));
            out.push(keyword(
                "template",
                "template formula ${1:name} {\n  nuts {\n    ${2:nutrient} min ${3:0}\n  }\n}",
                "Declare a composition-only formula",
            ));
            out.push(keyword(
                "group",
                "group ${1:name} { ${2:ingredients} }",
                "Declare an ingredient group",
            ));
            out.push(keyword(
                "import",
                "import \"./${1:file}.fm\"",
                "Import another unit",
            ));
        }
        Context::NutrientDeclBody => {
            for prop in ["name", "code", "desc", "unit"] {
                out.push(keyword(prop, prop, "Nutrient property"));
            }
        }
        Context::IngredientDeclBody => {
            for prop in ["name", "code", "desc", "cost"] {
                out.push(keyword(prop, prop, "Ingredient property"));
            }
            out.push(keyword("nuts", "nuts {\n  ${1:nutrient} ${2:0}\n}", "Nutrient levels"));
        }
        Context::FormulaDeclBody => {
            for prop in ["name", "code", "desc", "batch"] {
                out.push(keyword(prop, prop, "Formula property"));
            }
            out.push(keyword("nuts", "nuts {\n  ${1:nutrient} min ${2:0}\n}", "Nutrient constraints"));
            out.push(keyword("ings", "ings {\n  ${1:ingredient}\n}", "Ingredient constraints"));
        }
        Context::GroupDeclBody => {
            push_symbols(&mut out, source, &[SymbolKind::Ingredient]);
        }
        Context::NutrientsBlock(in_formula) => {
            push_symbols(&mut out, source, &[SymbolKind::Nutrient]);
            if in_formula {
                out.push(keyword("min", "min ${1:0}", "Lower bound"));
                out.push(keyword("max", "max ${1:0}", "Upper bound"));
            }
        }
        Context::IngredientsBlock => {
            push_symbols(&mut out, source, &[SymbolKind::Ingredient, SymbolKind::Group]);
            out.push(keyword("min", "min ${1:0}%", "Lower bound"));
            out.push(keyword("max", "max ${1:0}%", "Upper bound"));
        }
    }
    out
}

fn keyword(label: &str, insert: &str, detail: &str) -> Completion {
    Completion {
        label: label.to_string(),
        kind: CompletionKind::Keyword,
        detail: Some(detail.to_string()),
        insert_text: insert.to_string(),
    }
}

fn push_symbols(out: &mut Vec<Completion>, source: &str, kinds: &[SymbolKind]) {
    let (program, _diagnostics) = formulang_resolve::analyze("main.fm", source, &SourceSet::new());
    for &kind in kinds {
        for (name, _decl) in program.symbols.module(0).locals(kind) {
            out.push(Completion {
                label: name.to_string(),
                kind: CompletionKind::Variable,
                detail: Some(capitalize(kind.display_name())),
                insert_text: name.to_string(),
            });
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Walk the tokens before the offset and classify where the cursor sits.
fn classify_context(tokens: &[(Token, std::ops::Range<usize>)], offset: usize) -> Context {
    let mut stack: Vec<Context> = Vec::new();
    let mut pending: Option<Context> = None;
    let mut last_on_line: Option<&Token> = None;

    for (token, range) in tokens {
        if range.end > offset {
            break;
        }
        match token {
            Token::Nutrient => pending = Some(Context::NutrientDeclBody),
            Token::Ingredient => pending = Some(Context::IngredientDeclBody),
            Token::Formula => pending = Some(Context::FormulaDeclBody),
            Token::Group => pending = Some(Context::GroupDeclBody),
            Token::Ident(name) if matches!(name.as_str(), "nutrients" | "nuts") => {
                match stack.last() {
                    Some(Context::FormulaDeclBody) => {
                        pending = Some(Context::NutrientsBlock(true));
                    }
                    Some(Context::IngredientDeclBody) => {
                        pending = Some(Context::NutrientsBlock(false));
                    }
                    _ => {}
                }
            }
            Token::Ident(name) if matches!(name.as_str(), "ingredients" | "ings") => {
                if matches!(stack.last(), Some(Context::FormulaDeclBody)) {
                    pending = Some(Context::IngredientsBlock);
                }
            }
            Token::LBrace => stack.push(pending.take().unwrap_or(Context::TopLevel)),
            Token::RBrace => {
                stack.pop();
            }
            _ => {}
        }
        last_on_line = match token {
            Token::Newline => None,
            _ if token.is_trivia() => last_on_line,
            other => Some(other),
        };
    }

    match last_on_line {
        Some(Token::Dot) => return Context::AfterDot,
        Some(Token::Import) => return Context::AfterImport,
        _ => {}
    }
    stack.last().copied().unwrap_or(Context::TopLevel)
}

/// Token classification for syntax highlighting.
pub fn semantic_tokens(source: &str) -> Vec<SemanticToken> {
    lex(source)
        .into_iter()
        .map(|(token, range)| {
            let token_type = match token {
                Token::Nutrient
                | Token::Ingredient
                | Token::Formula
                | Token::Template
                | Token::Import
                | Token::Group
                | Token::As
                | Token::Min
                | Token::Max => "keyword",
                Token::Ident(_) => "variable",
                Token::Number(_) | Token::Percent(_) => "number",
                Token::Str(_) | Token::UnterminatedStr => "string",
                Token::LineComment | Token::BlockComment => "comment",
                Token::Plus | Token::Minus | Token::Star | Token::Slash => "operator",
                Token::Dot
                | Token::Colon
                | Token::Comma
                | Token::LBrace
                | Token::RBrace
                | Token::LBracket
                | Token::RBracket
                | Token::LParen
                | Token::RParen => "delimiter",
                Token::Newline => "whitespace",
                Token::Error => "error",
            };
            SemanticToken {
                start: range.start,
                end: range.end,
                token_type,
            }
        })
        .collect()
}
