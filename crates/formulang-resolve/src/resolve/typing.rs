//! Block-context typing and property validation.
//!
//! The same syntactic expression means different things in the two formula
//! blocks: nutrient-block references must name nutrients, ingredient-block
//! references must name ingredients or groups. Percent literals belong to
//! ingredient blocks only. This pass validates; it never mutates the AST.

use formulang_ast::{
    get_number_prop, BlockItem, BlockKind, Bounds, CompositionRef, Decl, Diagnostic,
    DiagnosticKind, Expr, FileId, FormulaDecl, GroupDecl, IngredientDecl, NutrientDecl, RefPath,
    Span,
};

use super::names::SymbolKind;
use super::pipeline::Program;

const NUTRIENT_PROPS: &[&str] = &["name", "code", "desc", "description", "unit"];
const INGREDIENT_PROPS: &[&str] = &["name", "code", "desc", "description", "cost"];
const FORMULA_PROPS: &[&str] = &[
    "name",
    "code",
    "desc",
    "description",
    "batch",
    "batch_size",
];

/// Run every typing check over every module.
pub fn check(program: &Program) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for module in &program.modules {
        for decl in &module.decls {
            match decl {
                Decl::Nutrient(d) => check_nutrient(d, &mut diagnostics),
                Decl::Ingredient(d) => check_ingredient(program, module.file, d, &mut diagnostics),
                Decl::Group(d) => check_group(program, module.file, d, &mut diagnostics),
                Decl::Formula(d) => check_formula(program, module.file, d, &mut diagnostics),
            }
        }
    }

    diagnostics
}

fn check_props(
    props: &[formulang_ast::Property],
    allowed: &[&str],
    decl_kind: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for prop in props {
        if !allowed.contains(&prop.name.as_str()) {
            diagnostics.push(Diagnostic::error(
                DiagnosticKind::UnknownProperty,
                prop.span,
                format!(
                    "`{}` is not a valid property for {}; valid properties: {}",
                    prop.name,
                    decl_kind,
                    allowed.join(", ")
                ),
            ));
        }
    }
}

fn check_nutrient(decl: &NutrientDecl, diagnostics: &mut Vec<Diagnostic>) {
    check_props(&decl.props, NUTRIENT_PROPS, "a nutrient", diagnostics);
}

fn check_ingredient(
    program: &Program,
    file: FileId,
    decl: &IngredientDecl,
    diagnostics: &mut Vec<Diagnostic>,
) {
    check_props(&decl.props, INGREDIENT_PROPS, "an ingredient", diagnostics);

    if get_number_prop(&decl.props, "cost").is_none() {
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::MissingCost,
            decl.name.span,
            format!(
                "ingredient `{}` has no `cost` property; it cannot be used in a solved formula",
                decl.name.text
            ),
        ));
    }

    for value in &decl.values {
        if let Err(diag) = program.resolve_ref(file, &[SymbolKind::Nutrient], &value.nutrient) {
            diagnostics.push(diag);
        }
    }
}

fn check_group(
    program: &Program,
    file: FileId,
    decl: &GroupDecl,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for member in &decl.members {
        let path = RefPath::simple(member.text.clone(), member.span);
        if let Err(diag) = program.resolve_ref(file, &[SymbolKind::Ingredient], &path) {
            diagnostics.push(diag);
        }
    }
}

fn check_formula(
    program: &Program,
    file: FileId,
    decl: &FormulaDecl,
    diagnostics: &mut Vec<Diagnostic>,
) {
    check_props(&decl.props, FORMULA_PROPS, "a formula", diagnostics);

    if !decl.is_template && get_number_prop(&decl.props, "batch_size").is_none() {
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::MissingBatch,
            decl.name.span,
            format!(
                "formula `{}` has no `batch_size` property and cannot be solved",
                decl.name.text
            ),
        ));
    }

    for item in &decl.nutrient_items {
        check_item(program, file, item, BlockKind::Nutrients, diagnostics);
    }
    for item in &decl.ingredient_items {
        check_item(program, file, item, BlockKind::Ingredients, diagnostics);
    }
}

fn check_item(
    program: &Program,
    file: FileId,
    item: &BlockItem,
    block: BlockKind,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match item {
        BlockItem::Constraint(c) => {
            check_expr(program, file, &c.expr, block, diagnostics);
            check_bounds(&c.bounds, block, diagnostics);
        }
        BlockItem::Include(include) => check_include(program, file, include, block, diagnostics),
    }
}

fn check_expr(
    program: &Program,
    file: FileId,
    expr: &Expr,
    block: BlockKind,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Percent literals in expression position are an ingredient-block device.
    if block == BlockKind::Nutrients {
        check_no_percent(expr, diagnostics);
    }

    let expected: &[SymbolKind] = match block {
        BlockKind::Nutrients => &[SymbolKind::Nutrient],
        BlockKind::Ingredients => &[SymbolKind::Ingredient, SymbolKind::Group],
    };

    expr.walk_refs(&mut |path| {
        if let Err(diag) = program.resolve_ref(file, expected, path) {
            diagnostics.push(diag);
        }
    });
}

fn check_no_percent(expr: &Expr, diagnostics: &mut Vec<Diagnostic>) {
    match expr {
        Expr::Percent { span, .. } => diagnostics.push(percent_error(*span)),
        Expr::Binary { left, right, .. } => {
            check_no_percent(left, diagnostics);
            check_no_percent(right, diagnostics);
        }
        Expr::Paren { inner, .. } => check_no_percent(inner, diagnostics),
        Expr::Num { .. } | Expr::Ref(_) => {}
    }
}

fn check_bounds(bounds: &Bounds, block: BlockKind, diagnostics: &mut Vec<Diagnostic>) {
    if block != BlockKind::Nutrients {
        return;
    }
    for bound in [&bounds.min, &bounds.max].into_iter().flatten() {
        if bound.is_percent {
            diagnostics.push(percent_error(bound.span));
        }
    }
}

fn percent_error(span: Span) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::PercentContext,
        span,
        "percent values are only valid inside ingredient blocks",
    )
}

fn check_include(
    program: &Program,
    file: FileId,
    include: &CompositionRef,
    block: BlockKind,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match include {
        CompositionRef::AllOf { base, .. } => {
            if let Err(diag) = program.resolve_ref(file, &[SymbolKind::Formula], base) {
                diagnostics.push(diag);
            }
        }
        CompositionRef::Subset { base, names, .. } => {
            if let Err(diag) = program.resolve_ref(file, &[SymbolKind::Formula], base) {
                diagnostics.push(diag);
            }
            let kind = match block {
                BlockKind::Nutrients => SymbolKind::Nutrient,
                BlockKind::Ingredients => SymbolKind::Ingredient,
            };
            for name in names {
                let path = RefPath::simple(name.text.clone(), name.span);
                if let Err(diag) = program.resolve_ref(file, &[kind], &path) {
                    diagnostics.push(diag);
                }
            }
        }
        CompositionRef::SingleBound { base, name, .. } => {
            if let Err(diag) = program.resolve_ref(file, &[SymbolKind::Formula], base) {
                diagnostics.push(diag);
            }
            let kind = match block {
                BlockKind::Nutrients => SymbolKind::Nutrient,
                BlockKind::Ingredients => SymbolKind::Ingredient,
            };
            let path = RefPath::simple(name.text.clone(), name.span);
            if let Err(diag) = program.resolve_ref(file, &[kind], &path) {
                diagnostics.push(diag);
            }
        }
        CompositionRef::GroupSelect { group, names, span } => {
            if block == BlockKind::Nutrients {
                diagnostics.push(Diagnostic::error(
                    DiagnosticKind::WrongKind,
                    *span,
                    "group selections are only valid inside ingredient blocks",
                ));
                return;
            }
            match program.resolve_ref(file, &[SymbolKind::Group], group) {
                Err(diag) => diagnostics.push(diag),
                Ok((_, decl)) => {
                    let group_decl = program.group(decl).expect("resolved as group");
                    for name in names {
                        if !group_decl.members.iter().any(|m| m.text == name.text) {
                            diagnostics.push(Diagnostic::error(
                                DiagnosticKind::UnknownName,
                                name.span,
                                format!(
                                    "group `{}` has no member `{}`",
                                    group_decl.name.text, name.text
                                ),
                            ));
                        }
                    }
                }
            }
        }
        CompositionRef::GroupAll { group, .. } => {
            if let Err(diag) = program.resolve_ref(file, &[SymbolKind::Group], group) {
                diagnostics.push(diag);
            }
        }
    }
}
