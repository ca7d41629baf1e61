//! Composition reference expansion.
//!
//! Flattens a formula's constraint blocks into one ordered sequence with
//! last-definition-wins overrides. Expansion is memoized per
//! `(formula, block)` and the reference graph must be a DAG; a cycle is a
//! hard error naming the whole chain.
//!
//! # Override law
//!
//! Constraints merge into an ordered map keyed by the canonical form of the
//! left-hand side. The last occurrence in flattened source order wins, takes
//! the last position, and replaces the previous constraint whole: a later
//! `min`-only constraint drops an inherited `max`. Users restate both bounds
//! to keep both.

use std::collections::HashMap;

use indexmap::IndexMap;

use formulang_ast::{
    BlockItem, BlockKind, Bounds, CompositionRef, Diagnostic, DiagnosticKind, Expr, FileId,
    RefPath, Span, SpannedName,
};

use super::names::{DeclRef, SymbolKind};
use super::pipeline::Program;

/// One constraint after composition.
///
/// `origin` is the module whose scope resolves the expression's references:
/// constraints inherited from a base formula keep resolving the way the base
/// wrote them.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedConstraint {
    /// Canonical identity of the left-hand side, for override matching
    pub key: String,
    /// Module whose scope the expression resolves in
    pub origin: FileId,
    pub expr: Expr,
    pub bounds: Bounds,
    pub span: Span,
}

/// Memoizing composition engine over a resolved program.
pub struct Composer<'a> {
    program: &'a Program,
    memo: HashMap<(DeclRef, BlockKind), Vec<ComposedConstraint>>,
    in_progress: Vec<(DeclRef, BlockKind)>,
}

impl<'a> Composer<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            memo: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// The fully-composed, override-collapsed constraint sequence of one
    /// formula block.
    ///
    /// Warnings (missing bounds) go to `diagnostics`; a composition cycle is
    /// the only hard error.
    pub fn composed(
        &mut self,
        formula: DeclRef,
        block: BlockKind,
        span: Span,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Vec<ComposedConstraint>, Diagnostic> {
        if let Some(cached) = self.memo.get(&(formula, block)) {
            return Ok(cached.clone());
        }

        if self.in_progress.contains(&(formula, block)) {
            let mut chain: Vec<&str> = self
                .in_progress
                .iter()
                .skip_while(|(f, b)| (*f, *b) != (formula, block))
                .map(|(f, _)| self.program.decl(*f).name())
                .collect();
            chain.push(self.program.decl(formula).name());
            return Err(Diagnostic::error(
                DiagnosticKind::ComposeCycle,
                span,
                format!("formula composition cycle: {}", chain.join(" -> ")),
            ));
        }

        self.in_progress.push((formula, block));
        let result = self.expand_formula(formula, block, diagnostics);
        self.in_progress.pop();

        let collapsed = collapse_overrides(result?);
        self.memo.insert((formula, block), collapsed.clone());
        Ok(collapsed)
    }

    fn expand_formula(
        &mut self,
        formula: DeclRef,
        block: BlockKind,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Vec<ComposedConstraint>, Diagnostic> {
        let decl = self
            .program
            .formula(formula)
            .expect("composition base resolved as formula");
        let items = match block {
            BlockKind::Nutrients => &decl.nutrient_items,
            BlockKind::Ingredients => &decl.ingredient_items,
        };

        let mut out = Vec::new();
        for item in items {
            match item {
                BlockItem::Constraint(c) => {
                    // A bare group reference with no bounds mentions every
                    // member; with bounds it constrains the member sum and
                    // stays a plain constraint.
                    if block == BlockKind::Ingredients && c.bounds.is_empty() {
                        if let Some(path) = ref_path(&c.expr) {
                            if let Ok((SymbolKind::Group, _)) = self.program.resolve_ref(
                                formula.file,
                                &[SymbolKind::Ingredient, SymbolKind::Group],
                                path,
                            ) {
                                let all = CompositionRef::GroupAll {
                                    span: c.span,
                                    group: path.clone(),
                                };
                                self.expand_include(formula.file, &all, block, &mut out, diagnostics)?;
                                continue;
                            }
                        }
                    }
                    out.push(self.constraint(
                        formula.file,
                        c.expr.clone(),
                        c.bounds.clone(),
                        c.span,
                        block,
                    ));
                }
                BlockItem::Include(include) => {
                    self.expand_include(formula.file, include, block, &mut out, diagnostics)?;
                }
            }
        }
        Ok(out)
    }

    fn expand_include(
        &mut self,
        file: FileId,
        include: &CompositionRef,
        block: BlockKind,
        out: &mut Vec<ComposedConstraint>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), Diagnostic> {
        match include {
            CompositionRef::AllOf { base, span, .. } => {
                let Some(base_ref) = self.resolve_formula(file, base) else {
                    return Ok(()); // typing already reported it
                };
                let inlined = self.composed(base_ref, block, *span, diagnostics)?;
                out.extend(inlined);
            }
            CompositionRef::Subset {
                base, names, span, ..
            } => {
                let Some(base_ref) = self.resolve_formula(file, base) else {
                    return Ok(());
                };
                let inlined = self.composed(base_ref, block, *span, diagnostics)?;

                // Subset selection keeps only bare constraints on the listed
                // names; ratio and arithmetic constraints are never selected.
                let targets = self.resolve_names(file, names, block);
                out.extend(
                    inlined
                        .into_iter()
                        .filter(|c| match self.bare_lhs(c, block) {
                            Some(decl) => targets.contains(&decl),
                            None => false,
                        }),
                );
            }
            CompositionRef::SingleBound {
                base,
                name,
                which,
                span,
                ..
            } => {
                let Some(base_ref) = self.resolve_formula(file, base) else {
                    return Ok(());
                };
                let inlined = self.composed(base_ref, block, *span, diagnostics)?;

                let kind = block_kind_symbol(block);
                let path = RefPath::simple(name.text.clone(), name.span);
                let Ok((_, target)) = self.program.resolve_ref(file, &[kind], &path) else {
                    return Ok(());
                };

                let found = inlined
                    .into_iter()
                    .find(|c| self.bare_lhs(c, block) == Some(target));
                let half = found.as_ref().and_then(|c| match which {
                    formulang_ast::BoundKind::Min => c.bounds.min.clone(),
                    formulang_ast::BoundKind::Max => c.bounds.max.clone(),
                });

                match (found, half) {
                    (Some(c), Some(bound)) => {
                        let bounds = match which {
                            formulang_ast::BoundKind::Min => Bounds {
                                min: Some(bound),
                                max: None,
                            },
                            formulang_ast::BoundKind::Max => Bounds {
                                min: None,
                                max: Some(bound),
                            },
                        };
                        out.push(ComposedConstraint { bounds, ..c });
                    }
                    _ => {
                        diagnostics.push(Diagnostic::warning(
                            DiagnosticKind::MissingBound,
                            *span,
                            format!(
                                "`{}` declares no `{}` bound on `{}`; nothing inherited",
                                base,
                                which.keyword(),
                                name.text
                            ),
                        ));
                    }
                }
            }
            CompositionRef::GroupSelect { group, names, .. } => {
                self.expand_group(file, group, Some(names), out);
            }
            CompositionRef::GroupAll { group, .. } => {
                self.expand_group(file, group, None, out);
            }
        }
        Ok(())
    }

    /// Mention group members as individual unbounded ingredient references.
    fn expand_group(
        &mut self,
        file: FileId,
        group: &RefPath,
        selection: Option<&[SpannedName]>,
        out: &mut Vec<ComposedConstraint>,
    ) {
        let Ok((_, decl)) = self.program.resolve_ref(file, &[SymbolKind::Group], group) else {
            return;
        };
        let group_decl = self.program.group(decl).expect("resolved as group");

        for member in &group_decl.members {
            if let Some(names) = selection {
                if !names.iter().any(|n| n.text == member.text) {
                    continue;
                }
            }
            let expr = Expr::Ref(RefPath::simple(member.text.clone(), member.span));
            // Members resolve in the group's defining module.
            out.push(self.constraint(
                decl.file,
                expr,
                Bounds::default(),
                member.span,
                BlockKind::Ingredients,
            ));
        }
    }

    fn constraint(
        &self,
        origin: FileId,
        expr: Expr,
        bounds: Bounds,
        span: Span,
        block: BlockKind,
    ) -> ComposedConstraint {
        let key = self.canonical_key(&expr, origin, block);
        ComposedConstraint {
            key,
            origin,
            expr,
            bounds,
            span,
        }
    }

    fn resolve_formula(&self, file: FileId, base: &RefPath) -> Option<DeclRef> {
        self.program
            .resolve_ref(file, &[SymbolKind::Formula], base)
            .ok()
            .map(|(_, decl)| decl)
    }

    fn resolve_names(
        &self,
        file: FileId,
        names: &[SpannedName],
        block: BlockKind,
    ) -> Vec<DeclRef> {
        let kind = block_kind_symbol(block);
        names
            .iter()
            .filter_map(|name| {
                let path = RefPath::simple(name.text.clone(), name.span);
                self.program
                    .resolve_ref(file, &[kind], &path)
                    .ok()
                    .map(|(_, decl)| decl)
            })
            .collect()
    }

    /// The declaration a constraint's LHS names, when it is a pure reference.
    fn bare_lhs(&self, c: &ComposedConstraint, block: BlockKind) -> Option<DeclRef> {
        let path = ref_path(&c.expr)?;
        let kinds: &[SymbolKind] = match block {
            BlockKind::Nutrients => &[SymbolKind::Nutrient],
            BlockKind::Ingredients => &[SymbolKind::Ingredient, SymbolKind::Group],
        };
        self.program
            .resolve_ref(c.origin, kinds, path)
            .ok()
            .map(|(_, decl)| decl)
    }

    /// Canonical LHS identity for override matching.
    ///
    /// References canonicalize to their resolved declaration identity, so
    /// `protein` in a base module and `nutrients.protein` in a child collide
    /// exactly when they name the same declaration. Operand order of the
    /// commutative operators is normalized; parentheses are transparent.
    fn canonical_key(&self, expr: &Expr, origin: FileId, block: BlockKind) -> String {
        match expr {
            Expr::Num { value, .. } => format!("#{}", value),
            Expr::Percent { value, .. } => format!("#{}%", value),
            Expr::Ref(path) => {
                let kinds: &[SymbolKind] = match block {
                    BlockKind::Nutrients => &[SymbolKind::Nutrient],
                    BlockKind::Ingredients => &[SymbolKind::Ingredient, SymbolKind::Group],
                };
                match self.program.resolve_ref(origin, kinds, path) {
                    Ok((kind, decl)) => format!(
                        "{}:{}:{}",
                        kind.display_name(),
                        decl.file,
                        self.program.decl(decl).name()
                    ),
                    Err(_) => format!("?:{}", path),
                }
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let mut l = self.canonical_key(left, origin, block);
                let mut r = self.canonical_key(right, origin, block);
                if op.is_commutative() && l > r {
                    std::mem::swap(&mut l, &mut r);
                }
                format!("({}{}{})", l, op, r)
            }
            Expr::Paren { inner, .. } => self.canonical_key(inner, origin, block),
        }
    }
}

/// Unwrap parentheses down to a reference path, if the expression is one.
fn ref_path(expr: &Expr) -> Option<&RefPath> {
    match expr {
        Expr::Ref(path) => Some(path),
        Expr::Paren { inner, .. } => ref_path(inner),
        _ => None,
    }
}

fn block_kind_symbol(block: BlockKind) -> SymbolKind {
    match block {
        BlockKind::Nutrients => SymbolKind::Nutrient,
        BlockKind::Ingredients => SymbolKind::Ingredient,
    }
}

/// Collapse the flattened sequence: for each canonical key the last
/// occurrence wins, as a whole, at its own position.
fn collapse_overrides(constraints: Vec<ComposedConstraint>) -> Vec<ComposedConstraint> {
    let mut map: IndexMap<String, ComposedConstraint> = IndexMap::new();
    for c in constraints {
        if map.contains_key(&c.key) {
            map.shift_remove(&c.key);
        }
        map.insert(c.key.clone(), c);
    }
    map.into_values().collect()
}
