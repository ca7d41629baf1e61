//! Formula → LP lowering.
//!
//! A composed formula becomes one variable per mentioned ingredient, a
//! minimize-cost objective, and linear rows for every bounded constraint:
//!
//! - nutrient rows substitute each nutrient reference with the ingredient
//!   content column and scale the bound by the batch size
//! - ratio rows `A / D op V` linearize to `A - V*D op 0`
//! - ingredient rows combine amount variables; percent bounds rewrite to
//!   `V·B/100`
//! - ingredients with no explicit bound get the implicit `x ≤ B` row, and
//!   the batch closure row `Σ x = B` always closes the program
//!
//! Emission order is deterministic: variables in first-seen order after
//! composition, rows in composed order.

use indexmap::IndexMap;
use tracing::trace;

use formulang_ast::{
    get_number_prop, get_string_prop, BinOp, BlockKind, Bound, Diagnostic, DiagnosticKind, Expr,
    FileId, RefPath, Span,
};
use formulang_resolve::{ComposedConstraint, Composer, DeclRef, Program, SymbolKind};
use formulang_solver::{ConstraintOp, LpProblem};

/// One ingredient variable of a lowered formula.
#[derive(Debug, Clone)]
pub struct IngredientColumn {
    pub decl: DeclRef,
    /// Declared identifier
    pub id: String,
    pub display_name: Option<String>,
    pub code: Option<String>,
    pub cost: f64,
    /// Declared nutrient levels, resolved to nutrient identities
    pub contents: IndexMap<DeclRef, f64>,
}

/// One nutrient that appears on some ingredient of the formula.
#[derive(Debug, Clone)]
pub struct NutrientColumn {
    pub decl: DeclRef,
    pub id: String,
    pub display_name: Option<String>,
    pub code: Option<String>,
    pub unit: Option<String>,
}

/// A formula lowered to an LP plus the metadata reports need.
#[derive(Debug, Clone)]
pub struct LoweredFormula {
    pub name: String,
    pub display_name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub batch_size: f64,
    pub ingredients: Vec<IngredientColumn>,
    pub nutrients: Vec<NutrientColumn>,
    pub problem: LpProblem,
}

/// Lower one non-template formula. Every blocking problem is returned as a
/// diagnostic; the LP is only built when all of them are absent.
pub fn lower(program: &Program, decl: DeclRef) -> Result<LoweredFormula, Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();

    let formula = program
        .formula(decl)
        .expect("solve target resolved as formula");

    if formula.is_template {
        return Err(vec![Diagnostic::error(
            DiagnosticKind::TemplateSolve,
            formula.name.span,
            format!("`{}` is a template formula and cannot be solved", formula.name.text),
        )]);
    }

    let Some(batch_size) = get_number_prop(&formula.props, "batch_size") else {
        return Err(vec![Diagnostic::error(
            DiagnosticKind::MissingBatch,
            formula.name.span,
            format!("formula `{}` has no `batch_size` property", formula.name.text),
        )]);
    };

    let mut composer = Composer::new(program);
    let nutrient_rows =
        match composer.composed(decl, BlockKind::Nutrients, formula.name.span, &mut diagnostics) {
            Ok(rows) => rows,
            Err(diag) => return Err(vec![diag]),
        };
    let ingredient_rows = match composer.composed(
        decl,
        BlockKind::Ingredients,
        formula.name.span,
        &mut diagnostics,
    ) {
        Ok(rows) => rows,
        Err(diag) => return Err(vec![diag]),
    };

    let mut ctx = Lowering {
        program,
        batch_size,
        columns: IndexMap::new(),
        diagnostics: Vec::new(),
    };

    ctx.collect_variables(&ingredient_rows);
    let nutrients = ctx.collect_nutrients();

    let mut problem = LpProblem::new(ctx.columns.values().map(|c| c.id.clone()).collect());
    problem.set_objective(ctx.columns.values().map(|c| c.cost).collect(), true);

    for row in &nutrient_rows {
        ctx.lower_nutrient_row(row, &mut problem);
    }
    let mut explicitly_bounded = vec![false; ctx.columns.len()];
    for row in &ingredient_rows {
        ctx.lower_ingredient_row(row, &mut problem, &mut explicitly_bounded);
    }

    // Implicit 0 <= x <= B for ingredients no constraint touches.
    for (index, column) in ctx.columns.values().enumerate() {
        if !explicitly_bounded[index] {
            let mut coefficients = vec![0.0; ctx.columns.len()];
            coefficients[index] = 1.0;
            problem.add_constraint(
                format!("{}_ub", column.id),
                coefficients,
                ConstraintOp::Le,
                batch_size,
            );
        }
    }

    // Batch closure.
    problem.add_constraint(
        "batch_size",
        vec![1.0; ctx.columns.len()],
        ConstraintOp::Eq,
        batch_size,
    );

    // Only warnings may remain for a formula we actually lower.
    diagnostics.extend(ctx.diagnostics);
    if diagnostics.iter().any(Diagnostic::is_error) {
        return Err(diagnostics.into_iter().filter(Diagnostic::is_error).collect());
    }

    Ok(LoweredFormula {
        name: formula.name.text.clone(),
        display_name: get_string_prop(&formula.props, "name"),
        code: get_string_prop(&formula.props, "code"),
        description: get_string_prop(&formula.props, "description"),
        batch_size,
        ingredients: ctx.columns.into_values().collect(),
        nutrients,
        problem,
    })
}

/// A linear combination of the ingredient variables plus a constant.
#[derive(Debug, Clone)]
struct LinExpr {
    coefficients: Vec<f64>,
    constant: f64,
}

impl LinExpr {
    fn constant(n: usize, value: f64) -> Self {
        Self {
            coefficients: vec![0.0; n],
            constant: value,
        }
    }

    fn is_constant(&self) -> bool {
        self.coefficients.iter().all(|c| *c == 0.0)
    }

    fn combine(mut self, other: &LinExpr, scale: f64) -> Self {
        for (a, b) in self.coefficients.iter_mut().zip(&other.coefficients) {
            *a += scale * b;
        }
        self.constant += scale * other.constant;
        self
    }

    fn scaled(mut self, factor: f64) -> Self {
        for a in self.coefficients.iter_mut() {
            *a *= factor;
        }
        self.constant *= factor;
        self
    }
}

struct Lowering<'a> {
    program: &'a Program,
    batch_size: f64,
    columns: IndexMap<DeclRef, IngredientColumn>,
    diagnostics: Vec<Diagnostic>,
}

impl Lowering<'_> {
    /// Ingredient variables in first-seen order over the composed block.
    fn collect_variables(&mut self, rows: &[ComposedConstraint]) {
        for row in rows {
            let origin = row.origin;
            let mut refs = Vec::new();
            row.expr.walk_refs(&mut |path| refs.push(path.clone()));
            for path in refs {
                match self.program.resolve_ref(
                    origin,
                    &[SymbolKind::Ingredient, SymbolKind::Group],
                    &path,
                ) {
                    Ok((SymbolKind::Ingredient, decl)) => self.add_column(decl, path.span),
                    Ok((SymbolKind::Group, decl)) => {
                        let group = self.program.group(decl).expect("resolved as group");
                        for member in &group.members {
                            let member_path = RefPath::simple(member.text.clone(), member.span);
                            if let Ok((_, ingredient)) = self.program.resolve_ref(
                                decl.file,
                                &[SymbolKind::Ingredient],
                                &member_path,
                            ) {
                                self.add_column(ingredient, member.span);
                            }
                        }
                    }
                    Ok(_) => unreachable!("resolve_ref honors the kind filter"),
                    Err(diag) => self.diagnostics.push(diag),
                }
            }
        }
    }

    fn add_column(&mut self, decl: DeclRef, use_span: Span) {
        if self.columns.contains_key(&decl) {
            return;
        }
        let Some(ingredient) = self.program.ingredient(decl) else {
            return;
        };

        let Some(cost) = get_number_prop(&ingredient.props, "cost") else {
            self.diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::MissingCost,
                    use_span,
                    format!(
                        "ingredient `{}` is used here but declares no `cost`",
                        ingredient.name.text
                    ),
                )
                .with_label(ingredient.name.span, "declared here"),
            );
            return;
        };

        let mut contents = IndexMap::new();
        for value in &ingredient.values {
            if let Ok((_, nutrient)) =
                self.program
                    .resolve_ref(decl.file, &[SymbolKind::Nutrient], &value.nutrient)
            {
                contents.insert(nutrient, value.value);
            }
        }

        self.columns.insert(
            decl,
            IngredientColumn {
                decl,
                id: ingredient.name.text.clone(),
                display_name: get_string_prop(&ingredient.props, "name"),
                code: get_string_prop(&ingredient.props, "code"),
                cost,
                contents,
            },
        );
    }

    /// Nutrients present on any used ingredient, in first-seen order.
    fn collect_nutrients(&self) -> Vec<NutrientColumn> {
        let mut out: IndexMap<DeclRef, NutrientColumn> = IndexMap::new();
        for column in self.columns.values() {
            for &nutrient in column.contents.keys() {
                out.entry(nutrient).or_insert_with(|| {
                    let decl = self.program.nutrient(nutrient).expect("content nutrient");
                    NutrientColumn {
                        decl: nutrient,
                        id: decl.name.text.clone(),
                        display_name: get_string_prop(&decl.props, "name"),
                        code: get_string_prop(&decl.props, "code"),
                        unit: get_string_prop(&decl.props, "unit"),
                    }
                });
            }
        }
        out.into_values().collect()
    }

    fn lower_nutrient_row(&mut self, row: &ComposedConstraint, problem: &mut LpProblem) {
        if row.bounds.is_empty() {
            return;
        }
        let label = row.expr.display_label();

        // A top-level division with variables below the bar is a ratio
        // constraint `A / D op V`, linearized as `A - V*D op 0`.
        if let Expr::Binary {
            op: BinOp::Div,
            left,
            right,
            ..
        } = unparen(&row.expr)
        {
            if let (Ok(num), Ok(den)) = (
                self.nutrient_expr(left, row.origin, row.span),
                self.nutrient_expr(right, row.origin, row.span),
            ) {
                if !den.is_constant() && num.constant == 0.0 && den.constant == 0.0 {
                    if let Some(bound) = &row.bounds.min {
                        let lhs = num.clone().combine(&den, -bound.value);
                        trace!(constraint = %label, bound = bound.value, "ratio min row");
                        problem.add_constraint(
                            format!("{}_min", label),
                            lhs.coefficients,
                            ConstraintOp::Ge,
                            -lhs.constant,
                        );
                    }
                    if let Some(bound) = &row.bounds.max {
                        let lhs = num.combine(&den, -bound.value);
                        trace!(constraint = %label, bound = bound.value, "ratio max row");
                        problem.add_constraint(
                            format!("{}_max", label),
                            lhs.coefficients,
                            ConstraintOp::Le,
                            -lhs.constant,
                        );
                    }
                    return;
                }
            }
        }

        let lin = match self.nutrient_expr(&row.expr, row.origin, row.span) {
            Ok(lin) => lin,
            Err(diag) => {
                self.diagnostics.push(diag);
                return;
            }
        };

        // The row is in absolute nutrient amounts: columns hold per-unit
        // fractions, so a percent-of-batch bound V becomes V*B/100 on the
        // right. A constant term on the LHS is percent-of-batch too and
        // moves across with the same scaling.
        if let Some(bound) = &row.bounds.min {
            trace!(constraint = %label, bound = bound.value, "nutrient min row");
            problem.add_constraint(
                format!("{}_min", label),
                lin.coefficients.clone(),
                ConstraintOp::Ge,
                (bound.value - lin.constant) * self.batch_size / 100.0,
            );
        }
        if let Some(bound) = &row.bounds.max {
            trace!(constraint = %label, bound = bound.value, "nutrient max row");
            problem.add_constraint(
                format!("{}_max", label),
                lin.coefficients,
                ConstraintOp::Le,
                (bound.value - lin.constant) * self.batch_size / 100.0,
            );
        }
    }

    fn lower_ingredient_row(
        &mut self,
        row: &ComposedConstraint,
        problem: &mut LpProblem,
        explicitly_bounded: &mut [bool],
    ) {
        if row.bounds.is_empty() {
            return; // pure mention; the variable is already collected
        }
        let label = row.expr.display_label();

        let lin = match self.ingredient_expr(&row.expr, row.origin, row.span) {
            Ok(lin) => lin,
            Err(diag) => {
                self.diagnostics.push(diag);
                return;
            }
        };

        for (index, coefficient) in lin.coefficients.iter().enumerate() {
            if *coefficient != 0.0 {
                explicitly_bounded[index] = true;
            }
        }

        if let Some(bound) = &row.bounds.min {
            trace!(constraint = %label, bound = bound.value, "ingredient min row");
            problem.add_constraint(
                format!("{}_min", label),
                lin.coefficients.clone(),
                ConstraintOp::Ge,
                self.bound_amount(bound) - lin.constant,
            );
        }
        if let Some(bound) = &row.bounds.max {
            trace!(constraint = %label, bound = bound.value, "ingredient max row");
            problem.add_constraint(
                format!("{}_max", label),
                lin.coefficients,
                ConstraintOp::Le,
                self.bound_amount(bound) - lin.constant,
            );
        }
    }

    /// Percent bounds rewrite to absolute amounts of the batch.
    fn bound_amount(&self, bound: &Bound) -> f64 {
        if bound.is_percent {
            bound.value * self.batch_size / 100.0
        } else {
            bound.value
        }
    }

    /// Evaluate a nutrient-block expression: references become content
    /// columns over the ingredient variables.
    fn nutrient_expr(
        &self,
        expr: &Expr,
        origin: FileId,
        span: Span,
    ) -> Result<LinExpr, Diagnostic> {
        let n = self.columns.len();
        match expr {
            Expr::Num { value, .. } => Ok(LinExpr::constant(n, *value)),
            Expr::Percent { span, .. } => Err(Diagnostic::error(
                DiagnosticKind::PercentContext,
                *span,
                "percent values are only valid inside ingredient blocks",
            )),
            Expr::Ref(path) => {
                let (_, nutrient) =
                    self.program
                        .resolve_ref(origin, &[SymbolKind::Nutrient], path)?;
                // Declared levels are percent of the ingredient; the column
                // holds the per-unit fraction.
                let coefficients = self
                    .columns
                    .values()
                    .map(|c| c.contents.get(&nutrient).copied().unwrap_or(0.0) / 100.0)
                    .collect();
                Ok(LinExpr {
                    coefficients,
                    constant: 0.0,
                })
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let l = self.nutrient_expr(left, origin, span)?;
                let r = self.nutrient_expr(right, origin, span)?;
                self.apply_op(*op, l, r, span)
            }
            Expr::Paren { inner, .. } => self.nutrient_expr(inner, origin, span),
        }
    }

    /// Evaluate an ingredient-block expression: references become amount
    /// variables, group references the sum of their members.
    fn ingredient_expr(
        &self,
        expr: &Expr,
        origin: FileId,
        span: Span,
    ) -> Result<LinExpr, Diagnostic> {
        let n = self.columns.len();
        match expr {
            Expr::Num { value, .. } => Ok(LinExpr::constant(n, *value)),
            Expr::Percent { value, .. } => {
                Ok(LinExpr::constant(n, value * self.batch_size / 100.0))
            }
            Expr::Ref(path) => {
                let (kind, decl) = self.program.resolve_ref(
                    origin,
                    &[SymbolKind::Ingredient, SymbolKind::Group],
                    path,
                )?;
                let mut coefficients = vec![0.0; n];
                match kind {
                    SymbolKind::Ingredient => {
                        if let Some(index) = self.columns.get_index_of(&decl) {
                            coefficients[index] = 1.0;
                        }
                    }
                    SymbolKind::Group => {
                        let group = self.program.group(decl).expect("resolved as group");
                        for member in &group.members {
                            let member_path = RefPath::simple(member.text.clone(), member.span);
                            if let Ok((_, ingredient)) = self.program.resolve_ref(
                                decl.file,
                                &[SymbolKind::Ingredient],
                                &member_path,
                            ) {
                                if let Some(index) = self.columns.get_index_of(&ingredient) {
                                    coefficients[index] = 1.0;
                                }
                            }
                        }
                    }
                    _ => unreachable!("resolve_ref honors the kind filter"),
                }
                Ok(LinExpr {
                    coefficients,
                    constant: 0.0,
                })
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let l = self.ingredient_expr(left, origin, span)?;
                let r = self.ingredient_expr(right, origin, span)?;
                self.apply_op(*op, l, r, span)
            }
            Expr::Paren { inner, .. } => self.ingredient_expr(inner, origin, span),
        }
    }

    fn apply_op(
        &self,
        op: BinOp,
        l: LinExpr,
        r: LinExpr,
        span: Span,
    ) -> Result<LinExpr, Diagnostic> {
        match op {
            BinOp::Add => Ok(l.combine(&r, 1.0)),
            BinOp::Sub => Ok(l.combine(&r, -1.0)),
            BinOp::Mul => {
                if r.is_constant() {
                    Ok(l.scaled(r.constant))
                } else if l.is_constant() {
                    Ok(r.scaled(l.constant))
                } else {
                    Err(self.nonlinear(span, "a product of two references is not linear"))
                }
            }
            BinOp::Div => {
                if r.is_constant() && r.constant != 0.0 {
                    Ok(l.scaled(1.0 / r.constant))
                } else if r.is_constant() {
                    Err(self.nonlinear(span, "division by zero"))
                } else {
                    Err(self.nonlinear(
                        span,
                        "division by a reference is only supported as a top-level ratio constraint",
                    ))
                }
            }
        }
    }

    fn nonlinear(&self, span: Span, message: &str) -> Diagnostic {
        Diagnostic::error(DiagnosticKind::Nonlinear, span, message)
    }
}

/// Strip grouping parentheses.
fn unparen(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren { inner, .. } => unparen(inner),
        other => other,
    }
}
