// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Back half of the Formulang pipeline: lower a composed formula to a linear
//! program, hand it to the solver, and build the report.

pub mod lower;
pub mod report;

use formulang_resolve::Program;
use formulang_solver::Solver;
use tracing::debug;

pub use lower::{IngredientColumn, LoweredFormula, NutrientColumn};
pub use report::{
    AnalysisReport, IngredientLine, NutrientLine, ShadowPriceLine, SolveReport, SolveStatus,
    ViolationReport,
};

/// Lower a formula and solve it.
///
/// Conditions that prevent building the LP (unknown formula, template,
/// missing batch size or cost, unresolved references, composition cycles,
/// nonlinear expressions) come back as an `error`-status report carrying the
/// diagnostic messages; a built-but-infeasible LP comes back as an
/// `infeasible` report with per-constraint violations.
pub fn solve_formula(program: &Program, formula_name: &str) -> SolveReport {
    let Some(decl) = program.find_formula(formula_name) else {
        return SolveReport::failed(
            formula_name,
            format!("unknown formula `{}`", formula_name),
        );
    };

    let lowered = match lower::lower(program, decl) {
        Ok(lowered) => lowered,
        Err(diagnostics) => {
            let message = diagnostics
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return SolveReport::failed(formula_name, message);
        }
    };

    debug!(
        formula = %lowered.name,
        variables = lowered.problem.num_variables(),
        constraints = lowered.problem.num_constraints(),
        "solving lowered formula"
    );

    match Solver::new().solve(&lowered.problem) {
        Ok(solution) => report::build_report(&lowered, &solution),
        Err(err) => SolveReport::failed(formula_name, err.to_string()),
    }
}
