// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Formulang: a declarative language for least-cost feed formulation.
//!
//! A source program declares **nutrients**, **ingredients** (cost plus
//! per-nutrient levels), and **formulas** (batch size plus constraint
//! blocks). Each formula compiles to a linear program whose solution is the
//! cheapest blend meeting every constraint.
//!
//! Every entry point is a pure function of its inputs: no filesystem access,
//! no shared state, fully serializable results. Hosts with multiple files
//! pass a pre-bundled [`SourceSet`] to the `_in` variants.
//!
//! ```
//! let source = r#"
//!     nutrient protein {}
//!     ingredient corn { cost 150, nuts { protein 8.5 } }
//!     ingredient soybean_meal { cost 450, nuts { protein 48 } }
//!     formula starter {
//!         batch 1000
//!         nuts { protein min 20 }
//!         ings { corn, soybean_meal }
//!     }
//! "#;
//! let report = formulang::solve(source, "starter");
//! assert_eq!(report.status, formulang::SolveStatus::Optimal);
//! ```

mod service;

use tracing::debug;

pub use formulang_ast::{Diagnostic, DiagnosticFormatter, DiagnosticKind, Severity, Span};
pub use formulang_compiler::{
    AnalysisReport, IngredientLine, NutrientLine, ShadowPriceLine, SolveReport, SolveStatus,
    ViolationReport,
};
pub use formulang_resolve::{analyze, Program, SourceResolver, SourceSet};
pub use service::{
    Completion, CompletionKind, FormulaInfo, Hover, SemanticToken,
};

/// Default unit name for single-buffer entry points.
pub const ROOT_NAME: &str = "main.fm";

/// Solve one formula of a single source buffer.
pub fn solve(source: &str, formula_name: &str) -> SolveReport {
    solve_in(ROOT_NAME, source, &SourceSet::new(), formula_name)
}

/// Solve one formula of a root unit whose imports resolve through `sources`.
pub fn solve_in(
    root_name: &str,
    source: &str,
    sources: &dyn SourceResolver,
    formula_name: &str,
) -> SolveReport {
    debug!(formula = formula_name, root = root_name, "solve requested");
    let (program, diagnostics) = formulang_resolve::analyze(root_name, source, sources);

    // LP building requires an error-free program; warnings are fine.
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.to_string())
        .collect();
    if !errors.is_empty() {
        return SolveReport::failed(formula_name, errors.join("; "));
    }

    formulang_compiler::solve_formula(&program, formula_name)
}

/// Validate a single source buffer: lex, parse, link, resolve.
///
/// Later stages contribute only where earlier stages left enough structure;
/// the list is every diagnostic found, errors and warnings alike.
pub fn validate(source: &str) -> Vec<Diagnostic> {
    validate_in(ROOT_NAME, source, &SourceSet::new())
}

/// Validate a root unit whose imports resolve through `sources`.
pub fn validate_in(
    root_name: &str,
    source: &str,
    sources: &dyn SourceResolver,
) -> Vec<Diagnostic> {
    let (_program, diagnostics) = formulang_resolve::analyze(root_name, source, sources);
    diagnostics
}

/// List the formulas of a source buffer, templates included.
///
/// A cheap top-level scan that tolerates errors anywhere else in the buffer.
pub fn get_formulas(source: &str) -> Vec<FormulaInfo> {
    service::formulas(source)
}

/// Hover contents for a byte offset, on a best-effort partial parse.
pub fn get_hover(source: &str, offset: usize) -> Option<Hover> {
    service::hover(source, offset)
}

/// Completions for a byte offset, classified by grammatical context.
pub fn get_completions(source: &str, offset: usize) -> Vec<Completion> {
    service::completions(source, offset)
}

/// Classified tokens for syntax highlighting.
pub fn tokens(source: &str) -> Vec<SemanticToken> {
    service::semantic_tokens(source)
}
