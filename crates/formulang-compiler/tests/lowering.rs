//! LP-structure tests: the lowered problem itself, not just the solve result.

use formulang_compiler::lower::lower;
use formulang_resolve::{analyze, SourceSet};
use formulang_solver::ConstraintOp;
use indoc::indoc;

fn lower_formula(source: &str, name: &str) -> formulang_compiler::LoweredFormula {
    let (program, diags) = analyze("main.fm", source, &SourceSet::new());
    let errors: Vec<_> = diags.iter().filter(|d| d.is_error()).collect();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let decl = program.find_formula(name).expect("formula exists");
    lower(&program, decl).expect("lowering succeeds")
}

const CATALOG: &str = indoc! {"
    nutrient protein {}
    ingredient corn { cost 150, nuts { protein 8.5 } }
    ingredient soybean_meal { cost 450, nuts { protein 48 } }
"};

#[test]
fn test_variables_objective_and_batch_row() {
    let source = format!(
        "{}\nformula f {{ batch 1000\n nuts {{ protein min 20 }}\n ings {{ corn, soybean_meal }} }}",
        CATALOG
    );
    let lowered = lower_formula(&source, "f");

    assert_eq!(lowered.problem.variables, vec!["corn", "soybean_meal"]);
    assert_eq!(lowered.problem.objective.coefficients, vec![150.0, 450.0]);
    assert!(lowered.problem.objective.minimize);

    let batch = lowered
        .problem
        .constraints
        .iter()
        .find(|c| c.name == "batch_size")
        .expect("batch row");
    assert_eq!(batch.op, ConstraintOp::Eq);
    assert_eq!(batch.rhs, 1000.0);
    assert_eq!(batch.coefficients, vec![1.0, 1.0]);
}

#[test]
fn test_nutrient_row_scaling() {
    let source = format!(
        "{}\nformula f {{ batch 1000\n nuts {{ protein min 20 }}\n ings {{ corn, soybean_meal }} }}",
        CATALOG
    );
    let lowered = lower_formula(&source, "f");

    // Columns hold per-unit fractions; the percent bound scales by B/100.
    let row = lowered
        .problem
        .constraints
        .iter()
        .find(|c| c.name == "protein_min")
        .expect("protein row");
    assert_eq!(row.op, ConstraintOp::Ge);
    assert!((row.coefficients[0] - 0.085).abs() < 1e-12);
    assert!((row.coefficients[1] - 0.48).abs() < 1e-12);
    assert!((row.rhs - 200.0).abs() < 1e-12);
}

#[test]
fn test_percent_bound_rewrites_to_absolute() {
    let percent = format!(
        "{}\nformula f {{ batch 1000\n nuts {{ protein min 20 }}\n ings {{ corn max 50%, soybean_meal }} }}",
        CATALOG
    );
    let absolute = format!(
        "{}\nformula f {{ batch 1000\n nuts {{ protein min 20 }}\n ings {{ corn max 500, soybean_meal }} }}",
        CATALOG
    );
    // Identical LPs, constraint for constraint.
    let a = lower_formula(&percent, "f");
    let b = lower_formula(&absolute, "f");
    assert_eq!(a.problem, b.problem);
}

#[test]
fn test_implicit_upper_bound_rows() {
    let source = format!(
        "{}\nformula f {{ batch 1000\n nuts {{ protein min 20 }}\n ings {{ corn max 40%, soybean_meal }} }}",
        CATALOG
    );
    let lowered = lower_formula(&source, "f");

    // corn is explicitly bounded; soybean_meal gets the implicit x <= B row.
    assert!(lowered
        .problem
        .constraints
        .iter()
        .any(|c| c.name == "soybean_meal_ub" && c.op == ConstraintOp::Le && c.rhs == 1000.0));
    assert!(!lowered
        .problem
        .constraints
        .iter()
        .any(|c| c.name == "corn_ub"));
}

#[test]
fn test_ratio_linearization() {
    let source = indoc! {"
        nutrient calcium {}
        nutrient phosphorus {}
        ingredient a { cost 10, nuts { calcium 30, phosphorus 10 } }
        ingredient b { cost 10, nuts { calcium 5, phosphorus 20 } }
        formula f {
            batch 100
            nuts { calcium / phosphorus min 1.5 max 2.0 }
            ings { a, b }
        }
    "};
    let lowered = lower_formula(source, "f");

    // min 1.5: ca - 1.5*p >= 0, per-unit fractions.
    let min_row = lowered
        .problem
        .constraints
        .iter()
        .find(|c| c.name == "calcium / phosphorus_min")
        .expect("ratio min row");
    assert_eq!(min_row.op, ConstraintOp::Ge);
    assert_eq!(min_row.rhs, 0.0);
    assert!((min_row.coefficients[0] - (0.30 - 1.5 * 0.10)).abs() < 1e-12);
    assert!((min_row.coefficients[1] - (0.05 - 1.5 * 0.20)).abs() < 1e-12);

    let max_row = lowered
        .problem
        .constraints
        .iter()
        .find(|c| c.name == "calcium / phosphorus_max")
        .expect("ratio max row");
    assert_eq!(max_row.op, ConstraintOp::Le);
    assert_eq!(max_row.rhs, 0.0);
}

#[test]
fn test_arithmetic_ingredient_expression() {
    let source = format!(
        "{}\nformula f {{ batch 1000\n nuts {{ protein min 10 }}\n ings {{ corn + soybean_meal max 80% }} }}",
        CATALOG
    );
    let lowered = lower_formula(&source, "f");
    let row = lowered
        .problem
        .constraints
        .iter()
        .find(|c| c.name == "corn + soybean_meal_max")
        .expect("sum row");
    assert_eq!(row.coefficients, vec![1.0, 1.0]);
    assert!((row.rhs - 800.0).abs() < 1e-12);
}

#[test]
fn test_nonlinear_expression_is_rejected() {
    let source = format!(
        "{}\nformula f {{ batch 1000\n nuts {{ protein * protein min 10 }}\n ings {{ corn }} }}",
        CATALOG
    );
    let (program, _) = analyze("main.fm", &source, &SourceSet::new());
    let decl = program.find_formula("f").unwrap();
    let errors = lower(&program, decl).expect_err("nonlinear must fail");
    assert!(errors
        .iter()
        .any(|d| d.kind == formulang_ast::DiagnosticKind::Nonlinear));
}

#[test]
fn test_lowering_is_deterministic() {
    let source = format!(
        "{}\ntemplate formula base {{ nuts {{ protein min 16 }} }}\nformula f {{ batch 1000\n nuts {{ base.nutrients, protein min 20 }}\n ings {{ corn, soybean_meal }} }}",
        CATALOG
    );
    let a = lower_formula(&source, "f");
    let b = lower_formula(&source, "f");
    assert_eq!(a.problem, b.problem);
}
