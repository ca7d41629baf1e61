//! Composition engine tests: expansion, overrides, cycles, groups.

use formulang_ast::{BlockKind, DiagnosticKind, Expr, Span};
use formulang_resolve::{analyze, ComposedConstraint, Composer, Program, SourceSet};
use indoc::indoc;

fn analyze_clean(source: &str) -> Program {
    let (program, diags) = analyze("main.fm", source, &SourceSet::new());
    let errors: Vec<_> = diags.iter().filter(|d| d.is_error()).collect();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    program
}

fn compose(
    program: &Program,
    formula: &str,
    block: BlockKind,
) -> (Vec<ComposedConstraint>, Vec<formulang_ast::Diagnostic>) {
    let decl = program.find_formula(formula).expect("formula exists");
    let mut diags = Vec::new();
    let composed = Composer::new(program)
        .composed(decl, block, Span::zero(0), &mut diags)
        .expect("no composition cycle");
    (composed, diags)
}

fn lhs_label(c: &ComposedConstraint) -> String {
    c.expr.display_label()
}

#[test]
fn test_all_of_inlines_base() {
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        nutrient energy {}
        template formula base {
            nuts { protein min 16 max 24, energy min 2800 }
        }
        formula child {
            batch 1000
            nuts { base.nutrients }
        }
    "});
    let (composed, _) = compose(&program, "child", BlockKind::Nutrients);
    let labels: Vec<_> = composed.iter().map(lhs_label).collect();
    assert_eq!(labels, vec!["protein", "energy"]);
}

#[test]
fn test_override_replaces_whole_constraint() {
    // The later `protein min 22` replaces the inherited constraint entirely:
    // the base's max 24 does not survive.
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        template formula base {
            nuts { protein min 16 max 24 }
        }
        formula child {
            batch 1000
            nuts { base.nutrients, protein min 22 }
        }
    "});
    let (composed, _) = compose(&program, "child", BlockKind::Nutrients);
    assert_eq!(composed.len(), 1);
    let c = &composed[0];
    assert_eq!(c.bounds.min.as_ref().unwrap().value, 22.0);
    assert!(c.bounds.max.is_none());
}

#[test]
fn test_override_takes_last_position() {
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        nutrient energy {}
        nutrient fat {}
        template formula base {
            nuts { protein min 16, energy min 2800, fat max 6 }
        }
        formula child {
            batch 1000
            nuts { base.nutrients, protein min 22 }
        }
    "});
    let (composed, _) = compose(&program, "child", BlockKind::Nutrients);
    let labels: Vec<_> = composed.iter().map(lhs_label).collect();
    assert_eq!(labels, vec!["energy", "fat", "protein"]);
}

#[test]
fn test_subset_selects_bare_constraints_only() {
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        nutrient energy {}
        nutrient calcium {}
        nutrient phosphorus {}
        template formula base {
            nuts {
                protein min 16
                energy min 2800
                calcium / phosphorus min 1.5
            }
        }
        formula child {
            batch 1000
            nuts { base.nutrients.[protein, calcium] }
        }
    "});
    let (composed, _) = compose(&program, "child", BlockKind::Nutrients);
    // `protein` is selected; the ratio constraint is never subset-selected,
    // and `calcium` has no bare constraint in the base.
    let labels: Vec<_> = composed.iter().map(lhs_label).collect();
    assert_eq!(labels, vec!["protein"]);
}

#[test]
fn test_single_bound_inherits_one_half() {
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        template formula base {
            nuts { protein min 16 max 24 }
        }
        formula child {
            batch 1000
            nuts { base.nutrients.protein.min }
        }
    "});
    let (composed, diags) = compose(&program, "child", BlockKind::Nutrients);
    assert_eq!(composed.len(), 1);
    assert_eq!(composed[0].bounds.min.as_ref().unwrap().value, 16.0);
    assert!(composed[0].bounds.max.is_none());
    assert!(diags.is_empty());
}

#[test]
fn test_single_bound_missing_is_warning() {
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        template formula base {
            nuts { protein max 24 }
        }
        formula child {
            batch 1000
            nuts { base.nutrients.protein.min }
        }
    "});
    let (composed, diags) = compose(&program, "child", BlockKind::Nutrients);
    assert!(composed.is_empty());
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].kind, DiagnosticKind::MissingBound);
    assert!(!diags[0].is_error());
}

#[test]
fn test_chained_inheritance() {
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        template formula grandparent { nuts { protein min 10 } }
        template formula parent { nuts { grandparent.nutrients, protein min 14 } }
        formula child { batch 1000, nuts { parent.nutrients } }
    "});
    let (composed, _) = compose(&program, "child", BlockKind::Nutrients);
    assert_eq!(composed.len(), 1);
    assert_eq!(composed[0].bounds.min.as_ref().unwrap().value, 14.0);
}

#[test]
fn test_composition_cycle_is_hard_error() {
    let (program, diags) = analyze(
        "main.fm",
        indoc! {"
            nutrient protein {}
            formula a { batch 100, nuts { b.nutrients } }
            formula b { batch 100, nuts { a.nutrients } }
        "},
        &SourceSet::new(),
    );

    // Validation already surfaces the cycle.
    assert!(diags.iter().any(|d| d.kind == DiagnosticKind::ComposeCycle));

    let decl = program.find_formula("a").unwrap();
    let mut warn = Vec::new();
    let err = Composer::new(&program)
        .composed(decl, BlockKind::Nutrients, Span::zero(0), &mut warn)
        .expect_err("cycle must error");
    assert_eq!(err.kind, DiagnosticKind::ComposeCycle);
    assert!(err.message.contains("a") && err.message.contains("b"));
}

#[test]
fn test_composition_determinism() {
    let source = indoc! {"
        nutrient protein {}
        nutrient energy {}
        template formula base { nuts { protein min 16, energy min 2800 } }
        formula child { batch 1000, nuts { base.nutrients, protein min 20 } }
    "};
    let program = analyze_clean(source);
    let (a, _) = compose(&program, "child", BlockKind::Nutrients);
    let (b, _) = compose(&program, "child", BlockKind::Nutrients);
    assert_eq!(a, b);
}

#[test]
fn test_group_mention_expands_members() {
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        ingredient corn { cost 100, nuts { protein 8.5 } }
        ingredient wheat { cost 120, nuts { protein 11 } }
        group grains { corn, wheat }
        formula f {
            batch 1000
            ings { grains }
        }
    "});
    let (composed, _) = compose(&program, "f", BlockKind::Ingredients);
    let labels: Vec<_> = composed.iter().map(lhs_label).collect();
    assert_eq!(labels, vec!["corn", "wheat"]);
    assert!(composed.iter().all(|c| c.bounds.is_empty()));
}

#[test]
fn test_group_with_bounds_stays_sum_constraint() {
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        ingredient corn { cost 100, nuts { protein 8.5 } }
        ingredient wheat { cost 120, nuts { protein 11 } }
        group grains { corn, wheat }
        formula f {
            batch 1000
            ings { grains max 60% }
        }
    "});
    let (composed, _) = compose(&program, "f", BlockKind::Ingredients);
    assert_eq!(composed.len(), 1);
    assert!(matches!(composed[0].expr, Expr::Ref(_)));
    assert!(composed[0].bounds.max.is_some());
}

#[test]
fn test_group_select_mentions_subset() {
    let program = analyze_clean(indoc! {"
        nutrient protein {}
        ingredient corn { cost 100, nuts { protein 8.5 } }
        ingredient wheat { cost 120, nuts { protein 11 } }
        ingredient barley { cost 110, nuts { protein 10 } }
        group grains { corn, wheat, barley }
        formula f {
            batch 1000
            ings { grains.[corn, barley] }
        }
    "});
    let (composed, _) = compose(&program, "f", BlockKind::Ingredients);
    let labels: Vec<_> = composed.iter().map(lhs_label).collect();
    assert_eq!(labels, vec!["corn", "barley"]);
}

#[test]
fn test_cross_module_composition_resolves_in_origin() {
    // The base formula references a nutrient that only its own module
    // imports directly; composition must keep resolving it there.
    let sources = SourceSet::new()
        .with("nutrients.fm", "nutrient lysine {}")
        .with(
            "base.fm",
            indoc! {"
                import ./nutrients.fm { lysine }
                template formula base { nuts { lysine min 1.1 } }
            "},
        );
    let main = indoc! {"
        import ./base.fm { * }
        formula child { batch 1000, nuts { base.nutrients } }
    "};
    let (program, diags) = analyze("main.fm", main, &sources);
    assert!(diags.iter().all(|d| !d.is_error()), "diags: {:?}", diags);

    let decl = program.find_formula("child").unwrap();
    let mut warn = Vec::new();
    let composed = Composer::new(&program)
        .composed(decl, BlockKind::Nutrients, Span::zero(0), &mut warn)
        .unwrap();
    assert_eq!(composed.len(), 1);
    // Origin is base.fm, not main.fm.
    assert_eq!(program.module_name(composed[0].origin), "base.fm");
}
