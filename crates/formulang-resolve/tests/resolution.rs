//! Name resolution and typing tests over whole programs.

use formulang_ast::DiagnosticKind;
use formulang_resolve::{analyze, SourceSet, SymbolKind};
use indoc::indoc;

fn errors_of(diags: &[formulang_ast::Diagnostic]) -> Vec<DiagnosticKind> {
    diags.iter().filter(|d| d.is_error()).map(|d| d.kind).collect()
}

#[test]
fn test_local_resolution() {
    let source = indoc! {"
        nutrient protein {}
        ingredient corn { cost 100, nuts { protein 8.5 } }
        formula f {
            batch 1000
            nuts { protein min 20 }
            ings { corn }
        }
    "};
    let (program, diags) = analyze("main.fm", source, &SourceSet::new());
    assert!(errors_of(&diags).is_empty(), "diags: {:?}", diags);
    assert!(program
        .symbols
        .resolve_name(0, SymbolKind::Nutrient, "protein")
        .is_ok());
}

#[test]
fn test_unknown_and_wrong_kind() {
    let source = indoc! {"
        nutrient protein {}
        ingredient corn { cost 100, nuts { protein 8.5 } }
        formula f {
            batch 1000
            nuts { corn min 20, lysine min 1 }
            ings { protein }
        }
    "};
    let (_, diags) = analyze("main.fm", source, &SourceSet::new());
    let errors = errors_of(&diags);
    // corn in nuts, protein in ings => wrong kind; lysine => unknown.
    assert_eq!(
        errors.iter().filter(|k| **k == DiagnosticKind::WrongKind).count(),
        2
    );
    assert!(errors.contains(&DiagnosticKind::UnknownName));
}

#[test]
fn test_duplicate_declaration() {
    let source = "nutrient protein {}\nnutrient protein {}";
    let (_, diags) = analyze("main.fm", source, &SourceSet::new());
    assert!(errors_of(&diags).contains(&DiagnosticKind::DuplicateName));
}

#[test]
fn test_same_name_different_kind_is_fine() {
    // Names are unique per kind.
    let source = indoc! {"
        nutrient fiber {}
        group fiber_sources { straw }
        ingredient straw { cost 10, nuts { fiber 30 } }
    "};
    let (_, diags) = analyze("main.fm", source, &SourceSet::new());
    assert!(errors_of(&diags).is_empty(), "diags: {:?}", diags);
}

#[test]
fn test_namespace_import() {
    let sources = SourceSet::new().with(
        "nutrients.fm",
        "nutrient protein {}\nnutrient energy {}",
    );
    let main = indoc! {"
        import ./nutrients.fm
        ingredient corn { cost 100, nuts { nutrients.protein 8.5 } }
        formula f {
            batch 1000
            nuts { nutrients.protein min 20 }
            ings { corn }
        }
    "};
    let (_, diags) = analyze("main.fm", main, &sources);
    assert!(errors_of(&diags).is_empty(), "diags: {:?}", diags);
}

#[test]
fn test_aliased_import() {
    let sources = SourceSet::new().with("lib/minerals.fm", "nutrient calcium {}");
    let main = indoc! {"
        import ./lib/minerals.fm as mins
        ingredient limestone { cost 40, nuts { mins.calcium 38 } }
    "};
    let (_, diags) = analyze("main.fm", main, &sources);
    assert!(errors_of(&diags).is_empty(), "diags: {:?}", diags);
}

#[test]
fn test_direct_import() {
    let sources = SourceSet::new().with(
        "nutrients.fm",
        "nutrient protein {}\nnutrient energy {}",
    );
    let main = indoc! {"
        import ./nutrients.fm { protein }
        ingredient corn { cost 100, nuts { protein 8.5, energy 3300 } }
    "};
    let (_, diags) = analyze("main.fm", main, &sources);
    // protein resolves; energy was not imported.
    let errors = errors_of(&diags);
    assert_eq!(errors, vec![DiagnosticKind::UnknownName]);
}

#[test]
fn test_wildcard_import_and_reexport() {
    let sources = SourceSet::new()
        .with("base.fm", "nutrient protein {}")
        .with("mid.fm", "import ./base.fm { * }");
    let main = indoc! {"
        import ./mid.fm { * }
        ingredient corn { cost 100, nuts { protein 8.5 } }
    "};
    // Wildcard re-exports propagate transitively through mid.fm.
    let (_, diags) = analyze("main.fm", main, &sources);
    assert!(errors_of(&diags).is_empty(), "diags: {:?}", diags);
}

#[test]
fn test_wildcard_ambiguity_reported_at_use() {
    let sources = SourceSet::new()
        .with("a.fm", "nutrient protein {}")
        .with("b.fm", "nutrient protein {}");

    // Importing both is fine on its own...
    let ok = "import ./a.fm { * }\nimport ./b.fm { * }";
    let (_, diags) = analyze("main.fm", ok, &sources);
    assert!(errors_of(&diags).is_empty(), "diags: {:?}", diags);

    // ...the error appears when the colliding name is actually used.
    let bad = indoc! {"
        import ./a.fm { * }
        import ./b.fm { * }
        ingredient corn { cost 100, nuts { protein 8.5 } }
    "};
    let (_, diags) = analyze("main.fm", bad, &sources);
    assert!(errors_of(&diags).contains(&DiagnosticKind::AmbiguousName));
}

#[test]
fn test_diamond_wildcard_is_not_ambiguous() {
    // The same declaration reached through two paths is one declaration.
    let sources = SourceSet::new()
        .with("shared.fm", "nutrient protein {}")
        .with("a.fm", "import ./shared.fm { * }")
        .with("b.fm", "import ./shared.fm { * }");
    let main = indoc! {"
        import ./a.fm { * }
        import ./b.fm { * }
        ingredient corn { cost 100, nuts { protein 8.5 } }
    "};
    let (_, diags) = analyze("main.fm", main, &sources);
    assert!(errors_of(&diags).is_empty(), "diags: {:?}", diags);
}

#[test]
fn test_import_cycle_is_error() {
    let sources = SourceSet::new()
        .with("a.fm", "import ./b.fm")
        .with("b.fm", "import ./a.fm");
    let (_, diags) = analyze("main.fm", "import ./a.fm", &sources);
    assert!(errors_of(&diags).contains(&DiagnosticKind::ImportCycle));
}

#[test]
fn test_percent_in_nutrient_block() {
    let source = indoc! {"
        nutrient protein {}
        formula f {
            batch 1000
            nuts { protein min 20% }
        }
    "};
    let (_, diags) = analyze("main.fm", source, &SourceSet::new());
    assert!(errors_of(&diags).contains(&DiagnosticKind::PercentContext));
}

#[test]
fn test_unknown_property() {
    let source = "nutrient protein { colour \"red\" }";
    let (_, diags) = analyze("main.fm", source, &SourceSet::new());
    assert!(errors_of(&diags).contains(&DiagnosticKind::UnknownProperty));
}

#[test]
fn test_missing_cost_and_batch_warnings() {
    let source = indoc! {"
        nutrient protein {}
        ingredient corn { nuts { protein 8.5 } }
        formula f { nuts { protein min 20 } ings { corn } }
    "};
    let (_, diags) = analyze("main.fm", source, &SourceSet::new());
    let warnings: Vec<_> = diags
        .iter()
        .filter(|d| d.severity == formulang_ast::Severity::Warning)
        .map(|d| d.kind)
        .collect();
    assert!(warnings.contains(&DiagnosticKind::MissingCost));
    assert!(warnings.contains(&DiagnosticKind::MissingBatch));
}

#[test]
fn test_group_member_must_be_ingredient() {
    let source = indoc! {"
        nutrient protein {}
        group grains { protein }
    "};
    let (_, diags) = analyze("main.fm", source, &SourceSet::new());
    assert!(errors_of(&diags).contains(&DiagnosticKind::WrongKind));
}

#[test]
fn test_find_formula() {
    let source = indoc! {"
        template formula base { nuts { } }
        formula starter { batch 1000 }
    "};
    let (program, _) = analyze("main.fm", source, &SourceSet::new());
    assert!(program.find_formula("starter").is_some());
    assert!(program.find_formula("base").is_some());
    assert!(program.find_formula("nope").is_none());

    let listed: Vec<_> = program
        .root_formulas()
        .map(|(_, f)| (f.name.text.clone(), f.is_template))
        .collect();
    assert_eq!(
        listed,
        vec![("base".to_string(), true), ("starter".to_string(), false)]
    );
}
