//! Error recovery tests.
//!
//! A broken declaration or block item must not take the rest of the module
//! with it: valid items still parse and every failure leaves a diagnostic.

use formulang_ast::Decl;
use formulang_parser::parse;
use indoc::indoc;

#[test]
fn test_broken_declaration_recovers_to_next() {
    let source = indoc! {r#"
        nutrient protein {
            name "Protein"
        }

        nutrient broken
            name "missing opening brace"
        }

        ingredient corn {
            cost 100
            nuts { protein 8.0 }
        }

        formula test {
            batch 1000
            nuts { protein min 20 }
            ings { corn }
        }
    "#};

    let (module, diags) = parse(source, 0);
    assert!(!diags.is_empty(), "should report the broken declaration");

    let names: Vec<_> = module.decls.iter().map(Decl::name).collect();
    assert!(names.contains(&"protein"));
    assert!(names.contains(&"corn"));
    assert!(names.contains(&"test"));
}

#[test]
fn test_broken_block_item_keeps_formula() {
    let source = indoc! {"
        formula test {
            batch 1000
            nuts {
                protein min
                energy min 2800
            }
            ings { corn }
        }
    "};

    let (module, diags) = parse(source, 0);
    assert_eq!(diags.len(), 1);

    match &module.decls[0] {
        Decl::Formula(f) => {
            // The bad `protein min` item is dropped, the rest survives.
            assert_eq!(f.nutrient_items.len(), 1);
            assert_eq!(f.ingredient_items.len(), 1);
        }
        other => panic!("expected formula, got {:?}", other),
    }
}

#[test]
fn test_unterminated_string_recovers() {
    let source = indoc! {r#"
        nutrient protein {
            name "unterminated
        }
        nutrient energy {}
    "#};

    let (module, diags) = parse(source, 0);
    assert!(diags
        .iter()
        .any(|d| d.kind == formulang_ast::DiagnosticKind::UnterminatedString));
    // `energy` still parses.
    assert!(module.decls.iter().any(|d| d.name() == "energy"));
}

#[test]
fn test_composition_ref_with_bounds_is_rejected() {
    let source = indoc! {"
        formula test {
            batch 1000
            nuts { base.nutrients min 5 }
        }
    "};
    let (_, diags) = parse(source, 0);
    assert!(diags.iter().any(|d| d.message.contains("no bounds")));
}

#[test]
fn test_empty_source() {
    let (module, diags) = parse("", 0);
    assert!(module.decls.is_empty());
    assert!(diags.is_empty());
}

#[test]
fn test_spans_point_into_source() {
    let source = "formula f {\n  batch 1000\n  nuts { protein min }\n}";
    let (_, diags) = parse(source, 0);
    assert!(!diags.is_empty());
    for d in &diags {
        assert!((d.span.end as usize) <= source.len());
        assert!(d.span.start <= d.span.end);
    }
}
