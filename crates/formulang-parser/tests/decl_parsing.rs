//! Declaration parsing tests.
//!
//! Verifies AST structure for every declaration form and the classification
//! of composition references inside formula blocks.

use formulang_ast::{
    BlockItem, BlockKind, BoundKind, CompositionRef, Decl, Expr, ImportBinding, PropertyValue,
};
use formulang_parser::parse;
use indoc::indoc;

/// Helper: parse and require zero diagnostics.
fn parse_clean(source: &str) -> formulang_ast::Module {
    let (module, diags) = parse(source, 0);
    assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
    module
}

#[test]
fn test_nutrient_declaration() {
    let module = parse_clean(indoc! {r#"
        nutrient protein {
            name "Crude Protein"
            code CP
            unit "%"
        }
    "#});

    assert_eq!(module.decls.len(), 1);
    match &module.decls[0] {
        Decl::Nutrient(n) => {
            assert_eq!(n.name.text, "protein");
            assert_eq!(n.props.len(), 3);
            assert_eq!(
                n.props[1].value,
                PropertyValue::Ident("CP".to_string())
            );
        }
        other => panic!("expected nutrient, got {:?}", other),
    }
}

#[test]
fn test_ingredient_declaration() {
    let module = parse_clean(indoc! {r#"
        ingredient corn {
            name "Yellow Corn"
            cost 150
            nutrients {
                protein 8.5
                energy 3350
            }
        }
    "#});

    match &module.decls[0] {
        Decl::Ingredient(i) => {
            assert_eq!(i.name.text, "corn");
            assert_eq!(i.values.len(), 2);
            assert_eq!(i.values[0].nutrient.to_string(), "protein");
            assert_eq!(i.values[0].value, 8.5);
        }
        other => panic!("expected ingredient, got {:?}", other),
    }
}

#[test]
fn test_group_declaration() {
    let module = parse_clean("group grains { corn, wheat, barley }");
    match &module.decls[0] {
        Decl::Group(g) => {
            assert_eq!(g.name.text, "grains");
            let members: Vec<_> = g.members.iter().map(|m| m.text.as_str()).collect();
            assert_eq!(members, vec!["corn", "wheat", "barley"]);
        }
        other => panic!("expected group, got {:?}", other),
    }
}

#[test]
fn test_formula_with_blocks() {
    let module = parse_clean(indoc! {r#"
        formula starter {
            batch_size 1000

            nutrients {
                protein min 20 max 24
                energy min 2800
            }

            ingredients {
                corn max 50%
                soybean_meal min 20%
            }
        }
    "#});

    match &module.decls[0] {
        Decl::Formula(f) => {
            assert_eq!(f.name.text, "starter");
            assert!(!f.is_template);
            assert_eq!(f.nutrient_items.len(), 2);
            assert_eq!(f.ingredient_items.len(), 2);

            let BlockItem::Constraint(c) = &f.nutrient_items[0] else {
                panic!("expected constraint");
            };
            assert_eq!(c.bounds.min.as_ref().unwrap().value, 20.0);
            assert_eq!(c.bounds.max.as_ref().unwrap().value, 24.0);

            let BlockItem::Constraint(c) = &f.ingredient_items[0] else {
                panic!("expected constraint");
            };
            let max = c.bounds.max.as_ref().unwrap();
            assert_eq!(max.value, 50.0);
            assert!(max.is_percent);
        }
        other => panic!("expected formula, got {:?}", other),
    }
}

#[test]
fn test_shorthand_aliases() {
    let module = parse_clean(indoc! {r#"
        formula test {
            batch 1000
            desc "short aliases"
            nuts { protein min 20 }
            ings { corn }
        }
    "#});

    match &module.decls[0] {
        Decl::Formula(f) => {
            assert_eq!(f.nutrient_items.len(), 1);
            assert_eq!(f.ingredient_items.len(), 1);
        }
        other => panic!("expected formula, got {:?}", other),
    }
}

#[test]
fn test_legacy_colon_properties() {
    let module = parse_clean(indoc! {r#"
        nutrient protein {
            name: "Crude Protein"
            unit: "%"
        }
    "#});
    match &module.decls[0] {
        Decl::Nutrient(n) => assert_eq!(n.props.len(), 2),
        other => panic!("expected nutrient, got {:?}", other),
    }
}

#[test]
fn test_template_formula() {
    let module = parse_clean("template formula base { nuts { protein min 16 } }");
    match &module.decls[0] {
        Decl::Formula(f) => assert!(f.is_template),
        other => panic!("expected formula, got {:?}", other),
    }
}

#[test]
fn test_composition_all_of() {
    let module = parse_clean(indoc! {"
        formula child {
            batch 1000
            nuts { base.nutrients }
            ings { base.ingredients }
        }
    "});
    match &module.decls[0] {
        Decl::Formula(f) => {
            assert!(matches!(
                &f.nutrient_items[0],
                BlockItem::Include(CompositionRef::AllOf {
                    block: BlockKind::Nutrients,
                    ..
                })
            ));
            assert!(matches!(
                &f.ingredient_items[0],
                BlockItem::Include(CompositionRef::AllOf {
                    block: BlockKind::Ingredients,
                    ..
                })
            ));
        }
        other => panic!("expected formula, got {:?}", other),
    }
}

#[test]
fn test_composition_subset_and_single_bound() {
    let module = parse_clean(indoc! {"
        formula child {
            batch 1000
            nuts {
                base.nutrients.[protein, energy]
                base.nutrients.lysine.min
            }
        }
    "});
    match &module.decls[0] {
        Decl::Formula(f) => {
            match &f.nutrient_items[0] {
                BlockItem::Include(CompositionRef::Subset { base, names, .. }) => {
                    assert_eq!(base.to_string(), "base");
                    let names: Vec<_> = names.iter().map(|n| n.text.as_str()).collect();
                    assert_eq!(names, vec!["protein", "energy"]);
                }
                other => panic!("expected subset, got {:?}", other),
            }
            match &f.nutrient_items[1] {
                BlockItem::Include(CompositionRef::SingleBound { name, which, .. }) => {
                    assert_eq!(name.text, "lysine");
                    assert_eq!(*which, BoundKind::Min);
                }
                other => panic!("expected single bound, got {:?}", other),
            }
        }
        other => panic!("expected formula, got {:?}", other),
    }
}

#[test]
fn test_group_select() {
    let module = parse_clean(indoc! {"
        formula f {
            batch 1000
            ings { grains.[corn, wheat] }
        }
    "});
    match &module.decls[0] {
        Decl::Formula(f) => match &f.ingredient_items[0] {
            BlockItem::Include(CompositionRef::GroupSelect { group, names, .. }) => {
                assert_eq!(group.to_string(), "grains");
                assert_eq!(names.len(), 2);
            }
            other => panic!("expected group select, got {:?}", other),
        },
        other => panic!("expected formula, got {:?}", other),
    }
}

#[test]
fn test_ratio_constraint_expression() {
    let module = parse_clean(indoc! {"
        formula f {
            batch 1000
            nuts { calcium / phosphorus min 1.5 max 2.0 }
        }
    "});
    match &module.decls[0] {
        Decl::Formula(f) => {
            let BlockItem::Constraint(c) = &f.nutrient_items[0] else {
                panic!("expected constraint");
            };
            match &c.expr {
                Expr::Binary { op, .. } => assert_eq!(*op, formulang_ast::BinOp::Div),
                other => panic!("expected binary op, got {:?}", other),
            }
        }
        other => panic!("expected formula, got {:?}", other),
    }
}

#[test]
fn test_import_forms() {
    let module = parse_clean(indoc! {r#"
        import ./nutrients.fm
        import lib/minerals as mins
        import ./vitamins.fm { * }
        import ./premixes.fm { broiler_premix, layer_premix }
    "#});

    assert_eq!(module.imports.len(), 4);
    assert_eq!(module.imports[0].path, "./nutrients.fm");
    assert!(matches!(module.imports[0].binding, ImportBinding::Namespace));
    match &module.imports[1].binding {
        ImportBinding::Alias(alias) => assert_eq!(alias.text, "mins"),
        other => panic!("expected alias, got {:?}", other),
    }
    assert!(matches!(module.imports[2].binding, ImportBinding::Wildcard));
    match &module.imports[3].binding {
        ImportBinding::Names(names) => assert_eq!(names.len(), 2),
        other => panic!("expected names, got {:?}", other),
    }
}

#[test]
fn test_string_import_path() {
    let module = parse_clean(r#"import "./nutrients.fm""#);
    assert_eq!(module.imports[0].path, "./nutrients.fm");
}

#[test]
fn test_declarations_in_any_order() {
    let module = parse_clean(indoc! {"
        formula f { batch 100, nuts { protein min 5 }, ings { corn } }
        nutrient protein {}
        ingredient corn { cost 100, nuts { protein 8 } }
    "});
    assert_eq!(module.decls.len(), 3);
}

#[test]
fn test_comma_separated_items() {
    let module = parse_clean("formula f { batch 100, nuts { protein min 5, fat max 4 }, ings { corn } }");
    match &module.decls[0] {
        Decl::Formula(f) => assert_eq!(f.nutrient_items.len(), 2),
        other => panic!("expected formula, got {:?}", other),
    }
}
