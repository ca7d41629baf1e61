//! AST node definitions.
//!
//! One [`Module`] per source unit. Nodes are immutable after parse and every
//! node carries a [`Span`]; recompilation always starts from fresh modules.

use serde::{Deserialize, Serialize};

use crate::foundation::{FileId, RefPath, Span};

/// Which constraint block of a formula a reference or item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Nutrients,
    Ingredients,
}

impl BlockKind {
    /// Canonical keyword for this block.
    pub fn keyword(self) -> &'static str {
        match self {
            BlockKind::Nutrients => "nutrients",
            BlockKind::Ingredients => "ingredients",
        }
    }
}

/// An identifier together with its source span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpannedName {
    pub text: String,
    pub span: Span,
}

impl SpannedName {
    pub fn new(text: impl Into<String>, span: Span) -> Self {
        Self {
            text: text.into(),
            span,
        }
    }
}

/// A parsed source unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Source unit this module was parsed from
    pub file: FileId,
    pub imports: Vec<Import>,
    pub decls: Vec<Decl>,
}

/// An `import` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub span: Span,
    /// The path as written (`./nutrients.fm`, `lib/minerals`)
    pub path: String,
    /// Span of just the path portion
    pub path_span: Span,
    pub binding: ImportBinding,
}

/// How an import binds names into the importing module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportBinding {
    /// Default: namespace bound to the filename stem
    Namespace,
    /// `as NAME`: namespace bound to an alias
    Alias(SpannedName),
    /// `{ a, b }`: listed names enter local scope directly
    Names(Vec<SpannedName>),
    /// `{ * }`: all exported names enter local scope
    Wildcard,
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Nutrient(NutrientDecl),
    Ingredient(IngredientDecl),
    Group(GroupDecl),
    Formula(FormulaDecl),
}

impl Decl {
    /// Declared name.
    pub fn name(&self) -> &str {
        match self {
            Decl::Nutrient(d) => &d.name.text,
            Decl::Ingredient(d) => &d.name.text,
            Decl::Group(d) => &d.name.text,
            Decl::Formula(d) => &d.name.text,
        }
    }

    /// Span of the declared name.
    pub fn name_span(&self) -> Span {
        match self {
            Decl::Nutrient(d) => d.name.span,
            Decl::Ingredient(d) => d.name.span,
            Decl::Group(d) => d.name.span,
            Decl::Formula(d) => d.name.span,
        }
    }

    /// Span of the whole declaration.
    pub fn span(&self) -> Span {
        match self {
            Decl::Nutrient(d) => d.span,
            Decl::Ingredient(d) => d.span,
            Decl::Group(d) => d.span,
            Decl::Formula(d) => d.span,
        }
    }

    /// Human-readable kind name for messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Decl::Nutrient(_) => "nutrient",
            Decl::Ingredient(_) => "ingredient",
            Decl::Group(_) => "group",
            Decl::Formula(_) => "formula",
        }
    }
}

/// `nutrient NAME { ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientDecl {
    pub span: Span,
    pub name: SpannedName,
    pub props: Vec<Property>,
}

/// `ingredient NAME { ... }` with per-nutrient concentrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientDecl {
    pub span: Span,
    pub name: SpannedName,
    pub props: Vec<Property>,
    /// Ordered `(nutrient reference, declared level)` pairs
    pub values: Vec<NutrientValue>,
}

/// One entry in an ingredient's nutrients block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientValue {
    pub span: Span,
    pub nutrient: RefPath,
    pub value: f64,
}

/// `group NAME { a, b, c }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDecl {
    pub span: Span,
    pub name: SpannedName,
    pub members: Vec<SpannedName>,
}

/// `formula NAME { ... }`, optionally prefixed with `template`.
///
/// Template formulas exist only to be composed from; they are never lowered
/// to a linear program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaDecl {
    pub span: Span,
    pub name: SpannedName,
    pub is_template: bool,
    pub props: Vec<Property>,
    pub nutrient_items: Vec<BlockItem>,
    pub ingredient_items: Vec<BlockItem>,
}

/// A property assignment `name value` (legacy `name: value`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub span: Span,
    pub name: String,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Str(String),
    Num(f64),
    Ident(String),
}

/// One item of a formula's nutrients or ingredients block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockItem {
    /// A constraint on an expression
    Constraint(ConstraintItem),
    /// A composition reference inlining constraints from elsewhere
    Include(CompositionRef),
}

impl BlockItem {
    pub fn span(&self) -> Span {
        match self {
            BlockItem::Constraint(c) => c.span,
            BlockItem::Include(r) => r.span(),
        }
    }
}

/// `EXPR [min V] [max V]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintItem {
    pub span: Span,
    pub expr: Expr,
    pub bounds: Bounds,
}

/// Optional lower/upper bounds on a constraint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Option<Bound>,
    pub max: Option<Bound>,
}

impl Bounds {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// A single bound value; `is_percent` marks a `%`-suffixed literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub span: Span,
    pub value: f64,
    pub is_percent: bool,
}

/// Which half of a two-sided bound a `SingleBound` reference selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundKind {
    Min,
    Max,
}

impl BoundKind {
    pub fn keyword(self) -> &'static str {
        match self {
            BoundKind::Min => "min",
            BoundKind::Max => "max",
        }
    }
}

/// A composition reference inside a formula block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompositionRef {
    /// `base.nutrients` — inline the base's whole composed block
    AllOf {
        span: Span,
        base: RefPath,
        block: BlockKind,
    },
    /// `base.nutrients.[x, y]` — inline only bare constraints on listed names
    Subset {
        span: Span,
        base: RefPath,
        block: BlockKind,
        names: Vec<SpannedName>,
    },
    /// `base.nutrients.protein.min` — inline one half of one constraint
    SingleBound {
        span: Span,
        base: RefPath,
        block: BlockKind,
        name: SpannedName,
        which: BoundKind,
    },
    /// `grains.[corn, wheat]` — mention listed group members individually
    GroupSelect {
        span: Span,
        group: RefPath,
        names: Vec<SpannedName>,
    },
    /// A bare group reference with no bounds — mention every member
    GroupAll { span: Span, group: RefPath },
}

impl CompositionRef {
    pub fn span(&self) -> Span {
        match self {
            CompositionRef::AllOf { span, .. }
            | CompositionRef::Subset { span, .. }
            | CompositionRef::SingleBound { span, .. }
            | CompositionRef::GroupSelect { span, .. }
            | CompositionRef::GroupAll { span, .. } => *span,
        }
    }
}

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    /// Is operand order irrelevant for this operator?
    pub fn is_commutative(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Mul)
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinOp::Add => write!(f, "+"),
            BinOp::Sub => write!(f, "-"),
            BinOp::Mul => write!(f, "*"),
            BinOp::Div => write!(f, "/"),
        }
    }
}

/// Constraint left-hand-side expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Num {
        span: Span,
        value: f64,
    },
    /// A `%`-suffixed literal; legal only inside ingredient blocks
    Percent {
        span: Span,
        value: f64,
    },
    Ref(RefPath),
    Binary {
        span: Span,
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Paren {
        span: Span,
        inner: Box<Expr>,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Num { span, .. }
            | Expr::Percent { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Paren { span, .. } => *span,
            Expr::Ref(path) => path.span,
        }
    }

    /// Visit every reference in the expression, left to right.
    pub fn walk_refs<'a>(&'a self, f: &mut impl FnMut(&'a RefPath)) {
        match self {
            Expr::Num { .. } | Expr::Percent { .. } => {}
            Expr::Ref(path) => f(path),
            Expr::Binary { left, right, .. } => {
                left.walk_refs(f);
                right.walk_refs(f);
            }
            Expr::Paren { inner, .. } => inner.walk_refs(f),
        }
    }

    /// The bare name this expression references, if it is exactly one
    /// single-segment reference (possibly parenthesized).
    pub fn as_bare_ref(&self) -> Option<&RefPath> {
        match self {
            Expr::Ref(path) if path.is_bare() => Some(path),
            Expr::Paren { inner, .. } => inner.as_bare_ref(),
            _ => None,
        }
    }

    /// Render the expression the way a report labels a constraint.
    pub fn display_label(&self) -> String {
        match self {
            Expr::Num { value, .. } => format_number(*value),
            Expr::Percent { value, .. } => format!("{}%", format_number(*value)),
            Expr::Ref(path) => path.to_string(),
            Expr::Binary {
                op, left, right, ..
            } => format!(
                "{} {} {}",
                left.display_label(),
                op,
                right.display_label()
            ),
            Expr::Paren { inner, .. } => format!("({})", inner.display_label()),
        }
    }
}

/// Trim trailing zeros from a float for display.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// Property lookup helpers with the surface aliases (`batch` for `batch_size`,
// `desc` for `description`).

/// Does a written property name match a canonical one, including aliases?
pub fn property_matches(written: &str, canonical: &str) -> bool {
    if written == canonical {
        return true;
    }
    matches!(
        (written, canonical),
        ("batch", "batch_size") | ("desc", "description")
    )
}

/// Find a string-valued property (identifiers count as strings).
pub fn get_string_prop(props: &[Property], canonical: &str) -> Option<String> {
    props.iter().find_map(|p| {
        if property_matches(&p.name, canonical) {
            match &p.value {
                PropertyValue::Str(s) => Some(s.clone()),
                PropertyValue::Ident(s) => Some(s.clone()),
                PropertyValue::Num(_) => None,
            }
        } else {
            None
        }
    })
}

/// Find a number-valued property.
pub fn get_number_prop(props: &[Property], canonical: &str) -> Option<f64> {
    props.iter().find_map(|p| {
        if property_matches(&p.name, canonical) {
            match &p.value {
                PropertyValue::Num(n) => Some(*n),
                _ => None,
            }
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        Span::new(0, 0, 0)
    }

    #[test]
    fn test_property_aliases() {
        let props = vec![
            Property {
                span: sp(),
                name: "batch".into(),
                value: PropertyValue::Num(1000.0),
            },
            Property {
                span: sp(),
                name: "desc".into(),
                value: PropertyValue::Str("starter feed".into()),
            },
        ];
        assert_eq!(get_number_prop(&props, "batch_size"), Some(1000.0));
        assert_eq!(
            get_string_prop(&props, "description").as_deref(),
            Some("starter feed")
        );
        assert_eq!(get_number_prop(&props, "cost"), None);
    }

    #[test]
    fn test_ident_property_counts_as_string() {
        let props = vec![Property {
            span: sp(),
            name: "code".into(),
            value: PropertyValue::Ident("CP".into()),
        }];
        assert_eq!(get_string_prop(&props, "code").as_deref(), Some("CP"));
    }

    #[test]
    fn test_as_bare_ref_through_parens() {
        let inner = Expr::Ref(RefPath::simple("protein", sp()));
        let expr = Expr::Paren {
            span: sp(),
            inner: Box::new(inner),
        };
        assert_eq!(expr.as_bare_ref().map(|p| p.to_string()), Some("protein".into()));
    }

    #[test]
    fn test_display_label() {
        let expr = Expr::Binary {
            span: sp(),
            op: BinOp::Div,
            left: Box::new(Expr::Ref(RefPath::simple("calcium", sp()))),
            right: Box::new(Expr::Ref(RefPath::simple("phosphorus", sp()))),
        };
        assert_eq!(expr.display_label(), "calcium / phosphorus");
    }

    #[test]
    fn test_walk_refs_order() {
        let expr = Expr::Binary {
            span: sp(),
            op: BinOp::Add,
            left: Box::new(Expr::Ref(RefPath::simple("corn", sp()))),
            right: Box::new(Expr::Ref(RefPath::simple("wheat", sp()))),
        };
        let mut seen = Vec::new();
        expr.walk_refs(&mut |p| seen.push(p.to_string()));
        assert_eq!(seen, vec!["corn", "wheat"]);
    }
}
