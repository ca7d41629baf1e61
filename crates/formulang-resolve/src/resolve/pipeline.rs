//! Pass orchestration and the resolved [`Program`] view.

use formulang_ast::{
    BlockKind, Decl, Diagnostic, DiagnosticKind, FileId, FormulaDecl, GroupDecl, IngredientDecl,
    Module, NutrientDecl, RefPath, SourceMap,
};

use super::compose::Composer;
use super::linker::{load, SourceResolver};
use super::names::{build_symbols, describe_candidates, DeclRef, LookupError, SymbolKind, Symbols};
use super::typing;

/// A fully linked and name-checked program.
///
/// Immutable: downstream stages (composition, LP building, tooling queries)
/// only read from it. The root unit is always file 0.
#[derive(Debug, Clone)]
pub struct Program {
    pub sources: SourceMap,
    pub modules: Vec<Module>,
    pub symbols: Symbols,
}

impl Program {
    /// The root source unit's ID.
    pub fn root(&self) -> FileId {
        0
    }

    pub fn module(&self, file: FileId) -> &Module {
        &self.modules[file as usize]
    }

    pub fn module_name(&self, file: FileId) -> &str {
        self.sources
            .get(file)
            .map(|f| f.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn decl(&self, decl: DeclRef) -> &Decl {
        &self.modules[decl.file as usize].decls[decl.index]
    }

    pub fn nutrient(&self, decl: DeclRef) -> Option<&NutrientDecl> {
        match self.decl(decl) {
            Decl::Nutrient(d) => Some(d),
            _ => None,
        }
    }

    pub fn ingredient(&self, decl: DeclRef) -> Option<&IngredientDecl> {
        match self.decl(decl) {
            Decl::Ingredient(d) => Some(d),
            _ => None,
        }
    }

    pub fn group(&self, decl: DeclRef) -> Option<&GroupDecl> {
        match self.decl(decl) {
            Decl::Group(d) => Some(d),
            _ => None,
        }
    }

    pub fn formula(&self, decl: DeclRef) -> Option<&FormulaDecl> {
        match self.decl(decl) {
            Decl::Formula(d) => Some(d),
            _ => None,
        }
    }

    /// Formulas declared in the root unit, in source order.
    pub fn root_formulas(&self) -> impl Iterator<Item = (DeclRef, &FormulaDecl)> {
        self.modules[0]
            .decls
            .iter()
            .enumerate()
            .filter_map(|(index, decl)| match decl {
                Decl::Formula(f) => Some((DeclRef { file: 0, index }, f)),
                _ => None,
            })
    }

    /// Find a formula by name: root scope first, then any loaded module.
    pub fn find_formula(&self, name: &str) -> Option<DeclRef> {
        if let Ok(decl) = self.symbols.resolve_name(0, SymbolKind::Formula, name) {
            return Some(decl);
        }
        for (file, module) in self.modules.iter().enumerate() {
            for (index, decl) in module.decls.iter().enumerate() {
                if matches!(decl, Decl::Formula(_)) && decl.name() == name {
                    return Some(DeclRef {
                        file: file as FileId,
                        index,
                    });
                }
            }
        }
        None
    }

    /// Resolve a reference that may be one of several kinds, producing a
    /// precise diagnostic on failure.
    ///
    /// Kinds are tried in order; the first hit wins. When nothing matches,
    /// the other kinds are probed to distinguish "wrong kind here" from
    /// "unknown name".
    pub fn resolve_ref(
        &self,
        from: FileId,
        kinds: &[SymbolKind],
        path: &RefPath,
    ) -> Result<(SymbolKind, DeclRef), Diagnostic> {
        let mut ambiguous: Option<Vec<DeclRef>> = None;
        for &kind in kinds {
            match self.symbols.resolve_path(from, kind, path) {
                Ok(decl) => return Ok((kind, decl)),
                Err(LookupError::Ambiguous(candidates)) => {
                    ambiguous.get_or_insert(candidates);
                }
                Err(LookupError::NotFound) => {}
            }
        }

        if let Some(candidates) = ambiguous {
            return Err(Diagnostic::error(
                DiagnosticKind::AmbiguousName,
                path.span,
                format!(
                    "`{}` is ambiguous; it is wildcard-imported from {}",
                    path,
                    describe_candidates(&candidates, &self.sources)
                ),
            ));
        }

        // Probe the other kinds for a better message.
        const ALL: [SymbolKind; 4] = [
            SymbolKind::Nutrient,
            SymbolKind::Ingredient,
            SymbolKind::Group,
            SymbolKind::Formula,
        ];
        for kind in ALL {
            if kinds.contains(&kind) {
                continue;
            }
            if self.symbols.resolve_path(from, kind, path).is_ok() {
                return Err(Diagnostic::error(
                    DiagnosticKind::WrongKind,
                    path.span,
                    format!(
                        "`{}` is {} {}, but {} is expected here",
                        path,
                        article(kind.display_name()),
                        kind.display_name(),
                        list_kinds(kinds)
                    ),
                ));
            }
        }

        Err(Diagnostic::error(
            DiagnosticKind::UnknownName,
            path.span,
            format!("unknown {} `{}`", list_kinds(kinds), path),
        ))
    }
}

fn article(noun: &str) -> &'static str {
    match noun.chars().next() {
        Some('a') | Some('e') | Some('i') | Some('o') | Some('u') => "an",
        _ => "a",
    }
}

fn list_kinds(kinds: &[SymbolKind]) -> String {
    kinds
        .iter()
        .map(|k| k.display_name())
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Run the front half of the pipeline: load and link every module, build
/// symbol tables, and type-check block contexts.
///
/// Always returns a program; diagnostics tell the caller how trustworthy it
/// is. Later stages (composition, lowering) require an error-free formula.
pub fn analyze(
    root_name: &str,
    root_source: &str,
    resolver: &dyn SourceResolver,
) -> (Program, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let loaded = load(root_name, root_source, resolver, &mut diagnostics);
    let symbols = build_symbols(&loaded, &mut diagnostics);

    let program = Program {
        sources: loaded.sources,
        modules: loaded.modules,
        symbols,
    };

    diagnostics.extend(typing::check(&program));

    // Expand every formula eagerly so composition cycles and missing-bound
    // references surface in validation, not just at solve time. Memoization
    // keeps this linear.
    let mut composer = Composer::new(&program);
    let mut compose_diags = Vec::new();
    for (file, module) in program.modules.iter().enumerate() {
        for (index, decl) in module.decls.iter().enumerate() {
            let Decl::Formula(formula) = decl else {
                continue;
            };
            let decl_ref = DeclRef {
                file: file as FileId,
                index,
            };
            for block in [BlockKind::Nutrients, BlockKind::Ingredients] {
                if let Err(diag) =
                    composer.composed(decl_ref, block, formula.name.span, &mut compose_diags)
                {
                    compose_diags.push(diag);
                }
            }
        }
    }
    diagnostics.extend(compose_diags);

    (program, diagnostics)
}
