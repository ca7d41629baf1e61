//! Name resolution pass.
//!
//! Builds per-module symbol tables and resolves references against them.
//!
//! # Scoping rules, in lookup order
//!
//! 1. A dotted path whose head is a known namespace resolves inside that
//!    namespace's exports.
//! 2. A bare identifier resolves to a local declaration, then to a
//!    directly-imported name, then through the transitive wildcard closure.
//! 3. A name reachable through two different wildcard sources is ambiguous;
//!    the error is reported at the use site, not at import.
//!
//! Wildcard re-exports propagate transitively; declaration identity is
//! `(file, decl index)`, so diamond imports collapse to one declaration.

use std::collections::HashSet;

use indexmap::IndexMap;

use formulang_ast::{
    Decl, Diagnostic, DiagnosticKind, FileId, ImportBinding, Module, RefPath, SourceMap,
};

use super::linker::{path_stem, LoadedModules};

/// Identity of a declaration: its module and position within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclRef {
    pub file: FileId,
    pub index: usize,
}

/// Declaration kinds; names are unique per kind within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Nutrient,
    Ingredient,
    Group,
    Formula,
}

impl SymbolKind {
    pub fn display_name(self) -> &'static str {
        match self {
            SymbolKind::Nutrient => "nutrient",
            SymbolKind::Ingredient => "ingredient",
            SymbolKind::Group => "group",
            SymbolKind::Formula => "formula",
        }
    }

    fn of(decl: &Decl) -> Self {
        match decl {
            Decl::Nutrient(_) => SymbolKind::Nutrient,
            Decl::Ingredient(_) => SymbolKind::Ingredient,
            Decl::Group(_) => SymbolKind::Group,
            Decl::Formula(_) => SymbolKind::Formula,
        }
    }
}

/// Why a lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    NotFound,
    /// Distinct declarations reachable from multiple wildcard imports
    Ambiguous(Vec<DeclRef>),
}

/// Symbol tables for one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleSymbols {
    nutrients: IndexMap<String, DeclRef>,
    ingredients: IndexMap<String, DeclRef>,
    groups: IndexMap<String, DeclRef>,
    formulas: IndexMap<String, DeclRef>,
    /// import stem or alias -> module
    namespaces: IndexMap<String, FileId>,
    /// directly-imported name -> source module
    named_imports: IndexMap<String, FileId>,
    /// wildcard-imported modules, in import order
    wildcard_from: Vec<FileId>,
}

impl ModuleSymbols {
    fn table(&self, kind: SymbolKind) -> &IndexMap<String, DeclRef> {
        match kind {
            SymbolKind::Nutrient => &self.nutrients,
            SymbolKind::Ingredient => &self.ingredients,
            SymbolKind::Group => &self.groups,
            SymbolKind::Formula => &self.formulas,
        }
    }

    fn table_mut(&mut self, kind: SymbolKind) -> &mut IndexMap<String, DeclRef> {
        match kind {
            SymbolKind::Nutrient => &mut self.nutrients,
            SymbolKind::Ingredient => &mut self.ingredients,
            SymbolKind::Group => &mut self.groups,
            SymbolKind::Formula => &mut self.formulas,
        }
    }

    /// Local declarations of a kind, in declaration order.
    pub fn locals(&self, kind: SymbolKind) -> impl Iterator<Item = (&str, DeclRef)> {
        self.table(kind).iter().map(|(n, r)| (n.as_str(), *r))
    }

    /// Namespace bindings of this module.
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, FileId)> {
        self.namespaces.iter().map(|(n, f)| (n.as_str(), *f))
    }
}

/// The linked, global symbol view.
#[derive(Debug, Clone, Default)]
pub struct Symbols {
    modules: Vec<ModuleSymbols>,
}

impl Symbols {
    pub fn module(&self, file: FileId) -> &ModuleSymbols {
        &self.modules[file as usize]
    }

    /// Resolve a bare name from a module's scope.
    pub fn resolve_name(
        &self,
        from: FileId,
        kind: SymbolKind,
        name: &str,
    ) -> Result<DeclRef, LookupError> {
        let scope = self.module(from);

        if let Some(&decl) = scope.table(kind).get(name) {
            return Ok(decl);
        }

        if let Some(&source) = scope.named_imports.get(name) {
            let mut visited = HashSet::new();
            let found = self.exports(source, kind, name, &mut visited);
            if let Some(&decl) = found.first() {
                return Ok(decl);
            }
        }

        let mut found: Vec<DeclRef> = Vec::new();
        for &source in &scope.wildcard_from {
            let mut visited = HashSet::new();
            for decl in self.exports(source, kind, name, &mut visited) {
                if !found.contains(&decl) {
                    found.push(decl);
                }
            }
        }
        match found.len() {
            0 => Err(LookupError::NotFound),
            1 => Ok(found[0]),
            _ => Err(LookupError::Ambiguous(found)),
        }
    }

    /// Resolve a possibly-dotted path from a module's scope.
    pub fn resolve_path(
        &self,
        from: FileId,
        kind: SymbolKind,
        path: &RefPath,
    ) -> Result<DeclRef, LookupError> {
        match path.segments() {
            [name] => self.resolve_name(from, kind, name),
            [ns, name] => {
                let scope = self.module(from);
                let Some(&target) = scope.namespaces.get(ns) else {
                    return Err(LookupError::NotFound);
                };
                let mut visited = HashSet::new();
                let found = self.exports(target, kind, name, &mut visited);
                match found.len() {
                    0 => Err(LookupError::NotFound),
                    1 => Ok(found[0]),
                    _ => Err(LookupError::Ambiguous(found)),
                }
            }
            _ => Err(LookupError::NotFound),
        }
    }

    /// Names a module exports for a kind: its locals, its direct imports,
    /// and transitively everything it wildcard-imports.
    fn exports(
        &self,
        file: FileId,
        kind: SymbolKind,
        name: &str,
        visited: &mut HashSet<FileId>,
    ) -> Vec<DeclRef> {
        if !visited.insert(file) {
            return Vec::new();
        }
        let scope = self.module(file);

        if let Some(&decl) = scope.table(kind).get(name) {
            return vec![decl];
        }
        if let Some(&source) = scope.named_imports.get(name) {
            return self.exports(source, kind, name, visited);
        }

        let mut found = Vec::new();
        for &source in &scope.wildcard_from {
            for decl in self.exports(source, kind, name, visited) {
                if !found.contains(&decl) {
                    found.push(decl);
                }
            }
        }
        found
    }
}

/// Build symbol tables for every loaded module.
///
/// Reports redeclarations (same name, same kind, same module) and colliding
/// namespace bindings.
pub fn build_symbols(loaded: &LoadedModules, diagnostics: &mut Vec<Diagnostic>) -> Symbols {
    let mut symbols = Symbols {
        modules: loaded.modules.iter().map(|_| ModuleSymbols::default()).collect(),
    };

    for (file, module) in loaded.modules.iter().enumerate() {
        register_decls(module, &mut symbols.modules[file], diagnostics);
        register_imports(
            module,
            &loaded.import_targets[file],
            &loaded.sources,
            &mut symbols.modules[file],
            diagnostics,
        );
    }

    symbols
}

fn register_decls(module: &Module, scope: &mut ModuleSymbols, diagnostics: &mut Vec<Diagnostic>) {
    for (index, decl) in module.decls.iter().enumerate() {
        let kind = SymbolKind::of(decl);
        let name = decl.name().to_string();
        let decl_ref = DeclRef {
            file: module.file,
            index,
        };
        if let Some(existing) = scope.table_mut(kind).insert(name.clone(), decl_ref) {
            // Keep the first declaration; diagnose the redeclaration.
            scope.table_mut(kind).insert(name.clone(), existing);
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::DuplicateName,
                    decl.name_span(),
                    format!("{} `{}` is declared twice", kind.display_name(), name),
                )
                .with_label(module.decls[existing.index].name_span(), "first declared here"),
            );
        }
    }
}

fn register_imports(
    module: &Module,
    targets: &[Option<FileId>],
    sources: &SourceMap,
    scope: &mut ModuleSymbols,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (import, target) in module.imports.iter().zip(targets) {
        let Some(target) = *target else {
            continue; // unresolved; the linker already diagnosed it
        };
        match &import.binding {
            ImportBinding::Namespace => {
                bind_namespace(scope, path_stem(&import.path), target, import, sources, diagnostics);
            }
            ImportBinding::Alias(alias) => {
                bind_namespace(scope, alias.text.clone(), target, import, sources, diagnostics);
            }
            ImportBinding::Names(names) => {
                for name in names {
                    scope.named_imports.insert(name.text.clone(), target);
                }
            }
            ImportBinding::Wildcard => {
                scope.wildcard_from.push(target);
            }
        }
    }
}

fn bind_namespace(
    scope: &mut ModuleSymbols,
    name: String,
    target: FileId,
    import: &formulang_ast::Import,
    sources: &SourceMap,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Some(&existing) = scope.namespaces.get(&name) {
        if existing != target {
            let existing_name = sources.get(existing).map(|f| f.name.clone()).unwrap_or_default();
            diagnostics.push(Diagnostic::error(
                DiagnosticKind::DuplicateName,
                import.span,
                format!(
                    "namespace `{}` is already bound to `{}`; use `as` to rename one import",
                    name, existing_name
                ),
            ));
        }
        return;
    }
    scope.namespaces.insert(name, target);
}

/// Describe an ambiguity for a diagnostic message.
pub fn describe_candidates(candidates: &[DeclRef], sources: &SourceMap) -> String {
    candidates
        .iter()
        .map(|c| {
            sources
                .get(c.file)
                .map(|f| f.name.clone())
                .unwrap_or_else(|| format!("module {}", c.file))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
