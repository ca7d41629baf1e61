//! Module loading and import linking.
//!
//! The core never touches the filesystem: a [`SourceResolver`] hands back
//! pre-bundled content by name, and the loader walks imports depth-first
//! with an in-progress stack so cycles surface as hard errors carrying the
//! full chain.

use indexmap::IndexMap;

use formulang_ast::{Diagnostic, DiagnosticKind, FileId, Module, SourceMap, Span};

/// Supplies import content by path.
///
/// `from` is the name of the importing unit; `path` is the import path as
/// written. A resolver returns the canonical unit name plus its content, or
/// `None` when the path does not resolve.
pub trait SourceResolver {
    fn resolve(&self, from: &str, path: &str) -> Option<(String, String)>;
}

/// In-memory bundle of pre-loaded sources, keyed by unit name.
///
/// Import paths resolve relative to the importing unit's directory portion;
/// the `.fm` extension is implied when absent.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    entries: IndexMap<String, String>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named source unit.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(normalize(&name.into()), content.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(name, content);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&normalize(name)).map(String::as_str)
    }
}

impl SourceResolver for SourceSet {
    fn resolve(&self, from: &str, path: &str) -> Option<(String, String)> {
        let joined = join_relative(from, path);
        for candidate in candidates(&joined) {
            if let Some(content) = self.entries.get(&candidate) {
                return Some((candidate, content.clone()));
            }
        }
        // Fall back to the path as written, for hosts that key the bundle
        // by exactly the paths the source uses.
        for candidate in candidates(&normalize(path)) {
            if let Some(content) = self.entries.get(&candidate) {
                return Some((candidate, content.clone()));
            }
        }
        None
    }
}

/// Strip a leading `./` and collapse `.`/`..` segments.
fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            seg => out.push(seg),
        }
    }
    out.join("/")
}

/// Resolve `path` relative to the directory of `from`.
fn join_relative(from: &str, path: &str) -> String {
    let dir = match from.rfind('/') {
        Some(i) => &from[..i],
        None => "",
    };
    if dir.is_empty() {
        normalize(path)
    } else {
        normalize(&format!("{}/{}", dir, path))
    }
}

/// Candidate unit names for a normalized path: as-is, then with `.fm`.
fn candidates(path: &str) -> Vec<String> {
    if path.ends_with(".fm") {
        vec![path.to_string()]
    } else {
        vec![path.to_string(), format!("{}.fm", path)]
    }
}

/// The filename stem of an import path; default namespace binding.
pub fn path_stem(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.strip_suffix(".fm").unwrap_or(base).to_string()
}

/// Everything the loader produces: parsed modules aligned with the source
/// map's file IDs, and each import's resolved target.
#[derive(Debug, Clone, Default)]
pub struct LoadedModules {
    pub sources: SourceMap,
    pub modules: Vec<Module>,
    /// `import_targets[file][import_index]` — the resolved unit, if any
    pub import_targets: Vec<Vec<Option<FileId>>>,
}

/// Load the root unit and, transitively, everything it imports.
pub fn load(
    root_name: &str,
    root_source: &str,
    resolver: &dyn SourceResolver,
    diagnostics: &mut Vec<Diagnostic>,
) -> LoadedModules {
    let mut loader = Loader {
        resolver,
        out: LoadedModules::default(),
        loaded: IndexMap::new(),
        in_progress: Vec::new(),
        diagnostics,
    };
    loader.load_unit(normalize(root_name), root_source.to_string());
    loader.out
}

struct Loader<'a> {
    resolver: &'a dyn SourceResolver,
    out: LoadedModules,
    /// canonical name -> file id, for units already fully loaded
    loaded: IndexMap<String, FileId>,
    /// canonical names currently on the load stack, for cycle detection
    in_progress: Vec<String>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Loader<'_> {
    fn load_unit(&mut self, name: String, source: String) -> FileId {
        let file = self.out.sources.add_file(name.clone(), &*source);
        let (module, mut diags) = formulang_parser::parse(&source, file);
        self.diagnostics.append(&mut diags);

        self.loaded.insert(name.clone(), file);
        self.in_progress.push(name);

        // Reserve the slots before recursing so file IDs stay aligned.
        self.out.modules.push(module);
        self.out
            .import_targets
            .push(vec![None; self.out.modules[file as usize].imports.len()]);

        for idx in 0..self.out.modules[file as usize].imports.len() {
            let import = self.out.modules[file as usize].imports[idx].clone();
            let target = self.resolve_import(file, &import.path, import.path_span);
            self.out.import_targets[file as usize][idx] = target;
        }

        self.in_progress.pop();
        file
    }

    fn resolve_import(&mut self, from: FileId, path: &str, span: Span) -> Option<FileId> {
        let from_name = self.out.sources.get(from)?.name.clone();

        let Some((canonical, content)) = self.resolver.resolve(&from_name, path) else {
            self.diagnostics.push(Diagnostic::error(
                DiagnosticKind::ImportNotFound,
                span,
                format!("cannot resolve import `{}`", path),
            ));
            return None;
        };

        if let Some(pos) = self.in_progress.iter().position(|n| *n == canonical) {
            let mut chain: Vec<&str> = self.in_progress[pos..]
                .iter()
                .map(String::as_str)
                .collect();
            chain.push(&canonical);
            self.diagnostics.push(Diagnostic::error(
                DiagnosticKind::ImportCycle,
                span,
                format!("import cycle: {}", chain.join(" -> ")),
            ));
            return None;
        }

        if let Some(&file) = self.loaded.get(&canonical) {
            return Some(file);
        }

        Some(self.load_unit(canonical, content))
    }
}
