//! Function registry: manifest + definition files → trigger handlers.
//!
//! A definition directory holds a JSON manifest listing `{trigger, file}`
//! pairs in match order, and one definition file per entry:
//!
//! ```text
//! // NAME: print
//! // DESCRIPTION: prints to the console with no sanitization
//! // TRIGGER: print(
//! // HANDLER
//! print
//! ```
//!
//! Everything after `// HANDLER` is the handler body.  Its first line that
//! is neither blank nor a `//` comment names a built-in [`HandlerKind`].
//!
//! Loading is best-effort: an entry whose file is missing or malformed is
//! reported as a [`LoadError`] and skipped, and the rest still load.  A
//! loaded [`Registry`] is immutable; share it across runs with an `Arc`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::handlers::HandlerKind;
use crate::embedded::{get_embedded, EMBEDDED_MANIFEST, MANIFEST_NAME};
use crate::error::LoadError;
use crate::pattern::{TriggerMatch, TriggerPattern};

// ── Manifest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub functions: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    pub trigger: String,
    pub file: String,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(text)?)
    }
}

// ── Definition files ──────────────────────────────────────────────────────────

/// The tagged sections of one definition file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Definition {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger: Option<String>,
    /// Lines after `// HANDLER`, verbatim; `None` if the marker is absent.
    pub body: Option<String>,
}

/// Scan a definition file for its annotation lines and handler body.
pub fn parse_definition(text: &str) -> Definition {
    let mut def = Definition::default();
    let mut body: Option<Vec<&str>> = None;
    for line in text.lines() {
        if let Some(lines) = body.as_mut() {
            lines.push(line);
        } else if let Some(v) = line.strip_prefix("// NAME:") {
            def.name = Some(v.trim().to_owned());
        } else if let Some(v) = line.strip_prefix("// DESCRIPTION:") {
            def.description = Some(v.trim().to_owned());
        } else if let Some(v) = line.strip_prefix("// TRIGGER:") {
            def.trigger = Some(v.trim().to_owned());
        } else if line.starts_with("// HANDLER") {
            body = Some(Vec::new());
        }
    }
    def.body = body.map(|lines| lines.join("\n"));
    def
}

/// First line of a handler body that is not blank or a comment.
fn handler_name(body: &str) -> Option<&str> {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("//"))
}

/// A loaded function: metadata, compiled trigger, and its handler.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub body: String,
    pub kind: HandlerKind,
    pub pattern: TriggerPattern,
}

impl FunctionDef {
    /// Build a function from its manifest entry and file contents.
    pub fn from_source(entry: &ManifestEntry, text: &str) -> Result<Self, LoadError> {
        let def = parse_definition(text);
        let file = || entry.file.clone();

        if let Some(declared) = &def.trigger {
            if declared != &entry.trigger {
                warn!(
                    file = %entry.file,
                    manifest = %entry.trigger,
                    declared = %declared,
                    "definition trigger differs from manifest; using manifest"
                );
            }
        }
        let trigger = entry.trigger.as_str();
        if trigger.trim().is_empty() {
            return Err(LoadError::EmptyTrigger { file: file() });
        }

        let body = def.body.ok_or_else(|| LoadError::NoHandler { file: file() })?;
        let kind_name = handler_name(&body).ok_or_else(|| LoadError::NoHandler { file: file() })?;
        let kind = HandlerKind::from_name(kind_name).ok_or_else(|| LoadError::UnknownHandler {
            file: file(),
            kind: kind_name.to_owned(),
        })?;
        let pattern = TriggerPattern::new(trigger)
            .map_err(|source| LoadError::Pattern { file: file(), source })?;

        Ok(FunctionDef {
            name: def.name.unwrap_or_else(file),
            description: def.description.unwrap_or_default(),
            body,
            kind,
            pattern,
        })
    }

    pub fn trigger(&self) -> &str {
        self.pattern.trigger()
    }
}

// ── Sources ───────────────────────────────────────────────────────────────────

/// Where the manifest and definition files come from.
pub trait FunctionSource {
    fn manifest(&mut self) -> Result<String, LoadError>;
    fn fetch(&mut self, file: &str) -> Result<String, LoadError>;
}

/// The definitions compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedSource;

impl FunctionSource for EmbeddedSource {
    fn manifest(&mut self) -> Result<String, LoadError> {
        Ok(EMBEDDED_MANIFEST.to_owned())
    }

    fn fetch(&mut self, file: &str) -> Result<String, LoadError> {
        get_embedded(file)
            .map(str::to_owned)
            .ok_or_else(|| LoadError::Missing(file.to_owned()))
    }
}

/// Definitions already read into memory.
///
/// [`Registry::load_dir`] fills one of these asynchronously and then builds
/// from it synchronously; tests use it directly.
#[derive(Debug, Default)]
pub struct MemorySource {
    manifest: String,
    files: HashMap<String, Result<String, LoadError>>,
}

impl MemorySource {
    pub fn new(manifest: impl Into<String>) -> Self {
        MemorySource {
            manifest: manifest.into(),
            files: HashMap::new(),
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.files.insert(name.into(), Ok(text.into()));
        self
    }

    /// Record a file that could not be read.
    pub fn with_failure(mut self, name: impl Into<String>, err: LoadError) -> Self {
        self.files.insert(name.into(), Err(err));
        self
    }
}

impl FunctionSource for MemorySource {
    fn manifest(&mut self) -> Result<String, LoadError> {
        Ok(std::mem::take(&mut self.manifest))
    }

    fn fetch(&mut self, file: &str) -> Result<String, LoadError> {
        self.files
            .remove(file)
            .unwrap_or_else(|| Err(LoadError::Missing(file.to_owned())))
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Ordered, immutable set of loaded functions.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    functions: Vec<FunctionDef>,
    by_trigger: HashMap<String, usize>,
}

impl Registry {
    /// The standard functions, loaded from the embedded definitions.
    pub fn builtin() -> Self {
        let (registry, _errors) = Self::load(&mut EmbeddedSource);
        registry
    }

    /// Load every manifest entry from `source`.
    ///
    /// Returns the registry and the errors for entries that were skipped.
    /// Each error is also logged.
    pub fn load(source: &mut dyn FunctionSource) -> (Self, Vec<LoadError>) {
        let mut registry = Registry::default();
        let mut errors = Vec::new();

        let manifest = match source.manifest().and_then(|text| Manifest::parse(&text)) {
            Ok(m) => m,
            Err(e) => {
                warn!("cannot load function manifest: {e}");
                errors.push(e);
                return (registry, errors);
            }
        };

        for entry in &manifest.functions {
            let loaded = source
                .fetch(&entry.file)
                .and_then(|text| FunctionDef::from_source(entry, &text));
            match loaded {
                Ok(def) => registry.insert(def),
                Err(e) => {
                    warn!(trigger = %entry.trigger, "skipping function: {e}");
                    errors.push(e);
                }
            }
        }

        info!(triggers = ?registry.triggers().collect::<Vec<_>>(), "VEIL functions loaded");
        (registry, errors)
    }

    /// Load a definition directory: `dir/manifest.json` plus the files it
    /// lists.  All reads happen up front.
    pub async fn load_dir(dir: &Path) -> (Self, Vec<LoadError>) {
        let manifest_path = dir.join(MANIFEST_NAME);
        let manifest_text = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(text) => text,
            Err(source) => {
                let e = LoadError::Read { path: manifest_path, source };
                warn!("cannot load function manifest: {e}");
                return (Registry::default(), vec![e]);
            }
        };

        let mut source = MemorySource::new(manifest_text.clone());
        if let Ok(manifest) = Manifest::parse(&manifest_text) {
            for entry in manifest.functions {
                let path = dir.join(&entry.file);
                source = match tokio::fs::read_to_string(&path).await {
                    Ok(text) => source.with_file(entry.file, text),
                    Err(e) => source.with_failure(entry.file, LoadError::Read { path, source: e }),
                };
            }
        }
        Self::load(&mut source)
    }

    fn insert(&mut self, def: FunctionDef) {
        let trigger = def.trigger().to_owned();
        match self.by_trigger.get(&trigger) {
            Some(&i) => {
                warn!(trigger = %trigger, "duplicate trigger; later definition replaces earlier");
                self.functions[i] = def;
            }
            None => {
                self.by_trigger.insert(trigger, self.functions.len());
                self.functions.push(def);
            }
        }
    }

    /// Functions in match order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.iter()
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(FunctionDef::trigger)
    }

    pub fn get(&self, trigger: &str) -> Option<&FunctionDef> {
        self.by_trigger.get(trigger).map(|&i| &self.functions[i])
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// The first function, in registry order, whose trigger matches `stmt`.
    pub fn find_match<'s>(&self, stmt: &'s str) -> Option<(&FunctionDef, TriggerMatch<'s>)> {
        let found = self
            .functions
            .iter()
            .find_map(|f| f.pattern.find(stmt).map(|m| (f, m)));
        if let Some((f, _)) = &found {
            debug!(trigger = f.trigger(), "matched");
        }
        found
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PRINT_FN: &str = "// NAME: print\n// DESCRIPTION: prints\n// TRIGGER: print(\n// HANDLER\n// kind:\nprint\n";

    #[test]
    fn parses_definition_sections() {
        let def = parse_definition(PRINT_FN);
        assert_eq!(def.name.as_deref(), Some("print"));
        assert_eq!(def.description.as_deref(), Some("prints"));
        assert_eq!(def.trigger.as_deref(), Some("print("));
        assert_eq!(def.body.as_deref(), Some("// kind:\nprint"));
        assert_eq!(handler_name(def.body.as_deref().unwrap()), Some("print"));
    }

    #[test]
    fn builtin_registry_order() {
        let (reg, errors) = Registry::load(&mut EmbeddedSource);
        assert!(errors.is_empty(), "{errors:?}");
        let triggers: Vec<_> = reg.triggers().collect();
        assert_eq!(
            triggers,
            vec!["let", "const", "print(", "printS(", "dump(", "appendToBody(", "if (", "} elseif (", "} else {", "}"]
        );
        assert_eq!(reg.get("printS(").map(|f| f.kind), Some(HandlerKind::PrintSanitized));
    }

    #[test]
    fn first_match_wins() {
        let reg = Registry::builtin();
        let (f, m) = reg.find_match("} elseif (x) {").unwrap();
        assert_eq!(f.trigger(), "} elseif (");
        assert_eq!(m.after(), "x) {");
        assert_eq!(reg.find_match("} else {").unwrap().0.trigger(), "} else {");
        assert_eq!(reg.find_match("}").unwrap().0.trigger(), "}");
        assert_eq!(reg.find_match("printS(x);").unwrap().0.trigger(), "printS(");
        assert!(reg.find_match("2 + 2;").is_none());
    }

    #[test]
    fn missing_and_bad_files_are_skipped() {
        let manifest = r#"{"functions":[
            {"trigger":"print(","file":"print.fn"},
            {"trigger":"gone(","file":"gone.fn"},
            {"trigger":"odd(","file":"odd.fn"},
            {"trigger":"bare(","file":"bare.fn"}
        ]}"#;
        let mut source = MemorySource::new(manifest)
            .with_file("print.fn", PRINT_FN)
            .with_file("odd.fn", "// HANDLER\nexec\n")
            .with_file("bare.fn", "// NAME: bare\n");
        let (reg, errors) = Registry::load(&mut source);
        assert_eq!(reg.triggers().collect::<Vec<_>>(), vec!["print("]);
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], LoadError::Missing(_)));
        assert!(matches!(&errors[1], LoadError::UnknownHandler { kind, .. } if kind == "exec"));
        assert!(matches!(errors[2], LoadError::NoHandler { .. }));
    }

    #[test]
    fn manifest_trigger_wins_over_declared() {
        let entry = ManifestEntry { trigger: "say(".into(), file: "print.fn".into() };
        let f = FunctionDef::from_source(&entry, PRINT_FN).unwrap();
        assert_eq!(f.trigger(), "say(");
        assert_eq!(f.name, "print");
    }

    #[test]
    fn bad_manifest_yields_empty_registry() {
        let (reg, errors) = Registry::load(&mut MemorySource::new("{ not json"));
        assert!(reg.is_empty());
        assert!(matches!(errors[..], [LoadError::Manifest(_)]));
    }

    #[test]
    fn duplicate_trigger_keeps_position() {
        let manifest = r#"{"functions":[
            {"trigger":"a(","file":"a.fn"},
            {"trigger":"b(","file":"b.fn"},
            {"trigger":"a(","file":"a2.fn"}
        ]}"#;
        let mut source = MemorySource::new(manifest)
            .with_file("a.fn", "// HANDLER\nprint\n")
            .with_file("b.fn", "// HANDLER\nprint\n")
            .with_file("a2.fn", "// HANDLER\ndump\n");
        let (reg, _) = Registry::load(&mut source);
        assert_eq!(reg.triggers().collect::<Vec<_>>(), vec!["a(", "b("]);
        assert_eq!(reg.get("a(").unwrap().kind, HandlerKind::Dump);
    }
}
