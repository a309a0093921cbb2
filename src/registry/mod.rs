//! Operation registry: binds declarative descriptors to callables.
//!
//! Each descriptor file in the tools directory declares one operation:
//!
//! ```yaml
//! name: list_jobs
//! description: List the jobs of a DataStage project.
//! function: datastage.get_jobs
//! ```
//!
//! `function` is resolved against a [`SymbolTable`] built at startup from
//! a fixed set of [`Namespace`]s.  Nothing is looked up reflectively: an
//! unknown namespace or symbol is rejected with a descriptive error.
//!
//! Loading is skip-and-report.  A malformed or unresolvable descriptor is
//! recorded in [`LoadReport::errors`] and the rest still load.

pub mod prompts;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::OpError;

/// File extensions recognised as descriptor files.
pub const DESCRIPTOR_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

// ── Types ───────────────────────────────────────────────────

/// Keyword arguments supplied by the caller.
pub type Args = Map<String, Value>;

/// Boxed future returned by every operation handler.
pub type OpFuture = Pin<Box<dyn Future<Output = Result<Value, OpError>> + Send>>;

/// A callable operation.
pub type Handler = Arc<dyn Fn(Args) -> OpFuture + Send + Sync>;

/// One operation as declared in a descriptor file.  Unknown keys are
/// ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Descriptor {
    pub name: String,
    pub description: String,
    /// Dotted `namespace.symbol` target.
    #[serde(rename = "function")]
    pub target: String,
}

/// A resolved, ready-to-invoke operation.
#[derive(Clone)]
pub struct Binding {
    pub name: String,
    pub description: String,
    pub target: String,
    pub handler: Handler,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Errors raised while loading descriptors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot read descriptor directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read descriptor {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed descriptor {}: {reason}", path.display())]
    DescriptorParse { path: PathBuf, reason: String },
    #[error("descriptor {}: `{target}` does not resolve: {reason}", path.display())]
    SymbolNotFound {
        path: PathBuf,
        target: String,
        reason: String,
    },
    #[error("descriptor {}: operation name `{name}` is already registered", path.display())]
    DuplicateName { path: PathBuf, name: String },
}

/// Outcome of [`load`]: the bindings that resolved plus one error per
/// descriptor that did not.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub bindings: Vec<Binding>,
    pub errors: Vec<RegistryError>,
}

// ── Symbol table ────────────────────────────────────────────

/// A named group of callables, e.g. `datastage`.
pub struct Namespace {
    name: String,
    aliases: Vec<String>,
    symbols: HashMap<String, Handler>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            symbols: HashMap::new(),
        }
    }

    /// Accept `alias` as another spelling of this namespace.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Add a callable under `symbol`.
    pub fn symbol(mut self, symbol: impl Into<String>, handler: Handler) -> Self {
        self.symbols.insert(symbol.into(), handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sorted symbol names.
    pub fn symbols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Static table of the namespaces descriptors may reference.
#[derive(Default)]
pub struct SymbolTable {
    namespaces: Vec<Arc<Namespace>>,
    by_name: HashMap<String, Arc<Namespace>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace under its name and aliases.
    pub fn with(mut self, ns: Namespace) -> Self {
        let ns = Arc::new(ns);
        for key in std::iter::once(&ns.name).chain(ns.aliases.iter()) {
            self.by_name.insert(key.clone(), Arc::clone(&ns));
        }
        self.namespaces.push(ns);
        self
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.iter().map(|ns| ns.as_ref())
    }

    /// Resolve a dotted `namespace.symbol` reference.
    ///
    /// The namespace is everything before the last dot, so dotted
    /// namespace aliases such as `utilidades.datastage` work.
    pub fn resolve(&self, target: &str) -> Result<Handler, String> {
        let (ns_name, symbol) = target
            .rsplit_once('.')
            .filter(|(ns, sym)| !ns.is_empty() && !sym.is_empty())
            .ok_or_else(|| "expected `namespace.symbol`".to_string())?;
        let ns = self.by_name.get(ns_name).ok_or_else(|| {
            let mut known: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
            known.sort_unstable();
            format!("unknown namespace `{ns_name}` (known: {})", known.join(", "))
        })?;
        ns.symbols
            .get(symbol)
            .cloned()
            .ok_or_else(|| format!("namespace `{}` has no symbol `{symbol}`", ns.name))
    }
}

// ── Loading ─────────────────────────────────────────────────

/// List the descriptor files directly inside `dir`, sorted by path.
pub fn descriptor_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let recognised = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| DESCRIPTOR_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if recognised {
            files.push(path);
        } else {
            debug!(path = %path.display(), "skipping non-descriptor file");
        }
    }
    files.sort();
    Ok(files)
}

/// Parse and check one descriptor document.
pub fn parse_descriptor(raw: &str, path: &Path) -> Result<Descriptor, RegistryError> {
    let parse_err = |reason: String| RegistryError::DescriptorParse {
        path: path.to_path_buf(),
        reason,
    };
    let desc: Descriptor = serde_yaml::from_str(raw).map_err(|e| parse_err(e.to_string()))?;
    for (field, value) in [
        ("name", &desc.name),
        ("description", &desc.description),
        ("function", &desc.target),
    ] {
        if value.trim().is_empty() {
            return Err(parse_err(format!("`{field}` must not be empty")));
        }
    }
    Ok(desc)
}

/// Load every descriptor in `dir` and bind it through `symbols`.
///
/// Only an unreadable directory fails the whole call; every other problem
/// is per-descriptor and lands in [`LoadReport::errors`].
pub fn load(dir: &Path, symbols: &SymbolTable) -> Result<LoadReport, RegistryError> {
    let files = descriptor_files(dir).map_err(|source| RegistryError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut report = LoadReport::default();
    let mut seen = HashSet::new();

    for path in files {
        match load_one(&path, symbols, &seen) {
            Ok(binding) => {
                debug!(name = %binding.name, target = %binding.target, "bound operation");
                seen.insert(binding.name.clone());
                report.bindings.push(binding);
            }
            Err(e) => report.errors.push(e),
        }
    }

    info!(
        dir = %dir.display(),
        loaded = report.bindings.len(),
        failed = report.errors.len(),
        "operation descriptors loaded"
    );
    Ok(report)
}

fn load_one(
    path: &Path,
    symbols: &SymbolTable,
    seen: &HashSet<String>,
) -> Result<Binding, RegistryError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let desc = parse_descriptor(&raw, path)?;

    if seen.contains(&desc.name) {
        return Err(RegistryError::DuplicateName {
            path: path.to_path_buf(),
            name: desc.name,
        });
    }

    let handler = symbols
        .resolve(&desc.target)
        .map_err(|reason| RegistryError::SymbolNotFound {
            path: path.to_path_buf(),
            target: desc.target.clone(),
            reason,
        })?;

    Ok(Binding {
        name: desc.name,
        description: desc.description,
        target: desc.target,
        handler,
    })
}
