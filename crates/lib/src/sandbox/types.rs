use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::env::BuildEnvironment;
use crate::manifest::{CommandList, ExportedEnv, InSourceFlag};

/// Where a package's sources come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
  /// The sandbox entry package itself.
  Root,

  /// A linked or unpublished local dependency. Sources can change between
  /// invocations, so artifacts must not be cached.
  Transient,

  /// A resolved, published dependency. Artifacts are content-addressed
  /// and cacheable.
  Immutable,
}

/// Whether (and where) a build pollutes its source root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
  /// The build never writes into the source root.
  OutOfSource,

  /// The build writes into the source root itself.
  InSource,

  /// The build writes only into a `_build` subdirectory of the source root.
  UnderBuild,
}

impl BuildType {
  pub fn from_flag(flag: &InSourceFlag) -> Self {
    match flag {
      InSourceFlag::Marker(marker) if marker == "_build" => BuildType::UnderBuild,
      InSourceFlag::Marker(marker) if !marker.is_empty() => BuildType::InSource,
      InSourceFlag::Marker(_) => BuildType::OutOfSource,
      InSourceFlag::Bool(true) => BuildType::InSource,
      InSourceFlag::Bool(false) => BuildType::OutOfSource,
    }
  }
}

/// A non-fatal problem recorded during crawling.
///
/// Diagnostics accumulate on the specs they were found under and propagate
/// into every consumer's `errors` list, so inspecting the root reports the
/// whole graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
  CircularDependency {
    name: String,
    trace: Vec<String>,
  },
  MissingPackages {
    names: Vec<String>,
    trace: Vec<String>,
  },
  MalformedManifest {
    path: PathBuf,
    message: String,
  },
}

impl std::fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Diagnostic::CircularDependency { name, trace } => {
        write!(
          f,
          "Circular dependency \"{}\" found\n  At {}",
          name,
          trace.join(" -> ")
        )
      }
      Diagnostic::MissingPackages { names, trace } => {
        let shown: Vec<String> = names.iter().take(3).map(|n| format!("\"{n}\"")).collect();
        let extra = if names.len() > 3 {
          format!(" (and {} more)", names.len() - 3)
        } else {
          String::new()
        };
        write!(
          f,
          "Cannot resolve {}{} packages\n  At {}\n  Did you forget to install dependencies?",
          shown.join(", "),
          extra,
          trace.join(" -> ")
        )
      }
      Diagnostic::MalformedManifest { path, message } => {
        write!(f, "Malformed manifest at {}: {}", path.display(), message)
      }
    }
  }
}

/// An immutable node of the specification graph: one package's build
/// intent, before environment resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSpec {
  /// Content-addressed identity; unique per (environment, source,
  /// manifest, dependency id set).
  pub id: String,

  pub name: String,
  pub version: Option<String>,

  /// Location of the sources, relative to the sandbox root (empty for the
  /// root package itself) or absolute for linked packages outside it.
  pub source_path: PathBuf,

  /// Location of the manifest. Usually equal to `source_path`; differs for
  /// linked packages whose declaration lives apart from their sources.
  pub package_path: PathBuf,

  pub source_type: SourceType,
  pub build_type: BuildType,

  /// Whether the built artifact belongs in the shared, long-lived store
  /// rather than the throwaway sandbox-local one.
  pub should_be_persisted: bool,

  /// Environment exported for consumers, pre-expansion.
  pub exported_env: IndexMap<String, ExportedEnv>,

  pub build_command: CommandList,
  pub install_command: CommandList,

  /// Direct declared dependencies (including peers), keyed by id.
  pub dependencies: IndexMap<String, Arc<BuildSpec>>,

  /// Diagnostics found under this node. Non-fatal at crawl time; fatal if
  /// a caller decides to build anyway.
  pub errors: Vec<Diagnostic>,
}

impl BuildSpec {
  /// Visit this spec and all transitive dependencies, dependencies first,
  /// each node exactly once.
  pub fn traverse(self: &Arc<Self>, visit: &mut dyn FnMut(&Arc<BuildSpec>)) {
    let mut seen = HashSet::new();
    fn walk(
      spec: &Arc<BuildSpec>,
      seen: &mut HashSet<String>,
      visit: &mut dyn FnMut(&Arc<BuildSpec>),
    ) {
      if !seen.insert(spec.id.clone()) {
        return;
      }
      for dep in spec.dependencies.values() {
        walk(dep, seen, visit);
      }
      visit(spec);
    }
    walk(self, &mut seen, visit);
  }
}

/// A crawled sandbox: the root spec plus the ambient base environment all
/// ids in the graph were derived against.
#[derive(Debug, Clone)]
pub struct Sandbox {
  pub env: BuildEnvironment,
  pub root: Arc<BuildSpec>,
}

impl Sandbox {
  /// Every diagnostic in the graph, one pass, deduplicated.
  pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    self.root.traverse(&mut |spec| {
      for error in &spec.errors {
        if !diagnostics.contains(error) {
          diagnostics.push(error.clone());
        }
      }
    });
    diagnostics
  }
}
