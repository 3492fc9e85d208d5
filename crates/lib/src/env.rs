//! Build environment values.
//!
//! A [`BuildEnvironment`] is an insertion-ordered map of environment
//! variables, each carrying the flags the composition rules need: whether
//! the engine itself injected it (`built_in`), whether it reaches the child
//! process (`exported`), and whether later packages may override it
//! (`exclusive`). Ordering is semantic: later entries may reference earlier
//! ones with `$NAME` and a sequential evaluation resolves them.

use indexmap::IndexMap;

use crate::expr;

/// A single environment variable in a composed build environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentVar {
  pub name: String,
  pub value: String,

  /// Whether the variable is part of the process environment (as opposed
  /// to a scope-only binding).
  pub exported: bool,

  /// Injected by the engine; can never be overridden by a package export.
  pub built_in: bool,

  /// Once set, no other package may bind the same name.
  pub exclusive: bool,

  /// The package that exported this variable, if any.
  pub origin: Option<VarOrigin>,
}

/// Identifies the package a variable came from, for conflict reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarOrigin {
  pub package: String,
  pub package_path: String,
}

impl EnvironmentVar {
  /// An engine-injected binding: exclusive, not exported.
  pub fn built_in(name: &str, value: impl Into<String>) -> Self {
    Self {
      name: name.to_string(),
      value: value.into(),
      exported: false,
      built_in: true,
      exclusive: true,
      origin: None,
    }
  }

  /// An engine-injected binding that reaches the process environment.
  pub fn built_in_exported(name: &str, value: impl Into<String>) -> Self {
    Self {
      exported: true,
      ..Self::built_in(name, value)
    }
  }

  /// An ordinary exported binding.
  pub fn exported(name: &str, value: impl Into<String>) -> Self {
    Self {
      name: name.to_string(),
      value: value.into(),
      exported: true,
      built_in: false,
      exclusive: false,
      origin: None,
    }
  }

  pub fn with_exclusive(mut self, exclusive: bool) -> Self {
    self.exclusive = exclusive;
    self
  }

  pub fn with_origin(mut self, origin: VarOrigin) -> Self {
    self.origin = Some(origin);
    self
  }
}

/// An insertion-ordered environment map keyed by variable name.
pub type BuildEnvironment = IndexMap<String, EnvironmentVar>;

/// Render an environment as a sourceable shell snippet, the form used by
/// build-env style dumps.
///
/// Built-in variables are annotated, exported package variables name their
/// origin, and non-exported scope bindings are skipped.
pub fn print_environment(env: &BuildEnvironment) -> String {
  let mut out = String::new();
  for var in env.values() {
    if !var.exported {
      continue;
    }
    match (&var.origin, var.built_in) {
      (_, true) => out.push_str("# built-in\n"),
      (Some(origin), _) => {
        out.push_str(&format!("# exported by {}\n", origin.package));
      }
      (None, false) => {}
    }
    out.push_str(&format!("export {}=\"{}\"\n", var.name, var.value));
  }
  out
}

/// Evaluate an environment sequentially: each variable's `$NAME` references
/// are substituted with the already-evaluated values of earlier entries.
/// Unresolved references are left verbatim for downstream shell expansion.
pub fn eval_environment(env: &BuildEnvironment) -> IndexMap<String, String> {
  let mut evaluated: IndexMap<String, String> = IndexMap::new();
  for var in env.values() {
    let value = expr::render_with_scope(&var.value, &|name| evaluated.get(name).cloned());
    evaluated.insert(var.name.clone(), value);
  }
  evaluated
}
