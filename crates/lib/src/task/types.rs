use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::env::{BuildEnvironment, VarOrigin};
use crate::expr::{EvalScope, ExprError};
use crate::sandbox::BuildSpec;

/// A command of a task: the raw manifest form and the fully rendered,
/// shell-ready form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
  pub command: String,
  pub rendered: String,
}

/// A concrete build task: one spec with a fully composed environment and
/// rendered commands, ready to hand to an executor.
///
/// Tasks are derived, ephemeral values: rebuilt on every planning run and
/// discarded once consumed.
#[derive(Debug, Clone)]
pub struct BuildTask {
  /// Equal to the owning spec's id.
  pub id: String,

  pub spec: Arc<BuildSpec>,

  pub build_command: Vec<TaskCommand>,
  pub install_command: Vec<TaskCommand>,

  /// The composed process environment, in merge order.
  pub env: BuildEnvironment,

  /// Two-level scope for on-demand expression evaluation against this
  /// build (not exported to the process environment).
  pub scope: EvalScope,

  /// Direct dependency tasks, keyed by id. Transitively visible state is
  /// captured in `env`, not by walking this map.
  pub dependencies: IndexMap<String, Arc<BuildTask>>,

  /// Environment conflicts detected while composing this node.
  pub errors: Vec<EnvConflict>,
}

impl BuildTask {
  /// Visit this task and all transitive dependencies, dependencies first,
  /// each node exactly once.
  pub fn traverse(self: &Arc<Self>, visit: &mut dyn FnMut(&Arc<BuildTask>)) {
    let mut seen = HashSet::new();
    fn walk(
      task: &Arc<BuildTask>,
      seen: &mut HashSet<String>,
      visit: &mut dyn FnMut(&Arc<BuildTask>),
    ) {
      if !seen.insert(task.id.clone()) {
        return;
      }
      for dep in task.dependencies.values() {
        walk(dep, seen, visit);
      }
      visit(task);
    }
    walk(self, &mut seen, visit);
  }

  /// Every composition conflict in the graph, one pass, deduplicated, so
  /// callers can report the full set at once instead of failing on the
  /// first.
  pub fn all_errors(self: &Arc<Self>) -> Vec<EnvConflict> {
    let mut errors = Vec::new();
    self.traverse(&mut |task| {
      for error in &task.errors {
        if !errors.contains(error) {
          errors.push(error.clone());
        }
      }
    });
    errors
  }
}

/// Why an exported variable was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
  /// The export names an engine-injected binding.
  BuiltInOverride,

  /// The export collides with a variable previously marked exclusive.
  ExclusiveOverride,

  /// The export is exclusive but the variable was already bound.
  ExclusiveAlreadyDefined,
}

/// A recorded environment-composition conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConflict {
  /// The package whose export caused the conflict.
  pub package: String,
  pub package_path: String,

  pub variable: String,

  /// The prior owner of the variable, when it came from a package.
  pub other: Option<VarOrigin>,

  pub kind: ConflictKind,
}

impl std::fmt::Display for EnvConflict {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "Package {} (at {}):", self.package, self.package_path)?;
    write!(f, "While exporting ${}:", self.variable)?;
    if let Some(other) = &self.other {
      write!(
        f,
        "\nVariable conflicts with ${} defined by {} (at {}):",
        self.variable, other.package, other.package_path
      )?;
    }
    match self.kind {
      ConflictKind::BuiltInOverride => {
        write!(f, "\nAttempts to override a built-in variable of the same name")
      }
      ConflictKind::ExclusiveOverride => write!(
        f,
        "\nAttempts to override an environment variable which was marked as exclusive"
      ),
      ConflictKind::ExclusiveAlreadyDefined => write!(
        f,
        "\nAttempts to set an exclusive environment variable but it was defined before."
      ),
    }
  }
}

/// Fatal task-construction failures.
///
/// Expression errors cannot degrade to diagnostics: an unresolved
/// reference would silently change what the build does.
#[derive(Debug, Error)]
pub enum TaskError {
  #[error("package {package}: failed to evaluate '{template}': {source}")]
  Expr {
    package: String,
    template: String,
    #[source]
    source: ExprError,
  },
}
