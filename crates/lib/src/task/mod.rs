//! Task planning: from a specification graph to concrete build tasks.
//!
//! A single memoized fold walks the graph dependencies-first and produces
//! one [`BuildTask`] per spec: the composed process environment, the
//! evaluation scope, and the rendered build and install commands. Shared
//! nodes are folded once, so a diamond dependency yields one task observed
//! through both parents.
//!
//! The environment of a task is assembled in a fixed order:
//!
//! 1. toolchain search paths derived from the full dependency closure,
//! 2. the engine bindings of the build itself (`cur__name`, `cur__bin`, ...),
//! 3. local exports of direct dependencies,
//! 4. global exports of all transitive dependencies and of the build
//!    itself, dependencies first,
//! 5. ambient overrides passed by the caller.
//!
//! Steps 3 and 4 are checked merges: an export that collides with a
//! built-in or exclusive binding is skipped and recorded as an
//! [`EnvConflict`] instead of silently winning.

mod types;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

pub use types::*;

use crate::config::Config;
use crate::env::{BuildEnvironment, EnvironmentVar, VarOrigin};
use crate::expr::{self, EvalScope, PackageBindings, ScopeField};
use crate::id::normalize_package_name;
use crate::manifest::{Command, ExportScope};
use crate::platform::paths_delimiter;
use crate::sandbox::{BuildSpec, Sandbox};

/// Caller-supplied additions to every task environment, merged last.
#[derive(Debug, Clone, Default)]
pub struct TaskParams {
  pub env: BuildEnvironment,
}

/// Plan tasks for a crawled sandbox, carrying its ambient environment into
/// every task.
pub fn from_sandbox(
  sandbox: &Sandbox,
  config: &Config,
  params: TaskParams,
) -> Result<Arc<BuildTask>, TaskError> {
  let mut env = sandbox.env.clone();
  env.extend(params.env.into_iter());
  from_build_spec(&sandbox.root, config, TaskParams { env })
}

/// Plan tasks for a spec graph rooted at `root`.
pub fn from_build_spec(
  root: &Arc<BuildSpec>,
  config: &Config,
  params: TaskParams,
) -> Result<Arc<BuildTask>, TaskError> {
  let mut ctx = FoldCtx {
    config,
    params: &params,
    memo: HashMap::new(),
  };
  Ok(fold(&mut ctx, root)?.task.clone())
}

/// The per-node result of the fold: the task plus the pieces consumers
/// need to compose their own environments.
struct Folded {
  task: Arc<BuildTask>,

  /// Rendered exports visible to direct dependents only.
  local_scope: BuildEnvironment,

  /// Rendered exports visible to every transitive dependent.
  global_scope: BuildEnvironment,

  /// Final-install field bindings, as consumers reference this package.
  bindings: PackageBindings,

  /// The transitive dependency closure, dependencies first, keyed by id.
  all_deps: IndexMap<String, Arc<Folded>>,
}

struct FoldCtx<'a> {
  config: &'a Config,
  params: &'a TaskParams,
  memo: HashMap<String, Arc<Folded>>,
}

fn fold(ctx: &mut FoldCtx<'_>, spec: &Arc<BuildSpec>) -> Result<Arc<Folded>, TaskError> {
  if let Some(folded) = ctx.memo.get(&spec.id) {
    return Ok(folded.clone());
  }

  debug!(id = %spec.id, name = %spec.name, "planning task");

  let mut direct: Vec<Arc<Folded>> = Vec::with_capacity(spec.dependencies.len());
  for dep in spec.dependencies.values() {
    direct.push(fold(ctx, dep)?);
  }

  let mut all_deps: IndexMap<String, Arc<Folded>> = IndexMap::new();
  for dep in &direct {
    for (id, transitive) in &dep.all_deps {
      all_deps.entry(id.clone()).or_insert_with(|| transitive.clone());
    }
    all_deps.entry(dep.task.id.clone()).or_insert_with(|| dep.clone());
  }

  let folded = create_task(ctx, spec, &direct, all_deps)?;
  ctx.memo.insert(spec.id.clone(), folded.clone());
  Ok(folded)
}

fn create_task(
  ctx: &mut FoldCtx<'_>,
  spec: &Arc<BuildSpec>,
  direct: &[Arc<Folded>],
  all_deps: IndexMap<String, Arc<Folded>>,
) -> Result<Arc<Folded>, TaskError> {
  let config = ctx.config;
  let platform = config.build_platform;

  // How consumers see this package vs. how its own commands see it: the
  // install family points at the final install tree for the former and at
  // the stage tree for the latter.
  let bindings = scope_bindings(spec, config, false);
  let stage_bindings = scope_bindings(spec, config, true);

  let self_key = normalize_package_name(&spec.name);
  let mut scope = EvalScope::new();
  let mut scope_vars: IndexMap<String, String> = IndexMap::new();
  for dep in direct {
    let prefix = normalize_package_name(&dep.task.spec.name);
    scope.bind(&prefix, dep.bindings.iter().map(|(f, v)| (*f, v.clone())));
    for (field, value) in &dep.bindings {
      scope_vars.insert(format!("{prefix}__{}", field.as_str()), value.clone());
    }
    for var in dep.local_scope.values() {
      scope_vars.insert(var.name.clone(), var.value.clone());
    }
  }
  scope.bind(&self_key, bindings.iter().map(|(f, v)| (*f, v.clone())));
  scope.alias(&self_key, "self");
  for (field, value) in &bindings {
    scope_vars.insert(format!("{self_key}__{}", field.as_str()), value.clone());
  }

  // Render this package's exports against its own scope. Failures here are
  // fatal: an unresolved export would feed garbage to every dependent.
  let origin = VarOrigin {
    package: spec.name.clone(),
    package_path: spec.package_path.display().to_string(),
  };
  let mut local_scope = BuildEnvironment::new();
  let mut global_scope = BuildEnvironment::new();
  for (name, export) in &spec.exported_env {
    let delimiter = paths_delimiter(name, platform);
    let value = expr::evaluate(&export.val, &scope, &|n| scope_vars.get(n).cloned(), delimiter)
      .map_err(|source| TaskError::Expr {
        package: spec.name.clone(),
        template: export.val.clone(),
        source,
      })?;
    let var = EnvironmentVar {
      name: name.clone(),
      value,
      exported: true,
      built_in: false,
      exclusive: export.exclusive,
      origin: Some(origin.clone()),
    };
    match export.scope {
      ExportScope::Local => local_scope.insert(name.clone(), var),
      ExportScope::Global => global_scope.insert(name.clone(), var),
    };
  }

  let mut env = BuildEnvironment::new();
  let mut errors: Vec<EnvConflict> = Vec::new();

  // Toolchain search paths over the whole closure. The host toolchain is
  // not sandboxed, so PATH and MAN_PATH keep their ambient tails.
  let mut ocamlpath = Vec::with_capacity(all_deps.len());
  let mut path = Vec::with_capacity(all_deps.len() + 1);
  let mut man_path = Vec::with_capacity(all_deps.len() + 1);
  for dep in all_deps.values() {
    ocamlpath.push(path_str(config.install_path(&dep.task.spec, &["lib"])));
    path.push(path_str(config.install_path(&dep.task.spec, &["bin"])));
    man_path.push(path_str(config.install_path(&dep.task.spec, &["man"])));
  }
  path.push("$PATH".to_string());
  man_path.push("$MAN_PATH".to_string());

  eval_into_env(
    &mut env,
    [
      EnvironmentVar::exported("OCAMLPATH", ocamlpath.join(paths_delimiter("OCAMLPATH", platform)))
        .with_exclusive(true),
      EnvironmentVar::exported("OCAMLFIND_DESTDIR", path_str(config.stage_path(spec, &["lib"])))
        .with_exclusive(true),
      EnvironmentVar::exported("OCAMLFIND_LDCONF", "ignore").with_exclusive(true),
      EnvironmentVar::exported(
        "OCAMLFIND_COMMANDS",
        "ocamlc=ocamlc.opt ocamldep=ocamldep.opt ocamldoc=ocamldoc.opt \
         ocamllex=ocamllex.opt ocamlopt=ocamlopt.opt",
      )
      .with_exclusive(true),
      EnvironmentVar::exported("PATH", path.join(paths_delimiter("PATH", platform))),
      EnvironmentVar::exported("MAN_PATH", man_path.join(paths_delimiter("MAN_PATH", platform))),
    ],
  );

  // $cur__name, $cur__version and so on.
  for (field, value) in &stage_bindings {
    let var = EnvironmentVar::built_in(&format!("cur__{}", field.as_str()), value.clone());
    env.insert(var.name.clone(), var);
  }

  for dep in direct {
    merge_checked(&mut env, &dep.local_scope, &mut errors);
  }

  for dep in all_deps.values() {
    merge_checked(&mut env, &dep.global_scope, &mut errors);
  }
  merge_checked(&mut env, &global_scope, &mut errors);

  eval_into_env(&mut env, ctx.params.env.values().cloned());

  // Commands see the composed environment first and fall back to the
  // dependency field bindings that never reach the environment.
  let lookup = |name: &str| {
    env
      .get(name)
      .map(|var| var.value.clone())
      .or_else(|| scope_vars.get(name).cloned())
  };
  let command_delimiter = paths_delimiter("PATH", platform);
  let mut build_command = Vec::with_capacity(spec.build_command.0.len());
  for command in &spec.build_command.0 {
    build_command.push(render_command(spec, command, &scope, &lookup, command_delimiter)?);
  }
  let mut install_command = Vec::with_capacity(spec.install_command.0.len());
  for command in &spec.install_command.0 {
    install_command.push(render_command(spec, command, &scope, &lookup, command_delimiter)?);
  }

  let task = Arc::new(BuildTask {
    id: spec.id.clone(),
    spec: spec.clone(),
    build_command,
    install_command,
    env,
    scope,
    dependencies: direct
      .iter()
      .map(|dep| (dep.task.id.clone(), dep.task.clone()))
      .collect(),
    errors,
  });

  Ok(Arc::new(Folded {
    task,
    local_scope,
    global_scope,
    bindings,
    all_deps,
  }))
}

/// The field bindings of one package. `currently_building` switches the
/// install family from the final install tree to the stage tree the
/// package's own commands install into.
fn scope_bindings(spec: &BuildSpec, config: &Config, currently_building: bool) -> PackageBindings {
  let install = |segments: &[&str]| {
    if currently_building {
      config.stage_path(spec, segments)
    } else {
      config.install_path(spec, segments)
    }
  };
  let depends: Vec<&str> = spec.dependencies.values().map(|dep| dep.name.as_str()).collect();

  [
    (ScopeField::Name, spec.name.clone()),
    (
      ScopeField::Version,
      spec.version.clone().unwrap_or_else(|| "0.0.0".to_string()),
    ),
    (ScopeField::Root, path_str(config.root_path(spec, &[]))),
    (ScopeField::Depends, depends.join(" ")),
    (ScopeField::TargetDir, path_str(config.build_path(spec, &[]))),
    (ScopeField::Install, path_str(install(&[]))),
    (ScopeField::Bin, path_str(install(&["bin"]))),
    (ScopeField::Sbin, path_str(install(&["sbin"]))),
    (ScopeField::Lib, path_str(install(&["lib"]))),
    (ScopeField::Man, path_str(install(&["man"]))),
    (ScopeField::Doc, path_str(install(&["doc"]))),
    (ScopeField::Stublibs, path_str(install(&["stublibs"]))),
    (ScopeField::Toplevel, path_str(install(&["toplevel"]))),
    (ScopeField::Share, path_str(install(&["share"]))),
    (ScopeField::Etc, path_str(install(&["etc"]))),
  ]
  .into_iter()
  .collect()
}

fn path_str(path: PathBuf) -> String {
  path.display().to_string()
}

/// Unchecked insertion: each value's `$NAME` references are substituted
/// with the current values of already-present variables, then the variable
/// replaces any previous binding of the same name.
fn eval_into_env(env: &mut BuildEnvironment, vars: impl IntoIterator<Item = EnvironmentVar>) {
  for mut var in vars {
    var.value = expr::render_with_scope(&var.value, &|name| {
      env.get(name).map(|existing| existing.value.clone())
    });
    env.insert(var.name.clone(), var);
  }
}

/// Checked merge of a package's rendered exports into a task environment.
/// Rejected variables are skipped and recorded, so one bad export never
/// aborts planning for the rest of the graph.
fn merge_checked(
  env: &mut BuildEnvironment,
  scope: &BuildEnvironment,
  errors: &mut Vec<EnvConflict>,
) {
  for var in scope.values() {
    if let Some(existing) = env.get(&var.name) {
      let kind = if existing.built_in {
        Some((ConflictKind::BuiltInOverride, None))
      } else if existing.exclusive {
        Some((ConflictKind::ExclusiveOverride, existing.origin.clone()))
      } else if var.exclusive {
        Some((ConflictKind::ExclusiveAlreadyDefined, existing.origin.clone()))
      } else {
        None
      };
      if let Some((kind, other)) = kind {
        let (package, package_path) = match &var.origin {
          Some(origin) => (origin.package.clone(), origin.package_path.clone()),
          None => (String::new(), String::new()),
        };
        errors.push(EnvConflict {
          package,
          package_path,
          variable: var.name.clone(),
          other,
          kind,
        });
        continue;
      }
    }
    env.insert(var.name.clone(), var.clone());
  }
}

fn render_command(
  spec: &BuildSpec,
  command: &Command,
  scope: &EvalScope,
  lookup: &dyn Fn(&str) -> Option<String>,
  delimiter: &str,
) -> Result<TaskCommand, TaskError> {
  let eval = |template: &str| {
    expr::evaluate(template, scope, lookup, delimiter).map_err(|source| TaskError::Expr {
      package: spec.name.clone(),
      template: template.to_string(),
      source,
    })
  };

  Ok(match command {
    Command::Line(line) => TaskCommand {
      command: line.clone(),
      rendered: eval(line)?,
    },
    Command::Args(args) => {
      let mut rendered = Vec::with_capacity(args.len());
      for arg in args {
        rendered.push(expr::quote_arg_if_needed(&eval(arg)?));
      }
      TaskCommand {
        command: args.join(" "),
        rendered: rendered.join(" "),
      }
    }
  })
}
