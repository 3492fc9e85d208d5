//! Manifest crawling: from a directory of package manifests to an
//! immutable specification graph.
//!
//! The crawler reads the root manifest, resolves each dependency name to a
//! package directory, and recurses. Two memoization caches make the walk
//! linear in the number of distinct packages: name resolution is cached per
//! `(name, base dir)` pair and crawled specs are cached per resolved source
//! path, so diamond dependencies are crawled once and share identity.
//!
//! Only an unreadable *root* manifest aborts the crawl. Everything else —
//! missing dependencies, dependency cycles, malformed manifests deeper in
//! the tree — degrades to [`Diagnostic`]s recorded on the affected specs,
//! leaving a deep-enough graph to report every problem in one pass.

mod types;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

pub use types::*;

use crate::consts::MANIFEST_FILENAMES;
use crate::env::{BuildEnvironment, EnvironmentVar};
use crate::id::compute_build_id;
use crate::manifest::{self, ManifestError, PackageManifest};

/// Resolves a dependency name to the package directory holding its
/// manifest, starting from the directory of the depending package.
pub trait PackageResolver {
  fn resolve(&self, name: &str, base_dir: &Path) -> Option<PathBuf>;
}

/// The default resolver: walks up from the base directory looking for
/// `node_modules/<name>` containing a manifest.
pub struct NodeModulesResolver;

impl PackageResolver for NodeModulesResolver {
  fn resolve(&self, name: &str, base_dir: &Path) -> Option<PathBuf> {
    let mut dir = Some(base_dir);
    while let Some(current) = dir {
      let candidate = current.join("node_modules").join(name);
      if MANIFEST_FILENAMES.iter().any(|f| candidate.join(f).exists()) {
        return Some(candidate);
      }
      dir = current.parent();
    }
    None
  }
}

/// Options for one crawl.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlOptions {
  /// Export-for-release mode: every build, the root included, is flagged
  /// for the shared store.
  pub for_release: bool,
}

/// Fatal crawl failures. Everything non-fatal is a [`Diagnostic`].
#[derive(Debug, Error)]
pub enum CrawlError {
  #[error("cannot read the root package manifest: {0}")]
  RootManifest(#[from] ManifestError),
}

/// Crawl the package at `sandbox_path` and its dependency closure into a
/// [`Sandbox`].
pub fn from_directory(
  sandbox_path: &Path,
  resolver: &dyn PackageResolver,
  options: CrawlOptions,
) -> Result<Sandbox, CrawlError> {
  let mut ctx = CrawlContext {
    env: base_environment(),
    sandbox_path: sandbox_path.to_path_buf(),
    resolver,
    options,
    resolution_cache: HashMap::new(),
    build_cache: HashMap::new(),
  };

  let root = crawl_build(&mut ctx, sandbox_path, &[], None)?;

  Ok(Sandbox { env: ctx.env, root })
}

/// The ambient environment every build id is derived against.
fn base_environment() -> BuildEnvironment {
  let vars = [
    EnvironmentVar::built_in_exported("PATH", "$PATH:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin")
      .with_exclusive(false),
    EnvironmentVar::built_in_exported("SHELL", "env -i /bin/bash --norc --noprofile")
      .with_exclusive(false),
  ];
  vars.into_iter().map(|v| (v.name.clone(), v)).collect()
}

// Scoped to one planning run; dropped when the crawl returns.
struct CrawlContext<'a> {
  env: BuildEnvironment,
  sandbox_path: PathBuf,
  resolver: &'a dyn PackageResolver,
  options: CrawlOptions,
  resolution_cache: HashMap<(String, PathBuf), Option<PathBuf>>,
  build_cache: HashMap<PathBuf, Arc<BuildSpec>>,
}

impl CrawlContext<'_> {
  fn resolve_cached(&mut self, name: &str, base_dir: &Path) -> Option<PathBuf> {
    let key = (name.to_string(), base_dir.to_path_buf());
    if let Some(cached) = self.resolution_cache.get(&key) {
      return cached.clone();
    }
    let resolution = self.resolver.resolve(name, base_dir);
    self.resolution_cache.insert(key, resolution.clone());
    resolution
  }
}

fn crawl_build(
  ctx: &mut CrawlContext<'_>,
  source_path: &Path,
  trace: &[String],
  dependency_name: Option<&str>,
) -> Result<Arc<BuildSpec>, CrawlError> {
  let cache_key = dunce::canonicalize(source_path).unwrap_or_else(|_| source_path.to_path_buf());
  if let Some(cached) = ctx.build_cache.get(&cache_key) {
    return Ok(cached.clone());
  }

  let is_root = source_path == ctx.sandbox_path;
  let mut errors: Vec<Diagnostic> = Vec::new();

  let manifest = match manifest::read_manifest(source_path) {
    Ok(manifest) => manifest,
    Err(err) if is_root => return Err(err.into()),
    Err(err) => {
      // A broken manifest deeper in the tree is tolerated: the package is
      // crawled with defaulted fields and the problem is recorded.
      errors.push(Diagnostic::MalformedManifest {
        path: source_path.to_path_buf(),
        message: err.to_string(),
      });
      PackageManifest::defaulted(dependency_name.unwrap_or("unknown"))
    }
  };

  debug!(package = %manifest.name, path = %source_path.display(), "crawling package");

  let mut next_trace = trace.to_vec();
  next_trace.push(manifest.name.clone());

  let (dependencies, dependency_errors) =
    crawl_dependencies(ctx, source_path, &manifest.dependency_names(), &next_trace)?;
  errors.extend(dependency_errors);

  let is_installed = manifest.resolved.is_some();
  let source = match &manifest.resolved {
    Some(resolved) => resolved.clone(),
    None => format!("local:{}", cache_key.display()),
  };

  let relative_source_path = source_path
    .strip_prefix(&ctx.sandbox_path)
    .map(Path::to_path_buf)
    .unwrap_or_else(|_| source_path.to_path_buf());

  let dependency_ids: Vec<&str> = dependencies.keys().map(String::as_str).collect();
  let id = compute_build_id(&ctx.env, &manifest, &source, &dependency_ids);

  let spec = Arc::new(BuildSpec {
    id,
    name: manifest.name.clone(),
    version: manifest.version.clone(),
    package_path: relative_source_path.clone(),
    source_path: relative_source_path,
    source_type: if is_root {
      SourceType::Root
    } else if !is_installed {
      SourceType::Transient
    } else {
      SourceType::Immutable
    },
    build_type: BuildType::from_flag(&manifest.build.builds_in_source),
    should_be_persisted: !(is_root || !is_installed) || ctx.options.for_release,
    exported_env: manifest.build.exported_env,
    build_command: manifest.build.build,
    install_command: manifest.build.install,
    dependencies,
    errors,
  });

  ctx.build_cache.insert(cache_key, spec.clone());
  Ok(spec)
}

fn crawl_dependencies(
  ctx: &mut CrawlContext<'_>,
  base_dir: &Path,
  names: &[&str],
  trace: &[String],
) -> Result<(IndexMap<String, Arc<BuildSpec>>, Vec<Diagnostic>), CrawlError> {
  let mut dependencies = IndexMap::new();
  let mut errors = Vec::new();
  let mut missing: Vec<String> = Vec::new();

  for &name in names {
    if trace.iter().any(|ancestor| ancestor == name) {
      errors.push(Diagnostic::CircularDependency {
        name: name.to_string(),
        trace: trace.to_vec(),
      });
      continue;
    }

    let Some(package_dir) = ctx.resolve_cached(name, base_dir) else {
      missing.push(name.to_string());
      continue;
    };

    let spec = crawl_build(ctx, &package_dir, trace, Some(name))?;
    // Dependency diagnostics surface on every consumer, so inspecting any
    // node reports its whole subtree.
    errors.extend(spec.errors.iter().cloned());
    dependencies.insert(spec.id.clone(), spec);
  }

  if !missing.is_empty() {
    errors.push(Diagnostic::MissingPackages {
      names: missing,
      trace: trace.to_vec(),
    });
  }

  Ok((dependencies, errors))
}
