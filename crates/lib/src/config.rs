//! Build configuration: the path scheme over the shared and sandbox-local
//! stores.
//!
//! Only `immutable` builds resolve against the shared, prefix-rooted store;
//! `root` and `transient` builds resolve against a store nested inside the
//! sandbox, since their artifacts are neither relocatable nor reusable.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::consts::{BUILD_ID_HASH_LEN, LOCAL_STORE_PATH};
use crate::id::canonical_hash;
use crate::platform::BuildPlatform;
use crate::sandbox::{BuildSpec, BuildType, SourceType};
use crate::store::{Store, StoreError, StoreTree};

/// Path-generation configuration for one sandbox.
#[derive(Debug, Clone)]
pub struct Config {
  /// The shared store for immutable builds.
  pub store: Store,

  /// The sandbox-local store for everything else.
  pub local_store: Store,

  pub sandbox_path: PathBuf,
  pub build_platform: BuildPlatform,
}

impl Config {
  /// A config whose shared store sits directly at `store_path` (no
  /// padding). Useful for tests and fixed deployments.
  pub fn create(
    store_path: impl Into<PathBuf>,
    sandbox_path: impl Into<PathBuf>,
    build_platform: BuildPlatform,
  ) -> Self {
    let sandbox_path = sandbox_path.into();
    Self {
      store: Store::for_path(store_path),
      local_store: Store::for_path(sandbox_path.join(LOCAL_STORE_PATH)),
      sandbox_path,
      build_platform,
    }
  }

  /// A config whose shared store is derived from `prefix` with the padding
  /// invariant enforced.
  pub fn for_prefix(
    prefix: &Path,
    sandbox_path: impl Into<PathBuf>,
    build_platform: BuildPlatform,
  ) -> Result<Self, StoreError> {
    let sandbox_path = sandbox_path.into();
    Ok(Self {
      store: Store::for_prefix(prefix)?,
      local_store: Store::for_path(sandbox_path.join(LOCAL_STORE_PATH)),
      sandbox_path,
      build_platform,
    })
  }

  fn store_for(&self, spec: &BuildSpec) -> &Store {
    match spec.source_type {
      SourceType::Immutable => &self.store,
      SourceType::Root | SourceType::Transient => &self.local_store,
    }
  }

  fn store_path(&self, tree: StoreTree, spec: &BuildSpec, segments: &[&str]) -> PathBuf {
    self.store_for(spec).get_path(tree, &spec.id, segments)
  }

  /// Where the package's sources live.
  pub fn source_path(&self, spec: &BuildSpec, segments: &[&str]) -> PathBuf {
    let mut path = if spec.source_path.is_absolute() {
      spec.source_path.clone()
    } else {
      self.sandbox_path.join(&spec.source_path)
    };
    for segment in segments {
      path.push(segment);
    }
    path
  }

  /// The directory the build executes from.
  ///
  /// In-source builds always run from a relocated copy in the build tree.
  /// `_build`-style builds only need relocation when cacheable; local and
  /// root sources build in place, as does every out-of-source build.
  pub fn root_path(&self, spec: &BuildSpec, segments: &[&str]) -> PathBuf {
    match spec.build_type {
      BuildType::InSource => self.store_path(StoreTree::Build, spec, segments),
      BuildType::UnderBuild => match spec.source_type {
        SourceType::Immutable => self.store_path(StoreTree::Build, spec, segments),
        SourceType::Transient | SourceType::Root => self.source_path(spec, segments),
      },
      BuildType::OutOfSource => self.source_path(spec, segments),
    }
  }

  /// Where build artifacts are written.
  pub fn build_path(&self, spec: &BuildSpec, segments: &[&str]) -> PathBuf {
    self.store_path(StoreTree::Build, spec, segments)
  }

  /// Where installs land first. Stage trees are renamed to install trees
  /// atomically, so a concurrent reader never sees a partial install.
  pub fn stage_path(&self, spec: &BuildSpec, segments: &[&str]) -> PathBuf {
    self.store_path(StoreTree::Stage, spec, segments)
  }

  /// The final, content-addressed install location.
  pub fn install_path(&self, spec: &BuildSpec, segments: &[&str]) -> PathBuf {
    self.store_path(StoreTree::Install, spec, segments)
  }

  /// Where the build log for this spec is written.
  pub fn log_path(&self, spec: &BuildSpec) -> PathBuf {
    let build_path = self.build_path(spec, &[]);
    let parent = build_path.parent().unwrap_or(&build_path);
    parent.join(format!("{}.log", spec.id))
  }

  /// Rewrite a path under the padded store root to the pretty alias root.
  pub fn prettify_path(&self, path: &Path) -> PathBuf {
    match path.strip_prefix(&self.store.path) {
      Ok(relative) => self.store.pretty_path.join(relative),
      Err(_) => path.to_path_buf(),
    }
  }

  /// A stable sandbox directory for an ad hoc set of package requests,
  /// keyed by the sorted request list.
  pub fn sandbox_path_for_requests(&self, requests: &[&str]) -> PathBuf {
    let mut requests: Vec<&str> = requests.to_vec();
    requests.sort_unstable();
    let digest = canonical_hash(&Value::String(requests.join(" ")));
    let prefix = self.store.path.parent().unwrap_or(&self.store.path);
    prefix.join("sandbox").join(&digest[..BUILD_ID_HASH_LEN])
  }
}
