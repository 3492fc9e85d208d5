//! Store path generation.
//!
//! A store maps build ids onto three sibling trees:
//!
//! - `b` — build trees, where commands run for relocated builds
//! - `i` — install trees, the final content-addressed artifacts
//! - `s` — stage trees, where installs land before the atomic rename to `i`
//!
//! Tree names are single characters on purpose: the install tree appears
//! inside interpreter lines of installed executables, and every byte spent
//! here is a byte taken from the padding budget.
//!
//! A store derived from a prefix is padded with `_` to a fixed total
//! length so any `#!<store>/i/<runtime>` line fits the POSIX limit no
//! matter how short the chosen prefix is. A prefix too deep to admit any
//! padding is rejected outright since no valid plan could reference it.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::{STORE_PADDING_CHAR, STORE_PADDING_LENGTH, STORE_VERSION};

/// The three store trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTree {
  Build,
  Install,
  Stage,
}

impl StoreTree {
  pub fn as_str(&self) -> &'static str {
    match self {
      StoreTree::Build => "b",
      StoreTree::Install => "i",
      StoreTree::Stage => "s",
    }
  }
}

/// Errors constructing a store.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error(
    "prefix {prefix} is too deep in the filesystem: the store root would \
     exceed {limit} characters and built artifacts could not be relocated"
  )]
  PrefixTooDeep { prefix: PathBuf, limit: usize },
}

/// A pure path-generation record for one store root.
///
/// No filesystem state is held or checked; the store only names paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
  /// The real store root. For prefix-derived stores this is padded.
  pub path: PathBuf,

  /// Human-facing alias of the root (a symlink target candidate). Equal to
  /// `path` unless the store was derived from a prefix.
  pub pretty_path: PathBuf,

  /// Layout version baked into the root.
  pub version: u32,
}

impl Store {
  /// A store rooted directly at `path`, without padding. Used for
  /// sandbox-local stores whose artifacts are never relocated.
  pub fn for_path(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    Self {
      pretty_path: path.clone(),
      path,
      version: STORE_VERSION,
    }
  }

  /// A store rooted under `prefix`, padded to [`STORE_PADDING_LENGTH`].
  ///
  /// The unpadded `<prefix>/<version>` path is kept as the pretty alias.
  pub fn for_prefix(prefix: &Path) -> Result<Self, StoreError> {
    let pretty = prefix.join(STORE_VERSION.to_string());
    let unpadded = pretty.to_string_lossy().into_owned();
    if unpadded.len() > STORE_PADDING_LENGTH {
      return Err(StoreError::PrefixTooDeep {
        prefix: prefix.to_path_buf(),
        limit: STORE_PADDING_LENGTH,
      });
    }

    let mut padded = unpadded;
    while padded.len() < STORE_PADDING_LENGTH {
      padded.push(STORE_PADDING_CHAR);
    }

    Ok(Self {
      path: PathBuf::from(padded),
      pretty_path: pretty,
      version: STORE_VERSION,
    })
  }

  /// Path of `build_id` inside `tree`, with optional trailing segments.
  pub fn get_path(&self, tree: StoreTree, build_id: &str, segments: &[&str]) -> PathBuf {
    let mut path = self.path.join(tree.as_str()).join(build_id);
    for segment in segments {
      path.push(segment);
    }
    path
  }
}
