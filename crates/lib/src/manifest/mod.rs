//! Package manifest reading and normalization.
//!
//! A manifest describes one package: its name and version, its declared
//! dependencies, and a nested build configuration block (build/install
//! commands, the in-source flag, exported environment variables). Reading
//! applies all defaults up front so downstream code works with fully
//! populated values.

mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use types::*;

use crate::consts::MANIFEST_FILENAMES;

/// Errors reading a package manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("no manifest found in {dir}: tried {tried}")]
  NotFound { dir: PathBuf, tried: String },

  #[error("failed to read {path}: {message}")]
  Io { path: PathBuf, message: String },

  #[error("failed to parse {path}: {message}")]
  Parse { path: PathBuf, message: String },
}

/// Read the manifest of the package at `package_path`.
///
/// Tries each of [`MANIFEST_FILENAMES`] in order and parses the first one
/// that exists.
pub fn read_manifest(package_path: &Path) -> Result<PackageManifest, ManifestError> {
  for filename in MANIFEST_FILENAMES {
    let manifest_path = package_path.join(filename);
    if !manifest_path.exists() {
      continue;
    }

    let contents = std::fs::read_to_string(&manifest_path).map_err(|e| ManifestError::Io {
      path: manifest_path.clone(),
      message: e.to_string(),
    })?;

    return serde_json::from_str(&contents).map_err(|e| ManifestError::Parse {
      path: manifest_path,
      message: e.to_string(),
    });
  }

  Err(ManifestError::NotFound {
    dir: package_path.to_path_buf(),
    tried: MANIFEST_FILENAMES.join(", "),
  })
}
