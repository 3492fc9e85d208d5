//! Shared test helpers for sandbox fixtures.

use std::path::Path;

use serde_json::Value;
use tempfile::TempDir;

use esker_lib::sandbox::{self, CrawlOptions, NodeModulesResolver, Sandbox};

/// A sandbox laid out on disk, one package per directory.
pub struct TestSandbox {
  temp: TempDir,
}

impl TestSandbox {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  /// Write a manifest at `dir`, relative to the sandbox root (`""` for the
  /// root package itself).
  pub fn manifest(self, dir: &str, manifest: &Value) -> Self {
    self.file(
      dir,
      "esker.json",
      &serde_json::to_string_pretty(manifest).unwrap(),
    )
  }

  /// Write an arbitrary file at `dir`, creating the directory as needed.
  pub fn file(self, dir: &str, name: &str, content: &str) -> Self {
    let dir_path = if dir.is_empty() {
      self.temp.path().to_path_buf()
    } else {
      self.temp.path().join(dir)
    };
    std::fs::create_dir_all(&dir_path).unwrap();
    std::fs::write(dir_path.join(name), content).unwrap();
    self
  }

  pub fn crawl(&self) -> Sandbox {
    self.crawl_with(CrawlOptions::default())
  }

  pub fn crawl_with(&self, options: CrawlOptions) -> Sandbox {
    sandbox::from_directory(self.path(), &NodeModulesResolver, options).unwrap()
  }
}

/// A minimal installed (registry-resolved) dependency manifest.
pub fn installed(name: &str, version: &str) -> Value {
  serde_json::json!({
    "name": name,
    "version": version,
    "_resolved": format!("https://registry.example.org/{name}/-/{name}-{version}.tgz"),
  })
}
