//! Shared constants for the store layout and manifest discovery.

/// Manifest filenames tried in order when reading a package directory.
pub const MANIFEST_FILENAMES: [&str; 2] = ["esker.json", "package.json"];

/// Directory (relative to the sandbox root) holding the sandbox-local store.
///
/// Builds of `root` and `transient` packages land here instead of the shared
/// prefix store because their artifacts are not relocatable.
pub const LOCAL_STORE_PATH: &str = "node_modules/.cache/_esker/store";

/// The current version of the store layout. Bump whenever the layout changes.
pub const STORE_VERSION: u32 = 3;

/// Filler character used to pad prefix-derived store roots.
pub const STORE_PADDING_CHAR: char = '_';

/// The longest interpreter line POSIX guarantees to honor.
///
/// Darwin is more lenient but Linux enforces this.
pub const MAX_SHEBANG_LENGTH: usize = 127;

/// The longest runtime path (relative to an install root) an installed
/// executable may embed in its interpreter line, under the current store
/// naming schema.
pub const RUNTIME_STORE_PATH: &str = "ocaml-n.00.000-########/bin/ocamlrun";

/// Fixed total length of a padded store root.
///
/// Every install tree must admit `#!<store root>/i/<RUNTIME_STORE_PATH>`
/// within [`MAX_SHEBANG_LENGTH`] bytes, so the store root consumes all the
/// spare budget regardless of how deep the chosen prefix is.
pub const STORE_PADDING_LENGTH: usize =
  MAX_SHEBANG_LENGTH - "#!".len() - "/i/".len() - RUNTIME_STORE_PATH.len();

/// Number of hex characters of the content hash kept in a build id.
pub const BUILD_ID_HASH_LEN: usize = 8;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn padding_length_matches_shebang_budget() {
    // "#!" + padded root + "/i/" + runtime path must exactly fill the limit.
    assert_eq!(
      "#!".len() + STORE_PADDING_LENGTH + "/i/".len() + RUNTIME_STORE_PATH.len(),
      MAX_SHEBANG_LENGTH
    );
    assert_eq!(STORE_PADDING_LENGTH, 86);
  }
}
