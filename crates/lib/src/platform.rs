//! Build platform identification and path-list delimiter rules.

use serde::{Deserialize, Serialize};

/// The platform a build plan targets.
///
/// This is the platform the build will actually run on, which is not
/// necessarily the platform constructing the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPlatform {
  Linux,
  Darwin,
  Cygwin,
}

impl std::fmt::Display for BuildPlatform {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      BuildPlatform::Linux => "linux",
      BuildPlatform::Darwin => "darwin",
      BuildPlatform::Cygwin => "cygwin",
    };
    write!(f, "{name}")
  }
}

/// Delimiter used between entries of a path-list environment variable.
///
/// All supported platforms use `:`, with one exception: `OCAMLPATH` on
/// Cygwin must use `;` because the OCaml toolchain there follows the
/// native Windows convention even though the shell environment is POSIX.
pub fn paths_delimiter(var_name: &str, platform: BuildPlatform) -> &'static str {
  if var_name == "OCAMLPATH" && platform == BuildPlatform::Cygwin {
    ";"
  } else {
    ":"
  }
}
