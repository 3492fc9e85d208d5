use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A package manifest, fully defaulted at parse time.
///
/// Optional sections deserialize to their neutral values so the rest of the
/// engine never branches on "field missing" versus "field empty".
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PackageManifest {
  pub name: String,

  pub version: Option<String>,

  #[serde(default)]
  pub dependencies: IndexMap<String, String>,

  #[serde(default, rename = "peerDependencies")]
  pub peer_dependencies: IndexMap<String, String>,

  /// Registry provenance marker left by the installer.
  ///
  /// Present for packages fetched from an upstream source, absent for local
  /// and linked packages. Its presence is what makes a dependency cacheable.
  #[serde(default, rename = "_resolved")]
  pub resolved: Option<String>,

  /// The nested build configuration block.
  #[serde(default, rename = "esker")]
  pub build: BuildSection,
}

impl PackageManifest {
  /// A manifest with every optional field at its default, used when a
  /// dependency's manifest is malformed but the crawl must continue.
  pub fn defaulted(name: &str) -> Self {
    Self {
      name: name.to_string(),
      version: None,
      dependencies: IndexMap::new(),
      peer_dependencies: IndexMap::new(),
      resolved: None,
      build: BuildSection::default(),
    }
  }

  /// Names of declared dependencies and peer dependencies, de-duplicated,
  /// first occurrence order preserved.
  pub fn dependency_names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for name in self.dependencies.keys().chain(self.peer_dependencies.keys()) {
      if !names.contains(&name.as_str()) {
        names.push(name);
      }
    }
    names
  }
}

/// The build configuration block of a manifest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildSection {
  #[serde(default)]
  pub build: CommandList,

  #[serde(default)]
  pub install: CommandList,

  /// `false` (default), `true`, or the `"_build"` sentinel.
  #[serde(default, rename = "buildsInSource")]
  pub builds_in_source: InSourceFlag,

  #[serde(default, rename = "exportedEnv")]
  pub exported_env: IndexMap<String, ExportedEnv>,
}

/// Whether (and where) a build pollutes its source root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InSourceFlag {
  Bool(bool),
  Marker(String),
}

impl Default for InSourceFlag {
  fn default() -> Self {
    InSourceFlag::Bool(false)
  }
}

/// An environment variable exported by a package for its consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedEnv {
  /// Value template, expanded against the exporter's evaluation scope.
  pub val: String,

  #[serde(default)]
  pub scope: ExportScope,

  #[serde(default)]
  pub exclusive: bool,
}

/// Visibility of an exported variable.
///
/// `Local` exports reach only immediate consumers; `Global` exports reach
/// every transitive consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
  #[default]
  Local,
  Global,
}

/// A build or install phase: a sequence of commands, each either a full
/// command line or an argument list.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CommandList(pub Vec<Command>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
  Line(String),
  Args(Vec<String>),
}

// Normalization happens at parse time: `null` becomes the empty list and a
// bare string becomes a singleton command line.
impl<'de> Deserialize<'de> for CommandList {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
      Many(Vec<Command>),
      One(String),
    }

    let repr = Option::<Repr>::deserialize(deserializer)?;
    Ok(match repr {
      None => CommandList(Vec::new()),
      Some(Repr::One(line)) => CommandList(vec![Command::Line(line)]),
      Some(Repr::Many(commands)) => CommandList(commands),
    })
  }
}
