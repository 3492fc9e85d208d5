//! Content-addressed build identity.
//!
//! A build id is a deterministic structural hash over everything that can
//! change the result of a build: the ambient base environment, the source
//! provenance, the manifest fields that drive the build, and the ids of the
//! direct dependencies. Dependencies contribute only their own ids, never
//! their full subtrees, so identical subtrees always hash identically and
//! id changes propagate transitively through consumers.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::consts::BUILD_ID_HASH_LEN;
use crate::env::BuildEnvironment;
use crate::manifest::PackageManifest;

/// Compute the content-addressed id for a build.
///
/// The id reads as `<normalized name>-<version>-<8 hex chars>`, with
/// `0.0.0` standing in for a missing version.
pub fn compute_build_id(
  env: &BuildEnvironment,
  manifest: &PackageManifest,
  source: &str,
  dependency_ids: &[&str],
) -> String {
  let mut dependency_ids: Vec<&str> = dependency_ids.to_vec();
  dependency_ids.sort_unstable();

  let env_values: serde_json::Map<String, Value> = env
    .values()
    .map(|var| (var.name.clone(), Value::String(var.value.clone())))
    .collect();

  let id_source = serde_json::json!({
    "env": env_values,
    "source": source,
    "manifest": {
      "name": manifest.name,
      "version": manifest.version,
      "build": manifest.build,
    },
    "dependencies": dependency_ids,
  });

  let digest = canonical_hash(&id_source);
  format!(
    "{}-{}-{}",
    normalize_package_name(&manifest.name),
    manifest.version.as_deref().unwrap_or("0.0.0"),
    &digest[..BUILD_ID_HASH_LEN]
  )
}

/// Hash a JSON value into a full lowercase hex SHA-256 digest.
///
/// Object keys are serialized in lexicographic order so structurally equal
/// values hash identically regardless of construction order. `null` (the
/// encoding of an absent field) serializes to a bare token distinct from
/// any real string value.
pub fn canonical_hash(value: &Value) -> String {
  let mut canonical = String::new();
  write_canonical(value, &mut canonical);

  let mut hasher = Sha256::new();
  hasher.update(canonical.as_bytes());
  format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    // Absent fields; the token carries no quotes so it can never collide
    // with the string "undefined".
    Value::Null => out.push_str("undefined"),
    Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
    Value::Number(n) => out.push_str(&n.to_string()),
    Value::String(s) => {
      // serde_json string escaping is deterministic.
      out.push_str(&serde_json::to_string(s).unwrap_or_default());
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      out.push('{');
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&serde_json::to_string(key).unwrap_or_default());
        out.push(':');
        write_canonical(&map[key], out);
      }
      out.push('}');
    }
  }
}

/// Normalize a package name into an identifier safe for environment
/// variable names and store path components.
///
/// The leading scope marker is dropped, the scope separator becomes `__`,
/// and `-`/`.` become `_`: `@scope/pkg-a` normalizes to `scope__pkg_a`.
pub fn normalize_package_name(name: &str) -> String {
  name
    .strip_prefix('@')
    .unwrap_or(name)
    .chars()
    .map(|c| match c {
      '/' => "__".to_string(),
      '-' | '.' => "_".to_string(),
      c => c.to_string(),
    })
    .collect()
}
