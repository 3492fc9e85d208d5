//! End-to-end planning: crawled sandboxes into build tasks.

use serde_json::json;

use esker_lib::config::Config;
use esker_lib::consts::LOCAL_STORE_PATH;
use esker_lib::env::print_environment;
use esker_lib::platform::BuildPlatform;
use esker_lib::task::{self, ConflictKind, TaskParams};

use super::common::{TestSandbox, installed};

fn config_for(fixture: &TestSandbox) -> Config {
  Config::create("/store", fixture.path(), BuildPlatform::Linux)
}

#[test]
fn dependency_export_reaches_the_root_task() {
  let mut dep = installed("dep", "1.0.0");
  dep["esker"] = json!({
    "exportedEnv": {
      "DEP_GREETING": {"val": "hello from $cur__name", "scope": "global"},
    },
  });
  let fixture = TestSandbox::new()
    .manifest(
      "",
      &json!({
        "name": "app",
        "version": "1.0.0",
        "dependencies": {"dep": "*"},
      }),
    )
    .manifest("node_modules/dep", &dep);

  let sandbox = fixture.crawl();
  let task = task::from_sandbox(&sandbox, &config_for(&fixture), TaskParams::default()).unwrap();

  let var = task.env.get("DEP_GREETING").unwrap();
  // $cur__name belongs to whichever build consumes the export, so it is
  // deferred, not expanded at the exporter.
  assert_eq!(var.value, "hello from $cur__name");
  assert_eq!(var.origin.as_ref().unwrap().package, "dep");
}

#[test]
fn path_composes_dependency_bins_and_the_ambient_tail() {
  let fixture = TestSandbox::new()
    .manifest(
      "",
      &json!({
        "name": "app",
        "version": "1.0.0",
        "dependencies": {"dep": "*"},
      }),
    )
    .manifest("node_modules/dep", &installed("dep", "1.0.0"));

  let sandbox = fixture.crawl();
  let task = task::from_sandbox(&sandbox, &config_for(&fixture), TaskParams::default()).unwrap();

  let path = &task.env.get("PATH").unwrap().value;
  // Installed dependency artifacts live in the shared store.
  assert!(path.contains("/store/i/"), "unexpected PATH: {path}");
  assert!(
    path.ends_with("$PATH:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin"),
    "unexpected PATH: {path}"
  );
}

#[test]
fn root_commands_render_against_the_local_store() {
  let fixture = TestSandbox::new().manifest(
    "",
    &json!({
      "name": "app",
      "version": "1.0.0",
      "esker": {
        "build": "make PREFIX=$cur__install",
      },
    }),
  );

  let sandbox = fixture.crawl();
  let task = task::from_sandbox(&sandbox, &config_for(&fixture), TaskParams::default()).unwrap();

  // The root is never persisted, so its stage tree is sandbox-local.
  let rendered = &task.build_command[0].rendered;
  let local_store = fixture.path().join(LOCAL_STORE_PATH).join("s");
  assert!(
    rendered.contains(&local_store.display().to_string()),
    "unexpected command: {rendered}"
  );
}

#[test]
fn printed_environment_names_exporters() {
  let mut dep = installed("dep", "1.0.0");
  dep["esker"] = json!({
    "exportedEnv": {
      "DEP_FLAG": {"val": "1", "scope": "global"},
    },
  });
  let fixture = TestSandbox::new()
    .manifest(
      "",
      &json!({
        "name": "app",
        "version": "1.0.0",
        "dependencies": {"dep": "*"},
      }),
    )
    .manifest("node_modules/dep", &dep);

  let sandbox = fixture.crawl();
  let task = task::from_sandbox(&sandbox, &config_for(&fixture), TaskParams::default()).unwrap();

  let printed = print_environment(&task.env);
  assert!(printed.contains("# exported by dep\nexport DEP_FLAG=\"1\"\n"));
  // Engine bindings are scope-only and stay out of the printed form.
  assert!(!printed.contains("cur__target_dir"));
}

#[test]
fn exclusive_conflicts_surface_through_all_errors() {
  let mut first = installed("first", "1.0.0");
  first["esker"] = json!({
    "exportedEnv": {
      "PKG_FLAG": {"val": "one", "scope": "global", "exclusive": true},
    },
  });
  let mut second = installed("second", "1.0.0");
  second["esker"] = json!({
    "exportedEnv": {
      "PKG_FLAG": {"val": "two", "scope": "global"},
    },
  });
  let fixture = TestSandbox::new()
    .manifest(
      "",
      &json!({
        "name": "app",
        "version": "1.0.0",
        "dependencies": {"first": "*", "second": "*"},
      }),
    )
    .manifest("node_modules/first", &first)
    .manifest("node_modules/second", &second);

  let sandbox = fixture.crawl();
  let task = task::from_sandbox(&sandbox, &config_for(&fixture), TaskParams::default()).unwrap();

  assert_eq!(task.env.get("PKG_FLAG").unwrap().value, "one");

  let errors = task.all_errors();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].kind, ConflictKind::ExclusiveOverride);
  assert!(errors[0].to_string().contains("marked as exclusive"));
}
