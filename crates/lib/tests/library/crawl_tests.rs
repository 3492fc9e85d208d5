//! Crawling manifests into specification graphs.

use std::sync::Arc;

use serde_json::json;

use esker_lib::consts::BUILD_ID_HASH_LEN;
use esker_lib::sandbox::{
  self, BuildSpec, BuildType, CrawlOptions, Diagnostic, NodeModulesResolver, SourceType,
};

use super::common::{TestSandbox, installed};

fn find(root: &Arc<BuildSpec>, name: &str) -> Arc<BuildSpec> {
  let mut found = None;
  root.traverse(&mut |spec| {
    if spec.name == name {
      found = Some(spec.clone());
    }
  });
  found.unwrap_or_else(|| panic!("no package named {name} in the graph"))
}

mod root_package {
  use super::*;

  #[test]
  fn crawls_name_version_and_commands() {
    let sandbox = TestSandbox::new()
      .manifest(
        "",
        &json!({
          "name": "app",
          "version": "1.0.0",
          "esker": {
            "build": ["make"],
            "install": "make install",
          },
        }),
      )
      .crawl();

    let root = &sandbox.root;
    assert_eq!(root.name, "app");
    assert_eq!(root.version.as_deref(), Some("1.0.0"));
    assert_eq!(root.source_type, SourceType::Root);
    assert_eq!(root.build_type, BuildType::OutOfSource);
    assert!(!root.should_be_persisted);
    assert_eq!(root.build_command.0.len(), 1);
    assert_eq!(root.install_command.0.len(), 1);
  }

  #[test]
  fn id_is_name_version_and_hash() {
    let sandbox = TestSandbox::new()
      .manifest("", &json!({"name": "app", "version": "1.0.0"}))
      .crawl();

    let id = &sandbox.root.id;
    assert!(id.starts_with("app-1.0.0-"), "unexpected id: {id}");
    assert_eq!(id.len(), "app-1.0.0-".len() + BUILD_ID_HASH_LEN);
  }

  #[test]
  fn missing_root_manifest_is_fatal() {
    let sandbox = TestSandbox::new();
    let result =
      sandbox::from_directory(sandbox.path(), &NodeModulesResolver, CrawlOptions::default());
    assert!(result.is_err());
  }

  #[test]
  fn for_release_persists_the_root() {
    let fixture = TestSandbox::new().manifest("", &json!({"name": "app", "version": "1.0.0"}));

    assert!(!fixture.crawl().root.should_be_persisted);
    assert!(
      fixture
        .crawl_with(CrawlOptions { for_release: true })
        .root
        .should_be_persisted
    );
  }
}

mod dependencies {
  use super::*;

  fn app_with(dep: &serde_json::Value) -> TestSandbox {
    TestSandbox::new()
      .manifest(
        "",
        &json!({
          "name": "app",
          "version": "1.0.0",
          "dependencies": {"dep": "*"},
        }),
      )
      .manifest("node_modules/dep", dep)
  }

  #[test]
  fn installed_dependency_is_immutable_and_persisted() {
    let sandbox = app_with(&installed("dep", "1.0.0")).crawl();

    assert_eq!(sandbox.root.dependencies.len(), 1);
    let dep = find(&sandbox.root, "dep");
    assert_eq!(dep.source_type, SourceType::Immutable);
    assert!(dep.should_be_persisted);
  }

  #[test]
  fn linked_dependency_is_transient() {
    let sandbox = app_with(&json!({"name": "dep", "version": "1.0.0"})).crawl();

    let dep = find(&sandbox.root, "dep");
    assert_eq!(dep.source_type, SourceType::Transient);
    assert!(!dep.should_be_persisted);
  }

  #[test]
  fn builds_in_source_marker_selects_build_type() {
    let mut dep = installed("dep", "1.0.0");
    dep["esker"] = json!({"buildsInSource": true});
    let sandbox = app_with(&dep).crawl();
    assert_eq!(find(&sandbox.root, "dep").build_type, BuildType::InSource);

    let mut dep = installed("dep", "1.0.0");
    dep["esker"] = json!({"buildsInSource": "_build"});
    let sandbox = app_with(&dep).crawl();
    assert_eq!(find(&sandbox.root, "dep").build_type, BuildType::UnderBuild);
  }

  #[test]
  fn diamond_dependency_is_crawled_once() {
    let mut left = installed("left", "1.0.0");
    left["dependencies"] = json!({"shared": "*"});
    let mut right = installed("right", "1.0.0");
    right["dependencies"] = json!({"shared": "*"});

    let sandbox = TestSandbox::new()
      .manifest(
        "",
        &json!({
          "name": "app",
          "version": "1.0.0",
          "dependencies": {"left": "*", "right": "*"},
        }),
      )
      .manifest("node_modules/left", &left)
      .manifest("node_modules/right", &right)
      .manifest("node_modules/shared", &installed("shared", "1.0.0"))
      .crawl();

    let through_left = find(&find(&sandbox.root, "left"), "shared");
    let through_right = find(&find(&sandbox.root, "right"), "shared");
    assert!(Arc::ptr_eq(&through_left, &through_right));

    let mut count = 0;
    sandbox.root.traverse(&mut |_| count += 1);
    assert_eq!(count, 4);
  }

  #[test]
  fn peer_dependencies_are_crawled_too() {
    let sandbox = TestSandbox::new()
      .manifest(
        "",
        &json!({
          "name": "app",
          "version": "1.0.0",
          "peerDependencies": {"peer": "*"},
        }),
      )
      .manifest("node_modules/peer", &installed("peer", "2.0.0"))
      .crawl();

    assert_eq!(find(&sandbox.root, "peer").version.as_deref(), Some("2.0.0"));
  }
}

mod identity {
  use super::*;

  #[test]
  fn ids_are_stable_across_crawls() {
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

    let first = fixture.crawl();
    let second = fixture.crawl();
    assert_eq!(first.root.id, second.root.id);
    assert_eq!(
      find(&first.root, "dep").id,
      find(&second.root, "dep").id
    );
  }

  #[test]
  fn dependency_change_ripples_into_the_consumer_id() {
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
    let before = fixture.crawl();

    let fixture = fixture.manifest("node_modules/dep", &installed("dep", "1.0.1"));
    let after = fixture.crawl();

    assert_ne!(find(&before.root, "dep").id, find(&after.root, "dep").id);
    assert_ne!(before.root.id, after.root.id);
  }
}

mod diagnostics {
  use super::*;

  #[test]
  fn cycle_is_recorded_with_its_trace() {
    let mut b = installed("b", "1.0.0");
    b["dependencies"] = json!({"app": "*"});
    let sandbox = TestSandbox::new()
      .manifest(
        "",
        &json!({
          "name": "app",
          "version": "1.0.0",
          "dependencies": {"b": "*"},
        }),
      )
      .manifest("node_modules/b", &b)
      .crawl();

    let diagnostics = sandbox.all_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
      diagnostics[0].to_string(),
      "Circular dependency \"app\" found\n  At app -> b"
    );
  }

  #[test]
  fn missing_packages_are_reported_together() {
    let sandbox = TestSandbox::new()
      .manifest(
        "",
        &json!({
          "name": "app",
          "version": "1.0.0",
          "dependencies": {"m1": "*", "m2": "*", "m3": "*", "m4": "*"},
        }),
      )
      .crawl();

    let diagnostics = sandbox.all_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
      diagnostics[0].to_string(),
      "Cannot resolve \"m1\", \"m2\", \"m3\" (and 1 more) packages\n\
       \x20 At app\n\
       \x20 Did you forget to install dependencies?"
    );
  }

  #[test]
  fn malformed_dependency_manifest_is_tolerated() {
    let sandbox = TestSandbox::new()
      .manifest(
        "",
        &json!({
          "name": "app",
          "version": "1.0.0",
          "dependencies": {"broken": "*"},
        }),
      )
      .file("node_modules/broken", "esker.json", "{ not json")
      .crawl();

    // The dependency is still part of the graph, with defaulted fields.
    let broken = find(&sandbox.root, "broken");
    assert!(broken.id.starts_with("broken-0.0.0-"));

    let diagnostics = sandbox.all_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(&diagnostics[0], Diagnostic::MalformedManifest { .. }));
  }

  #[test]
  fn shared_subtree_problems_are_reported_once() {
    let mut left = installed("left", "1.0.0");
    left["dependencies"] = json!({"ghost": "*"});
    let mut right = installed("right", "1.0.0");
    right["dependencies"] = json!({"left": "*"});

    let sandbox = TestSandbox::new()
      .manifest(
        "",
        &json!({
          "name": "app",
          "version": "1.0.0",
          "dependencies": {"left": "*", "right": "*"},
        }),
      )
      .manifest("node_modules/left", &left)
      .manifest("node_modules/right", &right)
      .crawl();

    // The missing package is visible through both parents but deduplicated.
    assert_eq!(sandbox.all_diagnostics().len(), 1);
  }
}
