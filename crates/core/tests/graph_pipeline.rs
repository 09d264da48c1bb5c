//! End-to-end graph construction over a real on-disk workspace.

use std::fs;
use std::path::Path;

use trellis_core::workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};
use trellis_core::ProjectGraph;
use trellis_plugin_protocol::TargetDependency;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A workspace mixing Gradle services, cargo crates, an explicit project
/// configuration file, and workspace-level target defaults.
fn polyglot_workspace() -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();

    write(
        root,
        ".trellis/workspace.yml",
        concat!(
            "name: conveyor\n",
            "plugins:\n",
            "  - plugin: trellis/gradle\n",
            "    options:\n",
            "      ciTargetName: test-ci\n",
            "targetDefaults:\n",
            "  lint:\n",
            "    command: echo lint\n",
            "    cache: true\n",
        ),
    );

    // Two Gradle projects; the API project references the core one and owns a
    // test source file, so it atomizes.
    write(
        root,
        "services/api/build.gradle",
        concat!(
            "plugins {\n",
            "    id 'java'\n",
            "}\n",
            "dependencies {\n",
            "    implementation project(':services:core')\n",
            "}\n",
        ),
    );
    write(
        root,
        "services/core/build.gradle",
        "plugins {\n    id 'java'\n}\n",
    );
    write(
        root,
        "services/api/src/test/java/com/acme/ApiTest.java",
        "class ApiTest {}",
    );
    write(root, "services/api/trellis.yml", "tags:\n  - backend\n");

    // Two cargo crates with a path dependency between them.
    write(
        root,
        "crates/alpha/Cargo.toml",
        concat!(
            "[package]\nname = \"alpha\"\nversion = \"0.1.0\"\n\n",
            "[dependencies]\nbeta = { path = \"../beta\" }\n",
        ),
    );
    write(
        root,
        "crates/beta/Cargo.toml",
        "[package]\nname = \"beta\"\nversion = \"0.1.0\"\n",
    );

    temp
}

async fn construct(root: &Path) -> ProjectGraph {
    WorkspaceManager::new(WorkspaceManagerConfig {
        workspace_root: root.to_path_buf(),
    })
    .unwrap()
    .construct_graph()
    .await
    .unwrap()
}

#[tokio::test]
async fn constructs_the_full_graph_across_providers() {
    let temp = polyglot_workspace();
    let graph = construct(temp.path()).await;

    let roots: Vec<&str> = graph.nodes.keys().map(String::as_str).collect();
    assert!(roots.contains(&"services/api"));
    assert!(roots.contains(&"services/core"));
    assert!(roots.contains(&"crates/alpha"));
    assert!(roots.contains(&"crates/beta"));

    let api = &graph.nodes["services/api"];
    assert_eq!(api.name.as_deref(), Some("api"));
    assert_eq!(api.tags, vec!["backend".to_string()]);

    // Workspace-level target defaults survive where no later plugin overrides.
    assert_eq!(api.targets["lint"].command.as_deref(), Some("echo lint"));

    // Atomization: one target per owned test class, a no-op umbrella fanning
    // out over them, and the coarse task no longer caching.
    let atomized = &api.targets["test-ci--ApiTest"];
    assert_eq!(
        atomized.command.as_deref(),
        Some("./gradlew services:api:test --tests ApiTest")
    );
    let umbrella = &api.targets["test-ci"];
    assert_eq!(umbrella.executor.as_deref(), Some("trellis:noop"));
    assert_eq!(
        umbrella.depends_on,
        vec![TargetDependency::self_target("test-ci--ApiTest")]
    );
    assert_eq!(api.targets["test"].cache, Some(false));

    // A project without test sources keeps its plain test target.
    let core = &graph.nodes["services/core"];
    assert!(!core.targets.contains_key("test-ci"));
    assert_eq!(core.targets["test"].cache, Some(true));

    // Dependencies: the gradle project reference and the cargo path dependency.
    let edges: Vec<(&str, &str)> = graph
        .dependencies
        .iter()
        .map(|edge| (edge.source.as_str(), edge.target.as_str()))
        .collect();
    assert!(edges.contains(&("api", "core")));
    assert!(edges.contains(&("alpha", "beta")));
    assert!(graph.cycles.is_empty());
}

#[tokio::test]
async fn construction_is_deterministic() {
    let temp = polyglot_workspace();

    let first = serde_json::to_string(&construct(temp.path()).await).unwrap();
    let second = serde_json::to_string(&construct(temp.path()).await).unwrap();
    assert_eq!(first, second);
}
