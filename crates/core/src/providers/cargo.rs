//! Cargo manifest inference.
//!
//! Every `Cargo.toml` carrying a `[package]` section becomes a project with
//! standard build and test targets. Path dependencies between workspace
//! members become static graph edges.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use trellis_plugin_protocol::{
    DependencyKind, NodeProvider, NodeResult, NodesHook, ProjectDefinition, ProjectDependency,
    ProjectMetadata, ProviderContext, TargetDefinition, TargetDependency,
};

use crate::resolver::CARGO_PLUGIN;

pub const CARGO_MANIFEST_FILE: &str = "Cargo.toml";

const DEPENDENCY_SECTIONS: &[&str] = &["dependencies", "dev-dependencies", "build-dependencies"];

pub struct CargoProvider;

impl CargoProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CargoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeProvider for CargoProvider {
    fn name(&self) -> &str {
        CARGO_PLUGIN
    }

    fn nodes_hook(&self) -> Option<NodesHook> {
        Some(NodesHook::per_file(format!("**/{CARGO_MANIFEST_FILE}")))
    }

    fn create_nodes_for_file(
        &self,
        file: &Path,
        _options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<NodeResult> {
        let manifest = read_manifest(&context.workspace_root, file)?;

        // Virtual workspace manifests have no [package] section and define no
        // project of their own.
        let Some(package_name) = package_name(&manifest) else {
            return Ok(NodeResult::default());
        };

        let root = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.to_string_lossy().replace('\\', "/")
            }
            _ => ".".to_string(),
        };

        let mut targets = IndexMap::new();
        targets.insert(
            "build".to_string(),
            TargetDefinition {
                command: Some(format!("cargo build -p {package_name}")),
                inputs: vec!["default".to_string(), "^production".to_string()],
                cache: Some(true),
                ..TargetDefinition::default()
            },
        );
        targets.insert(
            "test".to_string(),
            TargetDefinition {
                command: Some(format!("cargo test -p {package_name}")),
                depends_on: vec![TargetDependency::Target("build".to_string())],
                inputs: vec!["default".to_string(), "^production".to_string()],
                cache: Some(true),
                ..TargetDefinition::default()
            },
        );

        let mut target_groups = IndexMap::new();
        target_groups.insert("Build".to_string(), vec!["build".to_string()]);
        target_groups.insert("Test".to_string(), vec!["test".to_string()]);

        let project = ProjectDefinition {
            name: Some(package_name),
            targets,
            tags: Vec::new(),
            metadata: Some(ProjectMetadata {
                technologies: vec!["cargo".to_string()],
                target_groups,
            }),
        };

        Ok(NodeResult::single(root, project))
    }

    fn creates_dependencies(&self) -> bool {
        true
    }

    fn create_dependencies(
        &self,
        _options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<Vec<ProjectDependency>> {
        let manifests: Vec<(&PathBuf, toml::Value)> = context
            .workspace_files
            .iter()
            .filter(|file| file.file_name().is_some_and(|name| name == CARGO_MANIFEST_FILE))
            .map(|file| Ok((file, read_manifest(&context.workspace_root, file)?)))
            .collect::<Result<_>>()?;

        let known_packages: Vec<String> = manifests
            .iter()
            .filter_map(|(_, manifest)| package_name(manifest))
            .collect();

        let mut dependencies = Vec::new();
        for (file, manifest) in &manifests {
            let Some(source) = package_name(manifest) else {
                continue;
            };

            for dependency in path_dependencies(manifest) {
                if !known_packages.contains(&dependency) {
                    tracing::debug!(
                        source = %source,
                        dependency = %dependency,
                        "path dependency points outside the workspace, skipping"
                    );
                    continue;
                }

                dependencies.push(ProjectDependency {
                    source: source.clone(),
                    target: dependency,
                    kind: DependencyKind::Static,
                    source_file: Some((*file).clone()),
                });
            }
        }

        Ok(dependencies)
    }
}

fn read_manifest(workspace_root: &Path, file: &Path) -> Result<toml::Value> {
    let contents = std::fs::read_to_string(workspace_root.join(file))
        .with_context(|| format!("Failed to read {}", file.display()))?;
    contents
        .parse::<toml::Value>()
        .with_context(|| format!("Failed to parse {}", file.display()))
}

fn package_name(manifest: &toml::Value) -> Option<String> {
    manifest
        .get("package")
        .and_then(|package| package.get("name"))
        .and_then(|name| name.as_str())
        .map(str::to_string)
}

/// Names of all dependencies declared with a `path`, honoring `package`
/// renames. Duplicates across sections collapse to one entry.
fn path_dependencies(manifest: &toml::Value) -> Vec<String> {
    let mut names = Vec::new();

    for section in DEPENDENCY_SECTIONS {
        let Some(table) = manifest.get(section).and_then(|value| value.as_table()) else {
            continue;
        };

        for (key, details) in table {
            if details.get("path").is_none() {
                continue;
            }

            let name = details
                .get("package")
                .and_then(|package| package.as_str())
                .unwrap_or(key)
                .to_string();

            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(temp: &tempfile::TempDir, relative: &str, contents: &str) -> PathBuf {
        let path = temp.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        PathBuf::from(relative)
    }

    #[test]
    fn package_manifest_becomes_a_project() {
        let temp = tempfile::tempdir().unwrap();
        let file = write_manifest(
            &temp,
            "crates/util/Cargo.toml",
            "[package]\nname = \"util\"\nversion = \"0.1.0\"\n",
        );
        let context = ProviderContext::new(temp.path());

        let provider = CargoProvider::new();
        let nodes = provider.create_nodes_for_file(&file, None, &context).unwrap();

        let project = &nodes.projects["crates/util"];
        assert_eq!(project.name.as_deref(), Some("util"));
        assert_eq!(
            project.targets["build"].command.as_deref(),
            Some("cargo build -p util")
        );
        assert_eq!(
            project.targets["test"].depends_on,
            vec![TargetDependency::Target("build".to_string())]
        );
    }

    #[test]
    fn virtual_manifest_defines_no_project() {
        let temp = tempfile::tempdir().unwrap();
        let file = write_manifest(&temp, "Cargo.toml", "[workspace]\nmembers = [\"crates/*\"]\n");
        let context = ProviderContext::new(temp.path());

        let provider = CargoProvider::new();
        let nodes = provider.create_nodes_for_file(&file, None, &context).unwrap();
        assert!(nodes.is_empty());
    }

    #[test]
    fn path_dependencies_become_static_edges() {
        let temp = tempfile::tempdir().unwrap();
        let app = write_manifest(
            &temp,
            "crates/app/Cargo.toml",
            concat!(
                "[package]\nname = \"app\"\nversion = \"0.1.0\"\n\n",
                "[dependencies]\nutil = { path = \"../util\" }\n",
                "serde = \"1.0\"\n",
            ),
        );
        let util = write_manifest(
            &temp,
            "crates/util/Cargo.toml",
            "[package]\nname = \"util\"\nversion = \"0.1.0\"\n",
        );

        let mut context = ProviderContext::new(temp.path());
        context.workspace_files = vec![app.clone(), util];

        let provider = CargoProvider::new();
        let dependencies = provider.create_dependencies(None, &context).unwrap();

        assert_eq!(dependencies.len(), 1);
        assert_eq!(dependencies[0].source, "app");
        assert_eq!(dependencies[0].target, "util");
        assert_eq!(dependencies[0].kind, DependencyKind::Static);
        assert_eq!(dependencies[0].source_file.as_ref(), Some(&app));
    }

    #[test]
    fn renamed_path_dependency_uses_package_name() {
        let manifest: toml::Value = concat!(
            "[package]\nname = \"app\"\n\n",
            "[dependencies]\ncore-alias = { path = \"../core\", package = \"engine-core\" }\n",
        )
        .parse()
        .unwrap();

        assert_eq!(path_dependencies(&manifest), vec!["engine-core".to_string()]);
    }
}
