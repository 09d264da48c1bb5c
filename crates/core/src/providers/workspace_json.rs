//! Legacy `workspace.json` support.
//!
//! Older workspaces enumerate projects in a single root-level JSON file. The
//! resolver only appends this provider when that file exists, so most runs
//! never see it.

use std::path::PathBuf;

use anyhow::Result;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use trellis_plugin_protocol::{
    FileNodes, NodeCreationFailure, NodeProvider, NodeResult, NodesHook,
    PartialNodeCreationError, ProjectDefinition, ProviderContext, TargetDefinition,
};

use crate::resolver::WORKSPACE_JSON_PLUGIN;

pub const WORKSPACE_JSON_FILE: &str = "workspace.json";

#[derive(Debug, Deserialize)]
struct WorkspaceJson {
    #[serde(default)]
    projects: IndexMap<String, WorkspaceJsonProject>,
}

/// A project entry is either a bare root path or an inline definition.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkspaceJsonProject {
    Root(String),
    Detailed {
        root: String,
        #[serde(default)]
        targets: IndexMap<String, TargetDefinition>,
        #[serde(default)]
        tags: Vec<String>,
    },
}

pub struct WorkspaceJsonProvider;

impl WorkspaceJsonProvider {
    pub fn new() -> Self {
        Self
    }

    fn nodes_for_file(&self, file: &PathBuf, context: &ProviderContext) -> Result<NodeResult> {
        let contents = std::fs::read_to_string(context.workspace_root.join(file))?;
        let manifest: WorkspaceJson = serde_json::from_str(&contents)?;

        let mut nodes = NodeResult::default();
        for (name, entry) in manifest.projects {
            let (root, targets, tags) = match entry {
                WorkspaceJsonProject::Root(root) => (root, IndexMap::new(), Vec::new()),
                WorkspaceJsonProject::Detailed {
                    root,
                    targets,
                    tags,
                } => (root, targets, tags),
            };

            nodes.projects.insert(
                root,
                ProjectDefinition {
                    name: Some(name),
                    targets,
                    tags,
                    metadata: None,
                },
            );
        }

        Ok(nodes)
    }
}

impl Default for WorkspaceJsonProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeProvider for WorkspaceJsonProvider {
    fn name(&self) -> &str {
        WORKSPACE_JSON_PLUGIN
    }

    fn nodes_hook(&self) -> Option<NodesHook> {
        Some(NodesHook::batched(WORKSPACE_JSON_FILE))
    }

    fn create_nodes(
        &self,
        files: &[PathBuf],
        _options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<Vec<FileNodes>> {
        let mut results = Vec::new();
        let mut failures = Vec::new();

        for file in files {
            match self.nodes_for_file(file, context) {
                Ok(nodes) => results.push(FileNodes::new(self.name(), file, nodes)),
                Err(err) => failures.push(NodeCreationFailure::for_file(file, format!("{err:#}"))),
            }
        }

        if failures.is_empty() {
            Ok(results)
        } else {
            Err(PartialNodeCreationError { results, failures }.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bare_and_detailed_entries() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(
            temp.path().join(WORKSPACE_JSON_FILE),
            r#"{
                "projects": {
                    "web": "apps/web",
                    "api": {
                        "root": "apps/api",
                        "tags": ["backend"],
                        "targets": {
                            "serve": { "command": "just serve" }
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        let context = ProviderContext::new(temp.path());

        let provider = WorkspaceJsonProvider::new();
        let results = provider
            .create_nodes(&[PathBuf::from(WORKSPACE_JSON_FILE)], None, &context)
            .unwrap();

        assert_eq!(results.len(), 1);
        let nodes = &results[0].nodes;
        assert_eq!(nodes.projects["apps/web"].name.as_deref(), Some("web"));
        let api = &nodes.projects["apps/api"];
        assert_eq!(api.tags, vec!["backend".to_string()]);
        assert_eq!(api.targets["serve"].command.as_deref(), Some("just serve"));
    }

    #[test]
    fn malformed_manifest_reports_partial_outcome() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join(WORKSPACE_JSON_FILE), "{ not json").unwrap();
        let context = ProviderContext::new(temp.path());

        let provider = WorkspaceJsonProvider::new();
        let error = provider
            .create_nodes(&[PathBuf::from(WORKSPACE_JSON_FILE)], None, &context)
            .unwrap_err();

        let partial = error.downcast::<PartialNodeCreationError>().unwrap();
        assert!(partial.results.is_empty());
        assert_eq!(partial.failures.len(), 1);
        assert_eq!(
            partial.failures[0].file.as_deref(),
            Some(std::path::Path::new(WORKSPACE_JSON_FILE))
        );
    }
}
