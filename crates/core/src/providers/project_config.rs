//! Turns explicit `trellis.yml` project files into graph nodes.
//!
//! Resolution places this provider last, which makes an explicit project file
//! the final word on names, tags, and the targets it declares.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use trellis_plugin_protocol::{
    NodeProvider, NodeResult, NodesHook, ProjectDefinition, ProviderContext,
};

use crate::configs::project::{parse_project_config, PROJECT_CONFIG_FILE};
use crate::resolver::PROJECT_CONFIG_PLUGIN;

pub struct ProjectConfigProvider;

impl ProjectConfigProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProjectConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeProvider for ProjectConfigProvider {
    fn name(&self) -> &str {
        PROJECT_CONFIG_PLUGIN
    }

    fn nodes_hook(&self) -> Option<NodesHook> {
        Some(NodesHook::per_file(format!("**/{PROJECT_CONFIG_FILE}")))
    }

    fn create_nodes_for_file(
        &self,
        file: &Path,
        _options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<NodeResult> {
        let contents = std::fs::read_to_string(context.workspace_root.join(file))
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let config = parse_project_config(&contents)
            .with_context(|| format!("Failed to parse {}", file.display()))?;

        let (root, directory_name) = split_project_path(file, context);

        let mut project = ProjectDefinition {
            name: Some(config.name.unwrap_or(directory_name)),
            ..ProjectDefinition::default()
        };

        if let Some(tags) = config.tags {
            project.tags = tags;
        }

        if let Some(targets) = config.targets {
            for (target_name, target_config) in &targets {
                project
                    .targets
                    .insert(target_name.clone(), target_config.to_target_definition());
            }
        }

        Ok(NodeResult::single(root, project))
    }
}

/// Workspace-relative project root plus the name to fall back on when the
/// config does not set one.
fn split_project_path(file: &Path, context: &ProviderContext) -> (String, String) {
    let parent = file.parent().filter(|parent| !parent.as_os_str().is_empty());

    match parent {
        Some(parent) => {
            let root = parent.to_string_lossy().replace('\\', "/");
            let name = parent
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| root.clone());
            (root, name)
        }
        None => {
            let name = context
                .workspace_root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "root".to_string());
            (".".to_string(), name)
        }
    }
}
