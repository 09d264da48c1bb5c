//! Seeds workspace-level default targets into every explicit project.
//!
//! This provider sits at the front of the resolved plugin order, so anything
//! a later plugin synthesizes for the same target name overrides the default
//! field by field during aggregation.

use std::path::PathBuf;

use anyhow::Result;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use trellis_plugin_protocol::{
    FileNodes, NodeProvider, NodeResult, NodesHook, ProjectDefinition, ProviderContext,
    TargetDefinition,
};

use crate::configs::project::PROJECT_CONFIG_FILE;
use crate::configs::workspace::load_workspace_config;
use crate::resolver::TARGET_DEFAULTS_PLUGIN;

pub struct TargetDefaultsProvider;

impl TargetDefaultsProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TargetDefaultsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeProvider for TargetDefaultsProvider {
    fn name(&self) -> &str {
        TARGET_DEFAULTS_PLUGIN
    }

    fn nodes_hook(&self) -> Option<NodesHook> {
        Some(NodesHook::batched(format!("**/{PROJECT_CONFIG_FILE}")))
    }

    fn create_nodes(
        &self,
        files: &[PathBuf],
        _options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<Vec<FileNodes>> {
        let workspace_config = load_workspace_config(&context.workspace_root)?;
        let defaults: IndexMap<String, TargetDefinition> = workspace_config
            .target_defaults
            .unwrap_or_default()
            .iter()
            .map(|(target_name, config)| (target_name.clone(), config.to_target_definition()))
            .collect();

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            if defaults.is_empty() {
                results.push(FileNodes::new(self.name(), file, NodeResult::default()));
                continue;
            }

            let root = project_root_for(file);
            let project = ProjectDefinition {
                targets: defaults.clone(),
                ..ProjectDefinition::default()
            };

            results.push(FileNodes::new(
                self.name(),
                file,
                NodeResult::single(root, project),
            ));
        }

        Ok(results)
    }
}

fn project_root_for(file: &PathBuf) -> String {
    match file.parent() {
        Some(parent) if parent.as_os_str().is_empty() => ".".to_string(),
        Some(parent) => parent.to_string_lossy().replace('\\', "/"),
        None => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_config(target_defaults: &str) -> (tempfile::TempDir, ProviderContext) {
        let temp = tempfile::tempdir().unwrap();
        let config_dir = temp.path().join(".trellis");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("workspace.yml"),
            format!("name: fixture\n{target_defaults}"),
        )
        .unwrap();

        let context = ProviderContext::new(temp.path());
        (temp, context)
    }

    #[test]
    fn emits_defaults_for_each_project_file() {
        let (_temp, context) = context_with_config(
            "targetDefaults:\n  lint:\n    command: just lint\n    cache: true\n",
        );
        let files = vec![
            PathBuf::from("apps/web/trellis.yml"),
            PathBuf::from("libs/util/trellis.yml"),
        ];

        let provider = TargetDefaultsProvider::new();
        let results = provider.create_nodes(&files, None, &context).unwrap();

        assert_eq!(results.len(), 2);
        let project = &results[0].nodes.projects["apps/web"];
        let lint = &project.targets["lint"];
        assert_eq!(lint.command.as_deref(), Some("just lint"));
        assert_eq!(lint.cache, Some(true));
        assert!(results[1].nodes.projects.contains_key("libs/util"));
    }

    #[test]
    fn stays_silent_without_configured_defaults() {
        let (_temp, context) = context_with_config("");
        let files = vec![PathBuf::from("apps/web/trellis.yml")];

        let provider = TargetDefaultsProvider::new();
        let results = provider.create_nodes(&files, None, &context).unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].nodes.is_empty());
    }

    #[test]
    fn workspace_root_project_file_maps_to_dot() {
        assert_eq!(project_root_for(&PathBuf::from("trellis.yml")), ".");
        assert_eq!(project_root_for(&PathBuf::from("apps/web/trellis.yml")), "apps/web");
    }
}
