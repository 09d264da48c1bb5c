use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use trellis_plugin_protocol::PluginSpec;

use crate::configs::targets::TargetConfig;
use crate::types::TrellisResult;

/// Directory under the workspace root holding Trellis configuration.
pub const CONFIG_DIR: &str = ".trellis";

/// Workspace configuration filename inside [`CONFIG_DIR`].
pub const WORKSPACE_CONFIG_FILE: &str = "workspace.yml";

#[derive(Deserialize, Serialize, JsonSchema, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub plugins: Option<Vec<PluginEntry>>,
    /// Glob patterns for paths to include in workspace traversal. If empty or not specified, all paths are included.
    pub includes: Option<Vec<String>>,
    /// Glob patterns for paths to exclude from workspace traversal.
    pub excludes: Option<Vec<String>>,
    /// Named input-set definitions available to every provider.
    pub named_inputs: Option<IndexMap<String, Vec<String>>>,
    /// Workspace-level target defaults, applied by the `trellis/target-defaults`
    /// provider so any configured plugin can override them.
    pub target_defaults: Option<IndexMap<String, TargetConfig>>,
}

/// One entry of the `plugins` list: a bare plugin name, or a table carrying
/// options and file filters.
#[derive(Deserialize, Serialize, JsonSchema, Clone)]
#[serde(untagged)]
pub enum PluginEntry {
    Name(String),
    Detailed(PluginConfig),
}

#[derive(Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PluginConfig {
    pub plugin: String,
    pub options: Option<serde_json::Value>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

impl PluginEntry {
    /// Normalize to the resolved specification form.
    #[must_use]
    pub fn into_spec(self) -> PluginSpec {
        match self {
            Self::Name(plugin) => PluginSpec::new(plugin),
            Self::Detailed(config) => PluginSpec {
                plugin: config.plugin,
                options: config.options,
                include: config.include,
                exclude: config.exclude,
            },
        }
    }
}

impl WorkspaceConfig {
    /// The configured plugin specifications, normalized and in file order.
    #[must_use]
    pub fn plugin_specs(&self) -> Vec<PluginSpec> {
        self.plugins
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(PluginEntry::into_spec)
            .collect()
    }
}

pub fn parse_workspace_config(yaml_str: &str) -> TrellisResult<WorkspaceConfig> {
    let config: WorkspaceConfig = serde_yaml::from_str(yaml_str)?;
    Ok(config)
}

/// Read `.trellis/workspace.yml` under `root`. A missing file yields the
/// default configuration; a present but malformed file is an error.
pub fn load_workspace_config(root: &std::path::Path) -> TrellisResult<WorkspaceConfig> {
    let path = root.join(CONFIG_DIR).join(WORKSPACE_CONFIG_FILE);
    if !path.exists() {
        return Ok(WorkspaceConfig::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    parse_workspace_config(&contents)
}
