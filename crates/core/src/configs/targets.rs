use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use trellis_plugin_protocol::{
    DependencyParams, TargetDefinition, TargetDependency, TargetMetadata,
};

/// A target as written in configuration files, shared between workspace-level
/// `targetDefaults` and per-project `trellis.yml` targets.
#[derive(Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetConfig {
    pub command: Option<String>,
    pub executor: Option<String>,
    pub depends_on: Option<Vec<TargetDependencyConfig>>,
    pub inputs: Option<Vec<String>>,
    pub cache: Option<bool>,
    pub options: Option<serde_json::Value>,
    pub description: Option<String>,
}

/// A `dependsOn` entry: a bare target name, or a structured cross-project
/// reference.
#[derive(Deserialize, Serialize, JsonSchema, Clone)]
#[serde(untagged)]
pub enum TargetDependencyConfig {
    Target(String),
    #[serde(rename_all = "camelCase")]
    Structured {
        projects: String,
        target: String,
        params: Option<DependencyParamsConfig>,
    },
}

#[derive(Deserialize, Serialize, JsonSchema, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DependencyParamsConfig {
    Forward,
    Ignore,
}

impl From<DependencyParamsConfig> for DependencyParams {
    fn from(params: DependencyParamsConfig) -> Self {
        match params {
            DependencyParamsConfig::Forward => DependencyParams::Forward,
            DependencyParamsConfig::Ignore => DependencyParams::Ignore,
        }
    }
}

impl From<&TargetDependencyConfig> for TargetDependency {
    fn from(config: &TargetDependencyConfig) -> Self {
        match config {
            TargetDependencyConfig::Target(name) => TargetDependency::Target(name.clone()),
            TargetDependencyConfig::Structured {
                projects,
                target,
                params,
            } => TargetDependency::Structured {
                projects: projects.clone(),
                target: target.clone(),
                params: params.map(Into::into),
            },
        }
    }
}

impl TargetConfig {
    /// Convert to the graph-node representation.
    #[must_use]
    pub fn to_target_definition(&self) -> TargetDefinition {
        TargetDefinition {
            command: self.command.clone(),
            executor: self.executor.clone(),
            depends_on: self
                .depends_on
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(TargetDependency::from)
                .collect(),
            inputs: self.inputs.clone().unwrap_or_default(),
            cache: self.cache,
            options: self.options.clone(),
            metadata: self.description.as_ref().map(|description| TargetMetadata {
                description: Some(description.clone()),
                ..TargetMetadata::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_structured_depends_on_both_parse() {
        let yaml = r#"
command: cargo build
dependsOn:
  - build
  - projects: self
    target: lint
    params: ignore
cache: true
"#;
        let config: TargetConfig = serde_yaml::from_str(yaml).unwrap();
        let target = config.to_target_definition();
        assert_eq!(target.command.as_deref(), Some("cargo build"));
        assert_eq!(target.cache, Some(true));
        assert_eq!(target.depends_on.len(), 2);
        assert_eq!(
            target.depends_on[0],
            TargetDependency::Target("build".to_string())
        );
        assert_eq!(
            target.depends_on[1],
            TargetDependency::Structured {
                projects: "self".to_string(),
                target: "lint".to_string(),
                params: Some(DependencyParams::Ignore),
            }
        );
    }

    #[test]
    fn structured_depends_on_tolerates_extra_keys() {
        let yaml = concat!(
            "command: cargo build\n",
            "dependsOn:\n",
            "  - projects: self\n",
            "    target: lint\n",
            "    note: editor annotation\n",
        );
        let config: TargetConfig = serde_yaml::from_str(yaml).unwrap();
        let target = config.to_target_definition();
        assert_eq!(
            target.depends_on,
            vec![TargetDependency::Structured {
                projects: "self".to_string(),
                target: "lint".to_string(),
                params: None,
            }]
        );
    }

    #[test]
    fn description_lands_in_metadata() {
        let config: TargetConfig = serde_yaml::from_str("description: builds the crate").unwrap();
        let target = config.to_target_definition();
        let metadata = target.metadata.expect("metadata");
        assert_eq!(metadata.description.as_deref(), Some("builds the crate"));
    }
}
