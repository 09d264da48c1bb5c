use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::configs::targets::TargetConfig;
use crate::types::TrellisResult;

/// Explicit project configuration filename, placed at a project's root.
pub const PROJECT_CONFIG_FILE: &str = "trellis.yml";

#[derive(Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub targets: Option<IndexMap<String, TargetConfig>>,
}

pub fn parse_project_config(yaml_str: &str) -> TrellisResult<ProjectConfig> {
    let config: ProjectConfig = serde_yaml::from_str(yaml_str)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_project_config_parses() {
        let yaml = r#"
name: billing-api
tags:
  - backend
targets:
  deploy:
    command: ./scripts/deploy.sh
    dependsOn:
      - build
"#;
        let config = parse_project_config(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("billing-api"));
        assert_eq!(config.tags.as_deref(), Some(&["backend".to_string()][..]));
        let targets = config.targets.unwrap();
        assert!(targets.contains_key("deploy"));
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        assert!(parse_project_config("nam: oops").is_err());
    }
}
