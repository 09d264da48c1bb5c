//! Merges per-plugin node batches into the final project node set.
//!
//! Order is the whole contract: batches arrive in plugin resolution order and
//! files within a batch in matcher order, so a later plugin overrides an
//! earlier one wherever both speak about the same project root. Scalar fields
//! override whole; the targets map merges key by key, leaving targets only
//! one side defines untouched. First definition wins for map position, which
//! keeps output ordering stable no matter who overrides what later.

use trellis_plugin_protocol::{FileNodes, ProjectDefinition, ProjectGraphNodes};

/// Fold result batches into one project map. Pure and deterministic: same
/// batches in, same nodes out, and feeding the output back through changes
/// nothing.
pub fn merge_node_results(batches: &[Vec<FileNodes>]) -> ProjectGraphNodes {
    let mut nodes = ProjectGraphNodes::new();

    for batch in batches {
        for entry in batch {
            for (root, incoming) in &entry.nodes.projects {
                match nodes.get_mut(root) {
                    Some(existing) => {
                        tracing::debug!(
                            root = %root,
                            plugin = %entry.plugin,
                            "project root redefined, merging with override semantics"
                        );
                        merge_project(existing, incoming);
                    }
                    None => {
                        nodes.insert(root.clone(), incoming.clone());
                    }
                }
            }
        }
    }

    nodes
}

fn merge_project(base: &mut ProjectDefinition, incoming: &ProjectDefinition) {
    if incoming.name.is_some() {
        base.name = incoming.name.clone();
    }

    if !incoming.tags.is_empty() {
        base.tags = incoming.tags.clone();
    }

    if incoming.metadata.is_some() {
        base.metadata = incoming.metadata.clone();
    }

    for (target_name, target) in &incoming.targets {
        base.targets.insert(target_name.clone(), target.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use trellis_plugin_protocol::{NodeResult, TargetDefinition};

    fn entry(plugin: &str, root: &str, project: ProjectDefinition) -> FileNodes {
        FileNodes::new(plugin, format!("{root}/some-file"), NodeResult::single(root, project))
    }

    fn project_with_target(name: Option<&str>, target: &str, command: &str) -> ProjectDefinition {
        let mut targets = IndexMap::new();
        targets.insert(
            target.to_string(),
            TargetDefinition {
                command: Some(command.to_string()),
                ..TargetDefinition::default()
            },
        );
        ProjectDefinition {
            name: name.map(str::to_string),
            targets,
            ..ProjectDefinition::default()
        }
    }

    #[test]
    fn later_batch_overrides_scalars_and_merges_targets() {
        let batches = vec![
            vec![entry(
                "earlier",
                "apps/web",
                project_with_target(Some("inferred"), "build", "infer build"),
            )],
            vec![entry(
                "later",
                "apps/web",
                project_with_target(Some("web"), "test", "just test"),
            )],
        ];

        let nodes = merge_node_results(&batches);
        let project = &nodes["apps/web"];

        assert_eq!(project.name.as_deref(), Some("web"));
        // Target only the earlier plugin defined survives untouched.
        assert_eq!(project.targets["build"].command.as_deref(), Some("infer build"));
        assert_eq!(project.targets["test"].command.as_deref(), Some("just test"));
    }

    #[test]
    fn same_target_is_replaced_key_wise() {
        let batches = vec![
            vec![entry(
                "earlier",
                "apps/web",
                project_with_target(None, "build", "old"),
            )],
            vec![entry(
                "later",
                "apps/web",
                project_with_target(None, "build", "new"),
            )],
        ];

        let nodes = merge_node_results(&batches);
        assert_eq!(nodes["apps/web"].targets["build"].command.as_deref(), Some("new"));
    }

    #[test]
    fn absent_fields_do_not_erase_earlier_values() {
        let named = ProjectDefinition {
            name: Some("web".to_string()),
            tags: vec!["frontend".to_string()],
            ..ProjectDefinition::default()
        };
        let anonymous = project_with_target(None, "lint", "just lint");

        let batches = vec![
            vec![entry("earlier", "apps/web", named)],
            vec![entry("later", "apps/web", anonymous)],
        ];

        let nodes = merge_node_results(&batches);
        let project = &nodes["apps/web"];
        assert_eq!(project.name.as_deref(), Some("web"));
        assert_eq!(project.tags, vec!["frontend".to_string()]);
        assert!(project.targets.contains_key("lint"));
    }

    #[test]
    fn map_position_follows_first_definition() {
        let batches = vec![
            vec![
                entry("earlier", "b", ProjectDefinition::default()),
                entry("earlier", "a", ProjectDefinition::default()),
            ],
            vec![entry("later", "b", project_with_target(Some("b"), "x", "y"))],
        ];

        let nodes = merge_node_results(&batches);
        let roots: Vec<&String> = nodes.keys().collect();
        assert_eq!(roots, vec!["b", "a"]);
    }

    #[test]
    fn merging_is_idempotent() {
        let batches = vec![
            vec![entry(
                "earlier",
                "apps/web",
                project_with_target(Some("web"), "build", "old"),
            )],
            vec![entry(
                "later",
                "apps/web",
                project_with_target(Some("site"), "build", "new"),
            )],
        ];

        let once = merge_node_results(&batches);

        let replay: Vec<Vec<FileNodes>> = vec![once
            .iter()
            .map(|(root, project)| {
                FileNodes::new("replay", "replay", NodeResult::single(root.clone(), project.clone()))
            })
            .collect()];
        let twice = merge_node_results(&replay);

        assert_eq!(once, twice);
    }
}
