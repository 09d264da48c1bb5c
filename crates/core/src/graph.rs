//! Final graph assembly: merged nodes plus contributed dependency edges.

use indexmap::IndexMap;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use trellis_plugin_protocol::{ProjectDependency, ProjectGraphNodes};

use crate::types::{TrellisError, TrellisResult};

/// The assembled output of a run: every synthesized project, every dependency
/// edge, and any dependency cycles found between projects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectGraph {
    /// Project root to definition, in merge order.
    pub nodes: ProjectGraphNodes,

    /// Inter-project edges, in contribution order.
    pub dependencies: Vec<ProjectDependency>,

    /// Strongly connected project groups (sorted within each cycle). Cycles
    /// are reported, not rejected; callers decide how loud to be.
    pub cycles: Vec<Vec<String>>,
}

impl ProjectGraph {
    /// Names of all named projects, in node order.
    pub fn project_names(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter_map(|project| project.name.as_deref())
            .collect()
    }

    /// Dependencies originating from the named project.
    pub fn dependencies_of<'a>(&'a self, project: &str) -> Vec<&'a ProjectDependency> {
        self.dependencies
            .iter()
            .filter(|dependency| dependency.source == project)
            .collect()
    }

    /// Dependencies originating from the node at `root`. Edges key on project
    /// names, so an unnamed node yields an empty list even when its root
    /// string matches some other project's name.
    pub fn dependencies_of_node<'a>(&'a self, root: &str) -> Vec<&'a ProjectDependency> {
        match self.nodes.get(root).and_then(|project| project.name.as_deref()) {
            Some(name) => self.dependencies_of(name),
            None => Vec::new(),
        }
    }
}

/// Validate dependency endpoints against the node set and assemble the final
/// graph. An edge naming a project no provider defined is a hard error: it
/// means a provider contributed an edge into thin air.
pub fn assemble_graph(
    nodes: ProjectGraphNodes,
    dependencies: Vec<ProjectDependency>,
) -> TrellisResult<ProjectGraph> {
    let cycles = detect_cycles(&nodes, &dependencies)?;

    if !cycles.is_empty() {
        tracing::warn!(count = cycles.len(), "dependency cycles detected");
    }

    Ok(ProjectGraph {
        nodes,
        dependencies,
        cycles,
    })
}

fn detect_cycles(
    nodes: &ProjectGraphNodes,
    dependencies: &[ProjectDependency],
) -> TrellisResult<Vec<Vec<String>>> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut indices: IndexMap<&str, NodeIndex> = IndexMap::new();

    for project in nodes.values() {
        if let Some(name) = project.name.as_deref() {
            indices
                .entry(name)
                .or_insert_with(|| graph.add_node(name.to_string()));
        }
    }

    for dependency in dependencies {
        let source = indices.get(dependency.source.as_str()).ok_or_else(|| {
            TrellisError::Graph(format!(
                "Dependency '{}' -> '{}' references unknown project '{}'",
                dependency.source, dependency.target, dependency.source
            ))
        })?;
        let target = indices.get(dependency.target.as_str()).ok_or_else(|| {
            TrellisError::Graph(format!(
                "Dependency '{}' -> '{}' references unknown project '{}'",
                dependency.source, dependency.target, dependency.target
            ))
        })?;

        graph.add_edge(*source, *target, ());
    }

    let mut cycles = Vec::new();
    for component in kosaraju_scc(&graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&index| graph.find_edge(index, index).is_some());

        if is_cycle {
            let mut cycle: Vec<String> = component
                .iter()
                .map(|&index| graph[index].clone())
                .collect();
            cycle.sort();
            cycles.push(cycle);
        }
    }
    cycles.sort();

    Ok(cycles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_plugin_protocol::{DependencyKind, ProjectDefinition};

    fn named_nodes(names: &[(&str, &str)]) -> ProjectGraphNodes {
        names
            .iter()
            .map(|(root, name)| {
                (
                    root.to_string(),
                    ProjectDefinition {
                        name: Some(name.to_string()),
                        ..ProjectDefinition::default()
                    },
                )
            })
            .collect()
    }

    fn edge(source: &str, target: &str) -> ProjectDependency {
        ProjectDependency {
            source: source.to_string(),
            target: target.to_string(),
            kind: DependencyKind::Static,
            source_file: None,
        }
    }

    #[test]
    fn assembles_valid_edges_without_cycles() {
        let nodes = named_nodes(&[("apps/a", "a"), ("libs/b", "b"), ("libs/c", "c")]);
        let dependencies = vec![edge("a", "b"), edge("a", "c"), edge("b", "c")];

        let graph = assemble_graph(nodes, dependencies).unwrap();

        assert!(graph.cycles.is_empty());
        assert_eq!(graph.project_names(), vec!["a", "b", "c"]);
        assert_eq!(graph.dependencies_of("a").len(), 2);
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let nodes = named_nodes(&[("apps/a", "a")]);
        let error = assemble_graph(nodes, vec![edge("a", "ghost")]).unwrap_err();
        assert!(error.to_string().contains("ghost"));
    }

    #[test]
    fn reports_cycles_sorted() {
        let nodes = named_nodes(&[("a", "a"), ("b", "b"), ("c", "c")]);
        let dependencies = vec![edge("c", "a"), edge("a", "b"), edge("b", "c")];

        let graph = assemble_graph(nodes, dependencies).unwrap();

        assert_eq!(graph.cycles.len(), 1);
        assert_eq!(graph.cycles[0], vec!["a", "b", "c"]);
    }

    #[test]
    fn self_dependency_counts_as_a_cycle() {
        let nodes = named_nodes(&[("a", "a")]);
        let graph = assemble_graph(nodes, vec![edge("a", "a")]).unwrap();
        assert_eq!(graph.cycles, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn node_dependencies_resolve_through_the_project_name() {
        let mut nodes = named_nodes(&[("apps/web", "web"), ("libs/ui", "ui")]);
        nodes.insert("web".to_string(), ProjectDefinition::default());
        let graph = assemble_graph(nodes, vec![edge("web", "ui")]).unwrap();

        // The edge belongs to the project named "web", looked up by its root.
        let deps = graph.dependencies_of_node("apps/web");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].target, "ui");

        // The unnamed node at root "web" does not inherit that project's
        // edges just because the strings coincide.
        assert!(graph.dependencies_of_node("web").is_empty());
        assert!(graph.dependencies_of_node("missing").is_empty());
    }

    #[test]
    fn unnamed_projects_cannot_anchor_edges() {
        let mut nodes = named_nodes(&[("apps/a", "a")]);
        nodes.insert("libs/unnamed".to_string(), ProjectDefinition::default());

        let error = assemble_graph(nodes, vec![edge("a", "libs/unnamed")]).unwrap_err();
        assert!(error.to_string().contains("libs/unnamed"));
    }
}
