//! Core types for the Trellis plugin protocol.
//!
//! This module contains the data structures exchanged between Trellis and its
//! project-graph providers:
//! - [`PluginSpec`] - A resolved plugin specification from workspace configuration
//! - [`NodeResult`] - A provider's project-graph contribution for one matched file
//! - [`ProjectDefinition`] / [`TargetDefinition`] - The node payloads themselves
//! - [`NodeCreationOutcome`] - A batch's successes and failures, side by side
//! - [`ProviderContext`] - The shared invocation context handed to every hook
//! - [`ProjectDependency`] - An edge contributed by a `create_dependencies` hook

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The merged project-graph node set: project root (workspace-relative path,
/// unique key) to project definition.
///
/// Insertion order is preserved so that repeated runs over identical input
/// serialize byte-identically.
pub type ProjectGraphNodes = IndexMap<String, ProjectDefinition>;

/// Identifies one plugin to load, together with its configuration.
///
/// A spec is immutable once resolved. `plugin` is either the key of a built-in
/// provider (for example `trellis/gradle`) or a path to a dynamic-library
/// plugin. `include`/`exclude` restrict which workspace files the plugin may
/// see, before its own file pattern is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSpec {
    /// Built-in provider key or dynamic-library path.
    pub plugin: String,

    /// Opaque plugin options, threaded into every hook invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonValue>,

    /// Glob patterns restricting the files this plugin may see.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,

    /// Glob patterns removing files from this plugin's view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

impl PluginSpec {
    /// Create a bare specification with no options or file filters.
    #[must_use]
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            options: None,
            include: None,
            exclude: None,
        }
    }

    /// Attach an options value to this specification.
    #[must_use]
    pub fn with_options(mut self, options: JsonValue) -> Self {
        self.options = Some(options);
        self
    }
}

/// How `params` of a dependent target invocation are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyParams {
    /// Forward the invoking target's params to the dependency.
    Forward,
    /// Ignore the invoking target's params.
    Ignore,
}

/// A single entry of a target's `depends_on` list.
///
/// The short form is a bare target name resolved within the same project. The
/// structured form fans out across projects (`"self"`, `"dependencies"`, or an
/// explicit project list).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetDependency {
    /// `"build"` - the named target of the same project.
    Target(String),
    /// `{ projects, target, params }` - a cross-project or self reference.
    #[serde(rename_all = "camelCase")]
    Structured {
        projects: String,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<DependencyParams>,
    },
}

impl TargetDependency {
    /// A `{ projects: "self", target, params: "forward" }` reference, the shape
    /// umbrella targets use to fan out over their atomized children.
    #[must_use]
    pub fn self_target(target: impl Into<String>) -> Self {
        Self::Structured {
            projects: "self".to_string(),
            target: target.into(),
            params: Some(DependencyParams::Forward),
        }
    }
}

/// Free-form descriptive metadata attached to a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetMetadata {
    /// Human-readable description shown in target listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Technologies this target is associated with (for display grouping).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,

    /// For umbrella targets: the coarse target the atomized set replaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_atomized_target: Option<String>,
}

/// One buildable target of a project.
///
/// Either `command` (a shell command line) or `executor` (a registered executor
/// identifier such as `trellis:noop`) identifies what runs; providers set
/// exactly one of the two.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,

    /// Targets that must complete before this one, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<TargetDependency>,

    /// Named input groups; a `^` prefix selects the group from dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Whether this target's outputs are cacheable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,

    /// Executor-specific options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TargetMetadata>,
}

/// Descriptive metadata attached to a project node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    /// Technologies detected for the project (for example `["gradle"]`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,

    /// Display buckets: category name to ordered list of target names.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub target_groups: IndexMap<String, Vec<String>>,
}

/// A project node contributed by a provider.
///
/// The project root is not part of this struct; it is the key under which the
/// definition is stored in a [`NodeResult`] and in the merged graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDefinition {
    /// Project name. Optional because some providers only contribute targets
    /// to a project another provider names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Target name to target definition. Insertion order is significant for
    /// display grouping and is preserved through the merge.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub targets: IndexMap<String, TargetDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ProjectMetadata>,
}

/// A provider's partial project-graph contribution for one matched file:
/// zero or more project definitions keyed by project root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub projects: IndexMap<String, ProjectDefinition>,
}

impl NodeResult {
    /// A contribution with a single project.
    #[must_use]
    pub fn single(root: impl Into<String>, project: ProjectDefinition) -> Self {
        let mut projects = IndexMap::new();
        projects.insert(root.into(), project);
        Self { projects }
    }

    /// True when this file contributed no projects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

/// One entry of a batched node-creation result: the invoking plugin's name,
/// the matched file, and the nodes it produced.
///
/// Every matched file yields exactly one entry, even when `nodes` is empty,
/// preserving the one-to-one file-to-result correspondence downstream
/// attribution depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNodes {
    pub plugin: String,
    pub file: PathBuf,
    pub nodes: NodeResult,
}

impl FileNodes {
    #[must_use]
    pub fn new(plugin: impl Into<String>, file: impl Into<PathBuf>, nodes: NodeResult) -> Self {
        Self {
            plugin: plugin.into(),
            file: file.into(),
            nodes,
        }
    }
}

/// One failed file of a node-creation batch. `file` is `None` when the whole
/// batch failed opaquely rather than a specific file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCreationFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub message: String,
}

impl NodeCreationFailure {
    /// A failure attributed to one file.
    #[must_use]
    pub fn for_file(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            message: message.into(),
        }
    }

    /// A failure covering the whole batch.
    #[must_use]
    pub fn opaque(message: impl Into<String>) -> Self {
        Self {
            file: None,
            message: message.into(),
        }
    }
}

/// The outcome of one batched node-creation call: whatever succeeded plus
/// whatever failed, side by side.
///
/// Partial success is an ordinary value here, not an error. An opaque provider
/// failure is represented as empty `results` with a single file-less entry in
/// `failures`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCreationOutcome {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<FileNodes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<NodeCreationFailure>,
}

impl NodeCreationOutcome {
    /// A fully successful outcome.
    #[must_use]
    pub fn success(results: Vec<FileNodes>) -> Self {
        Self {
            results,
            failures: Vec::new(),
        }
    }

    /// An outcome for a provider that failed as a whole.
    #[must_use]
    pub fn opaque_failure(message: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            failures: vec![NodeCreationFailure::opaque(message)],
        }
    }

    /// True when every file succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The error a batched provider raises to report that some files succeeded
/// and others did not.
///
/// Raise it through `anyhow` (`Err(PartialNodeCreationError { .. }.into())`);
/// the engine downcasts and carries the partial outcome forward instead of
/// discarding the successful subset.
#[derive(Debug, Clone, thiserror::Error)]
#[error("node creation failed for {} of {} files", .failures.len(), .failures.len() + .results.len())]
pub struct PartialNodeCreationError {
    pub results: Vec<FileNodes>,
    pub failures: Vec<NodeCreationFailure>,
}

impl From<PartialNodeCreationError> for NodeCreationOutcome {
    fn from(err: PartialNodeCreationError) -> Self {
        Self {
            results: err.results,
            failures: err.failures,
        }
    }
}

/// The kind of an inter-project dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Declared in a build manifest.
    Static,
    /// Inferred from configuration rather than a manifest declaration.
    Implicit,
}

/// An inter-project dependency edge contributed by a `create_dependencies`
/// hook. `source` and `target` are project names; both must exist in the
/// merged node set or graph assembly rejects the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDependency {
    pub source: String,
    pub target: String,
    pub kind: DependencyKind,

    /// The file the dependency was derived from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
}

/// Shared invocation context handed to every provider hook.
///
/// Providers may read from it freely but must not assume any file order beyond
/// what the matcher guarantees, and must not mutate state visible to other
/// plugins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderContext {
    /// Absolute path to the workspace root.
    pub workspace_root: PathBuf,

    /// Named-input-set definitions from workspace configuration, used to
    /// populate target `inputs` fields.
    #[serde(default)]
    pub named_inputs: IndexMap<String, Vec<String>>,

    /// The full list of files under consideration in the current command,
    /// workspace-relative.
    #[serde(default)]
    pub workspace_files: Vec<PathBuf>,
}

impl ProviderContext {
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            named_inputs: IndexMap::new(),
            workspace_files: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_dependency_deserializes_both_forms() {
        let bare: TargetDependency = serde_json::from_str("\"classes\"").unwrap();
        assert_eq!(bare, TargetDependency::Target("classes".to_string()));

        let structured: TargetDependency = serde_json::from_str(
            r#"{ "projects": "self", "target": "test-ci--Foo", "params": "forward" }"#,
        )
        .unwrap();
        assert_eq!(
            structured,
            TargetDependency::Structured {
                projects: "self".to_string(),
                target: "test-ci--Foo".to_string(),
                params: Some(DependencyParams::Forward),
            }
        );
    }

    #[test]
    fn self_target_reference_forwards_params() {
        let dep = TargetDependency::self_target("test-ci--Foo");
        let json = serde_json::to_value(&dep).unwrap();
        assert_eq!(json["projects"], "self");
        assert_eq!(json["params"], "forward");
    }

    #[test]
    fn target_maps_preserve_insertion_order() {
        let mut project = ProjectDefinition::default();
        for name in ["zeta", "alpha", "midway"] {
            project
                .targets
                .insert(name.to_string(), TargetDefinition::default());
        }

        let keys: Vec<&str> = project.targets.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "midway"]);

        let json = serde_json::to_string(&project).unwrap();
        let zeta = json.find("zeta").unwrap();
        let alpha = json.find("alpha").unwrap();
        assert!(zeta < alpha, "serialization must keep insertion order");
    }

    #[test]
    fn plugin_spec_round_trips() {
        let spec = PluginSpec::new("trellis/gradle")
            .with_options(serde_json::json!({ "ciTargetName": "test-ci" }));
        let json = serde_json::to_string(&spec).unwrap();
        let back: PluginSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }
}
