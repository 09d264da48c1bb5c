//! The provider trait that Trellis plugins implement.
//!
//! A plugin contributes to the project graph through a set of optional hooks:
//! - node creation ([`NodeProvider::nodes_hook`] plus one of the two creation
//!   methods, depending on the declared [`HookShape`])
//! - dependency creation ([`NodeProvider::create_dependencies`])
//! - project metadata ([`NodeProvider::create_metadata`])
//! - whole-graph post-processing ([`NodeProvider::post_process_graph`])

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{
    FileNodes, NodeResult, ProjectDependency, ProjectGraphNodes, ProjectMetadata, ProviderContext,
};

/// The calling convention of a provider's node-creation hook.
///
/// The set is closed: the engine normalizes both shapes into the batched
/// convention exactly once, at load time, and nothing downstream ever
/// re-inspects the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookShape {
    /// One call per matched file ([`NodeProvider::create_nodes_for_file`]).
    PerFile,
    /// One call per batch of matched files ([`NodeProvider::create_nodes`]).
    Batched,
}

/// A provider's declared node-creation capability: the file glob it wants to
/// see, and the shape of the hook that receives the matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesHook {
    /// Glob pattern selecting this provider's configuration files,
    /// for example `**/build.gradle{,.kts}`.
    pub pattern: String,
    pub shape: HookShape,
}

impl NodesHook {
    /// A hook invoked once per matched file.
    #[must_use]
    pub fn per_file(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            shape: HookShape::PerFile,
        }
    }

    /// A hook invoked once with the whole batch of matched files.
    #[must_use]
    pub fn batched(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            shape: HookShape::Batched,
        }
    }
}

/// A loaded provider's declared capability set, captured once at load time.
///
/// This is what travels in load responses and what the engine plans a run
/// from; after it is captured, no hook is ever probed again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_hook: Option<NodesHook>,
    pub creates_dependencies: bool,
    pub creates_metadata: bool,
    pub post_processes_graph: bool,
}

impl ProviderCapabilities {
    /// Capture the declared capabilities of `provider`.
    #[must_use]
    pub fn for_provider(provider: &dyn NodeProvider) -> Self {
        Self {
            name: provider.name().to_string(),
            nodes_hook: provider.nodes_hook(),
            creates_dependencies: provider.creates_dependencies(),
            creates_metadata: provider.creates_metadata(),
            post_processes_graph: provider.post_processes_graph(),
        }
    }
}

/// The project-graph provider trait that plugins implement.
///
/// **Purpose**: A `NodeProvider` turns raw workspace files into project-graph
/// nodes. Every capability is optional and declared up front (via
/// [`nodes_hook`](Self::nodes_hook) and the `creates_*` flags), so the engine
/// can plan a run without probing.
///
/// **Implementation Pattern**: Implement only the hooks you declare. The
/// engine invokes the node-creation method matching the declared
/// [`HookShape`]; the undeclared one is never called.
///
/// Providers are written synchronously. The engine supplies concurrency and
/// process isolation around the trait; implementations must be `Send + Sync`
/// and must not retain state between invocations.
///
/// # Example
///
/// ```rust
/// use std::path::Path;
///
/// use serde_json::Value as JsonValue;
/// use trellis_plugin_protocol::{
///     NodeProvider, NodeResult, NodesHook, ProjectDefinition, ProviderContext,
/// };
///
/// pub struct MakefileProvider;
///
/// impl NodeProvider for MakefileProvider {
///     fn name(&self) -> &str {
///         "example/makefile"
///     }
///
///     fn nodes_hook(&self) -> Option<NodesHook> {
///         Some(NodesHook::per_file("**/Makefile"))
///     }
///
///     fn create_nodes_for_file(
///         &self,
///         file: &Path,
///         _options: Option<&JsonValue>,
///         _context: &ProviderContext,
///     ) -> anyhow::Result<NodeResult> {
///         let root = file
///             .parent()
///             .map(|dir| dir.to_string_lossy().into_owned())
///             .unwrap_or_default();
///         Ok(NodeResult::single(root, ProjectDefinition::default()))
///     }
/// }
/// ```
pub trait NodeProvider: Send + Sync {
    /// Stable plugin name, used for attribution, logging, and diagnostics.
    ///
    /// Built-in providers use slash-qualified keys (`trellis/gradle`);
    /// external plugins may use any stable identifier without whitespace.
    fn name(&self) -> &str;

    /// Declare the node-creation capability, if any.
    ///
    /// Returning `None` means this provider creates no nodes (it may still
    /// contribute dependencies, metadata, or post-processing).
    fn nodes_hook(&self) -> Option<NodesHook> {
        None
    }

    /// Node creation, per-file shape: called once for each matched file.
    ///
    /// Only invoked when [`nodes_hook`](Self::nodes_hook) declares
    /// [`HookShape::PerFile`]. Errors are contained per plugin by the engine;
    /// they never abort other plugins' synthesis.
    fn create_nodes_for_file(
        &self,
        _file: &Path,
        _options: Option<&JsonValue>,
        _context: &ProviderContext,
    ) -> anyhow::Result<NodeResult> {
        anyhow::bail!(
            "provider `{}` declares a per-file nodes hook but does not implement create_nodes_for_file",
            self.name()
        )
    }

    /// Node creation, batched shape: called once with all matched files.
    ///
    /// Only invoked when [`nodes_hook`](Self::nodes_hook) declares
    /// [`HookShape::Batched`]. Must return exactly one [`FileNodes`] entry per
    /// input file, in input order, even for files that contribute no projects.
    fn create_nodes(
        &self,
        _files: &[PathBuf],
        _options: Option<&JsonValue>,
        _context: &ProviderContext,
    ) -> anyhow::Result<Vec<FileNodes>> {
        anyhow::bail!(
            "provider `{}` declares a batched nodes hook but does not implement create_nodes",
            self.name()
        )
    }

    /// Whether [`create_dependencies`](Self::create_dependencies) should run.
    fn creates_dependencies(&self) -> bool {
        false
    }

    /// Contribute inter-project dependency edges, derived from the same files
    /// the provider read during node creation.
    fn create_dependencies(
        &self,
        _options: Option<&JsonValue>,
        _context: &ProviderContext,
    ) -> anyhow::Result<Vec<ProjectDependency>> {
        Ok(Vec::new())
    }

    /// Whether [`create_metadata`](Self::create_metadata) should run.
    fn creates_metadata(&self) -> bool {
        false
    }

    /// Contribute project metadata, keyed by project root, merged onto the
    /// node set after node creation.
    fn create_metadata(
        &self,
        _options: Option<&JsonValue>,
        _context: &ProviderContext,
    ) -> anyhow::Result<IndexMap<String, ProjectMetadata>> {
        Ok(IndexMap::new())
    }

    /// Whether [`post_process_graph`](Self::post_process_graph) should run.
    fn post_processes_graph(&self) -> bool {
        false
    }

    /// Legacy whole-graph hook: receives the merged node set and returns a
    /// replacement. Runs after merging, in plugin resolution order.
    fn post_process_graph(
        &self,
        nodes: ProjectGraphNodes,
        _options: Option<&JsonValue>,
        _context: &ProviderContext,
    ) -> anyhow::Result<ProjectGraphNodes> {
        Ok(nodes)
    }
}
