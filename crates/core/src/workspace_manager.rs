//! High-level workspace management interface
//!
//! This module provides the [`WorkspaceManager`] which serves as the primary
//! entry point for embedding Trellis. It encapsulates configuration loading,
//! plugin resolution and loading, and the full graph-construction pipeline:
//! walk the workspace, synthesize nodes across all plugins, merge, run the
//! dependency/metadata/post-processing hooks, and assemble the final graph.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//!
//! use trellis_core::workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};
//!
//! # async fn example() -> trellis_core::types::TrellisResult<()> {
//! let manager = WorkspaceManager::new(WorkspaceManagerConfig {
//!     workspace_root: PathBuf::from("."),
//! })?;
//!
//! let graph = manager.construct_graph().await?;
//! for name in graph.project_names() {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use trellis_plugin_protocol::{PluginSpec, ProjectDependency, ProjectGraphNodes, ProviderContext};

use crate::adapter::LoadedPlugin;
use crate::configs::workspace::{load_workspace_config, WorkspaceConfig};
use crate::graph::{assemble_graph, ProjectGraph};
use crate::loader::{LoadPolicy, PluginLoader};
use crate::matcher::collect_workspace_files;
use crate::merge::merge_node_results;
use crate::nodes::create_nodes_for_plugins;
use crate::resolver::resolve_plugin_specs;
use crate::types::TrellisResult;

/// High-level workspace manager that owns the configuration and drives
/// project-graph construction.
pub struct WorkspaceManager {
    pub workspace_root: PathBuf,
    pub workspace_config: WorkspaceConfig,
}

/// Configuration for initializing a workspace manager
pub struct WorkspaceManagerConfig {
    pub workspace_root: PathBuf,
}

impl WorkspaceManager {
    /// Initialize a new workspace manager from the given workspace root.
    ///
    /// Reads `.trellis/workspace.yml` when present; a missing file yields the
    /// default configuration.
    pub fn new(config: WorkspaceManagerConfig) -> TrellisResult<Self> {
        let workspace_config = load_workspace_config(&config.workspace_root)?;
        Ok(Self {
            workspace_root: config.workspace_root,
            workspace_config,
        })
    }

    /// The full plugin list for this workspace: built-in providers injected
    /// at fixed positions around the configured plugins.
    #[must_use]
    pub fn resolved_plugin_specs(&self) -> Vec<PluginSpec> {
        resolve_plugin_specs(&self.workspace_config.plugin_specs(), &self.workspace_root)
    }

    /// Construct the project graph.
    ///
    /// Loads every resolved plugin (isolation policy read from the
    /// environment), runs node creation concurrently across all of them,
    /// merges the results in resolution order, then runs the dependency,
    /// metadata, and whole-graph hooks sequentially. Plugin workers are torn
    /// down before this returns, on success and failure alike.
    pub async fn construct_graph(&self) -> TrellisResult<ProjectGraph> {
        let mut loader = PluginLoader::new(&self.workspace_root, LoadPolicy::from_env());
        let result = self.construct_with_loader(&mut loader).await;
        loader.shutdown().await;
        result
    }

    async fn construct_with_loader(
        &self,
        loader: &mut PluginLoader,
    ) -> TrellisResult<ProjectGraph> {
        let specs = self.resolved_plugin_specs();
        let plugins = loader.load_plugins(&specs).await?;

        let context = self.build_context()?;
        let batches = create_nodes_for_plugins(&plugins, &context).await?;
        let mut nodes = merge_node_results(&batches);

        let dependencies = collect_dependencies(&plugins, &context).await?;
        apply_metadata(&plugins, &context, &mut nodes).await?;
        let nodes = run_post_processors(&plugins, &context, nodes).await?;

        assemble_graph(nodes, dependencies)
    }

    /// Walk the workspace and package everything a provider call needs.
    fn build_context(&self) -> TrellisResult<ProviderContext> {
        let includes = self.workspace_config.includes.clone().unwrap_or_default();
        let excludes = self.workspace_config.excludes.clone().unwrap_or_default();
        let workspace_files = collect_workspace_files(&self.workspace_root, &includes, &excludes)?;
        tracing::debug!(files = workspace_files.len(), "workspace walk complete");

        Ok(ProviderContext {
            workspace_root: self.workspace_root.clone(),
            named_inputs: self
                .workspace_config
                .named_inputs
                .clone()
                .unwrap_or_default(),
            workspace_files,
        })
    }
}

/// Run `create_dependencies` for every capable plugin, in resolution order.
async fn collect_dependencies(
    plugins: &[Arc<LoadedPlugin>],
    context: &ProviderContext,
) -> TrellisResult<Vec<ProjectDependency>> {
    let mut dependencies = Vec::new();
    for plugin in plugins {
        if !plugin.capabilities().creates_dependencies {
            continue;
        }
        dependencies.extend(plugin.create_dependencies(context).await?);
    }
    Ok(dependencies)
}

/// Run `create_metadata` for every capable plugin and attach the returned
/// entries to the matching nodes. Roots no plugin created are skipped.
async fn apply_metadata(
    plugins: &[Arc<LoadedPlugin>],
    context: &ProviderContext,
    nodes: &mut ProjectGraphNodes,
) -> TrellisResult<()> {
    for plugin in plugins {
        if !plugin.capabilities().creates_metadata {
            continue;
        }
        for (root, metadata) in plugin.create_metadata(context).await? {
            match nodes.get_mut(&root) {
                Some(project) => project.metadata = Some(metadata),
                None => tracing::debug!(
                    plugin = %plugin.name(),
                    root = %root,
                    "metadata for unknown project root ignored"
                ),
            }
        }
    }
    Ok(())
}

/// Thread the merged node set through every whole-graph post-processor, in
/// resolution order.
async fn run_post_processors(
    plugins: &[Arc<LoadedPlugin>],
    context: &ProviderContext,
    mut nodes: ProjectGraphNodes,
) -> TrellisResult<ProjectGraphNodes> {
    for plugin in plugins {
        if !plugin.capabilities().post_processes_graph {
            continue;
        }
        nodes = plugin.post_process_graph(nodes, context).await?;
    }
    Ok(nodes)
}
