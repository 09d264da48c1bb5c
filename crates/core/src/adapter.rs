//! The uniform plugin handle the engine works with after loading.
//!
//! A [`LoadedPlugin`] hides where a provider actually runs (in-process or in
//! a worker) and which hook shape it declared. Every node-creation call goes
//! through the same normalization: per-file hooks are fanned out over the
//! matched files, results are tagged with the owning plugin's name, and hook
//! errors are contained into a [`NodeCreationOutcome`] instead of unwinding,
//! so one plugin's failure never tears down another plugin's results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use trellis_plugin_protocol::{
    FileNodes, HookShape, NodeCreationFailure, NodeCreationOutcome, NodeProvider, NodesHook,
    PartialNodeCreationError, PluginSpec, ProjectDependency, ProjectGraphNodes, ProjectMetadata,
    ProviderCapabilities, ProviderContext,
};

use crate::types::{TrellisError, TrellisResult};
use crate::worker::WorkerClient;

enum PluginHandle {
    InProcess(Arc<dyn NodeProvider>),
    /// Worker calls are strictly request/response, so a mutex serializes them.
    Isolated(tokio::sync::Mutex<WorkerClient>),
}

/// A plugin that finished loading, bound to the spec it was loaded for.
///
/// All hook invocations take the options from the originating spec; callers
/// never pass options explicitly.
pub struct LoadedPlugin {
    spec: PluginSpec,
    capabilities: ProviderCapabilities,
    handle: PluginHandle,
}

impl LoadedPlugin {
    pub fn in_process(spec: PluginSpec, provider: Arc<dyn NodeProvider>) -> Self {
        let capabilities = ProviderCapabilities::for_provider(provider.as_ref());
        Self {
            spec,
            capabilities,
            handle: PluginHandle::InProcess(provider),
        }
    }

    pub fn isolated(
        spec: PluginSpec,
        capabilities: ProviderCapabilities,
        client: WorkerClient,
    ) -> Self {
        Self {
            spec,
            capabilities,
            handle: PluginHandle::Isolated(tokio::sync::Mutex::new(client)),
        }
    }

    pub fn name(&self) -> &str {
        &self.capabilities.name
    }

    pub fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    pub fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    pub fn nodes_hook(&self) -> Option<&NodesHook> {
        self.capabilities.nodes_hook.as_ref()
    }

    /// Run the plugin's node-creation hook over the matched files.
    ///
    /// Never fails outright: anything the hook raises comes back inside the
    /// outcome's failure list, opaque (no file attribution) when the whole
    /// call failed, per-file when the plugin could say which files broke.
    pub async fn create_nodes(
        &self,
        files: &[PathBuf],
        context: &ProviderContext,
    ) -> NodeCreationOutcome {
        let started = Instant::now();
        tracing::debug!(plugin = %self.name(), files = files.len(), "node creation started");

        let outcome = match (&self.handle, self.capabilities.nodes_hook.as_ref()) {
            (_, None) => NodeCreationOutcome::opaque_failure(format!(
                "plugin '{}' declares no nodes hook",
                self.name()
            )),
            (PluginHandle::InProcess(provider), Some(hook)) => run_batched_hook(
                provider.as_ref(),
                hook.shape,
                files,
                self.spec.options.as_ref(),
                context,
            ),
            (PluginHandle::Isolated(client), Some(_)) => {
                let mut client = client.lock().await;
                match client.create_nodes(files, context).await {
                    Ok(outcome) => outcome,
                    Err(err) => NodeCreationOutcome::opaque_failure(err.to_string()),
                }
            }
        };

        tracing::debug!(
            plugin = %self.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            results = outcome.results.len(),
            failures = outcome.failures.len(),
            "node creation finished"
        );

        outcome
    }

    pub async fn create_dependencies(
        &self,
        context: &ProviderContext,
    ) -> TrellisResult<Vec<ProjectDependency>> {
        let started = Instant::now();

        let result = match &self.handle {
            PluginHandle::InProcess(provider) => provider
                .create_dependencies(self.spec.options.as_ref(), context)
                .map_err(|err| self.plugin_error(format!("{err:#}"))),
            PluginHandle::Isolated(client) => {
                let mut client = client.lock().await;
                client
                    .create_dependencies(context)
                    .await
                    .map_err(|err| self.plugin_error(err.to_string()))
            }
        };

        tracing::debug!(
            plugin = %self.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dependency creation finished"
        );

        result
    }

    pub async fn create_metadata(
        &self,
        context: &ProviderContext,
    ) -> TrellisResult<IndexMap<String, ProjectMetadata>> {
        let started = Instant::now();

        let result = match &self.handle {
            PluginHandle::InProcess(provider) => provider
                .create_metadata(self.spec.options.as_ref(), context)
                .map_err(|err| self.plugin_error(format!("{err:#}"))),
            PluginHandle::Isolated(client) => {
                let mut client = client.lock().await;
                client
                    .create_metadata(context)
                    .await
                    .map_err(|err| self.plugin_error(err.to_string()))
            }
        };

        tracing::debug!(
            plugin = %self.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "metadata creation finished"
        );

        result
    }

    pub async fn post_process_graph(
        &self,
        nodes: ProjectGraphNodes,
        context: &ProviderContext,
    ) -> TrellisResult<ProjectGraphNodes> {
        let started = Instant::now();

        let result = match &self.handle {
            PluginHandle::InProcess(provider) => provider
                .post_process_graph(nodes, self.spec.options.as_ref(), context)
                .map_err(|err| self.plugin_error(format!("{err:#}"))),
            PluginHandle::Isolated(client) => {
                let mut client = client.lock().await;
                client
                    .post_process_graph(nodes, context)
                    .await
                    .map_err(|err| self.plugin_error(err.to_string()))
            }
        };

        tracing::debug!(
            plugin = %self.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "graph post-processing finished"
        );

        result
    }

    /// Terminate the backing worker, when there is one. Idempotent.
    pub(crate) async fn shutdown(&self) {
        if let PluginHandle::Isolated(client) = &self.handle {
            let mut client = client.lock().await;
            if let Err(err) = client.terminate().await {
                tracing::warn!(plugin = %self.name(), error = %err, "worker shutdown failed");
            }
        }
    }

    fn plugin_error(&self, message: String) -> TrellisError {
        TrellisError::PluginFailed {
            plugin: self.name().to_string(),
            message,
        }
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let execution = match &self.handle {
            PluginHandle::InProcess(_) => "in-process",
            PluginHandle::Isolated(_) => "isolated",
        };
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name())
            .field("execution", &execution)
            .finish_non_exhaustive()
    }
}

/// Run a provider's node-creation hook with batched semantics, whichever
/// shape it declared, containing errors into the outcome.
///
/// Shared by the in-process path and the worker serve loop, so both execution
/// policies normalize identically.
pub(crate) fn run_batched_hook(
    provider: &dyn NodeProvider,
    shape: HookShape,
    files: &[PathBuf],
    options: Option<&JsonValue>,
    context: &ProviderContext,
) -> NodeCreationOutcome {
    match shape {
        HookShape::PerFile => {
            let mut results = Vec::with_capacity(files.len());
            let mut failures = Vec::new();

            for file in files {
                match provider.create_nodes_for_file(file, options, context) {
                    Ok(nodes) => results.push(FileNodes::new(provider.name(), file, nodes)),
                    Err(err) => {
                        failures.push(NodeCreationFailure::for_file(file, format!("{err:#}")));
                    }
                }
            }

            NodeCreationOutcome { results, failures }
        }
        HookShape::Batched => match provider.create_nodes(files, options, context) {
            Ok(results) => NodeCreationOutcome::success(tag_results(provider.name(), results)),
            Err(err) => match err.downcast::<PartialNodeCreationError>() {
                Ok(partial) => {
                    let mut outcome = NodeCreationOutcome::from(partial);
                    outcome.results = tag_results(provider.name(), outcome.results);
                    outcome
                }
                Err(err) => NodeCreationOutcome::opaque_failure(format!("{err:#}")),
            },
        },
    }
}

/// Results carry the plugin name of whoever produced them, regardless of what
/// the provider wrote into the field itself.
fn tag_results(plugin: &str, mut results: Vec<FileNodes>) -> Vec<FileNodes> {
    for entry in &mut results {
        entry.plugin = plugin.to_string();
    }
    results
}
