//! Drives node creation across every loaded plugin.
//!
//! Each plugin with a nodes hook gets its own filtered file list and runs
//! concurrently with the others; results are put back into resolution order
//! before the merge so concurrency never shows up in the output. A plugin
//! failing opaquely (no per-file attribution) aborts the run; per-file
//! failures are logged and the successful remainder proceeds.

use std::sync::Arc;

use tokio::task::JoinSet;
use trellis_plugin_protocol::{FileNodes, ProviderContext};

use crate::adapter::LoadedPlugin;
use crate::matcher::filter_plugin_files;
use crate::types::{TrellisError, TrellisResult};

/// Run every plugin's node-creation hook and return one result batch per
/// plugin, in resolution order. Plugins without a nodes hook contribute an
/// empty batch.
pub async fn create_nodes_for_plugins(
    plugins: &[Arc<LoadedPlugin>],
    context: &ProviderContext,
) -> TrellisResult<Vec<Vec<FileNodes>>> {
    let context = Arc::new(context.clone());
    let mut join_set = JoinSet::new();

    for (index, plugin) in plugins.iter().enumerate() {
        let Some(hook) = plugin.nodes_hook() else {
            continue;
        };

        let files = filter_plugin_files(&context.workspace_files, plugin.spec(), &hook.pattern)?;
        tracing::debug!(plugin = %plugin.name(), files = files.len(), "matched files for plugin");

        let plugin = Arc::clone(plugin);
        let context = Arc::clone(&context);
        join_set.spawn(async move {
            let outcome = plugin.create_nodes(&files, &context).await;
            (index, outcome)
        });
    }

    let mut batches: Vec<Vec<FileNodes>> = vec![Vec::new(); plugins.len()];
    while let Some(joined) = join_set.join_next().await {
        let (index, outcome) = joined
            .map_err(|err| TrellisError::Plugin(format!("Node creation task panicked: {err}")))?;
        let plugin_name = plugins[index].name();

        // An unattributed failure means the plugin could not produce anything
        // trustworthy; the run stops rather than building a partial graph.
        if let Some(opaque) = outcome.failures.iter().find(|failure| failure.file.is_none()) {
            return Err(TrellisError::PluginFailed {
                plugin: plugin_name.to_string(),
                message: opaque.message.clone(),
            });
        }

        for failure in &outcome.failures {
            tracing::warn!(
                plugin = %plugin_name,
                file = %failure.file.as_deref().unwrap_or_else(|| std::path::Path::new("")).display(),
                error = %failure.message,
                "node creation failed for file"
            );
        }

        batches[index] = outcome.results;
    }

    Ok(batches)
}
