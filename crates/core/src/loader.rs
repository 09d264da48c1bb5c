//! Run-scoped plugin loading.
//!
//! A [`PluginLoader`] lives exactly as long as one graph construction. It
//! memoizes loads within the run (two specs with the same identity share one
//! [`LoadedPlugin`]) and owns the teardown of whatever it loaded; dropping
//! the loader after [`PluginLoader::shutdown`] is the whole cleanup story.
//! There is no process-global plugin state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use trellis_plugin_protocol::PluginSpec;

use crate::adapter::LoadedPlugin;
use crate::providers::resolve_provider;
use crate::types::{TrellisError, TrellisResult};
use crate::worker::{default_worker_binary, WorkerClient};

/// Setting this to `1`/`true`/`yes` runs every plugin in its own worker
/// process instead of in-process.
pub const ISOLATE_PLUGINS_ENV: &str = "TRELLIS_ISOLATE_PLUGINS";

/// Where plugins execute for this run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Resolve and invoke providers inside the engine process.
    #[default]
    InProcess,

    /// One dedicated worker process per plugin; hooks cross a JSON boundary.
    Isolated,
}

impl LoadPolicy {
    /// The policy selected by the environment, defaulting to in-process.
    pub fn from_env() -> Self {
        match std::env::var(ISOLATE_PLUGINS_ENV) {
            Ok(value) if matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes") => {
                Self::Isolated
            }
            _ => Self::InProcess,
        }
    }
}

/// Loads plugins for one run, memoizing by spec identity.
pub struct PluginLoader {
    workspace_root: PathBuf,
    policy: LoadPolicy,
    worker_binary: Option<PathBuf>,
    cache: HashMap<String, Arc<LoadedPlugin>>,
}

impl PluginLoader {
    pub fn new(workspace_root: impl Into<PathBuf>, policy: LoadPolicy) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            policy,
            worker_binary: None,
            cache: HashMap::new(),
        }
    }

    /// Use a specific worker binary instead of the default lookup.
    #[must_use]
    pub fn with_worker_binary(mut self, worker_binary: impl Into<PathBuf>) -> Self {
        self.worker_binary = Some(worker_binary.into());
        self
    }

    /// How many distinct plugins this loader has materialized so far.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Load every spec, reusing cached plugins, and return handles in spec
    /// order. Individual loads run concurrently; the call waits for all of
    /// them and fails if any failed, tearing down whatever the failing batch
    /// had already brought up.
    pub async fn load_plugins(
        &mut self,
        specs: &[PluginSpec],
    ) -> TrellisResult<Vec<Arc<LoadedPlugin>>> {
        // Reservation happens synchronously before any load is dispatched, so
        // a spec repeated within the batch still loads exactly once.
        let mut pending: Vec<(String, PluginSpec)> = Vec::new();
        for spec in specs {
            let key = cache_key(spec);
            if !self.cache.contains_key(&key)
                && !pending.iter().any(|(reserved, _)| *reserved == key)
            {
                pending.push((key, spec.clone()));
            }
        }

        let mut join_set = JoinSet::new();
        for (key, spec) in pending {
            let workspace_root = self.workspace_root.clone();
            let policy = self.policy;
            let worker_binary = self.worker_binary.clone();

            join_set.spawn(async move {
                let loaded =
                    load_one(spec, &workspace_root, policy, worker_binary.as_deref()).await;
                (key, loaded)
            });
        }

        let mut loaded = Vec::new();
        let mut first_error: Option<TrellisError> = None;
        while let Some(joined) = join_set.join_next().await {
            let (key, result) = joined.map_err(|err| {
                TrellisError::Plugin(format!("Plugin load task panicked: {err}"))
            })?;

            match result {
                Ok(plugin) => loaded.push((key, Arc::new(plugin))),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            for (_, plugin) in loaded {
                plugin.shutdown().await;
            }
            return Err(err);
        }

        for (key, plugin) in loaded {
            self.cache.insert(key, plugin);
        }

        Ok(specs
            .iter()
            .map(|spec| Arc::clone(&self.cache[&cache_key(spec)]))
            .collect())
    }

    /// Tear down everything the run loaded (worker processes included).
    pub async fn shutdown(mut self) {
        for (_, plugin) in self.cache.drain() {
            plugin.shutdown().await;
        }
    }
}

async fn load_one(
    spec: PluginSpec,
    workspace_root: &Path,
    policy: LoadPolicy,
    worker_binary: Option<&Path>,
) -> TrellisResult<LoadedPlugin> {
    tracing::debug!(plugin = %spec.plugin, ?policy, "loading plugin");

    match policy {
        LoadPolicy::InProcess => {
            let provider = resolve_provider(&spec, workspace_root)?;
            Ok(LoadedPlugin::in_process(spec, provider))
        }
        LoadPolicy::Isolated => {
            let worker_binary = match worker_binary {
                Some(path) => path.to_path_buf(),
                None => default_worker_binary()?,
            };

            let mut client = WorkerClient::spawn(&worker_binary, workspace_root)?;
            match client.load(&spec).await {
                Ok(capabilities) => Ok(LoadedPlugin::isolated(spec, capabilities, client)),
                Err(err) => {
                    let _ = client.terminate().await;
                    Err(TrellisError::PluginFailed {
                        plugin: spec.plugin.clone(),
                        message: err.to_string(),
                    })
                }
            }
        }
    }
}

/// The identity a load is memoized under: the plugin specifier together with
/// its options and file filters, exactly as written in the spec.
fn cache_key(spec: &PluginSpec) -> String {
    let options = spec
        .options
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    let include = spec.include.as_deref().unwrap_or_default().join(",");
    let exclude = spec.exclude.as_deref().unwrap_or_default().join(",");

    format!("{}\u{1f}{options}\u{1f}{include}\u{1f}{exclude}", spec.plugin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::CARGO_PLUGIN;

    fn loader() -> PluginLoader {
        PluginLoader::new("/tmp/does-not-matter", LoadPolicy::InProcess)
    }

    #[tokio::test]
    async fn repeated_specs_share_one_loaded_plugin() {
        let mut loader = loader();
        let spec = PluginSpec::new(CARGO_PLUGIN);

        let plugins = loader.load_plugins(&[spec.clone(), spec]).await.unwrap();

        assert_eq!(plugins.len(), 2);
        assert!(Arc::ptr_eq(&plugins[0], &plugins[1]));
        assert_eq!(loader.cached_count(), 1);
    }

    #[tokio::test]
    async fn cache_survives_across_calls_within_the_run() {
        let mut loader = loader();
        let spec = PluginSpec::new(CARGO_PLUGIN);

        let first = loader.load_plugins(&[spec.clone()]).await.unwrap();
        let second = loader.load_plugins(&[spec]).await.unwrap();

        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert_eq!(loader.cached_count(), 1);
    }

    #[tokio::test]
    async fn different_options_load_separately() {
        let mut loader = loader();
        let plain = PluginSpec::new(CARGO_PLUGIN);
        let configured =
            PluginSpec::new(CARGO_PLUGIN).with_options(serde_json::json!({ "flavor": "ci" }));

        let plugins = loader.load_plugins(&[plain, configured]).await.unwrap();

        assert!(!Arc::ptr_eq(&plugins[0], &plugins[1]));
        assert_eq!(loader.cached_count(), 2);
    }

    #[tokio::test]
    async fn one_bad_spec_fails_the_whole_batch() {
        let mut loader = loader();
        let specs = vec![PluginSpec::new(CARGO_PLUGIN), PluginSpec::new("no/such")];

        let error = loader.load_plugins(&specs).await.unwrap_err();
        assert!(error.to_string().contains("no/such"));
    }

    #[test]
    fn default_policy_is_in_process() {
        assert_eq!(LoadPolicy::default(), LoadPolicy::InProcess);
    }
}
