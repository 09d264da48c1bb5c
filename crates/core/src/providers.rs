//! Built-in node providers and plugin specifier resolution.
//!
//! A plugin specifier is either the key of a built-in provider shipped with
//! this crate, or a filesystem path to a dynamic library built against the
//! `trellis_plugin_protocol` C ABI. Both the in-process loader and the
//! isolated worker resolve specifiers through [`resolve_provider`], so a
//! plugin behaves identically under either execution policy.

pub mod cargo;
pub mod gradle;
pub mod project_config;
pub mod target_defaults;
pub mod workspace_json;

use std::path::Path;
use std::sync::Arc;

use trellis_plugin_protocol::{NodeProvider, PluginSpec};

use crate::resolver::{
    CARGO_PLUGIN, PROJECT_CONFIG_PLUGIN, TARGET_DEFAULTS_PLUGIN, WORKSPACE_JSON_PLUGIN,
};
use crate::types::{TrellisError, TrellisResult};

// Also accepted on non-default platforms so a workspace config written on one
// machine still parses everywhere.
const DYLIB_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

/// Look up a built-in provider by its plugin key.
pub fn builtin_provider(key: &str) -> Option<Arc<dyn NodeProvider>> {
    match key {
        TARGET_DEFAULTS_PLUGIN => Some(Arc::new(target_defaults::TargetDefaultsProvider::new())),
        CARGO_PLUGIN => Some(Arc::new(cargo::CargoProvider::new())),
        WORKSPACE_JSON_PLUGIN => Some(Arc::new(workspace_json::WorkspaceJsonProvider::new())),
        PROJECT_CONFIG_PLUGIN => Some(Arc::new(project_config::ProjectConfigProvider::new())),
        gradle::GRADLE_PLUGIN => Some(Arc::new(gradle::GradleProvider::new())),
        _ => None,
    }
}

/// Resolve a plugin specifier to a concrete provider instance.
///
/// Relative dynamic library paths are resolved against the workspace root, so
/// a spec behaves the same whether it is resolved in-process or inside a
/// worker spawned with the workspace root as its working directory.
pub fn resolve_provider(
    spec: &PluginSpec,
    workspace_root: &Path,
) -> TrellisResult<Arc<dyn NodeProvider>> {
    if let Some(provider) = builtin_provider(&spec.plugin) {
        return Ok(provider);
    }

    let path = Path::new(&spec.plugin);
    let is_dylib = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| DYLIB_EXTENSIONS.contains(&extension));

    if is_dylib {
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            workspace_root.join(path)
        };

        let provider = crate::dylib_provider::DylibNodeProvider::from_dylib_with_temp_copy(resolved)
            .map_err(|err| TrellisError::Plugin(format!("{err:#}")))?;
        return Ok(Arc::new(provider));
    }

    Err(TrellisError::Plugin(format!(
        "Unknown plugin '{}': not a built-in provider key or a dynamic library path",
        spec.plugin
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_builtin_key() {
        let keys = [
            TARGET_DEFAULTS_PLUGIN,
            CARGO_PLUGIN,
            WORKSPACE_JSON_PLUGIN,
            PROJECT_CONFIG_PLUGIN,
            gradle::GRADLE_PLUGIN,
        ];

        for key in keys {
            let provider = builtin_provider(key).unwrap_or_else(|| panic!("missing {key}"));
            assert_eq!(provider.name(), key);
        }
    }

    #[test]
    fn rejects_unknown_specifier() {
        let spec = PluginSpec::new("totally/unknown");
        let error = resolve_provider(&spec, Path::new("/tmp")).err().unwrap();
        assert!(error.to_string().contains("totally/unknown"));
    }

    #[test]
    fn recognizes_dylib_paths_by_extension() {
        // Resolution fails because the file does not exist, but the error
        // comes from the library loader rather than the unknown-key branch.
        let spec = PluginSpec::new("plugins/libcustom.so");
        let error = resolve_provider(&spec, Path::new("/nonexistent-root"))
            .err()
            .unwrap();
        assert!(!error.to_string().contains("not a built-in"));
    }
}
