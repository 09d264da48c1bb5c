//! Plugin resolution: turns the configured plugin list into the ordered
//! specification list a run loads.
//!
//! Position carries meaning. The merge is override-ordered (later wins), so
//! the defaults provider is prepended where anything can override it, and the
//! built-in tail is appended where it overrides inference - with explicit
//! per-project configuration placed last of all.

use std::path::Path;

use trellis_plugin_protocol::PluginSpec;

/// Prepended built-in: workspace-level target defaults, freely overridable.
pub const TARGET_DEFAULTS_PLUGIN: &str = "trellis/target-defaults";

/// Tail built-in: cargo manifest inference.
pub const CARGO_PLUGIN: &str = "trellis/cargo";

/// Conditional tail built-in: the legacy single-file workspace convention.
pub const WORKSPACE_JSON_PLUGIN: &str = "trellis/workspace-json";

/// Final tail built-in: explicit `trellis.yml` project files. Last on purpose;
/// nothing may silently override what a project declares about itself.
pub const PROJECT_CONFIG_PLUGIN: &str = "trellis/project-config";

/// Resolve the full, ordered plugin list for a run: the defaults provider,
/// then the user's plugins in configured order, then the built-in tail.
///
/// The tail gains `trellis/workspace-json` only when a `workspace.json` file
/// exists at the workspace root.
#[must_use]
pub fn resolve_plugin_specs(user_plugins: &[PluginSpec], workspace_root: &Path) -> Vec<PluginSpec> {
    let mut specs = Vec::with_capacity(user_plugins.len() + 4);

    specs.push(PluginSpec::new(TARGET_DEFAULTS_PLUGIN));
    specs.extend(user_plugins.iter().cloned());

    specs.push(PluginSpec::new(CARGO_PLUGIN));
    if workspace_root.join("workspace.json").is_file() {
        specs.push(PluginSpec::new(WORKSPACE_JSON_PLUGIN));
    }
    specs.push(PluginSpec::new(PROJECT_CONFIG_PLUGIN));

    specs
}
