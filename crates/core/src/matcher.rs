//! Workspace file collection and per-plugin file filtering.
//!
//! The walk produces the workspace-relative file list every provider sees;
//! [`filter_plugin_files`] then narrows that list for one plugin by applying
//! the spec's include/exclude globs followed by the hook's own pattern.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use trellis_plugin_protocol::PluginSpec;

use crate::types::{TrellisError, TrellisResult};

const DEFAULT_INCLUDE_GLOBS: &[&str] = &["**"];
const DEFAULT_EXCLUDE_GLOBS: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/node_modules/**",
    "**/.gradle/**",
    "**/.trellis/**",
];

/// Compile a list of glob patterns into one matcher set.
pub fn build_glob_set(patterns: &[String]) -> TrellisResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|err| TrellisError::Config(format!("invalid glob `{pattern}`: {err}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| TrellisError::Config(format!("invalid glob set: {err}")))
}

/// Walk the workspace and collect every file the configured filters admit,
/// as workspace-relative paths.
///
/// The walk is breadth-first with each directory's entries visited in name
/// order, so the returned list is identical across runs on identical trees.
pub fn collect_workspace_files(
    root: &Path,
    includes: &[String],
    excludes: &[String],
) -> TrellisResult<Vec<PathBuf>> {
    let include_patterns: Vec<String> = if includes.is_empty() {
        DEFAULT_INCLUDE_GLOBS.iter().map(|s| s.to_string()).collect()
    } else {
        includes.to_vec()
    };

    let mut exclude_patterns: Vec<String> = DEFAULT_EXCLUDE_GLOBS
        .iter()
        .map(|s| s.to_string())
        .collect();
    exclude_patterns.extend(excludes.iter().cloned());

    let include_set = build_glob_set(&include_patterns)?;
    let exclude_set = build_glob_set(&exclude_patterns)?;

    let mut files = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(root.to_path_buf());

    while let Some(current_dir) = queue.pop_front() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&current_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for path in entries {
            let relative_path = path.strip_prefix(root).unwrap_or(&path);

            if exclude_set.is_match(relative_path) {
                continue;
            }

            if path.is_dir() {
                queue.push_back(path);
            } else if include_set.is_match(relative_path) {
                files.push(relative_path.to_path_buf());
            }
        }
    }

    Ok(files)
}

/// Narrow the workspace file list to what one plugin's nodes hook should see:
/// the spec's `include`/`exclude` globs first, the hook `pattern` last.
/// Relative file order is preserved.
pub fn filter_plugin_files(
    files: &[PathBuf],
    spec: &PluginSpec,
    pattern: &str,
) -> TrellisResult<Vec<PathBuf>> {
    let include_set = spec
        .include
        .as_deref()
        .map(build_glob_set)
        .transpose()?;
    let exclude_set = spec
        .exclude
        .as_deref()
        .map(build_glob_set)
        .transpose()?;
    let pattern_set = build_glob_set(&[pattern.to_string()])?;

    Ok(files
        .iter()
        .filter(|file| {
            if let Some(include) = &include_set {
                if !include.is_match(file) {
                    return false;
                }
            }
            if let Some(exclude) = &exclude_set {
                if exclude.is_match(file) {
                    return false;
                }
            }
            pattern_set.is_match(file)
        })
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn walk_is_breadth_first_and_name_ordered() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("zeta.toml"));
        touch(&dir.path().join("alpha.toml"));
        touch(&dir.path().join("services/api/build.gradle"));
        touch(&dir.path().join("libs/util/build.gradle"));

        let files = collect_workspace_files(dir.path(), &[], &[]).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("alpha.toml"),
                PathBuf::from("zeta.toml"),
                PathBuf::from("libs/util/build.gradle"),
                PathBuf::from("services/api/build.gradle"),
            ],
            "root files first, then nested files in directory name order"
        );
    }

    #[test]
    fn default_excludes_prune_vendor_trees() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("app/build.gradle"));
        touch(&dir.path().join("app/node_modules/pkg/build.gradle"));
        touch(&dir.path().join("app/target/debug/build.gradle"));
        touch(&dir.path().join(".git/config"));

        let files = collect_workspace_files(dir.path(), &[], &[]).unwrap();
        assert_eq!(files, vec![PathBuf::from("app/build.gradle")]);
    }

    #[test]
    fn configured_excludes_extend_defaults() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/Cargo.toml"));
        touch(&dir.path().join("vendored/b/Cargo.toml"));

        let files =
            collect_workspace_files(dir.path(), &[], &["vendored/**".to_string()]).unwrap();
        assert_eq!(files, vec![PathBuf::from("a/Cargo.toml")]);
    }

    #[test]
    fn invalid_config_glob_is_an_error() {
        let err = build_glob_set(&["a[".to_string()]).unwrap_err();
        assert!(matches!(err, TrellisError::Config(_)));
    }

    #[test]
    fn plugin_filter_applies_spec_globs_then_pattern() {
        let files = vec![
            PathBuf::from("a/build.gradle"),
            PathBuf::from("a/settings.gradle"),
            PathBuf::from("b/build.gradle.kts"),
            PathBuf::from("vendored/c/build.gradle"),
        ];
        let spec = PluginSpec {
            plugin: "trellis/gradle".to_string(),
            options: None,
            include: None,
            exclude: Some(vec!["vendored/**".to_string()]),
        };

        let matched =
            filter_plugin_files(&files, &spec, "**/{build.gradle,build.gradle.kts}").unwrap();
        assert_eq!(
            matched,
            vec![
                PathBuf::from("a/build.gradle"),
                PathBuf::from("b/build.gradle.kts"),
            ]
        );
    }

    #[test]
    fn plugin_include_restricts_before_pattern() {
        let files = vec![
            PathBuf::from("apps/x/build.gradle"),
            PathBuf::from("libs/y/build.gradle"),
        ];
        let spec = PluginSpec {
            plugin: "trellis/gradle".to_string(),
            options: None,
            include: Some(vec!["apps/**".to_string()]),
            exclude: None,
        };

        let matched = filter_plugin_files(&files, &spec, "**/build.gradle").unwrap();
        assert_eq!(matched, vec![PathBuf::from("apps/x/build.gradle")]);
    }
}
