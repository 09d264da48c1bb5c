//! Gradle build-file inference, including CI test atomization.
//!
//! Every matched `build.gradle`/`build.gradle.kts` becomes a project whose
//! targets mirror the Gradle tasks the build file declares or implies. When a
//! CI target name is configured, test-type tasks are additionally split into
//! one target per test class so a CI pipeline can schedule and cache them
//! independently, with a no-op umbrella target fanning out over the pieces.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use trellis_plugin_protocol::{
    DependencyKind, FileNodes, NodeCreationFailure, NodeProvider, NodeResult, NodesHook,
    PartialNodeCreationError, ProjectDefinition, ProjectDependency, ProjectMetadata,
    ProviderContext, TargetDefinition, TargetDependency, TargetMetadata,
};

pub const GRADLE_PLUGIN: &str = "trellis/gradle";

const BUILD_FILE_PATTERN: &str = "**/{build.gradle,build.gradle.kts}";
const NOOP_EXECUTOR: &str = "trellis:noop";
const DEFAULT_INPUTS: &[&str] = &["default", "^production"];
const COMPILE_TASK: &str = "classes";
const TEST_SOURCE_EXTENSIONS: &[&str] = &["java", "kt", "groovy", "scala"];

/// Options accepted by the Gradle provider, from the plugin spec's `options`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GradleOptions {
    /// Name of the atomized CI umbrella target. Atomization is off without it.
    pub ci_target_name: Option<String>,

    /// How a test source file maps to the class name passed to `--tests`.
    pub test_class_naming: TestClassPolicy,
}

/// Naming policy for atomized test targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestClassPolicy {
    /// The file stem alone (`src/test/java/com/acme/FooTest.java` -> `FooTest`).
    #[default]
    FileStem,

    /// Dotted package path derived from the directories below the test source
    /// set (`src/test/java/com/acme/FooTest.java` -> `com.acme.FooTest`).
    PackageQualified,
}

impl TestClassPolicy {
    fn class_name(&self, project_root: &str, file: &Path) -> Option<String> {
        let stem = file.file_stem()?.to_str()?.to_string();

        match self {
            Self::FileStem => Some(stem),
            Self::PackageQualified => {
                let relative = relative_to_root(project_root, file)?;
                let components: Vec<&str> = relative
                    .components()
                    .filter_map(|component| component.as_os_str().to_str())
                    .collect();

                // Package directories start after `src/test/<language>/`.
                let set_start = components
                    .windows(2)
                    .position(|pair| pair == ["src", "test"])?;
                let package_dirs = components.get(set_start + 3..components.len() - 1)?;

                let mut qualified: Vec<&str> = package_dirs.to_vec();
                qualified.push(&stem);
                Some(qualified.join("."))
            }
        }
    }
}

/// Gradle task classification. Only test-type tasks atomize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskType {
    Test,
    Verification,
    Other,
}

impl TaskType {
    fn classify(type_name: &str) -> Self {
        match type_name {
            "Test" => Self::Test,
            "Verification" => Self::Verification,
            _ => Self::Other,
        }
    }

    fn category(self) -> &'static str {
        match self {
            Self::Test => "Test",
            Self::Verification => "Verification",
            Self::Other => "Build",
        }
    }
}

#[derive(Debug, Clone)]
struct GradleTask {
    name: String,
    task_type: TaskType,
}

impl GradleTask {
    fn new(name: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            name: name.into(),
            task_type,
        }
    }
}

/// Per-run view over every matched build file, computed once per batched call.
struct GradleReport {
    /// Project roots of all matched build files, used to decide which project
    /// a test source file belongs to.
    project_roots: Vec<String>,

    /// Candidate test source files across the workspace, in matcher order.
    test_files: Vec<PathBuf>,

    /// Project name per root. Leaf directory name, except that duplicate
    /// leaves across the workspace fall back to the dash-joined path so two
    /// `*/core` projects never collide in the name-keyed dependency graph.
    names: IndexMap<String, String>,
}

impl GradleReport {
    fn build(files: &[PathBuf], context: &ProviderContext) -> Self {
        let project_roots: Vec<String> =
            files.iter().map(|file| project_root_for(file)).collect();

        let test_files = context
            .workspace_files
            .iter()
            .filter(|file| is_test_source(file))
            .cloned()
            .collect();

        let root_project_name = ["settings.gradle", "settings.gradle.kts"]
            .iter()
            .find_map(|name| {
                std::fs::read_to_string(context.workspace_root.join(name))
                    .ok()
                    .and_then(|contents| parse_settings_project_name(&contents))
            });

        let mut names: IndexMap<String, String> = project_roots
            .iter()
            .map(|root| {
                (
                    root.clone(),
                    leaf_project_name(root, root_project_name.as_deref(), context),
                )
            })
            .collect();

        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for name in names.values() {
            *counts.entry(name.clone()).or_insert(0) += 1;
        }
        for (root, name) in &mut names {
            if counts[name.as_str()] > 1 && root != "." {
                *name = root.replace('/', "-");
            }
        }

        Self {
            project_roots,
            test_files,
            names,
        }
    }

    fn project_name(&self, root: &str) -> String {
        self.names
            .get(root)
            .cloned()
            .unwrap_or_else(|| root.replace('/', "-"))
    }

    /// The project a file belongs to: the deepest matched project root that is
    /// a path prefix of the file. Component-wise, so `app2/` never claims
    /// files under `app/` and nested projects shadow their ancestors.
    fn owning_root(&self, file: &Path) -> Option<&str> {
        self.project_roots
            .iter()
            .filter(|root| relative_to_root(root, file).is_some())
            .max_by_key(|root| {
                if *root == "." {
                    0
                } else {
                    Path::new(root.as_str()).components().count()
                }
            })
            .map(String::as_str)
    }

    /// Test files owned by exactly this project, in discovery order.
    fn test_files_for(&self, root: &str) -> Vec<&PathBuf> {
        self.test_files
            .iter()
            .filter(|file| self.owning_root(file) == Some(root))
            .collect()
    }
}

pub struct GradleProvider;

impl GradleProvider {
    pub fn new() -> Self {
        Self
    }

    fn project_for_file(
        &self,
        file: &Path,
        options: &GradleOptions,
        report: &GradleReport,
        context: &ProviderContext,
    ) -> Result<NodeResult> {
        let contents = std::fs::read_to_string(context.workspace_root.join(file))
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let root = project_root_for(file);
        let name = report.project_name(&root);
        let tasks = discover_tasks(&contents);
        let test_files = report.test_files_for(&root);

        let mut targets = IndexMap::new();
        let mut target_groups: IndexMap<String, Vec<String>> = IndexMap::new();

        for task in &tasks {
            let group = synthesize_task_targets(task, &root, options, &test_files, &mut targets);
            target_groups
                .entry(task.task_type.category().to_string())
                .or_default()
                .extend(group);
        }

        let project = ProjectDefinition {
            name: Some(name),
            targets,
            tags: Vec::new(),
            metadata: Some(ProjectMetadata {
                technologies: vec!["gradle".to_string()],
                target_groups,
            }),
        };

        Ok(NodeResult::single(root, project))
    }
}

impl Default for GradleProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeProvider for GradleProvider {
    fn name(&self) -> &str {
        GRADLE_PLUGIN
    }

    fn nodes_hook(&self) -> Option<NodesHook> {
        Some(NodesHook::batched(BUILD_FILE_PATTERN))
    }

    fn create_nodes(
        &self,
        files: &[PathBuf],
        options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<Vec<FileNodes>> {
        let options = parse_options(options)?;
        let report = GradleReport::build(files, context);

        let mut results = Vec::with_capacity(files.len());
        let mut failures = Vec::new();

        for file in files {
            match self.project_for_file(file, &options, &report, context) {
                Ok(nodes) => results.push(FileNodes::new(self.name(), file, nodes)),
                Err(err) => failures.push(NodeCreationFailure::for_file(file, format!("{err:#}"))),
            }
        }

        if failures.is_empty() {
            Ok(results)
        } else {
            Err(PartialNodeCreationError { results, failures }.into())
        }
    }

    fn creates_dependencies(&self) -> bool {
        true
    }

    fn create_dependencies(
        &self,
        _options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<Vec<ProjectDependency>> {
        let build_files: Vec<PathBuf> = context
            .workspace_files
            .iter()
            .filter(|file| is_build_file(file))
            .cloned()
            .collect();

        let report = GradleReport::build(&build_files, context);

        // Project names by gradle path, for resolving `project(':a:b')`.
        let mut names_by_path: IndexMap<String, String> = IndexMap::new();
        for file in &build_files {
            let root = project_root_for(file);
            names_by_path.insert(gradle_path(&root), report.project_name(&root));
        }

        let mut dependencies = Vec::new();
        for file in &build_files {
            let contents = std::fs::read_to_string(context.workspace_root.join(file))
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let root = project_root_for(file);
            let source = names_by_path[&gradle_path(&root)].clone();

            for referenced in parse_project_references(&contents) {
                let Some(target) = names_by_path.get(&referenced) else {
                    tracing::debug!(
                        source = %source,
                        reference = %referenced,
                        "gradle project reference has no matched build file, skipping"
                    );
                    continue;
                };

                if *target == source {
                    continue;
                }

                dependencies.push(ProjectDependency {
                    source: source.clone(),
                    target: target.clone(),
                    kind: DependencyKind::Static,
                    source_file: Some(file.clone()),
                });
            }
        }

        Ok(dependencies)
    }
}

fn parse_options(options: Option<&JsonValue>) -> Result<GradleOptions> {
    options
        .map(|value| serde_json::from_value(value.clone()))
        .transpose()
        .context("Invalid gradle plugin options")
        .map(Option::unwrap_or_default)
}

/// Synthesize all targets one Gradle task contributes and register them in
/// `targets`, returning the ordered target-group entry for the task.
fn synthesize_task_targets(
    task: &GradleTask,
    project_root: &str,
    options: &GradleOptions,
    test_files: &[&PathBuf],
    targets: &mut IndexMap<String, TargetDefinition>,
) -> Vec<String> {
    let base_command = gradle_command(project_root, &task.name);
    let default_inputs: Vec<String> = DEFAULT_INPUTS.iter().map(ToString::to_string).collect();

    let compile_dependency = if task.name == COMPILE_TASK {
        Vec::new()
    } else {
        vec![TargetDependency::Target(COMPILE_TASK.to_string())]
    };

    let mut base = TargetDefinition {
        command: Some(base_command.clone()),
        depends_on: compile_dependency.clone(),
        inputs: default_inputs.clone(),
        cache: Some(true),
        metadata: Some(TargetMetadata {
            description: Some(format!("Runs Gradle task {}", task.name)),
            technologies: vec!["gradle".to_string()],
            ..TargetMetadata::default()
        }),
        ..TargetDefinition::default()
    };

    let umbrella_name = match (&options.ci_target_name, task.task_type) {
        (Some(ci_target_name), TaskType::Test) if !test_files.is_empty() => {
            if task.name == "test" {
                ci_target_name.clone()
            } else {
                // A second test-type task atomizes under its own namespace so
                // the umbrella names cannot collide.
                format!("{ci_target_name}-{}", task.name)
            }
        }
        _ => {
            targets.insert(task.name.clone(), base);
            return vec![task.name.clone()];
        }
    };

    let mut group = Vec::new();
    let mut atomized_names = Vec::new();

    for file in test_files {
        let Some(class_name) = options.test_class_naming.class_name(project_root, file) else {
            continue;
        };

        let target_name = format!("{umbrella_name}--{class_name}");
        if targets.contains_key(&target_name) {
            continue;
        }

        targets.insert(
            target_name.clone(),
            TargetDefinition {
                command: Some(format!("{base_command} --tests {class_name}")),
                depends_on: compile_dependency.clone(),
                inputs: default_inputs.clone(),
                cache: Some(true),
                metadata: Some(TargetMetadata {
                    description: Some(format!("Runs tests in {}", file.display())),
                    technologies: vec!["gradle".to_string()],
                    ..TargetMetadata::default()
                }),
                ..TargetDefinition::default()
            },
        );

        atomized_names.push(target_name.clone());
        group.push(target_name);
    }

    targets.insert(
        umbrella_name.clone(),
        TargetDefinition {
            executor: Some(NOOP_EXECUTOR.to_string()),
            depends_on: atomized_names
                .iter()
                .map(TargetDependency::self_target)
                .collect(),
            cache: Some(true),
            metadata: Some(TargetMetadata {
                description: Some(format!(
                    "Runs all atomized {} targets in CI",
                    task.name
                )),
                technologies: vec!["gradle".to_string()],
                non_atomized_target: Some(task.name.clone()),
            }),
            ..TargetDefinition::default()
        },
    );
    group.push(umbrella_name);

    // The coarse task remains invocable but no longer caches; the atomized
    // targets are the cacheable unit now.
    base.cache = Some(false);
    targets.insert(task.name.clone(), base);
    group.push(task.name.clone());

    group
}

fn project_root_for(file: &Path) -> String {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.to_string_lossy().replace('\\', "/")
        }
        _ => ".".to_string(),
    }
}

fn leaf_project_name(
    root: &str,
    root_project_name: Option<&str>,
    context: &ProviderContext,
) -> String {
    if root == "." {
        return root_project_name.map(str::to_string).unwrap_or_else(|| {
            context
                .workspace_root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "root".to_string())
        });
    }

    Path::new(root)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string())
}

/// The colon-separated Gradle project path for a workspace-relative root.
fn gradle_path(root: &str) -> String {
    if root == "." {
        String::new()
    } else {
        root.replace('/', ":")
    }
}

fn gradle_command(root: &str, task: &str) -> String {
    let path = gradle_path(root);
    if path.is_empty() {
        format!("./gradlew {task}")
    } else {
        format!("./gradlew {path}:{task}")
    }
}

fn relative_to_root<'a>(root: &str, file: &'a Path) -> Option<&'a Path> {
    if root == "." {
        Some(file)
    } else {
        file.strip_prefix(root).ok()
    }
}

fn is_build_file(file: &Path) -> bool {
    file.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == "build.gradle" || name == "build.gradle.kts")
}

fn is_test_source(file: &Path) -> bool {
    let extension_matches = file
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| TEST_SOURCE_EXTENSIONS.contains(&extension));
    if !extension_matches {
        return false;
    }

    let components: Vec<&str> = file
        .components()
        .filter_map(|component| component.as_os_str().to_str())
        .collect();
    components.windows(2).any(|pair| pair == ["src", "test"])
}

/// The implied and declared tasks of one build file, in a stable order:
/// the java-plugin lifecycle first, then explicit declarations.
fn discover_tasks(contents: &str) -> Vec<GradleTask> {
    let mut tasks = Vec::new();

    if applies_java_plugin(contents) {
        tasks.push(GradleTask::new(COMPILE_TASK, TaskType::Other));
        tasks.push(GradleTask::new("test", TaskType::Test));
        tasks.push(GradleTask::new("build", TaskType::Other));
        tasks.push(GradleTask::new("check", TaskType::Verification));
    }

    for declared in parse_declared_tasks(contents) {
        if !tasks.iter().any(|task| task.name == declared.name) {
            tasks.push(declared);
        }
    }

    tasks
}

fn applies_java_plugin(contents: &str) -> bool {
    const MARKERS: &[&str] = &[
        "id 'java'",
        "id \"java\"",
        "id(\"java\")",
        "id 'java-library'",
        "id \"java-library\"",
        "id(\"java-library\")",
        "apply plugin: 'java'",
        "apply plugin: \"java\"",
        "kotlin(\"jvm\")",
        "id 'org.jetbrains.kotlin.jvm'",
        "id(\"org.jetbrains.kotlin.jvm\")",
    ];

    let mut in_plugins_block = false;
    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with("//") {
            continue;
        }
        if line.starts_with("plugins") && line.contains('{') {
            in_plugins_block = true;
        }

        if MARKERS.iter().any(|marker| line.contains(marker)) {
            return true;
        }
        // Bare `java` inside a kotlin-dsl plugins block.
        if in_plugins_block && (line == "java" || line == "`java-library`") {
            return true;
        }

        if in_plugins_block && line.contains('}') {
            in_plugins_block = false;
        }
    }

    false
}

/// Explicitly declared tasks:
/// `task integrationTest(type: Test)` (Groovy) and
/// `tasks.register("integrationTest", Test::class)` /
/// `tasks.register<Test>("integrationTest")` (Kotlin).
fn parse_declared_tasks(contents: &str) -> Vec<GradleTask> {
    let mut tasks = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with("//") {
            continue;
        }

        if let Some(rest) = line.strip_prefix("task ") {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if name.is_empty() {
                continue;
            }

            let task_type = rest
                .split_once("type:")
                .map(|(_, after)| {
                    let type_name: String = after
                        .trim_start()
                        .chars()
                        .take_while(|c| c.is_alphanumeric())
                        .collect();
                    TaskType::classify(&type_name)
                })
                .unwrap_or(TaskType::Other);

            tasks.push(GradleTask::new(name, task_type));
            continue;
        }

        if let Some(rest) = line.strip_prefix("tasks.register") {
            let Some(name) = quoted_token(rest) else {
                continue;
            };

            let task_type = if let Some(generic) = rest.strip_prefix('<') {
                let type_name: String = generic
                    .chars()
                    .take_while(|c| c.is_alphanumeric())
                    .collect();
                TaskType::classify(&type_name)
            } else if let Some((_, after)) = rest.split_once(',') {
                let type_name: String = after
                    .trim_start()
                    .chars()
                    .take_while(|c| c.is_alphanumeric())
                    .collect();
                TaskType::classify(&type_name)
            } else {
                TaskType::Other
            };

            tasks.push(GradleTask::new(name, task_type));
        }
    }

    tasks
}

/// `project(':a:b')` references inside a build file, as normalized colon paths
/// without the leading colon, in order of appearance.
fn parse_project_references(contents: &str) -> Vec<String> {
    let mut references = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with("//") {
            continue;
        }

        let mut rest = line;
        while let Some(position) = rest.find("project(") {
            rest = &rest[position + "project(".len()..];
            let Some(reference) = quoted_token(rest) else {
                continue;
            };

            let normalized = reference.trim_start_matches(':').to_string();
            if !normalized.is_empty() && !references.contains(&normalized) {
                references.push(normalized);
            }
        }
    }

    references
}

/// First single- or double-quoted token within `text`.
fn quoted_token(text: &str) -> Option<String> {
    let start = text.find(['\'', '"'])?;
    let quote = text.as_bytes()[start] as char;
    let rest = &text[start + 1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

fn parse_settings_project_name(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let line = line.trim();
        let rest = line.strip_prefix("rootProject.name")?;
        let (_, value) = rest.split_once('=')?;
        quoted_token(value)
    })
}
