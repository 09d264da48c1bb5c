//! Shared contract between Trellis and its project-graph provider plugins.
//!
//! This crate defines everything a plugin and the engine must agree on:
//!
//! - [`types`] - The graph node data model and invocation context
//! - [`traits`] - The [`NodeProvider`] trait and capability declarations
//! - [`message`] - Wire messages for isolated plugin workers
//! - [`dylib`] - The C ABI export macro for dynamic-library plugins
//!
//! Everything a plugin typically needs is re-exported at the crate root.

pub mod dylib;
pub mod message;
pub mod traits;
pub mod types;

pub use message::{WorkerRequest, WorkerResponse};
pub use traits::{HookShape, NodeProvider, NodesHook, ProviderCapabilities};
pub use types::{
    DependencyKind, DependencyParams, FileNodes, NodeCreationFailure, NodeCreationOutcome,
    NodeResult, PartialNodeCreationError, PluginSpec, ProjectDefinition, ProjectDependency,
    ProjectGraphNodes, ProjectMetadata, ProviderContext, TargetDefinition, TargetDependency,
    TargetMetadata,
};
