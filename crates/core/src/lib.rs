//! Trellis Core Library
//!
//! This is the core library for the Trellis monorepo tool. It provides the
//! project-graph construction engine: plugin resolution and loading, workspace
//! traversal, node synthesis across plugins, result merging, and graph
//! assembly.
//!
//! ## Architecture
//!
//! The core library is organized into several modules:
//!
//! - [`workspace_manager`] - High-level graph construction interface
//! - [`resolver`] - Built-in provider injection around the configured plugins
//! - [`loader`] - Run-scoped concurrent plugin loading and memoization
//! - [`adapter`] - Uniform batched calling convention over loaded plugins
//! - [`nodes`] - Concurrent node synthesis across all plugins
//! - [`merge`] - Override-ordered merging of plugin results
//! - [`graph`] - Dependency collection, cycle detection, and final assembly
//! - [`providers`] - Built-in node providers (gradle, cargo, ...)
//! - [`worker`] - Process-isolation worker transport
//! - [`configs`] - Configuration parsing for workspace and project files
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! The primary entry point is the [`WorkspaceManager`]:
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
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod configs;
pub mod dylib_provider;
pub mod graph;
pub mod loader;
pub mod matcher;
pub mod merge;
pub mod nodes;
pub mod providers;
pub mod resolver;
pub mod types;
pub mod worker;
pub mod workspace_manager;

// Re-export the main types for easier usage
pub use graph::ProjectGraph;
pub use types::{TrellisError, TrellisResult};
pub use workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};
