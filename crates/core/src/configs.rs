//! Configuration parsing for workspace and project files.

pub mod project;
pub mod targets;
pub mod workspace;
