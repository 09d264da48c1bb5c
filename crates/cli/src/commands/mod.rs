pub mod graph;
pub mod plugins;
pub mod projects;
