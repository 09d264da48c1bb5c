use thiserror::Error;

/// The main error type for Trellis operations
#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Plugin `{plugin}` failed: {message}")]
    PluginFailed { plugin: String, message: String },

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Path error: {0}")]
    Path(String),
}

/// Result type alias for Trellis operations
pub type TrellisResult<T> = Result<T, TrellisError>;
