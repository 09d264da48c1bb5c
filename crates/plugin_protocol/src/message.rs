//! Wire messages for isolated plugin workers.
//!
//! When plugin isolation is enabled, each plugin runs inside a dedicated
//! worker process. Host and worker exchange newline-delimited JSON over the
//! worker's stdio: one [`WorkerRequest`] per line in, one [`WorkerResponse`]
//! per line out, strictly request/response.
//!
//! The worker normalizes its plugin's hooks the same way the in-process path
//! does, so node creation always crosses the boundary as a single batched
//! call returning a [`NodeCreationOutcome`].

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::traits::ProviderCapabilities;
use crate::types::{
    NodeCreationOutcome, PluginSpec, ProjectDependency, ProjectGraphNodes, ProjectMetadata,
    ProviderContext,
};

/// A request from the host to a plugin worker.
///
/// `Load` must be the first request on a fresh worker; `Terminate` is the
/// last. Everything in between invokes a hook of the loaded plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    /// Load the plugin described by `spec` inside the worker. The worker
    /// hosts the same provider registry and dynamic-library loader as the
    /// in-process path, so the spec alone identifies what to load.
    Load { spec: PluginSpec },

    /// Invoke the batched node-creation hook over `files`.
    CreateNodes {
        files: Vec<PathBuf>,
        context: ProviderContext,
    },

    /// Invoke the dependency-creation hook.
    CreateDependencies { context: ProviderContext },

    /// Invoke the metadata hook.
    CreateMetadata { context: ProviderContext },

    /// Invoke the whole-graph post-processing hook.
    PostProcessGraph {
        nodes: ProjectGraphNodes,
        context: ProviderContext,
    },

    /// Shut the worker down. The worker acknowledges and exits.
    Terminate,
}

/// A response from a plugin worker to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerResponse {
    /// The plugin loaded; reports its declared capabilities. The hook shape
    /// in there is informational only: across this boundary, node creation
    /// is always batched.
    Loaded {
        capabilities: ProviderCapabilities,
    },

    /// Result of `CreateNodes`. Provider failures are contained inside the
    /// outcome; this variant is returned even when every file failed.
    Nodes { outcome: NodeCreationOutcome },

    /// Result of `CreateDependencies`.
    Dependencies {
        dependencies: Vec<ProjectDependency>,
    },

    /// Result of `CreateMetadata`.
    Metadata {
        metadata: IndexMap<String, ProjectMetadata>,
    },

    /// Result of `PostProcessGraph`.
    Graph { nodes: ProjectGraphNodes },

    /// Acknowledgement of `Terminate`; the worker exits after writing it.
    Terminated,

    /// A request could not be served: load failure, a hook invoked before
    /// `Load`, or an uncontained hook error. The run treats this as fatal
    /// for the plugin.
    Error { message: String },
}

impl WorkerRequest {
    /// Encode as a single JSON line (newline included).
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode from one line of input.
    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end())
    }
}

impl WorkerResponse {
    /// Encode as a single JSON line (newline included).
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode from one line of input.
    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_round_trip_as_single_lines() {
        let request = WorkerRequest::Load {
            spec: PluginSpec::new("trellis/gradle"),
        };
        let line = request.to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let back = WorkerRequest::from_json_line(&line).unwrap();
        match back {
            WorkerRequest::Load { spec } => assert_eq!(spec.plugin, "trellis/gradle"),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn responses_are_tagged_by_type() {
        let response = WorkerResponse::Error {
            message: "plugin not loaded".to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_str(response.to_json_line().unwrap().trim_end()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "plugin not loaded");
    }

    #[test]
    fn terminate_round_trips() {
        let line = WorkerRequest::Terminate.to_json_line().unwrap();
        assert!(matches!(
            WorkerRequest::from_json_line(&line).unwrap(),
            WorkerRequest::Terminate
        ));
    }
}
