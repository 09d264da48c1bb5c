//! Worker-process plumbing for isolated plugin execution.
//!
//! The host side is [`WorkerClient`]: it spawns one `trellis-workerd` process
//! per isolated plugin, with the workspace root as the worker's working
//! directory, and drives the newline-delimited JSON protocol from
//! `trellis_plugin_protocol::message` over the child's stdio. The worker side
//! is [`serve_worker`], the loop the `trellis-workerd` binary runs; it hosts
//! the same provider registry and dynamic-library loader as the in-process
//! path, so a spec resolves identically under either execution policy.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use trellis_plugin_protocol::{
    NodeCreationOutcome, NodeProvider, PluginSpec, ProjectDependency, ProjectGraphNodes,
    ProjectMetadata, ProviderCapabilities, ProviderContext, WorkerRequest, WorkerResponse,
};

use crate::adapter::run_batched_hook;
use crate::providers::resolve_provider;
use crate::types::{TrellisError, TrellisResult};

/// Overrides where the worker binary is looked up.
pub const WORKER_BINARY_ENV: &str = "TRELLIS_WORKERD";

const WORKER_BINARY_NAME: &str = "trellis-workerd";

/// Locate the worker binary: the `TRELLIS_WORKERD` override when set,
/// otherwise a sibling of the current executable.
pub fn default_worker_binary() -> TrellisResult<PathBuf> {
    if let Ok(path) = std::env::var(WORKER_BINARY_ENV) {
        return Ok(PathBuf::from(path));
    }

    let current = std::env::current_exe()?;
    let directory = current.parent().ok_or_else(|| {
        TrellisError::Plugin("Cannot locate the worker binary next to the current executable".to_string())
    })?;

    let mut candidate = directory.join(WORKER_BINARY_NAME);
    if cfg!(windows) {
        candidate.set_extension("exe");
    }

    Ok(candidate)
}

/// Host-side handle to one plugin worker process.
///
/// Calls are strictly request/response; the caller (the adapter) serializes
/// them. `terminate` must run before the client is dropped for a graceful
/// exit, but the child is killed on drop regardless so an abandoned run
/// cannot leak worker processes.
pub struct WorkerClient {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    terminated: bool,
}

impl WorkerClient {
    pub fn spawn(worker_binary: &Path, workspace_root: &Path) -> TrellisResult<Self> {
        let mut child = Command::new(worker_binary)
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                TrellisError::Plugin(format!(
                    "Failed to spawn plugin worker '{}': {err}",
                    worker_binary.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TrellisError::Plugin("Worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TrellisError::Plugin("Worker stdout unavailable".to_string()))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            terminated: false,
        })
    }

    async fn call(&mut self, request: &WorkerRequest) -> TrellisResult<WorkerResponse> {
        if self.terminated {
            return Err(TrellisError::Plugin(
                "Worker already terminated".to_string(),
            ));
        }

        let line = request.to_json_line()?;
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let mut response_line = String::new();
        let read = self.stdout.read_line(&mut response_line).await?;
        if read == 0 {
            self.terminated = true;
            return Err(TrellisError::Plugin(
                "Worker exited before responding".to_string(),
            ));
        }

        Ok(WorkerResponse::from_json_line(&response_line)?)
    }

    fn unexpected(response: WorkerResponse) -> TrellisError {
        match response {
            WorkerResponse::Error { message } => TrellisError::Plugin(message),
            other => TrellisError::Plugin(format!("Unexpected worker response: {other:?}")),
        }
    }

    pub async fn load(&mut self, spec: &PluginSpec) -> TrellisResult<ProviderCapabilities> {
        let request = WorkerRequest::Load { spec: spec.clone() };
        match self.call(&request).await? {
            WorkerResponse::Loaded { capabilities } => Ok(capabilities),
            other => Err(Self::unexpected(other)),
        }
    }

    pub async fn create_nodes(
        &mut self,
        files: &[PathBuf],
        context: &ProviderContext,
    ) -> TrellisResult<NodeCreationOutcome> {
        let request = WorkerRequest::CreateNodes {
            files: files.to_vec(),
            context: context.clone(),
        };
        match self.call(&request).await? {
            WorkerResponse::Nodes { outcome } => Ok(outcome),
            other => Err(Self::unexpected(other)),
        }
    }

    pub async fn create_dependencies(
        &mut self,
        context: &ProviderContext,
    ) -> TrellisResult<Vec<ProjectDependency>> {
        let request = WorkerRequest::CreateDependencies {
            context: context.clone(),
        };
        match self.call(&request).await? {
            WorkerResponse::Dependencies { dependencies } => Ok(dependencies),
            other => Err(Self::unexpected(other)),
        }
    }

    pub async fn create_metadata(
        &mut self,
        context: &ProviderContext,
    ) -> TrellisResult<IndexMap<String, ProjectMetadata>> {
        let request = WorkerRequest::CreateMetadata {
            context: context.clone(),
        };
        match self.call(&request).await? {
            WorkerResponse::Metadata { metadata } => Ok(metadata),
            other => Err(Self::unexpected(other)),
        }
    }

    pub async fn post_process_graph(
        &mut self,
        nodes: ProjectGraphNodes,
        context: &ProviderContext,
    ) -> TrellisResult<ProjectGraphNodes> {
        let request = WorkerRequest::PostProcessGraph {
            nodes,
            context: context.clone(),
        };
        match self.call(&request).await? {
            WorkerResponse::Graph { nodes } => Ok(nodes),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Ask the worker to exit and wait for it. Idempotent; kills the child
    /// when the graceful path fails.
    pub async fn terminate(&mut self) -> TrellisResult<()> {
        if self.terminated {
            return Ok(());
        }

        let goodbye = self.call(&WorkerRequest::Terminate).await;
        self.terminated = true;

        match goodbye {
            Ok(WorkerResponse::Terminated) => {
                self.child.wait().await?;
                Ok(())
            }
            Ok(other) => {
                self.kill_child().await;
                Err(Self::unexpected(other))
            }
            Err(err) => {
                self.kill_child().await;
                Err(err)
            }
        }
    }

    async fn kill_child(&mut self) {
        if self.child.start_kill().is_ok() {
            let _ = self.child.wait().await;
        }
    }
}

/// The plugin a worker process is currently hosting.
struct WorkerSession {
    spec: PluginSpec,
    provider: Arc<dyn NodeProvider>,
    capabilities: ProviderCapabilities,
}

/// The worker-side serve loop: one JSON request per input line, one JSON
/// response per output line, until `Terminate` or EOF.
///
/// Stdout belongs to the protocol; anything else the worker wants to say must
/// go to stderr.
pub fn serve_worker<R: BufRead, W: Write>(input: R, output: &mut W) -> std::io::Result<()> {
    let workspace_root = std::env::current_dir()?;
    let mut session: Option<WorkerSession> = None;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let request = match WorkerRequest::from_json_line(&line) {
            Ok(request) => request,
            Err(err) => {
                let response = WorkerResponse::Error {
                    message: format!("Malformed worker request: {err}"),
                };
                write_response(output, &response)?;
                continue;
            }
        };

        let terminate = matches!(request, WorkerRequest::Terminate);
        let response = handle_request(request, &workspace_root, &mut session);
        write_response(output, &response)?;

        if terminate {
            break;
        }
    }

    Ok(())
}

fn write_response<W: Write>(output: &mut W, response: &WorkerResponse) -> std::io::Result<()> {
    let line = response
        .to_json_line()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    output.write_all(line.as_bytes())?;
    output.flush()
}

fn handle_request(
    request: WorkerRequest,
    workspace_root: &Path,
    session: &mut Option<WorkerSession>,
) -> WorkerResponse {
    match request {
        WorkerRequest::Load { spec } => match resolve_provider(&spec, workspace_root) {
            Ok(provider) => {
                let capabilities = ProviderCapabilities::for_provider(provider.as_ref());
                let response = WorkerResponse::Loaded {
                    capabilities: capabilities.clone(),
                };
                *session = Some(WorkerSession {
                    spec,
                    provider,
                    capabilities,
                });
                response
            }
            Err(err) => WorkerResponse::Error {
                message: err.to_string(),
            },
        },

        WorkerRequest::CreateNodes { files, context } => match session.as_ref() {
            Some(session) => match session.capabilities.nodes_hook.as_ref() {
                Some(hook) => WorkerResponse::Nodes {
                    outcome: run_batched_hook(
                        session.provider.as_ref(),
                        hook.shape,
                        &files,
                        session.spec.options.as_ref(),
                        &context,
                    ),
                },
                None => WorkerResponse::Error {
                    message: "Loaded plugin declares no nodes hook".to_string(),
                },
            },
            None => not_loaded(),
        },

        WorkerRequest::CreateDependencies { context } => match session.as_ref() {
            Some(session) => session
                .provider
                .create_dependencies(session.spec.options.as_ref(), &context)
                .map(|dependencies| WorkerResponse::Dependencies { dependencies })
                .unwrap_or_else(hook_error),
            None => not_loaded(),
        },

        WorkerRequest::CreateMetadata { context } => match session.as_ref() {
            Some(session) => session
                .provider
                .create_metadata(session.spec.options.as_ref(), &context)
                .map(|metadata| WorkerResponse::Metadata { metadata })
                .unwrap_or_else(hook_error),
            None => not_loaded(),
        },

        WorkerRequest::PostProcessGraph { nodes, context } => match session.as_ref() {
            Some(session) => session
                .provider
                .post_process_graph(nodes, session.spec.options.as_ref(), &context)
                .map(|nodes| WorkerResponse::Graph { nodes })
                .unwrap_or_else(hook_error),
            None => not_loaded(),
        },

        WorkerRequest::Terminate => WorkerResponse::Terminated,
    }
}

fn not_loaded() -> WorkerResponse {
    WorkerResponse::Error {
        message: "No plugin loaded; send a load request first".to_string(),
    }
}

fn hook_error(err: anyhow::Error) -> WorkerResponse {
    WorkerResponse::Error {
        message: format!("{err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn serve(lines: &str) -> Vec<WorkerResponse> {
        let mut output = Vec::new();
        serve_worker(Cursor::new(lines.to_string()), &mut output).unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| WorkerResponse::from_json_line(line).unwrap())
            .collect()
    }

    #[test]
    fn hooks_before_load_are_rejected() {
        let request = WorkerRequest::CreateDependencies {
            context: ProviderContext::default(),
        };
        let responses = serve(&request.to_json_line().unwrap());

        assert_eq!(responses.len(), 1);
        match &responses[0] {
            WorkerResponse::Error { message } => assert!(message.contains("No plugin loaded")),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn terminate_acknowledges_and_stops() {
        let mut input = WorkerRequest::Terminate.to_json_line().unwrap();
        // Anything after terminate must not be served.
        input.push_str(&WorkerRequest::Terminate.to_json_line().unwrap());

        let responses = serve(&input);
        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0], WorkerResponse::Terminated));
    }

    #[test]
    fn malformed_requests_get_an_error_response() {
        let responses = serve("this is not json\n");
        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0], WorkerResponse::Error { .. }));
    }

    #[test]
    fn load_failure_reports_the_unknown_plugin() {
        let request = WorkerRequest::Load {
            spec: PluginSpec::new("no/such-plugin"),
        };
        let responses = serve(&request.to_json_line().unwrap());

        match &responses[0] {
            WorkerResponse::Error { message } => assert!(message.contains("no/such-plugin")),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
