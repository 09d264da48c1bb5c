//! Dynamic library plugin interface for C ABI exports.
//!
//! This module provides the infrastructure for building node providers as
//! dynamic libraries (`.so` on Linux, `.dylib` on macOS, `.dll` on Windows)
//! that Trellis loads at runtime.
//!
//! All data crosses the boundary as JSON-encoded C strings. Hook results
//! travel inside a [`HookEnvelope`] so that failures - including partial
//! node-creation outcomes - survive the crossing with their meaning intact.
//!
//! Use the [`export_node_provider!`] macro to export your provider with all
//! necessary C ABI functions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{FileNodes, NodeCreationFailure, PartialNodeCreationError};

/// The JSON envelope every hook result crosses the C boundary in.
///
/// `Value` wraps a successful result, `Partial` carries a batched provider's
/// mixed outcome, and `Failure` is an opaque error message. The host unpacks
/// the envelope back into the same `Result` shape the provider produced, so
/// error containment behaves identically for in-process and dynamic-library
/// plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookEnvelope {
    Value(JsonValue),
    #[serde(rename_all = "camelCase")]
    Partial {
        results: Vec<FileNodes>,
        failures: Vec<NodeCreationFailure>,
    },
    Failure(String),
}

impl HookEnvelope {
    /// Wrap a hook result for the crossing. A [`PartialNodeCreationError`]
    /// becomes [`HookEnvelope::Partial`]; any other error becomes an opaque
    /// [`HookEnvelope::Failure`].
    pub fn from_result<T: Serialize>(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(value) => Self::Value(value),
                Err(err) => Self::Failure(format!("failed to serialize hook result: {err}")),
            },
            Err(err) => match err.downcast::<PartialNodeCreationError>() {
                Ok(partial) => Self::Partial {
                    results: partial.results,
                    failures: partial.failures,
                },
                Err(err) => Self::Failure(format!("{err:#}")),
            },
        }
    }

    /// Unpack an envelope on the host side, restoring the provider's original
    /// `Result` shape.
    pub fn into_result<T: DeserializeOwned>(self) -> anyhow::Result<T> {
        match self {
            Self::Value(value) => Ok(serde_json::from_value(value)?),
            Self::Partial { results, failures } => {
                Err(PartialNodeCreationError { results, failures }.into())
            }
            Self::Failure(message) => Err(anyhow::anyhow!(message)),
        }
    }
}

/// Parse one JSON payload received over the C boundary, naming the payload in
/// the error. Used by the code [`export_node_provider!`] generates.
pub fn parse_payload<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, String> {
    serde_json::from_str(raw).map_err(|err| format!("invalid {what} payload: {err}"))
}

/// Macro to export a node provider with a C ABI interface for dynamic library
/// loading.
///
/// **Purpose**: Generates the C-compatible functions Trellis needs to load
/// and invoke your provider across the dynamic-library boundary.
///
/// **Requirements**: Your provider type must:
/// - Implement the `NodeProvider` trait
/// - Have a `const fn new() -> Self` constructor
/// - Be `Send + Sync`
///
/// **Generated Functions**:
/// - `provider_name()` - Returns the provider's name
/// - `provider_capabilities()` - Returns the declared capabilities as JSON
/// - `provider_create_nodes_for_file()` / `provider_create_nodes()` - The two
///   node-creation shapes; Trellis calls the one your hook declares
/// - `provider_create_dependencies()` - Dependency hook
/// - `provider_create_metadata()` - Metadata hook
/// - `provider_post_process_graph()` - Whole-graph hook
/// - `provider_cleanup_string()` - Frees strings the provider returned
///
/// # Usage
///
/// ```rust
/// use std::path::Path;
///
/// use serde_json::Value as JsonValue;
/// use trellis_plugin_protocol::{
///     dylib::export_node_provider, NodeProvider, NodeResult, NodesHook, ProjectDefinition,
///     ProviderContext,
/// };
///
/// pub struct MakefileProvider;
///
/// impl MakefileProvider {
///     pub const fn new() -> Self {
///         Self
///     }
/// }
///
/// impl NodeProvider for MakefileProvider {
///     fn name(&self) -> &str {
///         "example/makefile"
///     }
///
///     fn nodes_hook(&self) -> Option<NodesHook> {
///         Some(NodesHook::per_file("**/Makefile"))
///     }
///
///     fn create_nodes_for_file(
///         &self,
///         file: &Path,
///         _options: Option<&JsonValue>,
///         _context: &ProviderContext,
///     ) -> anyhow::Result<NodeResult> {
///         let root = file
///             .parent()
///             .map(|dir| dir.to_string_lossy().into_owned())
///             .unwrap_or_default();
///         Ok(NodeResult::single(root, ProjectDefinition::default()))
///     }
/// }
///
/// // Export the provider - this MUST be the last item in your lib.rs
/// export_node_provider!(MakefileProvider);
/// ```
///
/// # Memory Management
///
/// The macro handles C string memory automatically:
/// - Strings returned to Trellis are allocated with `CString::into_raw()`
/// - Trellis calls `provider_cleanup_string()` to free them
/// - Plugins must never free strings they returned
///
/// # Build Configuration
///
/// Your `Cargo.toml` must specify `cdylib` as the crate type, and the crate
/// must depend on `serde_json` (the macro encodes payloads with it):
///
/// ```toml
/// [lib]
/// crate-type = ["cdylib"]
/// ```
///
/// # Common Issues
///
/// **"Symbol not found"**: Verify `export_node_provider!(YourProvider)` is
/// called exactly once, at the end of `lib.rs`.
///
/// **"Plugin not recognized"**: Ensure the library file keeps the platform
/// naming convention (`lib<name>.so`, `lib<name>.dylib`, `<name>.dll`).
#[macro_export]
macro_rules! export_node_provider {
    ($provider_type:ty) => {
        use std::ffi::{CStr, CString};
        use std::os::raw::c_char;

        static PROVIDER: $provider_type = <$provider_type>::new();

        /// Borrow a C string as UTF-8, or `None` for null/invalid input.
        fn read_c_string<'a>(ptr: *const c_char) -> Option<&'a str> {
            if ptr.is_null() {
                return None;
            }
            unsafe { CStr::from_ptr(ptr).to_str().ok() }
        }

        /// Hand a JSON envelope back to the host as an owned C string.
        fn envelope_to_c(envelope: $crate::dylib::HookEnvelope) -> *const c_char {
            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(_) => return std::ptr::null(),
            };
            match CString::new(json) {
                Ok(cstr) => cstr.into_raw(),
                Err(_) => std::ptr::null(),
            }
        }

        #[no_mangle]
        pub extern "C" fn provider_name() -> *const c_char {
            match CString::new($crate::NodeProvider::name(&PROVIDER)) {
                Ok(cstr) => cstr.into_raw(),
                Err(_) => std::ptr::null(),
            }
        }

        #[no_mangle]
        pub extern "C" fn provider_capabilities() -> *const c_char {
            let capabilities = $crate::ProviderCapabilities::for_provider(&PROVIDER);
            match serde_json::to_string(&capabilities) {
                Ok(json) => match CString::new(json) {
                    Ok(cstr) => cstr.into_raw(),
                    Err(_) => std::ptr::null(),
                },
                Err(_) => std::ptr::null(),
            }
        }

        /// Shared front half of every hook export: parse options and context.
        fn parse_call_payloads(
            options_ptr: *const c_char,
            context_ptr: *const c_char,
        ) -> Result<(Option<serde_json::Value>, $crate::ProviderContext), String> {
            let options = match read_c_string(options_ptr) {
                Some(raw) => $crate::dylib::parse_payload(raw, "options")?,
                None => None,
            };
            let raw_context =
                read_c_string(context_ptr).ok_or_else(|| "missing context payload".to_string())?;
            let context = $crate::dylib::parse_payload(raw_context, "context")?;
            Ok((options, context))
        }

        #[no_mangle]
        pub extern "C" fn provider_create_nodes_for_file(
            file_ptr: *const c_char,
            options_ptr: *const c_char,
            context_ptr: *const c_char,
        ) -> *const c_char {
            let envelope = (|| {
                let file = read_c_string(file_ptr)
                    .ok_or_else(|| "missing file payload".to_string())
                    .map(std::path::PathBuf::from)?;
                let (options, context) = parse_call_payloads(options_ptr, context_ptr)?;
                Ok($crate::dylib::HookEnvelope::from_result(
                    $crate::NodeProvider::create_nodes_for_file(
                        &PROVIDER,
                        &file,
                        options.as_ref(),
                        &context,
                    ),
                ))
            })()
            .unwrap_or_else($crate::dylib::HookEnvelope::Failure);
            envelope_to_c(envelope)
        }

        #[no_mangle]
        pub extern "C" fn provider_create_nodes(
            files_ptr: *const c_char,
            options_ptr: *const c_char,
            context_ptr: *const c_char,
        ) -> *const c_char {
            let envelope = (|| {
                let raw_files = read_c_string(files_ptr)
                    .ok_or_else(|| "missing files payload".to_string())?;
                let files: Vec<std::path::PathBuf> =
                    $crate::dylib::parse_payload(raw_files, "files")?;
                let (options, context) = parse_call_payloads(options_ptr, context_ptr)?;
                Ok($crate::dylib::HookEnvelope::from_result(
                    $crate::NodeProvider::create_nodes(
                        &PROVIDER,
                        &files,
                        options.as_ref(),
                        &context,
                    ),
                ))
            })()
            .unwrap_or_else($crate::dylib::HookEnvelope::Failure);
            envelope_to_c(envelope)
        }

        #[no_mangle]
        pub extern "C" fn provider_create_dependencies(
            options_ptr: *const c_char,
            context_ptr: *const c_char,
        ) -> *const c_char {
            let envelope = match parse_call_payloads(options_ptr, context_ptr) {
                Ok((options, context)) => $crate::dylib::HookEnvelope::from_result(
                    $crate::NodeProvider::create_dependencies(
                        &PROVIDER,
                        options.as_ref(),
                        &context,
                    ),
                ),
                Err(message) => $crate::dylib::HookEnvelope::Failure(message),
            };
            envelope_to_c(envelope)
        }

        #[no_mangle]
        pub extern "C" fn provider_create_metadata(
            options_ptr: *const c_char,
            context_ptr: *const c_char,
        ) -> *const c_char {
            let envelope = match parse_call_payloads(options_ptr, context_ptr) {
                Ok((options, context)) => $crate::dylib::HookEnvelope::from_result(
                    $crate::NodeProvider::create_metadata(&PROVIDER, options.as_ref(), &context),
                ),
                Err(message) => $crate::dylib::HookEnvelope::Failure(message),
            };
            envelope_to_c(envelope)
        }

        #[no_mangle]
        pub extern "C" fn provider_post_process_graph(
            nodes_ptr: *const c_char,
            options_ptr: *const c_char,
            context_ptr: *const c_char,
        ) -> *const c_char {
            let envelope = (|| {
                let raw_nodes = read_c_string(nodes_ptr)
                    .ok_or_else(|| "missing nodes payload".to_string())?;
                let nodes: $crate::ProjectGraphNodes =
                    $crate::dylib::parse_payload(raw_nodes, "nodes")?;
                let (options, context) = parse_call_payloads(options_ptr, context_ptr)?;
                Ok($crate::dylib::HookEnvelope::from_result(
                    $crate::NodeProvider::post_process_graph(
                        &PROVIDER,
                        nodes,
                        options.as_ref(),
                        &context,
                    ),
                ))
            })()
            .unwrap_or_else($crate::dylib::HookEnvelope::Failure);
            envelope_to_c(envelope)
        }

        /// Safe wrapper for reclaiming provider-allocated strings.
        fn cleanup_string_safe(ptr: *const c_char) {
            if !ptr.is_null() {
                unsafe {
                    let _ = CString::from_raw(ptr as *mut c_char);
                }
            }
        }

        #[no_mangle]
        pub extern "C" fn provider_cleanup_string(ptr: *const c_char) {
            cleanup_string_safe(ptr);
        }
    };
}

pub use export_node_provider;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeResult;

    #[test]
    fn envelope_round_trips_success() {
        let envelope = HookEnvelope::from_result(Ok(NodeResult::default()));
        let json = serde_json::to_string(&envelope).unwrap();
        let back: HookEnvelope = serde_json::from_str(&json).unwrap();
        let result: NodeResult = back.into_result().unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn envelope_preserves_partial_outcomes() {
        let err = PartialNodeCreationError {
            results: Vec::new(),
            failures: vec![NodeCreationFailure::for_file("a/build.gradle", "boom")],
        };
        let envelope = HookEnvelope::from_result::<NodeResult>(Err(err.into()));
        let json = serde_json::to_string(&envelope).unwrap();

        let back: HookEnvelope = serde_json::from_str(&json).unwrap();
        let restored = back
            .into_result::<NodeResult>()
            .expect_err("partial outcome must stay an error");
        let partial = restored
            .downcast::<PartialNodeCreationError>()
            .expect("must downcast back to the partial error");
        assert_eq!(partial.failures.len(), 1);
        assert_eq!(partial.failures[0].message, "boom");
    }

    #[test]
    fn envelope_flattens_opaque_errors_to_messages() {
        let envelope =
            HookEnvelope::from_result::<NodeResult>(Err(anyhow::anyhow!("manifest unreadable")));
        match &envelope {
            HookEnvelope::Failure(message) => assert!(message.contains("manifest unreadable")),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }
}
