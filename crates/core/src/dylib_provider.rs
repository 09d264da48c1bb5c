use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use libloading::{Library, Symbol};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use trellis_plugin_protocol::dylib::HookEnvelope;
use trellis_plugin_protocol::{
    FileNodes, NodeProvider, NodeResult, NodesHook, ProjectDependency, ProjectGraphNodes,
    ProjectMetadata, ProviderCapabilities, ProviderContext,
};

/// Plugin function signatures for the C ABI interface
type ProviderStringFn = unsafe extern "C" fn() -> *const c_char;
type ProviderHook2Fn = unsafe extern "C" fn(*const c_char, *const c_char) -> *const c_char;
type ProviderHook3Fn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_char) -> *const c_char;
type ProviderCleanupStringFn = unsafe extern "C" fn(*const c_char);

/// A node provider backed by a dynamic library plugin.
///
/// All payloads cross the boundary as JSON strings; hook results come back
/// inside a `HookEnvelope`, so partial node-creation outcomes survive the
/// crossing exactly as an in-process provider would report them.
pub struct DylibNodeProvider {
    name: String,
    capabilities: ProviderCapabilities,
    library: Library,
    _temp_dir: Option<tempfile::TempDir>, // Hold onto temp dir to prevent cleanup
    call_lock: Mutex<()>,                 // Prevent concurrent calls into the same plugin
}

impl DylibNodeProvider {
    /// Load a plugin from a dynamic library file.
    pub fn from_dylib(dylib_path: PathBuf) -> Result<Self> {
        let library = unsafe {
            Library::new(&dylib_path).with_context(|| {
                format!("Failed to load plugin library: {}", dylib_path.display())
            })?
        };

        Self::from_library(library, None)
    }

    /// Load a plugin from a dynamic library, working from a temporary copy.
    /// This is useful when loading from cache directories where the file might
    /// be locked or replaced while the run holds it open.
    pub fn from_dylib_with_temp_copy(dylib_path: PathBuf) -> Result<Self> {
        let temp_dir =
            tempfile::tempdir().context("Failed to create temporary directory for plugin")?;

        let filename = dylib_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid plugin path"))?;

        let temp_path = temp_dir.path().join(filename);
        std::fs::copy(&dylib_path, &temp_path)
            .with_context(|| "Failed to copy plugin to temporary location".to_string())?;

        let library = unsafe {
            Library::new(&temp_path).with_context(|| {
                format!("Failed to load plugin library: {}", temp_path.display())
            })?
        };

        Self::from_library(library, Some(temp_dir))
    }

    fn from_library(library: Library, temp_dir: Option<tempfile::TempDir>) -> Result<Self> {
        let name = Self::read_exported_string(&library, b"provider_name")?;
        if name.chars().any(char::is_whitespace) {
            return Err(anyhow::anyhow!(
                "Plugin name '{}' contains whitespace characters",
                name
            ));
        }

        let raw_capabilities = Self::read_exported_string(&library, b"provider_capabilities")?;
        let capabilities: ProviderCapabilities = serde_json::from_str(&raw_capabilities)
            .with_context(|| {
                format!("Plugin '{name}' returned invalid capabilities: {raw_capabilities}")
            })?;

        if capabilities.name != name {
            return Err(anyhow::anyhow!(
                "Plugin name '{}' does not match its declared capabilities name '{}'",
                name,
                capabilities.name
            ));
        }

        Ok(Self {
            name,
            capabilities,
            library,
            _temp_dir: temp_dir,
            call_lock: Mutex::new(()),
        })
    }

    /// The capability set the plugin declared at load time.
    pub fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    /// Read a parameterless string export such as `provider_name`.
    fn read_exported_string(library: &Library, symbol: &[u8]) -> Result<String> {
        unsafe {
            let func: Symbol<ProviderStringFn> = library.get(symbol).with_context(|| {
                format!("Plugin missing {} function", String::from_utf8_lossy(symbol))
            })?;

            let ptr = func();
            if ptr.is_null() {
                return Err(anyhow::anyhow!(
                    "Plugin function {} returned null",
                    String::from_utf8_lossy(symbol)
                ));
            }

            let value = CStr::from_ptr(ptr)
                .to_str()
                .context("Plugin returned invalid UTF-8")?
                .to_string();

            Self::cleanup_string(library, ptr);

            Ok(value)
        }
    }

    /// Hand a provider-allocated string back for deallocation, when the plugin
    /// exports a cleanup function.
    fn cleanup_string(library: &Library, ptr: *const c_char) {
        unsafe {
            if let Ok(cleanup_fn) =
                library.get::<Symbol<ProviderCleanupStringFn>>(b"provider_cleanup_string")
            {
                cleanup_fn(ptr);
            }
        }
    }

    /// Unpack a hook's returned envelope string into the provider's original
    /// `Result` shape.
    fn unpack_result<T: DeserializeOwned>(&self, ptr: *const c_char) -> Result<T> {
        if ptr.is_null() {
            return Err(anyhow::anyhow!(
                "Plugin '{}' hook returned null",
                self.name
            ));
        }

        let raw = unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .context("Plugin hook returned invalid UTF-8")
            .map(str::to_string);
        Self::cleanup_string(&self.library, ptr);

        let envelope: HookEnvelope = serde_json::from_str(&raw?)
            .with_context(|| format!("Plugin '{}' returned a malformed hook envelope", self.name))?;
        envelope.into_result()
    }

    fn encode_options(options: Option<&JsonValue>) -> Result<Option<CString>> {
        options
            .map(|value| {
                let json = serde_json::to_string(value)?;
                CString::new(json).context("options payload contains a NUL byte")
            })
            .transpose()
    }

    /// Invoke a `(options, context)` hook.
    fn invoke2<T: DeserializeOwned>(
        &self,
        symbol: &[u8],
        options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<T> {
        let _guard = self
            .call_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("plugin call mutex poisoned"))?;

        let options_cstr = Self::encode_options(options)?;
        let context_cstr = CString::new(serde_json::to_string(context)?)
            .context("context payload contains a NUL byte")?;

        let result_ptr = unsafe {
            let func: Symbol<ProviderHook2Fn> = self.library.get(symbol).with_context(|| {
                format!("Plugin missing {} function", String::from_utf8_lossy(symbol))
            })?;
            func(
                options_cstr
                    .as_ref()
                    .map_or(std::ptr::null(), |cstr| cstr.as_ptr()),
                context_cstr.as_ptr(),
            )
        };

        self.unpack_result(result_ptr)
    }

    /// Invoke a `(payload, options, context)` hook; `payload` is the file
    /// path, the JSON file list, or the JSON node set, depending on the hook.
    fn invoke3<T: DeserializeOwned>(
        &self,
        symbol: &[u8],
        payload: &str,
        options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<T> {
        let _guard = self
            .call_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("plugin call mutex poisoned"))?;

        let payload_cstr = CString::new(payload).context("hook payload contains a NUL byte")?;
        let options_cstr = Self::encode_options(options)?;
        let context_cstr = CString::new(serde_json::to_string(context)?)
            .context("context payload contains a NUL byte")?;

        let result_ptr = unsafe {
            let func: Symbol<ProviderHook3Fn> = self.library.get(symbol).with_context(|| {
                format!("Plugin missing {} function", String::from_utf8_lossy(symbol))
            })?;
            func(
                payload_cstr.as_ptr(),
                options_cstr
                    .as_ref()
                    .map_or(std::ptr::null(), |cstr| cstr.as_ptr()),
                context_cstr.as_ptr(),
            )
        };

        self.unpack_result(result_ptr)
    }
}

impl NodeProvider for DylibNodeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn nodes_hook(&self) -> Option<NodesHook> {
        self.capabilities.nodes_hook.clone()
    }

    fn create_nodes_for_file(
        &self,
        file: &std::path::Path,
        options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<NodeResult> {
        self.invoke3(
            b"provider_create_nodes_for_file",
            &file.to_string_lossy(),
            options,
            context,
        )
    }

    fn create_nodes(
        &self,
        files: &[PathBuf],
        options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<Vec<FileNodes>> {
        let payload = serde_json::to_string(files)?;
        self.invoke3(b"provider_create_nodes", &payload, options, context)
    }

    fn creates_dependencies(&self) -> bool {
        self.capabilities.creates_dependencies
    }

    fn create_dependencies(
        &self,
        options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<Vec<ProjectDependency>> {
        self.invoke2(b"provider_create_dependencies", options, context)
    }

    fn creates_metadata(&self) -> bool {
        self.capabilities.creates_metadata
    }

    fn create_metadata(
        &self,
        options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<indexmap::IndexMap<String, ProjectMetadata>> {
        self.invoke2(b"provider_create_metadata", options, context)
    }

    fn post_processes_graph(&self) -> bool {
        self.capabilities.post_processes_graph
    }

    fn post_process_graph(
        &self,
        nodes: ProjectGraphNodes,
        options: Option<&JsonValue>,
        context: &ProviderContext,
    ) -> Result<ProjectGraphNodes> {
        let payload = serde_json::to_string(&nodes)?;
        self.invoke3(b"provider_post_process_graph", &payload, options, context)
    }
}
