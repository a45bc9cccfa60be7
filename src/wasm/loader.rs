//! Fetching, instantiating and starting the ephemeris module.
//!
//! ## Example
//!
//! ```ignore
//! use weph::wasm::{FileSource, ModuleLoader};
//!
//! let loader = ModuleLoader::new(FileSource::new("assets/weph.wasm"))?;
//!
//! // First call fetches, instantiates and runs `_start`.
//! let ephemeris = loader.resolve().await?;
//!
//! // Later calls reuse the same instance.
//! let again = loader.load().await?;
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use wasmtime::{Config, Engine, Instance, Linker, Module, Store};

use super::error::WasmError;
use super::exports::{ExportTable, START_EXPORT, trap_error};
use super::handle::{ModuleHandle, Session};
use super::imports::{GuestExit, HostOptions, HostState, ImportEnvironment};
use crate::facade::Ephemeris;
use crate::logging::{debug, error, info, trace};

/// Well-known location of the compiled module.
pub const DEFAULT_ARTIFACT_PATH: &str = "assets/weph.wasm";

/// Where the module bytes come from.
///
/// Bytes may be a binary module or WebAssembly text.
pub trait ArtifactSource: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn describe(&self) -> String;

    /// Fetch the module bytes.
    fn fetch(&self) -> impl Future<Output = Result<Vec<u8>, WasmError>> + Send;
}

/// Artifact read from the filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new(DEFAULT_ARTIFACT_PATH)
    }
}

impl ArtifactSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<Vec<u8>, WasmError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| WasmError::Fetch {
                source_name: self.describe(),
                source: Arc::new(source),
            })
    }
}

/// Artifact already held in memory.
#[derive(Debug, Clone)]
pub struct BytesSource {
    label: String,
    bytes: Arc<[u8]>,
}

impl BytesSource {
    pub fn new(label: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            label: label.into(),
            bytes: bytes.into(),
        }
    }
}

impl ArtifactSource for BytesSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn fetch(&self) -> Result<Vec<u8>, WasmError> {
        Ok(self.bytes.to_vec())
    }
}

/// Memoizing loader for the ephemeris module.
///
/// The first successful [`load`](Self::load) creates the [`ModuleHandle`];
/// every later call returns a clone of it. Concurrent callers join a single
/// in-flight attempt and all observe its outcome, success or failure. A
/// failed attempt is dropped once it settles, so the next call starts over
/// from the fetch.
pub struct ModuleLoader<S> {
    inner: Arc<LoaderInner<S>>,
    slot: Mutex<Option<Slot>>,
}

struct LoaderInner<S> {
    source: S,
    engine: Engine,
    options: HostOptions,
}

type Attempt = Shared<BoxFuture<'static, Result<ModuleHandle, WasmError>>>;

enum Slot {
    Ready(ModuleHandle),
    Pending(Attempt),
}

impl<S: ArtifactSource + 'static> ModuleLoader<S> {
    /// Create a loader with default host options.
    pub fn new(source: S) -> Result<Self, WasmError> {
        Self::with_options(source, HostOptions::default())
    }

    /// Create a loader with explicit host options.
    pub fn with_options(source: S, options: HostOptions) -> Result<Self, WasmError> {
        trace!("creating wasmtime engine");
        let config = Config::new();
        let engine = Engine::new(&config)?;

        Ok(Self {
            inner: Arc::new(LoaderInner {
                source,
                engine,
                options,
            }),
            slot: Mutex::new(None),
        })
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Whether a handle has already been created.
    pub fn is_loaded(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| matches!(*slot, Some(Slot::Ready(_))))
            .unwrap_or(false)
    }

    /// Return the module handle, loading the module on first use.
    pub async fn load(&self) -> Result<ModuleHandle, WasmError> {
        let attempt = {
            let mut slot = self.slot.lock().map_err(|_| WasmError::Poisoned)?;
            let joined = match &*slot {
                Some(Slot::Ready(handle)) => return Ok(handle.clone()),
                Some(Slot::Pending(attempt)) => Some(attempt.clone()),
                None => None,
            };
            match joined {
                Some(attempt) => {
                    trace!("joining in-flight module load");
                    attempt
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let attempt = async move { inner.instantiate().await }.boxed().shared();
                    *slot = Some(Slot::Pending(attempt.clone()));
                    attempt
                }
            }
        };

        let outcome = attempt.clone().await;

        let mut slot = self.slot.lock().map_err(|_| WasmError::Poisoned)?;
        // Only the attempt still parked in the slot may settle it
        let settles = matches!(&*slot, Some(Slot::Pending(current)) if current.ptr_eq(&attempt));
        if settles {
            *slot = match &outcome {
                Ok(handle) => Some(Slot::Ready(handle.clone())),
                Err(_) => None,
            };
        }
        outcome
    }

    /// Return the domain facade over the loaded module.
    pub async fn resolve(&self) -> Result<Ephemeris, WasmError> {
        self.load().await.map(Ephemeris::new)
    }
}

impl<S: ArtifactSource> LoaderInner<S> {
    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    async fn instantiate(&self) -> Result<ModuleHandle, WasmError> {
        let source_name = self.source.describe();
        info!(source = %source_name, "loading ephemeris module");

        let bytes = self.source.fetch().await.map_err(|e| {
            error!(source = %source_name, error = %e, "module fetch failed");
            e
        })?;

        trace!(bytes = bytes.len(), "compiling module");
        let module = Module::new(&self.engine, &bytes)?;

        let imports = ImportEnvironment::resolve(&module)?;
        let mut linker = Linker::new(&self.engine);
        imports.define(&mut linker)?;

        let mut store = Store::new(&self.engine, HostState::new(&self.options));
        trace!("instantiating module");
        let instance = linker.instantiate(&mut store, &module)?;

        run_start(&mut store, &instance)?;
        let exports = ExportTable::capture(&instance, &mut store)?;

        info!(source = %source_name, bytes = bytes.len(), "ephemeris module ready");
        Ok(ModuleHandle::new(Session::new(store, exports)))
    }
}

/// Drive the startup entrypoint once.
///
/// `proc_exit(0)` from inside `_start` is a normal return.
fn run_start(store: &mut Store<HostState>, instance: &Instance) -> Result<(), WasmError> {
    let func = instance
        .get_func(&mut *store, START_EXPORT)
        .ok_or_else(|| WasmError::MissingExport(START_EXPORT.to_string()))?;
    let start = func
        .typed::<(), ()>(&*store)
        .map_err(|e| WasmError::ExportSignature {
            name: START_EXPORT.to_string(),
            expected: "func()".to_string(),
            actual: e.to_string(),
        })?;

    debug!("running startup entrypoint");
    let Err(e) = start.call(&mut *store, ()) else {
        return Ok(());
    };
    match e.downcast_ref::<GuestExit>().copied() {
        Some(GuestExit(0)) => {
            debug!("startup exited cleanly");
            Ok(())
        }
        Some(GuestExit(code)) => {
            error!(code = code, "startup exited with failure status");
            Err(WasmError::Exit(code))
        }
        None => {
            error!(error = %e, "startup trapped");
            Err(trap_error(e))
        }
    }
}
