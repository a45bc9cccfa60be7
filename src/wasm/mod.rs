//! WebAssembly host for the ephemeris module.
//!
//! - [`HostImport`]: the host functions the module links against
//! - [`ModuleLoader`]: memoized fetch, instantiate and startup
//! - [`ModuleHandle`]: shared access to the started instance

mod error;
mod exports;
mod handle;
mod imports;
mod loader;

pub use error::WasmError;
pub use exports::{ExportName, MEMORY_EXPORT, START_EXPORT};
pub use handle::ModuleHandle;
pub use imports::{
    ConsoleSink, ENV_MODULE, GuestExit, HostImport, HostOptions, ImportGroup, UnavailableImport,
    WASI_MODULE,
};
pub use loader::{ArtifactSource, BytesSource, DEFAULT_ARTIFACT_PATH, FileSource, ModuleLoader};
