//! Error types for loading and driving the ephemeris module.

use std::sync::Arc;

use thiserror::Error;

use crate::memory::MemoryError;

/// Errors that can occur while loading the module or calling its exports.
///
/// Cloneable so that every caller joined on one load attempt receives the
/// same failure.
#[derive(Error, Debug, Clone)]
pub enum WasmError {
    /// Failed to fetch the module artifact.
    #[error("Failed to fetch wasm module from '{source_name}': {source}")]
    Fetch {
        source_name: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Wasmtime engine, compilation or link error.
    #[error("Wasmtime error: {0}")]
    Wasmtime(Arc<wasmtime::Error>),

    /// The module imports a host function outside the supported table.
    #[error("Unsupported import '{module}::{name}'")]
    UnsupportedImport { module: String, name: String },

    /// Required export not found in the module.
    #[error("Export not found in module: {0}")]
    MissingExport(String),

    /// Export exists but has an unexpected shape.
    #[error("Invalid signature for export '{name}': expected {expected}, got {actual}")]
    ExportSignature {
        name: String,
        expected: String,
        actual: String,
    },

    /// The module called `proc_exit` with a non-zero status.
    #[error("Module exited with status {0}")]
    Exit(i32),

    /// WebAssembly execution trapped (runtime error).
    #[error("Wasm execution trapped: {0}")]
    Trap(String),

    /// Export returned a value the host cannot interpret.
    #[error("Invalid return type: expected {expected}")]
    InvalidReturnType { expected: String },

    /// Reading a scratch region failed.
    #[error("Memory read error: {0}")]
    Memory(#[from] MemoryError),

    /// A previous call panicked while holding the module lock.
    #[error("Module handle lock poisoned")]
    Poisoned,
}

impl From<wasmtime::Error> for WasmError {
    fn from(err: wasmtime::Error) -> Self {
        WasmError::Wasmtime(Arc::new(err))
    }
}
