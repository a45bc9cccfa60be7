//! Shared handle over an instantiated, started module.

use std::fmt;
use std::sync::{Arc, Mutex};

use wasmtime::Store;

use super::error::WasmError;
use super::exports::{ExportName, ExportTable};
use super::imports::HostState;
use crate::memory::{Element, RegionDescriptor, read_region};

/// Store plus captured exports. Only reachable through [`ModuleHandle`].
pub(crate) struct Session {
    store: Store<HostState>,
    exports: ExportTable,
}

impl Session {
    pub(crate) fn new(store: Store<HostState>, exports: ExportTable) -> Self {
        Self { store, exports }
    }

    /// Call a scalar-returning export.
    pub(crate) fn call(&mut self, name: ExportName, args: &[f64]) -> Result<f64, WasmError> {
        self.exports.func(name)?.call(&mut self.store, args)
    }

    /// Call a populate export that stages its result in memory.
    pub(crate) fn populate(&mut self, name: ExportName, args: &[f64]) -> Result<(), WasmError> {
        self.exports.func(name)?.call_void(&mut self.store, args)
    }

    /// Ask an accessor export for the current offset of its scratch region.
    pub(crate) fn offset(&mut self, name: ExportName) -> Result<u32, WasmError> {
        self.exports.func(name)?.call_offset(&mut self.store)
    }

    pub(crate) fn has_export(&self, name: ExportName) -> bool {
        self.exports.contains(name)
    }

    /// Copy a region out of the memory as it is right now.
    pub(crate) fn read_region<T: Element>(
        &self,
        descriptor: &RegionDescriptor,
    ) -> Result<Vec<T>, WasmError> {
        let data = self.exports.memory().data(&self.store);
        Ok(read_region(data, descriptor)?)
    }

    /// Copy `N` elements at `offset` into a fixed-size array.
    pub(crate) fn read_array<T: Element, const N: usize>(
        &self,
        offset: u32,
    ) -> Result<[T; N], WasmError> {
        let values = self.read_region::<T>(&RegionDescriptor::of::<T>(offset, N))?;
        values
            .try_into()
            .map_err(|values: Vec<T>| WasmError::InvalidReturnType {
                expected: format!("{} elements, got {}", N, values.len()),
            })
    }
}

/// Handle to the loaded ephemeris module.
///
/// Cloning is cheap and every clone refers to the same instance. Calls are
/// serialized by an internal lock, and each composite operation keeps the
/// lock from the populate call until its scratch region has been copied out.
#[derive(Clone)]
pub struct ModuleHandle {
    inner: Arc<Mutex<Session>>,
}

impl ModuleHandle {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Run `f` with exclusive access to the session.
    pub(crate) fn with_session<R, E>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<WasmError>,
    {
        let mut session = self.inner.lock().map_err(|_| WasmError::Poisoned)?;
        f(&mut session)
    }

    /// Copy a region out of the module's current memory.
    ///
    /// The module must already have populated the region; this only reads.
    pub fn read_region<T: Element>(
        &self,
        descriptor: &RegionDescriptor,
    ) -> Result<Vec<T>, WasmError> {
        self.with_session(|session| session.read_region(descriptor))
    }

    /// Current size of the module's linear memory in bytes.
    pub fn memory_size(&self) -> Result<usize, WasmError> {
        self.with_session(|session| Ok(session.exports.memory().data_size(&session.store)))
    }

    /// Console lines retained by the [`ConsoleSink::Capture`](super::ConsoleSink::Capture) sink.
    pub fn console_lines(&self) -> Result<Vec<String>, WasmError> {
        self.with_session(|session| Ok(session.store.data().console.captured().to_vec()))
    }

    /// Whether the module exports the named function.
    pub fn has_export(&self, name: ExportName) -> Result<bool, WasmError> {
        self.with_session(|session| Ok(session.has_export(name)))
    }

    /// Whether two handles refer to the same instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("instance", &Arc::as_ptr(&self.inner))
            .finish()
    }
}
