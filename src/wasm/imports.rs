//! Host functions the ephemeris module imports.
//!
//! The module is built with its cooperative scheduler disabled and panics set
//! to trap, so its runtime only reaches out to the host through a small,
//! fixed table. [`HostImport`] enumerates that table; anything else the module
//! declares is rejected before instantiation.
//!
//! Three imports do real work: `fd_write` forwards console output,
//! `random_get` fills guest memory from the operating system RNG and
//! `proc_exit` unwinds the guest. The `syscall/js.*` bridge entries link so
//! that a js/wasm build instantiates, but trap with [`UnavailableImport`] if
//! the module ever calls one. Every other entry is an inert stub that returns
//! zeros of its declared result types.

use std::io::Write as _;

use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use wasmtime::{Caller, Extern, ExternType, FuncType, Linker, Memory, Module, Val, ValType};

use super::error::WasmError;
use crate::logging::{debug, info, trace, warn};
use crate::memory::{RegionDescriptor, read_region};

/// Import module name for the OS shim functions.
pub const WASI_MODULE: &str = "wasi_snapshot_preview1";

/// Import module name for the language runtime support functions.
pub const ENV_MODULE: &str = "env";

const ERRNO_SUCCESS: i32 = 0;
const ERRNO_FAULT: i32 = 21;
const ERRNO_IO: i32 = 29;

/// Which part of the import table an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportGroup {
    /// Minimal operating system shim (`wasi_snapshot_preview1`).
    OsShim,
    /// Language runtime hooks (`env`).
    RuntimeSupport,
    /// JavaScript value bridge (`env`, `syscall/js.*`). Linked, never served.
    JsBridge,
}

/// Closed set of host functions the module may import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostImport {
    FdWrite,
    FdClose,
    FdFdstatGet,
    FdSeek,
    ProcExit,
    RandomGet,
    RuntimeAlloc,
    MainMain,
    StartTimer,
    StopTimer,
    ResetTimer,
    AtomicAddInt32,
    JsFinalizeRef,
    JsStringVal,
    JsValueGet,
    JsValueSet,
    JsValueDelete,
    JsValueIndex,
    JsValueSetIndex,
    JsValueCall,
    JsValueInvoke,
    JsValueNew,
    JsValueLength,
    JsValuePrepareString,
    JsValueLoadString,
    JsValueInstanceOf,
    JsCopyBytesToGo,
    JsCopyBytesToJs,
}

impl HostImport {
    /// Every supported import.
    pub const ALL: [HostImport; 28] = [
        HostImport::FdWrite,
        HostImport::FdClose,
        HostImport::FdFdstatGet,
        HostImport::FdSeek,
        HostImport::ProcExit,
        HostImport::RandomGet,
        HostImport::RuntimeAlloc,
        HostImport::MainMain,
        HostImport::StartTimer,
        HostImport::StopTimer,
        HostImport::ResetTimer,
        HostImport::AtomicAddInt32,
        HostImport::JsFinalizeRef,
        HostImport::JsStringVal,
        HostImport::JsValueGet,
        HostImport::JsValueSet,
        HostImport::JsValueDelete,
        HostImport::JsValueIndex,
        HostImport::JsValueSetIndex,
        HostImport::JsValueCall,
        HostImport::JsValueInvoke,
        HostImport::JsValueNew,
        HostImport::JsValueLength,
        HostImport::JsValuePrepareString,
        HostImport::JsValueLoadString,
        HostImport::JsValueInstanceOf,
        HostImport::JsCopyBytesToGo,
        HostImport::JsCopyBytesToJs,
    ];

    /// Import module the entry lives under.
    pub const fn module(self) -> &'static str {
        match self.group() {
            ImportGroup::OsShim => WASI_MODULE,
            ImportGroup::RuntimeSupport | ImportGroup::JsBridge => ENV_MODULE,
        }
    }

    /// Import field name, exactly as the module build declares it.
    pub const fn name(self) -> &'static str {
        match self {
            HostImport::FdWrite => "fd_write",
            HostImport::FdClose => "fd_close",
            HostImport::FdFdstatGet => "fd_fdstat_get",
            HostImport::FdSeek => "fd_seek",
            HostImport::ProcExit => "proc_exit",
            HostImport::RandomGet => "random_get",
            HostImport::RuntimeAlloc => "runtime.alloc",
            HostImport::MainMain => "main.main",
            HostImport::StartTimer => "time.startTimer",
            HostImport::StopTimer => "time.stopTimer",
            HostImport::ResetTimer => "time.resetTimer",
            HostImport::AtomicAddInt32 => "sync/atomic.AddInt32",
            HostImport::JsFinalizeRef => "syscall/js.finalizeRef",
            HostImport::JsStringVal => "syscall/js.stringVal",
            HostImport::JsValueGet => "syscall/js.valueGet",
            HostImport::JsValueSet => "syscall/js.valueSet",
            HostImport::JsValueDelete => "syscall/js.valueDelete",
            HostImport::JsValueIndex => "syscall/js.valueIndex",
            HostImport::JsValueSetIndex => "syscall/js.valueSetIndex",
            HostImport::JsValueCall => "syscall/js.valueCall",
            HostImport::JsValueInvoke => "syscall/js.valueInvoke",
            HostImport::JsValueNew => "syscall/js.valueNew",
            HostImport::JsValueLength => "syscall/js.valueLength",
            HostImport::JsValuePrepareString => "syscall/js.valuePrepareString",
            HostImport::JsValueLoadString => "syscall/js.valueLoadString",
            HostImport::JsValueInstanceOf => "syscall/js.valueInstanceOf",
            HostImport::JsCopyBytesToGo => "syscall/js.copyBytesToGo",
            HostImport::JsCopyBytesToJs => "syscall/js.copyBytesToJS",
        }
    }

    pub const fn group(self) -> ImportGroup {
        match self {
            HostImport::FdWrite
            | HostImport::FdClose
            | HostImport::FdFdstatGet
            | HostImport::FdSeek
            | HostImport::ProcExit
            | HostImport::RandomGet => ImportGroup::OsShim,
            HostImport::RuntimeAlloc
            | HostImport::MainMain
            | HostImport::StartTimer
            | HostImport::StopTimer
            | HostImport::ResetTimer
            | HostImport::AtomicAddInt32 => ImportGroup::RuntimeSupport,
            HostImport::JsFinalizeRef
            | HostImport::JsStringVal
            | HostImport::JsValueGet
            | HostImport::JsValueSet
            | HostImport::JsValueDelete
            | HostImport::JsValueIndex
            | HostImport::JsValueSetIndex
            | HostImport::JsValueCall
            | HostImport::JsValueInvoke
            | HostImport::JsValueNew
            | HostImport::JsValueLength
            | HostImport::JsValuePrepareString
            | HostImport::JsValueLoadString
            | HostImport::JsValueInstanceOf
            | HostImport::JsCopyBytesToGo
            | HostImport::JsCopyBytesToJs => ImportGroup::JsBridge,
        }
    }

    /// Whether the entry is an inert stub returning a fixed sentinel.
    ///
    /// Bridge entries are not stubs: calling one traps.
    pub const fn is_stub(self) -> bool {
        match self {
            HostImport::FdWrite | HostImport::ProcExit | HostImport::RandomGet => false,
            other => !matches!(other.group(), ImportGroup::JsBridge),
        }
    }

    /// Find the entry for a declared `(module, name)` import.
    pub fn lookup(module: &str, name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|import| import.module() == module && import.name() == name)
    }
}

/// Trap payload raised by `proc_exit`.
///
/// The loader downcasts traps to this type to tell a clean exit during
/// startup apart from a real failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("guest exited with status {0}")]
pub struct GuestExit(pub i32);

/// Trap payload raised when the module calls a bridge import.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("host import '{0}' is not available without a JavaScript host")]
pub struct UnavailableImport(pub &'static str);

/// Where console output written by the module ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConsoleSink {
    /// Emit each line as an info event under the `weph::guest` target.
    Log,
    /// Print each line to the host's stdout.
    Stdout,
    /// Print each line to the host's stderr.
    #[default]
    Stderr,
    /// Keep lines in memory; see [`ModuleHandle::console_lines`](super::ModuleHandle::console_lines).
    Capture,
    /// Drop all output.
    Discard,
}

/// Options for the host side of the import environment.
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// Destination for guest console output.
    pub console: ConsoleSink,
}

/// Line-buffering console fed by `fd_write`.
#[derive(Debug, Default)]
pub struct Console {
    sink: ConsoleSink,
    pending: Vec<u8>,
    captured: Vec<String>,
}

impl Console {
    pub fn new(sink: ConsoleSink) -> Self {
        Self {
            sink,
            pending: Vec::new(),
            captured: Vec::new(),
        }
    }

    /// Append bytes and flush every complete line to the sink.
    pub fn write(&mut self, fd: i32, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = raw.strip_suffix(b"\n").unwrap_or(&raw);
            let line = String::from_utf8_lossy(line).into_owned();
            self.emit(fd, line);
        }
    }

    /// Lines retained by the `Capture` sink.
    pub fn captured(&self) -> &[String] {
        &self.captured
    }

    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    fn emit(&mut self, fd: i32, line: String) {
        match self.sink {
            ConsoleSink::Log => {
                info!(target: "weph::guest", fd = fd, "{}", line);
            }
            ConsoleSink::Stdout => {
                let _ = writeln!(std::io::stdout(), "{}", line);
            }
            ConsoleSink::Stderr => {
                let _ = writeln!(std::io::stderr(), "{}", line);
            }
            ConsoleSink::Capture => self.captured.push(line),
            ConsoleSink::Discard => {}
        }
    }
}

/// Per-store state the host functions act on.
#[derive(Debug)]
pub struct HostState {
    pub(crate) console: Console,
}

impl HostState {
    pub fn new(options: &HostOptions) -> Self {
        Self {
            console: Console::new(options.console),
        }
    }
}

/// The import table resolved against one compiled module.
///
/// [`ImportEnvironment::resolve`] checks every import the module declares
/// against [`HostImport`]; [`ImportEnvironment::define`] then registers the
/// matching host functions on a linker.
#[derive(Debug)]
pub struct ImportEnvironment {
    entries: Vec<(HostImport, FuncType)>,
}

impl ImportEnvironment {
    /// Map the module's declared imports onto the supported table.
    pub fn resolve(module: &Module) -> Result<Self, WasmError> {
        let mut entries = Vec::new();
        for import in module.imports() {
            let unsupported = || WasmError::UnsupportedImport {
                module: import.module().to_string(),
                name: import.name().to_string(),
            };
            let host = HostImport::lookup(import.module(), import.name()).ok_or_else(|| {
                warn!(
                    module = import.module(),
                    name = import.name(),
                    "module declares an unsupported import"
                );
                unsupported()
            })?;
            let ExternType::Func(ty) = import.ty() else {
                return Err(unsupported());
            };
            entries.push((host, ty));
        }
        debug!(imports = entries.len(), "resolved import environment");
        Ok(Self { entries })
    }

    /// Register every resolved import on `linker`.
    pub fn define(&self, linker: &mut Linker<HostState>) -> Result<(), WasmError> {
        for (host, ty) in &self.entries {
            trace!(module = host.module(), name = host.name(), "linking import");
            match host {
                HostImport::FdWrite => {
                    linker.func_wrap(
                        WASI_MODULE,
                        host.name(),
                        |mut caller: Caller<'_, HostState>,
                         fd: i32,
                         iovs: i32,
                         iovs_len: i32,
                         nwritten: i32|
                         -> i32 {
                            fd_write(&mut caller, fd, iovs, iovs_len, nwritten)
                                .unwrap_or_else(|errno| errno)
                        },
                    )?;
                }
                HostImport::RandomGet => {
                    linker.func_wrap(
                        WASI_MODULE,
                        host.name(),
                        |mut caller: Caller<'_, HostState>, buf: i32, len: i32| -> i32 {
                            random_get(&mut caller, buf, len).unwrap_or_else(|errno| errno)
                        },
                    )?;
                }
                HostImport::ProcExit => {
                    linker.func_wrap(
                        WASI_MODULE,
                        host.name(),
                        |code: i32| -> wasmtime::Result<()> {
                            debug!(code = code, "guest called proc_exit");
                            Err(wasmtime::Error::new(GuestExit(code)))
                        },
                    )?;
                }
                stub if stub.is_stub() => define_stub(linker, *stub, ty.clone())?,
                bridge => define_unavailable(linker, *bridge, ty.clone())?,
            }
        }
        Ok(())
    }
}

fn define_stub(
    linker: &mut Linker<HostState>,
    host: HostImport,
    ty: FuncType,
) -> Result<(), WasmError> {
    let results: Vec<ValType> = ty.results().collect();
    let name = host.name();
    linker.func_new(host.module(), name, ty, move |_caller, _params, out| {
        for (slot, result_ty) in out.iter_mut().zip(&results) {
            *slot = zero_value(result_ty).ok_or_else(|| {
                wasmtime::Error::msg(format!("stub '{}' cannot return {:?}", name, result_ty))
            })?;
        }
        Ok(())
    })?;
    Ok(())
}

fn define_unavailable(
    linker: &mut Linker<HostState>,
    host: HostImport,
    ty: FuncType,
) -> Result<(), WasmError> {
    let name = host.name();
    linker.func_new(host.module(), name, ty, move |_caller, _params, _out| {
        warn!(name = name, "module called a bridge import");
        Err(wasmtime::Error::new(UnavailableImport(name)))
    })?;
    Ok(())
}

fn zero_value(ty: &ValType) -> Option<Val> {
    match ty {
        ValType::I32 => Some(Val::I32(0)),
        ValType::I64 => Some(Val::I64(0)),
        ValType::F32 => Some(Val::F32(0)),
        ValType::F64 => Some(Val::F64(0)),
        _ => None,
    }
}

fn guest_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    caller.get_export("memory").and_then(Extern::into_memory)
}

fn fd_write(
    caller: &mut Caller<'_, HostState>,
    fd: i32,
    iovs: i32,
    iovs_len: i32,
    nwritten: i32,
) -> Result<i32, i32> {
    let memory = guest_memory(caller).ok_or(ERRNO_FAULT)?;
    let count = usize::try_from(iovs_len).map_err(|_| ERRNO_FAULT)?;

    let bytes = {
        let data = memory.data(&*caller);
        // Each iovec is a (buf: u32, buf_len: u32) pair.
        let pairs: Vec<i32> = read_region(
            data,
            &RegionDescriptor::of::<i32>(iovs as u32, count.saturating_mul(2)),
        )
        .map_err(|_| ERRNO_FAULT)?;

        let mut bytes = Vec::new();
        for pair in pairs.chunks_exact(2) {
            let [ptr, len] = pair else {
                return Err(ERRNO_FAULT);
            };
            let start = *ptr as u32 as usize;
            let end = start
                .checked_add(*len as u32 as usize)
                .ok_or(ERRNO_FAULT)?;
            bytes.extend_from_slice(data.get(start..end).ok_or(ERRNO_FAULT)?);
        }
        bytes
    };

    let written = u32::try_from(bytes.len()).map_err(|_| ERRNO_FAULT)?;
    memory
        .write(&mut *caller, nwritten as u32 as usize, &written.to_le_bytes())
        .map_err(|_| ERRNO_FAULT)?;
    caller.data_mut().console.write(fd, &bytes);
    Ok(ERRNO_SUCCESS)
}

fn random_get(caller: &mut Caller<'_, HostState>, buf: i32, len: i32) -> Result<i32, i32> {
    let memory = guest_memory(caller).ok_or(ERRNO_FAULT)?;
    let len = len as u32 as usize;
    if len > memory.data_size(&*caller) {
        return Err(ERRNO_FAULT);
    }

    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes).map_err(|_| ERRNO_IO)?;
    memory
        .write(&mut *caller, buf as u32 as usize, &bytes)
        .map_err(|_| ERRNO_FAULT)?;
    Ok(ERRNO_SUCCESS)
}
