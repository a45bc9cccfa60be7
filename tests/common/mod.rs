//! Common test utilities and fixtures.
//!
//! The fixture is a WAT module that links the full host import table and
//! exports the ephemeris surface with deterministic fake arithmetic, so the
//! loader and facade can be exercised without the real artifact.

#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use weph::wasm::{ArtifactSource, BytesSource, WasmError};

// =============================================================================
// Fixture Layout
// =============================================================================

/// Scratch region for sunrise and sunset.
pub const SUN_OFFSET: u32 = 1024;
/// Scratch region for obliquity and local sidereal time.
pub const SKY_OFFSET: u32 = 1040;
/// Scratch region for the twelve house cusps.
pub const HOUSES_OFFSET: u32 = 1056;
/// Scratch region for the calendar sextuple.
pub const TIME_OFFSET: u32 = 1152;
/// Where `findLongitude` records the seven arguments it received, as f64.
pub const LONGITUDE_ARGS_OFFSET: u32 = 2048;
/// Set to 1 by `_start`.
pub const STARTED_OFFSET: u32 = 4000;

/// Obliquity the fixture reports, in radians.
pub const FIXTURE_OBLIQUITY: f64 = 0.409;

/// Julian day for which `jdToCalendar` reports second 60.
pub const ROLLOVER_JD: f64 = 1.0;
/// Julian day for which `jdToCalendar` reports February 30th.
pub const INVALID_JD: f64 = 2.0;

/// Line `_start` writes to stdout.
pub const STARTUP_LINE: &str = "weph ready";

const HOST_IMPORTS: &str = r#"
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_close" (func $fd_close (param i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_fdstat_get" (func $fd_fdstat_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_seek" (func $fd_seek (param i32 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (import "wasi_snapshot_preview1" "random_get" (func $random_get (param i32 i32) (result i32)))
  (import "env" "runtime.alloc" (func $alloc (param i32 i32 i32 i32) (result i32)))
  (import "env" "main.main" (func $main (param i32 i32)))
  (import "env" "time.startTimer" (func $start_timer (param i32 i32 i32)))
  (import "env" "time.stopTimer" (func $stop_timer (param i32 i32 i32) (result i32)))
  (import "env" "time.resetTimer" (func $reset_timer (param i32 i64 i32 i32) (result i32)))
  (import "env" "sync/atomic.AddInt32" (func $add_int32 (param i32 i32 i32 i32) (result i32)))
"#;

/// The `syscall/js` bridge a js/wasm build declares.
const JS_BRIDGE_IMPORTS: &str = r#"
  (import "env" "syscall/js.finalizeRef" (func $finalize_ref (param i64)))
  (import "env" "syscall/js.stringVal" (func $string_val (param i32 i32) (result i64)))
  (import "env" "syscall/js.valueGet" (func $value_get (param i64 i32 i32) (result i64)))
  (import "env" "syscall/js.valueSet" (func $value_set (param i64 i32 i32 i64)))
  (import "env" "syscall/js.valueDelete" (func $value_delete (param i64 i32 i32)))
  (import "env" "syscall/js.valueIndex" (func $value_index (param i64 i32) (result i64)))
  (import "env" "syscall/js.valueSetIndex" (func $value_set_index (param i64 i32 i64)))
  (import "env" "syscall/js.valueCall" (func $value_call (param i32 i64 i32 i32 i32 i32 i32)))
  (import "env" "syscall/js.valueInvoke" (func $value_invoke (param i32 i64 i32 i32)))
  (import "env" "syscall/js.valueNew" (func $value_new (param i32 i64 i32 i32)))
  (import "env" "syscall/js.valueLength" (func $value_length (param i64) (result i32)))
  (import "env" "syscall/js.valuePrepareString" (func $value_prepare_string (param i32 i64)))
  (import "env" "syscall/js.valueLoadString" (func $value_load_string (param i64 i32 i32)))
  (import "env" "syscall/js.valueInstanceOf" (func $value_instance_of (param i64 i64) (result i32)))
  (import "env" "syscall/js.copyBytesToGo" (func $copy_bytes_to_go (param i32 i32 i32 i64)))
  (import "env" "syscall/js.copyBytesToJS" (func $copy_bytes_to_js (param i32 i64 i32 i32)))
"#;

const EXPORTS: &str = r#"
  (func (export "angleFromDeg") (param f64) (result f64)
    (f64.mul (local.get 0) (f64.const 0.017453292519943295)))

  (func (export "findLongitude") (param i32 i32 f64 f64 f64 f64 i32) (result f64)
    (f64.store (i32.const 2048) (f64.convert_i32_s (local.get 0)))
    (f64.store (i32.const 2056) (f64.convert_i32_s (local.get 1)))
    (f64.store (i32.const 2064) (local.get 2))
    (f64.store (i32.const 2072) (local.get 3))
    (f64.store (i32.const 2080) (local.get 4))
    (f64.store (i32.const 2088) (local.get 5))
    (f64.store (i32.const 2096) (f64.convert_i32_s (local.get 6)))
    (f64.convert_i32_s (local.get 6)))

  (func (export "calendarGregorianToJD") (param i32 i32 f64) (result f64)
    (f64.add
      (f64.convert_i32_s
        (i32.add
          (i32.mul (local.get 0) (i32.const 10000))
          (i32.mul (local.get 1) (i32.const 100))))
      (local.get 2)))

  (func (export "findAscendingNode") (param f64) (result f64)
    (global.set $errors (f64.lt (local.get 0) (f64.const 0)))
    (f64.add (local.get 0) (f64.const 1)))

  (func (export "findMoonPhase") (param f64) (result i32)
    (i32.rem_s (i32.trunc_f64_s (local.get 0)) (i32.const 360)))

  (func (export "findStellarLongitude")
    (param f64 f64 f64 f64 f64 f64 f64 f64 f64 f64) (result f64)
    local.get 0
    local.get 1
    f64.add
    local.get 2
    f64.add
    local.get 3
    f64.add
    local.get 4
    f64.add
    local.get 5
    f64.add
    local.get 6
    f64.add
    local.get 7
    f64.add
    local.get 8
    f64.add
    local.get 9
    f64.add)

  (func (export "getSunRiseSetPtr") (result i32) (i32.const 1024))

  (func (export "findSunRiseSet") (param f64 f64 f64)
    (f64.store (i32.const 1024) (f64.sub (local.get 0) (f64.const 0.25)))
    (f64.store (i32.const 1032) (f64.add (local.get 0) (f64.const 0.25))))

  (func (export "getObliquityLSTContainer") (result i32) (i32.const 1040))

  (func (export "findObliquityLST") (param f64 f64)
    (f64.store (i32.const 1040) (f64.const 0.409))
    (f64.store (i32.const 1048) (f64.add (local.get 1) (f64.const 1))))

  (func (export "getHouseContainer") (result i32) (i32.const 1056))

  (func (export "findHouses") (param f64 f64 f64)
    (local $i i32)
    (loop $next
      (f64.store
        (i32.add (i32.const 1056) (i32.mul (local.get $i) (i32.const 8)))
        (f64.add
          (f64.mul
            (f64.convert_i32_s (i32.add (local.get $i) (i32.const 1)))
            (f64.const 30))
          (local.get 2)))
      (local.set $i (i32.add (local.get $i) (i32.const 1)))
      (br_if $next (i32.lt_s (local.get $i) (i32.const 12)))))

  (func (export "getTimeContainer") (result i32) (i32.const 1152))

  (func $write_time (param i32 i32 i32 i32 i32 i32)
    (i32.store (i32.const 1152) (local.get 0))
    (i32.store (i32.const 1156) (local.get 1))
    (i32.store (i32.const 1160) (local.get 2))
    (i32.store (i32.const 1164) (local.get 3))
    (i32.store (i32.const 1168) (local.get 4))
    (i32.store (i32.const 1172) (local.get 5)))

  (func (export "jdToCalendar") (param f64)
    (if (f64.eq (local.get 0) (f64.const 1))
      (then
        (call $write_time
          (i32.const 2016) (i32.const 11) (i32.const 31)
          (i32.const 23) (i32.const 59) (i32.const 60)))
      (else
        (if (f64.eq (local.get 0) (f64.const 2))
          (then
            (call $write_time
              (i32.const 2022) (i32.const 1) (i32.const 30)
              (i32.const 0) (i32.const 0) (i32.const 0)))
          (else
            (call $write_time
              (i32.const 2022) (i32.const 0) (i32.const 19)
              (i32.const 20) (i32.const 23) (i32.const 0)))))))
"#;

const ANY_ERRORS_EXPORT: &str = r#"
  (func (export "anyErrors") (result i32) (global.get $errors))
"#;

// =============================================================================
// Fixture Builder
// =============================================================================

/// Builder for fixture module variants.
#[derive(Debug, Clone)]
pub struct Fixture {
    extra_imports: Vec<String>,
    start_tail: String,
    any_errors: bool,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            extra_imports: Vec::new(),
            start_tail: String::new(),
            any_errors: true,
        }
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an additional import, e.g. one the host does not provide.
    pub fn with_import(mut self, import: &str) -> Self {
        self.extra_imports.push(import.to_string());
        self
    }

    /// Declare the full `syscall/js` bridge, as a js/wasm build does.
    pub fn with_js_bridge(self) -> Self {
        self.with_import(JS_BRIDGE_IMPORTS)
    }

    /// Instructions appended to the end of `_start`.
    pub fn with_start_tail(mut self, tail: &str) -> Self {
        self.start_tail = tail.to_string();
        self
    }

    /// `_start` ends with `proc_exit(code)`.
    pub fn exiting_with(self, code: i32) -> Self {
        self.with_start_tail(&format!("(call $proc_exit (i32.const {}))", code))
    }

    /// Leave out the pending-error export.
    pub fn without_any_errors(mut self) -> Self {
        self.any_errors = false;
        self
    }

    /// The module as WebAssembly text.
    pub fn wat(&self) -> String {
        format!(
            r#"(module
{imports}
{extra}
  (memory (export "memory") 1)
  (global $errors (mut i32) (i32.const 0))
  (data (i32.const 3000) "{line}\n")

  (func (export "_start")
    (i32.store (i32.const 3100) (i32.const 3000))
    (i32.store (i32.const 3104) (i32.const {len}))
    (drop (call $fd_write (i32.const 1) (i32.const 3100) (i32.const 1) (i32.const 3108)))
    (drop (call $random_get (i32.const 3200) (i32.const 16)))
    (drop (call $fd_close (i32.const 1)))
    (drop (call $alloc (i32.const 16) (i32.const 0) (i32.const 0) (i32.const 0)))
    (i32.store (i32.const 4000) (i32.const 1))
    {tail})
{exports}
{any_errors}
)"#,
            imports = HOST_IMPORTS,
            extra = self.extra_imports.join("\n"),
            line = STARTUP_LINE,
            len = STARTUP_LINE.len() + 1,
            tail = self.start_tail,
            exports = EXPORTS,
            any_errors = if self.any_errors { ANY_ERRORS_EXPORT } else { "" },
        )
    }

    pub fn source(&self) -> BytesSource {
        BytesSource::new("fixture.wat", self.wat().into_bytes())
    }
}

// =============================================================================
// Instrumented Sources
// =============================================================================

/// Source that counts fetches and can be slowed down.
#[derive(Debug, Clone)]
pub struct CountingSource {
    inner: BytesSource,
    fetches: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingSource {
    pub fn new(fixture: &Fixture) -> Self {
        Self {
            inner: fixture.source(),
            fetches: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for CountingSource {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    async fn fetch(&self) -> Result<Vec<u8>, WasmError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.fetch().await
    }
}

/// Source whose first `failures` fetches fail.
#[derive(Debug)]
pub struct FlakySource {
    inner: BytesSource,
    failures: usize,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl FlakySource {
    pub fn new(fixture: &Fixture, failures: usize) -> Self {
        Self {
            inner: fixture.source(),
            failures,
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Hold every fetch open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for FlakySource {
    fn describe(&self) -> String {
        "flaky".to_string()
    }

    async fn fetch(&self) -> Result<Vec<u8>, WasmError> {
        let attempt = self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if attempt < self.failures {
            return Err(WasmError::Fetch {
                source_name: self.describe(),
                source: Arc::new(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
            });
        }
        self.inner.fetch().await
    }
}

// =============================================================================
// Real Artifact
// =============================================================================

/// Location of the compiled ephemeris module, if one is available.
pub fn real_artifact() -> Option<PathBuf> {
    let path = std::env::var_os("WEPH_WASM")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(weph::wasm::DEFAULT_ARTIFACT_PATH)
        });
    path.exists().then_some(path)
}

pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}
