//! Host bindings for the weph ephemeris WebAssembly module.
//!
//! The ephemeris is computed by a precompiled core WebAssembly module. This
//! library loads it into wasmtime, supplies the runtime imports it links
//! against, runs its startup entrypoint, and exposes its exports as typed
//! operations.
//!
//! # Quick Start
//!
//! ```ignore
//! use weph::prelude::*;
//!
//! let loader = ModuleLoader::new(FileSource::new("assets/weph.wasm"))?;
//! let ephemeris = loader.resolve().await?;
//!
//! let observer = GeoCoordinate::new(42.0, -71.516667, 56.0832);
//! let at = DateTime::parse_from_rfc3339("2022-01-19T15:23:00-05:00")?;
//! let sun = ephemeris.longitude(&at, &observer, Body::Sun)?;
//! ```
//!
//! # Modules
//!
//! - [`wasm`] - Import environment, module loader and shared handle
//! - [`facade`] - Typed ephemeris operations over the handle
//! - [`memory`] - Bounds-checked reads of the module's scratch regions
//! - [`calendar`] - Instant encoding and calendar sextuple decoding
//! - [`types`] - Bodies, coordinates and result types
//! - [`config`] - TOML configuration (requires `config` feature)
//! - [`telemetry`] - Subscriber setup for the CLI (requires `cli` feature)
//!
//! # Feature Flags
//!
//! - `logging` - Enable library-level tracing (consumers provide their own subscriber)
//! - `serde` - Derive serde traits for result types
//! - `config` - Enable TOML configuration loading
//! - `cli` - Enable the command-line interface binary
//! - `full` - Enable all features

pub mod calendar;
#[cfg(feature = "config")]
pub mod config;
pub mod facade;
mod logging;
pub mod memory;
pub mod prelude;
#[cfg(feature = "cli")]
pub mod telemetry;
pub mod types;
pub mod wasm;

mod error;

// Re-export the unified error type
pub use error::{Error, Result};

pub use calendar::{CalendarArgs, CalendarError, decode_sextuple, encode_moment};
pub use facade::Ephemeris;
pub use memory::{Element, MemoryError, NumericKind, RegionDescriptor, read_region};
pub use types::{
    Body, GeoCoordinate, Houses, LongitudeResult, ObliquityLst, ParseBodyError, StarPosition,
    SunRiseSet, degs_to_rads, rads_to_degs,
};
pub use wasm::{
    ArtifactSource, BytesSource, ConsoleSink, FileSource, HostOptions, ModuleHandle, ModuleLoader,
    WasmError,
};
