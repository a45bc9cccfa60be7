//! Convenient re-exports for common usage patterns.
//!
//! # Example
//!
//! ```ignore
//! use weph::prelude::*;
//!
//! let ephemeris = ModuleLoader::new(FileSource::default())?.resolve().await?;
//! let jd = ephemeris.julian_day(&Utc::now())?;
//! let phase = ephemeris.moon_phase(jd)?;
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// Loading
pub use crate::wasm::{
    ArtifactSource, BytesSource, ConsoleSink, FileSource, HostOptions, ModuleHandle, ModuleLoader,
    WasmError,
};

// Operations and their types
pub use crate::facade::Ephemeris;
pub use crate::types::{
    Body, GeoCoordinate, Houses, LongitudeResult, ObliquityLst, StarPosition, SunRiseSet,
};

// Dependency re-exports
pub use chrono::{DateTime, FixedOffset, Utc};
