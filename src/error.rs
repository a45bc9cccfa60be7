//! Unified error type for the weph library.
//!
//! [`Error`] wraps the module-specific errors so callers of the facade can
//! use a single error type.

use thiserror::Error;

use crate::calendar::CalendarError;
#[cfg(feature = "config")]
use crate::config::ConfigError;
use crate::memory::MemoryError;
use crate::types::ParseBodyError;
use crate::wasm::WasmError;

/// Unified error type for all weph operations.
///
/// # Example
///
/// ```ignore
/// use weph::{Body, Result};
///
/// fn saturn(ephemeris: &Ephemeris, at: &DateTime<Utc>, observer: &GeoCoordinate) -> Result<f64> {
///     ephemeris.longitude(at, observer, Body::Saturn)
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Loading the module or calling into it failed.
    #[error(transparent)]
    Wasm(#[from] WasmError),

    /// Reading a scratch region failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// The module produced calendar fields that are not an instant.
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    /// A body name did not parse.
    #[error(transparent)]
    Body(#[from] ParseBodyError),

    /// Configuration could not be loaded.
    #[cfg(feature = "config")]
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this is a module load or call error.
    pub fn is_wasm(&self) -> bool {
        matches!(self, Self::Wasm(_))
    }

    /// Returns `true` if the module's startup exited with a status.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Wasm(WasmError::Exit(code)) => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if this is a calendar decoding error.
    pub fn is_calendar(&self) -> bool {
        matches!(self, Self::Calendar(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let exit: Error = WasmError::Exit(3).into();
        assert!(exit.is_wasm());
        assert_eq!(exit.exit_code(), Some(3));

        let calendar: Error = CalendarError::InvalidFields {
            fields: [0, 12, 1, 0, 0, 0],
        }
        .into();
        assert!(calendar.is_calendar());
        assert_eq!(calendar.exit_code(), None);

        let body: Error = ParseBodyError("pluto".to_string()).into();
        assert_eq!(body.to_string(), "Unknown body 'pluto'");
    }
}
