//! Domain types exchanged with the ephemeris facade.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Convert degrees to radians.
pub fn degs_to_rads(degs: f64) -> f64 {
    (std::f64::consts::PI / 180.0) * degs
}

/// Convert radians to degrees.
pub fn rads_to_degs(rads: f64) -> f64 {
    (180.0 / std::f64::consts::PI) * rads
}

/// Geographic position of the observer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoCoordinate {
    /// Latitude in degrees, north positive.
    pub latitude: f64,
    /// Longitude in degrees, east positive.
    pub longitude: f64,
    /// Height above mean sea level in meters.
    pub elevation: f64,
}

impl GeoCoordinate {
    pub const fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
        }
    }
}

/// Bodies the module computes longitudes for.
///
/// Discriminants are the module's body indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Body {
    Mercury = 0,
    Venus = 1,
    Earth = 2,
    Mars = 3,
    Jupiter = 4,
    Saturn = 5,
    Sun = 6,
    Moon = 7,
}

impl Body {
    pub const ALL: [Body; 8] = [
        Body::Mercury,
        Body::Venus,
        Body::Earth,
        Body::Mars,
        Body::Jupiter,
        Body::Saturn,
        Body::Sun,
        Body::Moon,
    ];

    /// Index passed to the module.
    pub const fn index(self) -> i32 {
        self as i32
    }

    pub const fn name(self) -> &'static str {
        match self {
            Body::Mercury => "mercury",
            Body::Venus => "venus",
            Body::Earth => "earth",
            Body::Mars => "mars",
            Body::Jupiter => "jupiter",
            Body::Saturn => "saturn",
            Body::Sun => "sun",
            Body::Moon => "moon",
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a body name is not recognized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown body '{0}'")]
pub struct ParseBodyError(pub String);

impl FromStr for Body {
    type Err = ParseBodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Body::ALL
            .into_iter()
            .find(|body| body.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseBodyError(s.to_string()))
    }
}

/// Ecliptic longitude, optionally with the time the module took to compute it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LongitudeResult {
    /// Topocentric ecliptic longitude in degrees.
    pub longitude: f64,
    /// Wall time spent inside the module, when measured.
    pub elapsed: Option<Duration>,
}

impl LongitudeResult {
    /// Elapsed time in milliseconds, when measured.
    pub fn perf_ms(&self) -> Option<f64> {
        self.elapsed.map(|d| d.as_secs_f64() * 1000.0)
    }
}

/// Catalog position of a fixed star.
///
/// Fields follow the granularity star catalogs use.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StarPosition {
    pub ra_hours: f64,
    pub ra_minutes: f64,
    pub ra_seconds: f64,
    pub decl_degrees: f64,
    pub decl_minutes: f64,
    pub decl_seconds: f64,
    /// Proper motion in right ascension, arc seconds per year.
    pub ra_motion: f64,
    /// Proper motion in declination, arc seconds per year.
    pub decl_motion: f64,
}

/// Sunrise and sunset for a day, as Julian days.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SunRiseSet {
    pub sunrise: f64,
    pub sunset: f64,
}

/// Obliquity of the ecliptic and local sidereal time, in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ObliquityLst {
    pub obliquity: f64,
    pub local_sidereal_time: f64,
}

/// The twelve house cusps in degrees, house 1 first.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Houses(pub [f64; 12]);

impl Houses {
    /// Cusp of house `n` (1-based).
    pub fn cusp(&self, n: usize) -> Option<f64> {
        n.checked_sub(1).and_then(|i| self.0.get(i)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
