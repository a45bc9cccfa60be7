//! Domain operations over the loaded ephemeris module.
//!
//! [`Ephemeris`] hides the module's calling convention: scalars go in as
//! `f64`, angles are converted to the module's unit first, and multi-value
//! results are staged by the module in scratch regions and copied out through
//! the memory reader. No input validation happens here. Out-of-range inputs
//! produce whatever numbers the module computes.
//!
//! ## Example
//!
//! ```ignore
//! let ephemeris = loader.resolve().await?;
//! let observer = GeoCoordinate::new(42.0, -71.516667, 56.0832);
//! let at = DateTime::parse_from_rfc3339("2022-01-19T15:23:00-05:00")?;
//!
//! let saturn = ephemeris.longitude(&at, &observer, Body::Saturn)?;
//! let jd = ephemeris.julian_day(&at)?;
//! let ObliquityLst { obliquity, local_sidereal_time } = ephemeris.obliquity_lst(jd, &observer)?;
//! let houses = ephemeris.houses(local_sidereal_time, obliquity, &observer)?;
//! ```

use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, TimeZone};

use crate::calendar::{decode_sextuple, encode_moment};
use crate::error::Result;
use crate::logging::{debug, trace};
use crate::types::{Body, GeoCoordinate, Houses, LongitudeResult, ObliquityLst, StarPosition, SunRiseSet};
use crate::wasm::{ExportName, ModuleHandle};

/// Run `f` under a monotonic timer.
fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let begin = Instant::now();
    let value = f();
    (value, begin.elapsed())
}

/// Typed facade over a [`ModuleHandle`].
///
/// Cloning is cheap; clones share the same module instance.
#[derive(Debug, Clone)]
pub struct Ephemeris {
    handle: ModuleHandle,
}

impl Ephemeris {
    pub fn new(handle: ModuleHandle) -> Self {
        Self { handle }
    }

    /// The underlying module handle.
    pub fn handle(&self) -> &ModuleHandle {
        &self.handle
    }

    /// Convert degrees to the module's angle unit (radians).
    pub fn angle_from_deg(&self, degs: f64) -> Result<f64> {
        self.handle
            .with_session(|session| -> Result<f64> {
                Ok(session.call(ExportName::AngleFromDeg, &[degs])?)
            })
    }

    /// Topocentric ecliptic longitude of `body` in degrees.
    pub fn longitude<Tz: TimeZone>(
        &self,
        moment: &DateTime<Tz>,
        observer: &GeoCoordinate,
        body: Body,
    ) -> Result<f64> {
        self.find_longitude(moment, observer, body, false)
            .map(|result| result.longitude)
    }

    /// Topocentric ecliptic longitude, optionally timing the module call.
    ///
    /// With `measure_perf` set, only the longitude export itself is timed;
    /// the angle conversions before it are not.
    pub fn find_longitude<Tz: TimeZone>(
        &self,
        moment: &DateTime<Tz>,
        observer: &GeoCoordinate,
        body: Body,
        measure_perf: bool,
    ) -> Result<LongitudeResult> {
        let [year, month, day] = encode_moment(moment).as_scalars();
        trace!(body = %body, year = year, month = month, day = day, "finding longitude");

        self.handle.with_session(|session| -> Result<LongitudeResult> {
            let latitude = session.call(ExportName::AngleFromDeg, &[observer.latitude])?;
            let longitude = session.call(ExportName::AngleFromDeg, &[observer.longitude])?;
            let args = [
                year,
                month,
                day,
                latitude,
                longitude,
                observer.elevation,
                f64::from(body.index()),
            ];

            let (longitude, elapsed) = if measure_perf {
                let (value, elapsed) = timed(|| session.call(ExportName::FindLongitude, &args));
                (value?, Some(elapsed))
            } else {
                (session.call(ExportName::FindLongitude, &args)?, None)
            };

            Ok(LongitudeResult { longitude, elapsed })
        })
    }

    /// Julian day for `moment`.
    pub fn julian_day<Tz: TimeZone>(&self, moment: &DateTime<Tz>) -> Result<f64> {
        let args = encode_moment(moment).as_scalars();
        self.handle.with_session(|session| -> Result<f64> {
            Ok(session.call(ExportName::CalendarGregorianToJd, &args)?)
        })
    }

    /// Geocentric ascending lunar node in degrees. The descending node is
    /// 180° away.
    pub fn ascending_node(&self, jd: f64) -> Result<f64> {
        self.handle.with_session(|session| -> Result<f64> {
            Ok(session.call(ExportName::FindAscendingNode, &[jd])?)
        })
    }

    /// Lunar phase as lunar minus solar longitude, in degrees.
    ///
    /// 0 is new, below 180 waxing, 180 full, above 180 waning.
    pub fn moon_phase(&self, jd: f64) -> Result<f64> {
        self.handle.with_session(|session| -> Result<f64> {
            Ok(session.call(ExportName::FindMoonPhase, &[jd])?)
        })
    }

    /// Geocentric ecliptic longitude of a fixed star in degrees.
    ///
    /// `obliquity` is in the module's angle unit, as returned by
    /// [`obliquity_lst`](Self::obliquity_lst).
    pub fn stellar_longitude(&self, jd: f64, obliquity: f64, star: &StarPosition) -> Result<f64> {
        let args = [
            jd,
            obliquity,
            star.ra_hours,
            star.ra_minutes,
            star.ra_seconds,
            star.decl_degrees,
            star.decl_minutes,
            star.decl_seconds,
            star.ra_motion,
            star.decl_motion,
        ];
        self.handle.with_session(|session| -> Result<f64> {
            Ok(session.call(ExportName::FindStellarLongitude, &args)?)
        })
    }

    /// Sunrise and sunset for the day containing `jd`.
    pub fn sunrise_sunset(&self, jd: f64, observer: &GeoCoordinate) -> Result<SunRiseSet> {
        self.handle.with_session(|session| -> Result<SunRiseSet> {
            let latitude = session.call(ExportName::AngleFromDeg, &[observer.latitude])?;
            let longitude = session.call(ExportName::AngleFromDeg, &[observer.longitude])?;
            session.populate(ExportName::FindSunRiseSet, &[jd, latitude, longitude])?;

            let offset = session.offset(ExportName::GetSunRiseSetPtr)?;
            let [sunrise, sunset] = session.read_array::<f64, 2>(offset)?;
            Ok(SunRiseSet { sunrise, sunset })
        })
    }

    /// Obliquity of the ecliptic and local sidereal time, in radians.
    pub fn obliquity_lst(&self, jd: f64, observer: &GeoCoordinate) -> Result<ObliquityLst> {
        self.handle.with_session(|session| -> Result<ObliquityLst> {
            let longitude = session.call(ExportName::AngleFromDeg, &[observer.longitude])?;
            session.populate(ExportName::FindObliquityLst, &[jd, longitude])?;

            let offset = session.offset(ExportName::GetObliquityLstContainer)?;
            let [obliquity, local_sidereal_time] = session.read_array::<f64, 2>(offset)?;
            Ok(ObliquityLst {
                obliquity,
                local_sidereal_time,
            })
        })
    }

    /// Regiomontanus house cusps in degrees.
    ///
    /// `lst` and `obliquity` are in radians, as returned by
    /// [`obliquity_lst`](Self::obliquity_lst).
    pub fn houses(&self, lst: f64, obliquity: f64, observer: &GeoCoordinate) -> Result<Houses> {
        self.handle.with_session(|session| -> Result<Houses> {
            let latitude = session.call(ExportName::AngleFromDeg, &[observer.latitude])?;
            session.populate(ExportName::FindHouses, &[lst, obliquity, latitude])?;

            let offset = session.offset(ExportName::GetHouseContainer)?;
            Ok(Houses(session.read_array::<f64, 12>(offset)?))
        })
    }

    /// Calendar instant for `jd`, expressed at `offset`.
    pub fn jd_to_moment(&self, jd: f64, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
        let fields = self.handle.with_session(|session| -> Result<[i32; 6]> {
            session.populate(ExportName::JdToCalendar, &[jd])?;
            let region = session.offset(ExportName::GetTimeContainer)?;
            Ok(session.read_array::<i32, 6>(region)?)
        })?;
        debug!(jd = jd, fields = ?fields, "decoding calendar fields");
        Ok(decode_sextuple(fields, offset)?)
    }

    /// Whether the module recorded an error during its last computation.
    ///
    /// Builds without the `anyErrors` export always report `false`.
    pub fn has_pending_error(&self) -> Result<bool> {
        self.handle.with_session(|session| -> Result<bool> {
            if !session.has_export(ExportName::AnyErrors) {
                return Ok(false);
            }
            Ok(session.call(ExportName::AnyErrors, &[])? != 0.0)
        })
    }
}
