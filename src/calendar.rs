//! Conversion between host instants and the module's calendar scalars.
//!
//! Going in, an instant is expressed in UTC as (year, month, fractional day),
//! where the fraction is the time since midnight divided by the length of a
//! day. Coming out, the module stages a sextuple of `i32`s: year, zero-based
//! month, day, hour, minute and second.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike};
use thiserror::Error;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// The module rounds seconds, so a value of 60 shows up near minute boundaries.
const ROLLOVER_SECOND: i32 = 60;

/// Errors decoding the module's calendar sextuple.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    /// The fields do not form a representable instant.
    #[error("Calendar fields {fields:?} do not form a valid instant")]
    InvalidFields { fields: [i32; 6] },
}

/// Calendar scalars the module takes for an instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalendarArgs {
    pub year: i32,
    /// Month, 1 through 12.
    pub month: u32,
    /// Day of month plus the elapsed fraction of that day.
    pub day: f64,
}

impl CalendarArgs {
    /// The arguments as the module receives them.
    pub fn as_scalars(&self) -> [f64; 3] {
        [f64::from(self.year), f64::from(self.month), self.day]
    }
}

/// Decompose `moment` in UTC, whatever its original offset.
pub fn encode_moment<Tz: TimeZone>(moment: &DateTime<Tz>) -> CalendarArgs {
    let utc = moment.naive_utc();
    let since_midnight =
        f64::from(utc.num_seconds_from_midnight()) + f64::from(utc.nanosecond()) / 1e9;
    CalendarArgs {
        year: utc.year(),
        month: utc.month(),
        day: f64::from(utc.day()) + since_midnight / SECONDS_PER_DAY,
    }
}

/// Build an instant from the module's sextuple, then shift it to `offset`.
///
/// The fields are interpreted as UTC. A second of 60 is built as second 0
/// with 60 seconds added afterwards.
pub fn decode_sextuple(
    fields: [i32; 6],
    offset: FixedOffset,
) -> Result<DateTime<FixedOffset>, CalendarError> {
    let invalid = || CalendarError::InvalidFields { fields };
    let unsigned = |v: i32| u32::try_from(v).map_err(|_| invalid());

    let [year, month, day, hour, minute, second] = fields;
    let date = NaiveDate::from_ymd_opt(year, unsigned(month)? + 1, unsigned(day)?)
        .ok_or_else(invalid)?;

    let naive: Option<NaiveDateTime> = if second == ROLLOVER_SECOND {
        date.and_hms_opt(unsigned(hour)?, unsigned(minute)?, 0)
            .and_then(|t| {
                TimeDelta::try_seconds(i64::from(ROLLOVER_SECOND))
                    .and_then(|delta| t.checked_add_signed(delta))
            })
    } else {
        date.and_hms_opt(unsigned(hour)?, unsigned(minute)?, unsigned(second)?)
    };
    let naive = naive.ok_or_else(invalid)?;

    Ok(naive.and_utc().with_timezone(&offset))
}
