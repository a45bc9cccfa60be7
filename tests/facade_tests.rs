//! Integration tests for the marshaling facade over the fixture module.

mod common;

use chrono::{DateTime, FixedOffset, TimeDelta};
use common::{
    FIXTURE_OBLIQUITY, Fixture, HOUSES_OFFSET, INVALID_JD, LONGITUDE_ARGS_OFFSET, ROLLOVER_JD,
    SUN_OFFSET, approx_eq,
};
use weph::wasm::ModuleLoader;
use weph::{Body, Ephemeris, GeoCoordinate, RegionDescriptor, StarPosition, degs_to_rads};

const TOLERANCE: f64 = 1e-9;

/// 42°N, 71.516667°W, 56.0832 m
fn observer() -> GeoCoordinate {
    GeoCoordinate::new(42.0, -71.516667, 56.0832)
}

fn moment() -> anyhow::Result<DateTime<FixedOffset>> {
    Ok(DateTime::parse_from_rfc3339("2022-01-19T15:23:00-05:00")?)
}

async fn ephemeris(fixture: Fixture) -> anyhow::Result<Ephemeris> {
    Ok(ModuleLoader::new(fixture.source())?.resolve().await?)
}

// =============================================================================
// Scalar Operations
// =============================================================================

#[tokio::test]
async fn test_angle_from_deg() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    assert!(approx_eq(eph.angle_from_deg(180.0)?, std::f64::consts::PI, TOLERANCE));
    assert!(approx_eq(eph.angle_from_deg(-71.516667)?, degs_to_rads(-71.516667), TOLERANCE));
    Ok(())
}

#[tokio::test]
async fn test_longitude_encodes_moment_in_utc() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let geo = observer();

    let longitude = eph.longitude(&moment()?, &geo, Body::Saturn)?;
    // The fixture echoes the body index
    assert_eq!(longitude, 5.0);

    let received = eph
        .handle()
        .read_region::<f64>(&RegionDescriptor::of::<f64>(LONGITUDE_ARGS_OFFSET, 7))?;
    let [year, month, day, lat, lon, elevation, body] = received.as_slice() else {
        anyhow::bail!("expected seven arguments, got {}", received.len());
    };

    // 15:23 at -05:00 is 20:23 UTC
    let expected_day = 19.0 + (20.0 * 3600.0 + 23.0 * 60.0) / 86_400.0;
    assert_eq!(*year, 2022.0);
    assert_eq!(*month, 1.0);
    assert!(approx_eq(*day, expected_day, TOLERANCE));
    assert!(approx_eq(*lat, degs_to_rads(42.0), TOLERANCE));
    assert!(approx_eq(*lon, degs_to_rads(-71.516667), TOLERANCE));
    assert_eq!(*elevation, 56.0832);
    assert_eq!(*body, 5.0);
    Ok(())
}

#[tokio::test]
async fn test_every_body_index_reaches_the_module() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let at = moment()?;
    for body in Body::ALL {
        let longitude = eph.longitude(&at, &observer(), body)?;
        assert_eq!(longitude, f64::from(body.index()), "{}", body);
    }
    Ok(())
}

#[tokio::test]
async fn test_perf_measurement_does_not_change_value() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let at = moment()?;

    let timed = eph.find_longitude(&at, &observer(), Body::Moon, true)?;
    let untimed = eph.find_longitude(&at, &observer(), Body::Moon, false)?;

    assert_eq!(timed.longitude, untimed.longitude);
    assert!(timed.elapsed.is_some());
    assert!(timed.perf_ms().is_some_and(|ms| ms >= 0.0));
    assert!(untimed.elapsed.is_none());
    Ok(())
}

#[tokio::test]
async fn test_julian_day_truncates_integer_parameters() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let jd = eph.julian_day(&moment()?)?;

    let expected_day = 19.0 + (20.0 * 3600.0 + 23.0 * 60.0) / 86_400.0;
    assert!(approx_eq(jd, 2022.0 * 10_000.0 + 100.0 + expected_day, 1e-6));
    Ok(())
}

#[tokio::test]
async fn test_node_phase_and_star() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;

    assert!(approx_eq(eph.ascending_node(2_459_599.5)?, 2_459_600.5, TOLERANCE));
    // Integer result widened to f64
    assert_eq!(eph.moon_phase(725.9)?, 5.0);

    let star = StarPosition {
        ra_hours: 3.0,
        ra_minutes: 4.0,
        ra_seconds: 5.0,
        decl_degrees: 6.0,
        decl_minutes: 7.0,
        decl_seconds: 8.0,
        ra_motion: 9.0,
        decl_motion: 10.0,
    };
    assert!(approx_eq(eph.stellar_longitude(1.0, 2.0, &star)?, 55.0, TOLERANCE));
    Ok(())
}

// =============================================================================
// Composite Operations
// =============================================================================

#[tokio::test]
async fn test_sunrise_sunset() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let times = eph.sunrise_sunset(100.0, &observer())?;
    assert_eq!(times.sunrise, 99.75);
    assert_eq!(times.sunset, 100.25);
    Ok(())
}

#[tokio::test]
async fn test_obliquity_lst_converts_longitude() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let sky = eph.obliquity_lst(100.0, &observer())?;
    assert_eq!(sky.obliquity, FIXTURE_OBLIQUITY);
    assert!(approx_eq(sky.local_sidereal_time, degs_to_rads(-71.516667) + 1.0, TOLERANCE));
    Ok(())
}

#[tokio::test]
async fn test_houses_reads_twelve_cusps() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let geo = observer();
    let sky = eph.obliquity_lst(100.0, &geo)?;
    let houses = eph.houses(sky.local_sidereal_time, sky.obliquity, &geo)?;

    assert_eq!(houses.len(), 12);
    let latitude = degs_to_rads(42.0);
    for (i, cusp) in houses.iter().enumerate() {
        assert!(approx_eq(cusp, (i as f64 + 1.0) * 30.0 + latitude, TOLERANCE));
    }
    assert_eq!(houses.cusp(1), houses.iter().next());
    Ok(())
}

#[tokio::test]
async fn test_results_do_not_alias_memory() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let geo = observer();

    let first = eph.sunrise_sunset(100.0, &geo)?;
    let second = eph.sunrise_sunset(200.0, &geo)?;

    // The scratch region now holds the second result
    let region = eph
        .handle()
        .read_region::<f64>(&RegionDescriptor::of::<f64>(SUN_OFFSET, 2))?;
    assert_eq!(region, vec![199.75, 200.25]);
    assert_eq!(first.sunrise, 99.75);
    assert_eq!(first.sunset, 100.25);
    assert_eq!(second.sunrise, 199.75);
    Ok(())
}

#[tokio::test]
async fn test_composites_do_not_overwrite_other_regions() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let geo = observer();

    eph.sunrise_sunset(100.0, &geo)?;
    let sky = eph.obliquity_lst(100.0, &geo)?;
    eph.houses(sky.local_sidereal_time, sky.obliquity, &geo)?;

    let sun = eph
        .handle()
        .read_region::<f64>(&RegionDescriptor::of::<f64>(SUN_OFFSET, 2))?;
    assert_eq!(sun, vec![99.75, 100.25]);
    Ok(())
}

#[tokio::test]
async fn test_region_reads_are_bounds_checked() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let size = u32::try_from(eph.handle().memory_size()?)?;

    let past_end = eph
        .handle()
        .read_region::<f64>(&RegionDescriptor::of::<f64>(size - 8, 2));
    assert!(matches!(past_end, Err(weph::WasmError::Memory(_))));

    let at_end = eph
        .handle()
        .read_region::<f64>(&RegionDescriptor::of::<f64>(HOUSES_OFFSET, 12))?;
    assert_eq!(at_end.len(), 12);
    Ok(())
}

#[test]
fn test_concurrent_composites_are_not_interleaved() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let eph = runtime.block_on(ephemeris(Fixture::new()))?;
    let geo = observer();

    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let eph = eph.clone();
                scope.spawn(move || -> weph::Result<()> {
                    for round in 0..200 {
                        let jd = f64::from(worker * 1000 + round);
                        let times = eph.sunrise_sunset(jd, &geo)?;
                        assert_eq!(times.sunrise, jd - 0.25);
                        assert_eq!(times.sunset, jd + 0.25);
                    }
                    Ok(())
                })
            })
            .collect();

        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("worker panicked"))??;
        }
        Ok(())
    })
}

// =============================================================================
// Calendar Decoding
// =============================================================================

#[tokio::test]
async fn test_jd_to_moment_applies_offset() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let offset = FixedOffset::west_opt(5 * 3600).ok_or_else(|| anyhow::anyhow!("offset"))?;

    let decoded = eph.jd_to_moment(2_459_599.35, offset)?;
    assert_eq!(decoded, moment()?);
    assert_eq!(decoded.offset(), &offset);
    Ok(())
}

#[tokio::test]
async fn test_jd_to_moment_rolls_over_second_sixty() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let utc = FixedOffset::east_opt(0).ok_or_else(|| anyhow::anyhow!("offset"))?;

    let decoded = eph.jd_to_moment(ROLLOVER_JD, utc)?;
    let expected = DateTime::parse_from_rfc3339("2017-01-01T00:00:00Z")?;
    assert_eq!(decoded, expected);

    let minute_start = DateTime::parse_from_rfc3339("2016-12-31T23:59:00Z")?;
    assert_eq!(decoded - minute_start, TimeDelta::seconds(60));
    Ok(())
}

#[tokio::test]
async fn test_jd_to_moment_rejects_impossible_fields() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    let utc = FixedOffset::east_opt(0).ok_or_else(|| anyhow::anyhow!("offset"))?;

    let err = eph
        .jd_to_moment(INVALID_JD, utc)
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
    assert!(err.is_calendar());
    Ok(())
}

// =============================================================================
// Pending Errors
// =============================================================================

#[tokio::test]
async fn test_pending_error_flag() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new()).await?;
    assert!(!eph.has_pending_error()?);

    eph.ascending_node(-1.0)?;
    assert!(eph.has_pending_error()?);

    eph.ascending_node(1.0)?;
    assert!(!eph.has_pending_error()?);
    Ok(())
}

#[tokio::test]
async fn test_pending_error_without_export() -> anyhow::Result<()> {
    let eph = ephemeris(Fixture::new().without_any_errors()).await?;
    eph.ascending_node(-1.0)?;
    assert!(!eph.has_pending_error()?);
    Ok(())
}
