use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

use weph::config::{Config, ConfigError};
use weph::telemetry::{self, LoggingError};
use weph::{Body, Ephemeris, GeoCoordinate};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Weph(#[from] weph::Error),

    #[error("Wasm error: {0}")]
    Wasm(#[from] weph::WasmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser)]
#[command(name = "weph")]
#[command(about = "Query the weph ephemeris WebAssembly module")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the compiled module (overrides the configuration)
    #[arg(long, global = true, env = "WEPH_WASM")]
    module: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Observer position in degrees and meters.
#[derive(Args, Debug, Clone, Copy)]
struct Observer {
    /// Latitude in degrees, north positive
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude in degrees, east positive
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    /// Elevation above sea level in meters
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    elevation: f64,
}

impl From<Observer> for GeoCoordinate {
    fn from(o: Observer) -> Self {
        GeoCoordinate::new(o.lat, o.lon, o.elevation)
    }
}

/// Instant to compute for.
#[derive(Args, Debug, Clone)]
struct Moment {
    /// RFC 3339 instant, e.g. 2022-01-19T15:23:00-05:00 (defaults to now)
    #[arg(long)]
    at: Option<DateTime<FixedOffset>>,
}

impl Moment {
    fn resolve(&self) -> DateTime<FixedOffset> {
        self.at.unwrap_or_else(|| Utc::now().fixed_offset())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Topocentric ecliptic longitude of a body
    Longitude {
        /// mercury, venus, earth, mars, jupiter, saturn, sun or moon
        #[arg(long)]
        body: Body,

        #[command(flatten)]
        moment: Moment,

        #[command(flatten)]
        observer: Observer,

        /// Report the time spent in the module
        #[arg(long)]
        perf: bool,
    },

    /// Julian day of an instant
    JulianDay {
        #[command(flatten)]
        moment: Moment,
    },

    /// Ascending and descending lunar nodes
    Node {
        #[command(flatten)]
        moment: Moment,
    },

    /// Lunar phase angle
    Phase {
        #[command(flatten)]
        moment: Moment,
    },

    /// Sunrise and sunset for the day of an instant
    Sun {
        #[command(flatten)]
        moment: Moment,

        #[command(flatten)]
        observer: Observer,
    },

    /// Regiomontanus house cusps
    Houses {
        #[command(flatten)]
        moment: Moment,

        #[command(flatten)]
        observer: Observer,
    },

    /// Calendar instant of a Julian day
    Calendar {
        /// Julian day
        #[arg(long)]
        jd: f64,

        /// UTC offset for the result, e.g. -05:00
        #[arg(long, default_value = "+00:00", value_parser = parse_offset, allow_hyphen_values = true)]
        offset: FixedOffset,
    },
}

fn parse_offset(s: &str) -> Result<FixedOffset, String> {
    DateTime::parse_from_str(&format!("2000-01-01T00:00:00{}", s), "%Y-%m-%dT%H:%M:%S%:z")
        .map(|dt| *dt.offset())
        .map_err(|e| format!("invalid UTC offset '{}': {}", s, e))
}

fn print(json: bool, value: serde_json::Value, text: impl FnOnce() -> String) -> Result<(), AppError> {
    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn run(ephemeris: &Ephemeris, command: Commands, as_json: bool) -> Result<(), AppError> {
    match command {
        Commands::Longitude {
            body,
            moment,
            observer,
            perf,
        } => {
            let at = moment.resolve();
            let result = ephemeris.find_longitude(&at, &observer.into(), body, perf)?;
            print(
                as_json,
                json!({
                    "body": body,
                    "at": at.to_rfc3339(),
                    "longitude": result.longitude,
                    "perf_ms": result.perf_ms(),
                }),
                || match result.perf_ms() {
                    Some(ms) => format!("{}: {:.6}° ({:.3} ms)", body, result.longitude, ms),
                    None => format!("{}: {:.6}°", body, result.longitude),
                },
            )
        }
        Commands::JulianDay { moment } => {
            let at = moment.resolve();
            let jd = ephemeris.julian_day(&at)?;
            print(as_json, json!({ "at": at.to_rfc3339(), "jd": jd }), || {
                format!("{:.6}", jd)
            })
        }
        Commands::Node { moment } => {
            let jd = ephemeris.julian_day(&moment.resolve())?;
            let ascending = ephemeris.ascending_node(jd)?;
            let descending = (ascending + 180.0).rem_euclid(360.0);
            print(
                as_json,
                json!({ "jd": jd, "ascending": ascending, "descending": descending }),
                || format!("ascending: {:.6}°\ndescending: {:.6}°", ascending, descending),
            )
        }
        Commands::Phase { moment } => {
            let jd = ephemeris.julian_day(&moment.resolve())?;
            let phase = ephemeris.moon_phase(jd)?;
            print(as_json, json!({ "jd": jd, "phase": phase }), || {
                format!("{:.6}°", phase)
            })
        }
        Commands::Sun { moment, observer } => {
            let jd = ephemeris.julian_day(&moment.resolve())?;
            let times = ephemeris.sunrise_sunset(jd, &observer.into())?;
            print(as_json, serde_json::to_value(times)?, || {
                format!("sunrise: {:.6}\nsunset: {:.6}", times.sunrise, times.sunset)
            })
        }
        Commands::Houses { moment, observer } => {
            let observer = GeoCoordinate::from(observer);
            let jd = ephemeris.julian_day(&moment.resolve())?;
            let sky = ephemeris.obliquity_lst(jd, &observer)?;
            let houses = ephemeris.houses(sky.local_sidereal_time, sky.obliquity, &observer)?;
            print(as_json, json!({ "jd": jd, "cusps": houses }), || {
                houses
                    .iter()
                    .enumerate()
                    .map(|(i, cusp)| format!("{:>2}: {:.6}°", i + 1, cusp))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Calendar { jd, offset } => {
            let moment = ephemeris.jd_to_moment(jd, offset)?;
            let text = moment.to_rfc3339_opts(SecondsFormat::Secs, false);
            print(as_json, json!({ "jd": jd, "moment": text.as_str() }), || text.clone())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(module) = cli.module {
        config.module.path = module;
    }

    telemetry::init(&config.logging)?;

    let loader = config.loader()?;
    let ephemeris = loader.resolve().await?;

    run(&ephemeris, cli.command, cli.json)
}
