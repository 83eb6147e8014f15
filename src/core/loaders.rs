//! Data loaders for per-driver lap telemetry CSV files.
//!
//! Files follow the `<track>-<session slug>-<driver>.csv` convention and live
//! either directly in the session directory or in a per-track sub-directory:
//!
//! ```text
//! telemetry-data/Qualifying/Japan-quali-VER.csv
//! telemetry-data/Qualifying/Japan/Japan-quali-VER.csv
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ColumnConfig, PathsConfig, Session};
use super::transforms::{derive_channels, DerivedChannels};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing file: {0}")]
    MissingFile(PathBuf),

    #[error("Missing required columns [{columns}] in {path}")]
    MissingColumns { path: PathBuf, columns: String },

    #[error("No valid telemetry rows in {0}")]
    EmptyFile(PathBuf),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Invalid file name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// A telemetry channel, raw or derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    Rpm,
    Speed,
    Gear,
    Throttle,
    Brake,
    /// Absolute throttle change between consecutive samples
    ThrottleRate,
    /// Brake flag times speed
    BrakeIntensity,
    /// RPM per gear step
    GearEfficiency,
    /// Rolling standard deviation of speed over 10 samples
    SpeedVariability,
    /// Speed change between consecutive samples
    Acceleration,
}

impl Channel {
    /// Channels used for sample-level pattern clustering.
    pub const PATTERN_CHANNELS: [Channel; 10] = [
        Channel::Rpm,
        Channel::Speed,
        Channel::Gear,
        Channel::Throttle,
        Channel::Brake,
        Channel::ThrottleRate,
        Channel::BrakeIntensity,
        Channel::GearEfficiency,
        Channel::SpeedVariability,
        Channel::Acceleration,
    ];
}

/// One telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapRecord {
    /// Distance along the lap in metres (row index if the file has none)
    pub distance: f64,
    /// Speed in km/h
    pub speed: f64,
    /// Throttle pedal position, 0-100
    pub throttle: f64,
    pub gear: f64,
    pub rpm: f64,
    /// 1.0 while braking
    pub brake: f64,
}

/// Lap telemetry of one driver on one track.
#[derive(Debug, Clone)]
pub struct LapTable {
    pub track: String,
    pub session: Session,
    pub driver: String,
    pub records: Vec<LapRecord>,
    pub derived: DerivedChannels,
}

impl LapTable {
    /// Build a table, computing the derived channels from the records.
    pub fn new(track: &str, session: Session, driver: &str, records: Vec<LapRecord>) -> Self {
        let derived = derive_channels(&records);
        Self {
            track: track.to_string(),
            session,
            driver: driver.to_string(),
            records,
            derived,
        }
    }

    /// Returns the number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the table has no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Values of one channel, in sample order.
    pub fn channel(&self, channel: Channel) -> Vec<f64> {
        let raw = |f: fn(&LapRecord) -> f64| -> Vec<f64> { self.records.iter().map(f).collect() };
        match channel {
            Channel::Rpm => raw(|r| r.rpm),
            Channel::Speed => raw(|r| r.speed),
            Channel::Gear => raw(|r| r.gear),
            Channel::Throttle => raw(|r| r.throttle),
            Channel::Brake => raw(|r| r.brake),
            Channel::ThrottleRate => self.derived.throttle_rate.clone(),
            Channel::BrakeIntensity => self.derived.brake_intensity.clone(),
            Channel::GearEfficiency => self.derived.gear_efficiency.clone(),
            Channel::SpeedVariability => self.derived.speed_variability.clone(),
            Channel::Acceleration => self.derived.acceleration.clone(),
        }
    }
}

/// A driver left out of a track, with the reason.
#[derive(Debug)]
pub struct SkippedDriver {
    pub driver: String,
    pub reason: LoaderError,
}

/// Everything loaded for one track.
#[derive(Debug)]
pub struct TrackData {
    pub track: String,
    pub session: Session,
    /// Tables in the order drivers were requested
    pub tables: Vec<LapTable>,
    pub skipped: Vec<SkippedDriver>,
}

impl TrackData {
    /// Total samples across all drivers.
    pub fn total_samples(&self) -> usize {
        self.tables.iter().map(LapTable::len).sum()
    }
}

/// Parse a brake cell: `True`/`False` as written by the timing export, or numeric.
fn parse_brake(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(1.0)
    } else if value.eq_ignore_ascii_case("false") {
        Some(0.0)
    } else {
        value.parse::<f64>().ok()
    }
}

fn parse_cell(record: &csv::StringRecord, idx: usize) -> Option<f64> {
    record
        .get(idx)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Load lap records from a telemetry CSV file.
///
/// Required columns (speed, throttle, gear, RPM) are looked up by their
/// configured, case-sensitive names. Distance and brake are optional; a
/// missing or unreadable distance becomes the row index. Rows with an
/// unparsable or non-finite required value or brake flag are dropped.
///
/// # Returns
///
/// The valid records and the number of dropped rows.
///
/// # Errors
///
/// Returns an error if the file cannot be read, lacks a required column or
/// contains no valid rows.
pub fn load_lap_csv<P: AsRef<Path>>(
    path: P,
    columns: &ColumnConfig,
) -> Result<(Vec<LapRecord>, usize)> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(LoaderError::MissingFile(path.to_path_buf()));
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();

    let required = [
        &columns.speed,
        &columns.throttle,
        &columns.gear,
        &columns.rpm,
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|name| !col_map.contains_key(name.as_str()))
        .map(|name| name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing.join(", "),
        });
    }

    let speed_idx = col_map[columns.speed.as_str()];
    let throttle_idx = col_map[columns.throttle.as_str()];
    let gear_idx = col_map[columns.gear.as_str()];
    let rpm_idx = col_map[columns.rpm.as_str()];
    let distance_idx = col_map.get(columns.distance.as_str()).copied();
    let brake_idx = col_map.get(columns.brake.as_str()).copied();

    let mut records = Vec::with_capacity(1024);
    let mut dropped = 0usize;

    for (row, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(_) => {
                dropped += 1;
                continue;
            }
        };

        let parsed = (|| {
            // an unreadable distance falls back to the row index
            let distance = distance_idx
                .and_then(|idx| parse_cell(&record, idx))
                .unwrap_or(row as f64);
            let brake = match brake_idx {
                Some(idx) => record.get(idx).and_then(parse_brake)?,
                None => 0.0,
            };
            Some(LapRecord {
                distance,
                speed: parse_cell(&record, speed_idx)?,
                throttle: parse_cell(&record, throttle_idx)?,
                gear: parse_cell(&record, gear_idx)?,
                rpm: parse_cell(&record, rpm_idx)?,
                brake,
            })
        })();

        match parsed {
            Some(r) => records.push(r),
            None => dropped += 1,
        }
    }

    if records.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok((records, dropped))
}

/// File name of a driver's telemetry for a track and session.
pub fn driver_file_name(paths: &PathsConfig, track: &str, session: Session, driver: &str) -> String {
    format!("{}-{}-{}.csv", track, paths.session_slug(session), driver)
}

/// Locate a driver's CSV, preferring the flat layout over the per-track folder.
///
/// Returns the flat-layout path when neither exists so the caller can report it.
pub fn resolve_driver_path(paths: &PathsConfig, track: &str, session: Session, driver: &str) -> PathBuf {
    let session_dir = paths.session_dir(session);
    let name = driver_file_name(paths, track, session, driver);

    let flat = session_dir.join(&name);
    if flat.is_file() {
        return flat;
    }
    let nested = session_dir.join(track).join(&name);
    if nested.is_file() {
        return nested;
    }
    flat
}

/// Load and validate the telemetry of every expected driver on a track.
///
/// Per-driver problems never abort the track: the driver is recorded in
/// `skipped` with the reason and a warning is logged.
pub fn load_track_data(
    track: &str,
    session: Session,
    drivers: &[String],
    paths: &PathsConfig,
    columns: &ColumnConfig,
) -> TrackData {
    let mut tables = Vec::with_capacity(drivers.len());
    let mut skipped = Vec::new();

    for driver in drivers {
        let path = resolve_driver_path(paths, track, session, driver);
        log::debug!("{}: loading {} from {}", track, driver, path.display());

        match load_lap_csv(&path, columns) {
            Ok((records, dropped)) => {
                if dropped > 0 {
                    log::warn!(
                        "{}: dropped {} malformed rows for {} ({})",
                        track,
                        dropped,
                        driver,
                        path.display()
                    );
                }
                log::info!("{}: loaded {} samples for {}", track, records.len(), driver);
                tables.push(LapTable::new(track, session, driver, records));
            }
            Err(reason) => {
                log::warn!("{}: skipping {}: {}", track, driver, reason);
                skipped.push(SkippedDriver {
                    driver: driver.clone(),
                    reason,
                });
            }
        }
    }

    TrackData {
        track: track.to_string(),
        session,
        tables,
        skipped,
    }
}

fn csv_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Find every driver with a telemetry file for a track, sorted by code.
pub fn discover_drivers(paths: &PathsConfig, track: &str, session: Session) -> Vec<String> {
    let session_dir = paths.session_dir(session);
    let pattern = format!(
        r"^{}-{}-([A-Za-z0-9]+)\.csv$",
        regex::escape(track),
        regex::escape(paths.session_slug(session))
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    let mut drivers: Vec<String> = [session_dir.clone(), session_dir.join(track)]
        .iter()
        .flat_map(|dir| csv_files_in(dir))
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            re.captures(&name).map(|caps| caps[1].to_string())
        })
        .collect();

    drivers.sort();
    drivers.dedup();
    drivers
}

/// Telemetry files found for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackListing {
    pub track: String,
    pub drivers: Vec<String>,
}

/// List the tracks and drivers available in a session directory.
///
/// Both flat files and per-track sub-directories are recognised.
///
/// # Errors
///
/// Returns `DirectoryNotFound` if the session directory does not exist.
pub fn describe_data_dir(paths: &PathsConfig, session: Session) -> Result<Vec<TrackListing>> {
    let session_dir = paths.session_dir(session);
    if !session_dir.is_dir() {
        return Err(LoaderError::DirectoryNotFound(session_dir));
    }

    let re = Regex::new(&format!(
        r"^(.+)-{}-([A-Za-z0-9]+)\.csv$",
        regex::escape(paths.session_slug(session))
    ))?;

    let mut by_track: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let mut dirs = vec![session_dir.clone()];
    for entry in fs::read_dir(&session_dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            by_track
                .entry(entry.file_name().to_string_lossy().to_string())
                .or_default();
            dirs.push(path);
        }
    }

    for dir in dirs {
        for path in csv_files_in(&dir) {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(caps) = re.captures(name) {
                by_track
                    .entry(caps[1].to_string())
                    .or_default()
                    .push(caps[2].to_string());
            }
        }
    }

    Ok(by_track
        .into_iter()
        .map(|(track, mut drivers)| {
            drivers.sort();
            drivers.dedup();
            TrackListing { track, drivers }
        })
        .collect())
}
