//! CSV exports of per-track analysis results.
//!
//! This module writes the tables behind the charts:
//! - driver profiles, one row per driver and one column per metric
//! - cluster assignments with the dominant telemetry pattern
//! - the driver x driver similarity matrix

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use crate::processors::clustering::{ClusterAssignment, PatternSummary};
use crate::processors::features::DriverProfile;
use crate::processors::similarity::SimilarityMatrix;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// A row does not have as many values as the header has columns.
    #[error("row '{row}' has {found} values, header has {expected} columns")]
    ShapeMismatch {
        row: String,
        expected: usize,
        found: usize,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a CSV writer over a buffered file at the given path.
fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

fn write_rows(path: &Path, header: Vec<String>, rows: Vec<Vec<String>>) -> Result<()> {
    let mut writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    writer.write_record(&header).map_err(|e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    })?;
    for row in rows {
        writer.write_record(&row).map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write driver profiles to CSV.
///
/// Columns are `driver,samples,low_confidence` followed by the metric
/// names of the first profile.
///
/// # Errors
///
/// Returns `ShapeMismatch` if a profile has a different number of values
/// than the first profile has feature names, or an I/O error.
///
/// # Example
///
/// ```no_run
/// use driving_style::core::writers::write_profiles_csv;
/// use std::path::Path;
///
/// write_profiles_csv(Path::new("Japan_profiles.csv"), &[]).unwrap();
/// ```
pub fn write_profiles_csv(path: &Path, profiles: &[DriverProfile]) -> Result<()> {
    let feature_names: Vec<String> = profiles
        .first()
        .map(|p| p.feature_names.clone())
        .unwrap_or_default();

    let mut header = vec![
        "driver".to_string(),
        "samples".to_string(),
        "low_confidence".to_string(),
    ];
    header.extend(feature_names.iter().cloned());

    let mut rows = Vec::with_capacity(profiles.len());
    for profile in profiles {
        if profile.values.len() != feature_names.len() {
            return Err(WriteError::ShapeMismatch {
                row: profile.driver.clone(),
                expected: feature_names.len(),
                found: profile.values.len(),
            });
        }
        let mut row = vec![
            profile.driver.clone(),
            profile.samples.to_string(),
            profile.low_confidence.to_string(),
        ];
        row.extend(profile.values.iter().map(|v| format!("{:.6}", v)));
        rows.push(row);
    }

    write_rows(path, header, rows)
}

/// Write the cluster label of each driver, with the dominant telemetry
/// pattern when a pattern summary is given.
///
/// Noise is written as `-1`; a driver without a dominant pattern gets
/// empty pattern cells.
pub fn write_assignments_csv(
    path: &Path,
    assignment: &ClusterAssignment,
    patterns: Option<&PatternSummary>,
) -> Result<()> {
    let header = ["driver", "cluster", "dominant_pattern", "pattern_share"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rows = assignment
        .drivers
        .iter()
        .zip(&assignment.labels)
        .map(|(driver, label)| {
            let dominant = patterns.and_then(|p| {
                p.dominant
                    .iter()
                    .find(|(d, _)| d == driver)
                    .and_then(|(_, best)| *best)
            });
            let (pattern, share) = match dominant {
                Some((pattern, share)) => (pattern.to_string(), format!("{:.4}", share)),
                None => (String::new(), String::new()),
            };
            vec![driver.clone(), label.to_string(), pattern, share]
        })
        .collect();

    write_rows(path, header, rows)
}

/// Write the similarity matrix with a `driver` column followed by one
/// column per driver.
pub fn write_similarity_csv(path: &Path, similarity: &SimilarityMatrix) -> Result<()> {
    let mut header = vec!["driver".to_string()];
    header.extend(similarity.drivers.iter().cloned());

    let mut rows = Vec::with_capacity(similarity.len());
    for (driver, scores) in similarity.drivers.iter().zip(&similarity.scores) {
        if scores.len() != similarity.len() {
            return Err(WriteError::ShapeMismatch {
                row: driver.clone(),
                expected: similarity.len(),
                found: scores.len(),
            });
        }
        let mut row = vec![driver.clone()];
        row.extend(scores.iter().map(|s| format!("{:.4}", s)));
        rows.push(row);
    }

    write_rows(path, header, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::clustering::NOISE;
    use crate::processors::features::StyleIndicators;
    use crate::processors::similarity::compute_similarity;
    use std::fs;
    use tempfile::tempdir;

    fn profile(driver: &str, values: Vec<f64>) -> DriverProfile {
        DriverProfile {
            track: "Japan".to_string(),
            driver: driver.to_string(),
            samples: 120,
            low_confidence: false,
            feature_names: vec!["avg_speed".to_string(), "max_speed".to_string()],
            values,
            style: StyleIndicators {
                throttle_mean: 60.0,
                throttle_rate_mean: 5.0,
                brake_intensity_mean: 0.2,
            },
        }
    }

    #[test]
    fn test_write_profiles_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("Japan_profiles.csv");
        let profiles = vec![profile("VER", vec![210.0, 320.5]), profile("TSU", vec![205.0, 318.0])];

        write_profiles_csv(&path, &profiles).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "driver,samples,low_confidence,avg_speed,max_speed");
        assert_eq!(lines[1], "VER,120,false,210.000000,320.500000");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_write_profiles_csv_shape_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.csv");
        let profiles = vec![profile("VER", vec![210.0, 320.5]), profile("TSU", vec![205.0])];

        match write_profiles_csv(&path, &profiles) {
            Err(WriteError::ShapeMismatch { row, expected, found }) => {
                assert_eq!(row, "TSU");
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_write_assignments_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("assignments.csv");
        let assignment = ClusterAssignment {
            drivers: vec!["VER".to_string(), "NOR".to_string()],
            labels: vec![0, NOISE],
        };
        let patterns = PatternSummary {
            n_patterns: 2,
            n_noise: 10,
            n_samples: 100,
            dominant: vec![("VER".to_string(), Some((1, 0.75))), ("NOR".to_string(), None)],
        };

        write_assignments_csv(&path, &assignment, Some(&patterns)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "driver,cluster,dominant_pattern,pattern_share");
        assert_eq!(lines[1], "VER,0,1,0.7500");
        assert_eq!(lines[2], "NOR,-1,,");
    }

    #[test]
    fn test_write_similarity_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("similarity.csv");
        let drivers = vec!["VER".to_string(), "NOR".to_string()];
        let sim = compute_similarity(&drivers, &[vec![0.0], vec![1.0]], &[NOISE, NOISE]);

        write_similarity_csv(&path, &sim).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "driver,VER,NOR");
        assert_eq!(lines[1], "VER,1.0000,0.0000");
        assert_eq!(lines[2], "NOR,0.0000,1.0000");
    }
}
