//! Per-driver driving style profiles.
//!
//! A profile is a fixed-length vector of named summary metrics computed from
//! one driver's lap table. All drivers of a track are profiled with the same
//! metric list, so columns line up in the [`FeatureMatrix`].

use rayon::prelude::*;
use thiserror::Error;

use crate::config::{MetricSpec, ProfileConfig, SpeedBand, Statistic};
use crate::core::loaders::{Channel, LapTable};
use crate::core::transforms::{mean, quantile, sample_std, standardize_columns};

/// Lower speed percentile bounding the cornering band.
const LOW_SPEED_QUANTILE: f64 = 0.3;

/// Upper speed percentile bounding the straight-line band.
const HIGH_SPEED_QUANTILE: f64 = 0.7;

/// Offset keeping the inverse-mean statistic finite.
const INVERSE_MEAN_OFFSET: f64 = 0.001;

/// Errors that can occur while assembling feature matrices.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("feature columns of {driver} do not match: expected [{expected}], found [{found}]")]
    FeatureMismatch {
        driver: String,
        expected: String,
        found: String,
    },

    #[error("no driver profiles to assemble")]
    NoProfiles,
}

/// Raw indicators behind the aggressiveness and smoothness rankings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleIndicators {
    pub throttle_mean: f64,
    pub throttle_rate_mean: f64,
    pub brake_intensity_mean: f64,
}

/// Driving style summary of one driver on one track.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverProfile {
    pub track: String,
    pub driver: String,
    /// Number of telemetry samples the profile was computed from
    pub samples: usize,
    /// Fewer samples than the configured minimum
    pub low_confidence: bool,
    pub feature_names: Vec<String>,
    pub values: Vec<f64>,
    pub style: StyleIndicators,
}

impl DriverProfile {
    /// Value of a named metric.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.feature_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Compute one metric over a lap table.
///
/// Speed bands select samples strictly below the 30th or above the 70th
/// speed percentile; an empty band falls back to all samples. Undefined
/// or non-finite results are reported as 0.
pub fn compute_metric(table: &LapTable, spec: &MetricSpec) -> f64 {
    let values = table.channel(spec.channel);

    let selected: Vec<f64> = match spec.band {
        SpeedBand::All => values,
        band => {
            let speeds = table.channel(Channel::Speed);
            let in_band: Vec<f64> = match band {
                SpeedBand::LowSpeed => {
                    let cut = quantile(&speeds, LOW_SPEED_QUANTILE).unwrap_or(f64::NEG_INFINITY);
                    values
                        .iter()
                        .zip(&speeds)
                        .filter(|(_, s)| **s < cut)
                        .map(|(v, _)| *v)
                        .collect()
                }
                _ => {
                    let cut = quantile(&speeds, HIGH_SPEED_QUANTILE).unwrap_or(f64::INFINITY);
                    values
                        .iter()
                        .zip(&speeds)
                        .filter(|(_, s)| **s > cut)
                        .map(|(v, _)| *v)
                        .collect()
                }
            };
            if in_band.is_empty() {
                values
            } else {
                in_band
            }
        }
    };

    let result = match spec.statistic {
        Statistic::Mean => mean(&selected),
        Statistic::Std => sample_std(&selected),
        Statistic::Min => selected.iter().copied().reduce(f64::min),
        Statistic::Max => selected.iter().copied().reduce(f64::max),
        Statistic::InverseMean => mean(&selected).map(|m| 1.0 / (m + INVERSE_MEAN_OFFSET)),
    };
    finite_or_zero(result)
}

/// Build the profile of one driver, `None` for an empty table.
pub fn build_profile(table: &LapTable, config: &ProfileConfig) -> Option<DriverProfile> {
    if table.is_empty() {
        return None;
    }

    let values = config
        .metrics
        .iter()
        .map(|spec| compute_metric(table, spec))
        .collect();

    let style = StyleIndicators {
        throttle_mean: finite_or_zero(mean(&table.channel(Channel::Throttle))),
        throttle_rate_mean: finite_or_zero(mean(&table.channel(Channel::ThrottleRate))),
        brake_intensity_mean: finite_or_zero(mean(&table.channel(Channel::BrakeIntensity))),
    };

    Some(DriverProfile {
        track: table.track.clone(),
        driver: table.driver.clone(),
        samples: table.len(),
        low_confidence: table.len() < config.min_samples,
        feature_names: config.feature_names(),
        values,
        style,
    })
}

/// Profile every driver of a track, keeping the table order.
///
/// Empty tables are excluded; low-confidence profiles are kept with a warning.
pub fn build_profiles(tables: &[LapTable], config: &ProfileConfig) -> Vec<DriverProfile> {
    let profiles: Vec<DriverProfile> = tables
        .par_iter()
        .filter_map(|table| build_profile(table, config))
        .collect();

    for profile in profiles.iter().filter(|p| p.low_confidence) {
        log::warn!(
            "{}: {} has only {} samples (minimum {}), profile is low-confidence",
            profile.track,
            profile.driver,
            profile.samples,
            config.min_samples
        );
    }

    profiles
}

/// Aligned feature matrix: one row per driver, one column per metric.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub drivers: Vec<String>,
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Assemble profiles into a matrix.
    ///
    /// # Errors
    ///
    /// `FeatureMismatch` if any profile's feature names differ from the
    /// first profile's, `NoProfiles` for an empty slice.
    pub fn new(profiles: &[DriverProfile]) -> Result<Self, FeatureError> {
        let first = profiles.first().ok_or(FeatureError::NoProfiles)?;
        let feature_names = first.feature_names.clone();

        for profile in profiles {
            if profile.feature_names != feature_names || profile.values.len() != feature_names.len() {
                return Err(FeatureError::FeatureMismatch {
                    driver: profile.driver.clone(),
                    expected: feature_names.join(", "),
                    found: profile.feature_names.join(", "),
                });
            }
        }

        Ok(Self {
            drivers: profiles.iter().map(|p| p.driver.clone()).collect(),
            feature_names,
            rows: profiles.iter().map(|p| p.values.clone()).collect(),
        })
    }

    /// Returns the number of drivers.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the matrix has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows standardised column-wise to zero mean and unit variance.
    pub fn standardized(&self) -> Vec<Vec<f64>> {
        standardize_columns(&self.rows)
    }
}
