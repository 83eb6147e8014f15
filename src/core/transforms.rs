//! Derived telemetry channels and numeric helpers.
//!
//! This module provides the channel derivations applied to every lap table,
//! column standardisation, percentiles, normalisation and reproducible
//! subsampling. Row-wise standardisation is parallelized using Rayon.

use rayon::prelude::*;

use super::loaders::LapRecord;

/// Window length of the rolling speed standard deviation.
pub const SPEED_VARIABILITY_WINDOW: usize = 10;

/// Channels computed from the raw samples of a lap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedChannels {
    pub throttle_rate: Vec<f64>,
    pub brake_intensity: Vec<f64>,
    pub gear_efficiency: Vec<f64>,
    pub speed_variability: Vec<f64>,
    pub acceleration: Vec<f64>,
}

/// Compute the derived channels for a sequence of samples.
///
/// * throttle rate: `|throttle[i] - throttle[i-1]|`, 0 for the first sample
/// * brake intensity: `brake * speed`
/// * gear efficiency: `rpm / (gear + 1)`
/// * speed variability: rolling sample standard deviation over
///   [`SPEED_VARIABILITY_WINDOW`] samples, 0 where undefined
/// * acceleration: `speed[i] - speed[i-1]`, 0 for the first sample
pub fn derive_channels(records: &[LapRecord]) -> DerivedChannels {
    let n = records.len();
    let speeds: Vec<f64> = records.iter().map(|r| r.speed).collect();

    let mut throttle_rate = Vec::with_capacity(n);
    let mut acceleration = Vec::with_capacity(n);
    for i in 0..n {
        if i == 0 {
            throttle_rate.push(0.0);
            acceleration.push(0.0);
        } else {
            throttle_rate.push((records[i].throttle - records[i - 1].throttle).abs());
            acceleration.push(records[i].speed - records[i - 1].speed);
        }
    }

    DerivedChannels {
        throttle_rate,
        brake_intensity: records.iter().map(|r| r.brake * r.speed).collect(),
        gear_efficiency: records.iter().map(|r| r.rpm / (r.gear + 1.0)).collect(),
        speed_variability: rolling_std(&speeds, SPEED_VARIABILITY_WINDOW),
        acceleration,
    }
}

/// Trailing-window sample standard deviation; windows shorter than two give 0.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            sample_std(&values[start..=i]).unwrap_or(0.0)
        })
        .collect()
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1 denominator), `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Percentile with linear interpolation between closest ranks, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Standardise each column to zero mean and unit (population) variance.
///
/// Columns with zero variance become all zeros. Rows must share one length.
pub fn standardize_columns(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.len();
    if n == 0 {
        return Vec::new();
    }
    let dims = rows[0].len();
    debug_assert!(rows.iter().all(|r| r.len() == dims), "ragged matrix");

    let mut means = vec![0.0; dims];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v;
        }
    }
    means.iter_mut().for_each(|m| *m /= n as f64);

    let mut scales = vec![0.0; dims];
    for row in rows {
        for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
            *s += (v - m) * (v - m);
        }
    }
    let scales: Vec<f64> = scales
        .into_iter()
        .map(|s| {
            let std = (s / n as f64).sqrt();
            if std > f64::EPSILON {
                std
            } else {
                1.0
            }
        })
        .collect();

    rows.par_iter()
        .map(|row| {
            row.iter()
                .zip(means.iter().zip(&scales))
                .map(|(v, (m, s))| (v - m) / s)
                .collect()
        })
        .collect()
}

/// Min-max normalise to [0, 1]; a single value or a constant slice maps to 0.5.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return vec![0.5; values.len()];
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![0.5; values.len()];
    }
    values
        .iter()
        .map(|v| {
            if v.is_finite() {
                (v - min) / (max - min)
            } else {
                0.5
            }
        })
        .collect()
}

/// Euclidean distance between two equally long vectors.
#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Pick at most `max_samples` of `n` indices, reproducibly for a given seed.
///
/// If `n <= max_samples` every index is returned. Otherwise a partial
/// Fisher-Yates shuffle driven by a 64-bit LCG selects the indices, which
/// are returned sorted.
pub fn subsample_indices(n: usize, max_samples: usize, seed: u64) -> Vec<usize> {
    if n <= max_samples {
        return (0..n).collect();
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut state: u64 = seed;
    for i in 0..max_samples {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let j = i + ((state >> 33) as usize) % (n - i);
        indices.swap(i, j);
    }

    indices.truncate(max_samples);
    indices.sort_unstable();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(speed: f64, throttle: f64, gear: f64, rpm: f64, brake: f64) -> LapRecord {
        LapRecord {
            distance: 0.0,
            speed,
            throttle,
            gear,
            rpm,
            brake,
        }
    }

    #[test]
    fn test_derive_channels() {
        let records = vec![
            record(100.0, 20.0, 3.0, 8000.0, 1.0),
            record(120.0, 60.0, 4.0, 10000.0, 0.0),
            record(110.0, 40.0, 4.0, 9000.0, 1.0),
        ];
        let derived = derive_channels(&records);

        assert_eq!(derived.throttle_rate, vec![0.0, 40.0, 20.0]);
        assert_eq!(derived.acceleration, vec![0.0, 20.0, -10.0]);
        assert_eq!(derived.brake_intensity, vec![100.0, 0.0, 110.0]);
        assert_eq!(derived.gear_efficiency, vec![2000.0, 2000.0, 1800.0]);
        assert_eq!(derived.speed_variability[0], 0.0);
        assert!((derived.speed_variability[1] - 200f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_derive_channels_empty() {
        let derived = derive_channels(&[]);
        assert_eq!(derived, DerivedChannels::default());
    }

    #[test]
    fn test_rolling_std_window() {
        let values = vec![1.0, 1.0, 1.0, 5.0];
        let rolled = rolling_std(&values, 2);
        assert_eq!(rolled[0], 0.0);
        assert_eq!(rolled[1], 0.0);
        assert!((rolled[3] - 8f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_quantile() {
        let values = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 0.5), Some(3.0));
        assert_eq!(quantile(&values, 1.0), Some(5.0));
        assert!((quantile(&values, 0.3).unwrap() - 2.2).abs() < 1e-9);
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_standardize_columns() {
        let rows = vec![vec![1.0, 7.0], vec![3.0, 7.0]];
        let scaled = standardize_columns(&rows);
        assert_eq!(scaled[0], vec![-1.0, 0.0]);
        assert_eq!(scaled[1], vec![1.0, 0.0]);
        assert!(standardize_columns(&[]).is_empty());
    }

    #[test]
    fn test_min_max_normalize() {
        assert_eq!(min_max_normalize(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(min_max_normalize(&[7.0]), vec![0.5]);
        assert_eq!(min_max_normalize(&[7.0, 7.0]), vec![0.5, 0.5]);
    }

    #[test]
    fn test_subsample_indices_no_reduction() {
        assert_eq!(subsample_indices(5, 10, 42), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_subsample_indices_reproducible() {
        let first = subsample_indices(1000, 100, 42);
        let second = subsample_indices(1000, 100, 42);

        assert_eq!(first.len(), 100);
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
        assert!(first.iter().all(|&i| i < 1000));
    }
}
