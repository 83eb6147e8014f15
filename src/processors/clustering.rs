//! Density-based clustering of driver profiles and telemetry samples.
//!
//! This module implements a parallelized DBSCAN using:
//! - `kiddo` KD-tree for neighbour queries over telemetry samples
//! - `rayon` for parallel neighbour finding and core point merging
//! - Atomic union-find for lock-free cluster merging
//!
//! Labels are assigned in one sequential pass, so the result only depends on
//! the input rows and the hyperparameters.
//!
//! # Example
//!
//! ```no_run
//! use driving_style::config::ClusterParams;
//! use driving_style::processors::clustering::dbscan;
//!
//! let rows = vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![9.0, 9.0]];
//! let labels = dbscan(&rows, &ClusterParams { eps: 0.5, min_samples: 2 });
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use crate::config::{ClusterParams, TrackClustering};
use crate::core::loaders::{Channel, LapTable};
use crate::core::transforms::{euclidean, standardize_columns, subsample_indices};
use super::features::FeatureMatrix;
use super::similarity::{compute_similarity, SimilarityMatrix};

/// Label of points that belong to no dense group.
pub const NOISE: i32 = -1;

/// Dimension of a sample-level pattern row.
pub const PATTERN_DIMS: usize = Channel::PATTERN_CHANNELS.len();

/// Relative slack on the KD-tree search radius; candidates are re-checked
/// against the exact radius.
const SEARCH_SLACK: f64 = 1.0 + 1e-9;

/// Atomic Union-Find data structure for lock-free parallel cluster merging.
///
/// Uses path compression with atomic compare-and-swap operations to safely
/// merge clusters from multiple threads without locks.
pub struct AtomicUnionFind {
    parent: Vec<AtomicUsize>,
}

impl AtomicUnionFind {
    /// Create a new union-find structure where each element is its own parent.
    #[inline]
    pub fn new(size: usize) -> Self {
        let parent = (0..size).map(AtomicUsize::new).collect();
        Self { parent }
    }

    /// Find the root of the set containing `x` with path compression.
    #[inline]
    pub fn find(&self, mut x: usize) -> usize {
        loop {
            let p = self.parent[x].load(Ordering::Relaxed);
            if p == x {
                return x;
            }
            let gp = self.parent[p].load(Ordering::Relaxed);
            if gp != p {
                // ok if this loses a race, the root is still reachable
                let _ = self.parent[x].compare_exchange_weak(
                    p,
                    gp,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
            x = p;
        }
    }

    /// Union the sets containing `x` and `y`.
    ///
    /// Returns true if a merge actually occurred, false if they were already
    /// in the same set.
    #[inline]
    pub fn union(&self, x: usize, y: usize) -> bool {
        loop {
            let root_x = self.find(x);
            let root_y = self.find(y);

            if root_x == root_y {
                return false;
            }

            let (small, large) = if root_x < root_y {
                (root_x, root_y)
            } else {
                (root_y, root_x)
            };

            match self.parent[small].compare_exchange_weak(
                small,
                large,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }
}

/// Cluster labels from per-row neighbour lists.
///
/// `neighbours[i]` holds every row within `eps` of row `i`, itself included,
/// in ascending index order.
fn label_neighbourhoods(neighbours: &[Vec<usize>], min_samples: usize) -> Vec<i32> {
    let n = neighbours.len();

    let is_core: Vec<bool> = neighbours
        .par_iter()
        .map(|neigh| neigh.len() >= min_samples)
        .collect();

    let uf = AtomicUnionFind::new(n);
    (0..n).into_par_iter().filter(|&i| is_core[i]).for_each(|i| {
        for &j in &neighbours[i] {
            if j > i && is_core[j] {
                uf.union(i, j);
            }
        }
    });

    let mut root_to_cluster: HashMap<usize, i32> = HashMap::new();
    let mut next_cluster_id: i32 = 0;
    let mut labels = vec![NOISE; n];

    for i in 0..n {
        if is_core[i] {
            let root = uf.find(i);
            labels[i] = *root_to_cluster.entry(root).or_insert_with(|| {
                let id = next_cluster_id;
                next_cluster_id += 1;
                id
            });
        }
    }

    // border rows join their lowest-index core neighbour
    for i in 0..n {
        if is_core[i] {
            continue;
        }
        if let Some(&j) = neighbours[i].iter().find(|&&j| is_core[j]) {
            labels[i] = labels[j];
        }
    }

    labels
}

/// DBSCAN over rows of equal dimension.
///
/// The neighbourhood of a row is every row (itself included) within `eps`
/// Euclidean distance. A core row has at least `min_samples` neighbours.
/// Core rows within `eps` of each other share a cluster; a non-core row
/// joins the cluster of its lowest-index core neighbour, otherwise it is
/// labelled [`NOISE`]. Cluster ids are numbered in order of first
/// appearance.
///
/// # Algorithm (Parallelized)
///
/// 1. **Parallel neighbour finding**: brute-force distances per row
/// 2. **Lock-free cluster formation**: each core row unions with its core
///    neighbours through the atomic union-find
/// 3. **Label assignment**: sequential pass mapping roots to ids
///
/// Used for driver profiles, whose width follows the configured metric
/// list. Telemetry samples go through [`dbscan_patterns`].
pub fn dbscan(rows: &[Vec<f64>], params: &ClusterParams) -> Vec<i32> {
    if rows.is_empty() {
        return Vec::new();
    }
    let eps = params.eps;

    let neighbours: Vec<Vec<usize>> = rows
        .par_iter()
        .map(|row| {
            (0..rows.len())
                .filter(|&j| euclidean(row, &rows[j]) <= eps)
                .collect()
        })
        .collect();

    label_neighbourhoods(&neighbours, params.min_samples)
}

/// DBSCAN over fixed-width pattern rows, with KD-tree neighbour queries.
///
/// Same neighbourhood and labelling rules as [`dbscan`].
pub fn dbscan_patterns(points: &[[f64; PATTERN_DIMS]], params: &ClusterParams) -> Vec<i32> {
    if points.is_empty() {
        return Vec::new();
    }

    let tree: ImmutableKdTree<f64, PATTERN_DIMS> = ImmutableKdTree::new_from_slice(points);
    let eps_sq = params.eps * params.eps;

    let neighbours: Vec<Vec<usize>> = points
        .par_iter()
        .map(|point| {
            let mut found: Vec<usize> = tree
                .within::<SquaredEuclidean>(point, eps_sq * SEARCH_SLACK)
                .iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| euclidean(point, &points[j]) <= params.eps)
                .collect();
            found.sort_unstable();
            found
        })
        .collect();

    label_neighbourhoods(&neighbours, params.min_samples)
}

/// Number of distinct clusters in a label vector, noise excluded.
pub fn count_clusters(labels: &[i32]) -> usize {
    labels
        .iter()
        .filter(|&&l| l != NOISE)
        .max()
        .map_or(0, |&max| max as usize + 1)
}

/// Cluster label of every driver on a track.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub drivers: Vec<String>,
    pub labels: Vec<i32>,
}

impl ClusterAssignment {
    /// Label of a driver, `None` if the driver was not clustered.
    pub fn label_of(&self, driver: &str) -> Option<i32> {
        self.drivers
            .iter()
            .position(|d| d == driver)
            .map(|i| self.labels[i])
    }

    pub fn n_clusters(&self) -> usize {
        count_clusters(&self.labels)
    }

    pub fn n_noise(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }
}

/// Driver-level clustering result of a track.
#[derive(Debug, Clone)]
pub enum DriverClustering {
    /// Fewer than two drivers had usable profiles
    InsufficientData { usable: usize },
    Complete {
        assignment: ClusterAssignment,
        similarity: SimilarityMatrix,
        /// Standardised profile rows, in `assignment.drivers` order
        standardized: Vec<Vec<f64>>,
    },
}

/// Cluster drivers by their standardised profiles and score pair similarity.
pub fn cluster_drivers(matrix: &FeatureMatrix, params: &ClusterParams) -> DriverClustering {
    if matrix.len() < 2 {
        return DriverClustering::InsufficientData {
            usable: matrix.len(),
        };
    }

    let standardized = matrix.standardized();
    let labels = dbscan(&standardized, params);
    let assignment = ClusterAssignment {
        drivers: matrix.drivers.clone(),
        labels,
    };
    let similarity = compute_similarity(&matrix.drivers, &standardized, &assignment.labels);

    DriverClustering::Complete {
        assignment,
        similarity,
        standardized,
    }
}

/// Sample-level pattern clustering result of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSummary {
    pub n_patterns: usize,
    pub n_noise: usize,
    pub n_samples: usize,
    /// Per driver: most frequent non-noise pattern and its share of the
    /// driver's clustered samples
    pub dominant: Vec<(String, Option<(i32, f64)>)>,
}

impl PatternSummary {
    /// Share of samples labelled noise, in percent.
    pub fn noise_percent(&self) -> f64 {
        if self.n_samples == 0 {
            0.0
        } else {
            self.n_noise as f64 / self.n_samples as f64 * 100.0
        }
    }
}

/// Run DBSCAN over standardised telemetry samples of every driver.
///
/// At most `samples_per_driver` samples per driver are used, selected
/// reproducibly from `seed`.
pub fn cluster_patterns(
    tables: &[LapTable],
    params: &TrackClustering,
    samples_per_driver: usize,
    seed: u64,
) -> PatternSummary {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut owners: Vec<usize> = Vec::new();

    for (t, table) in tables.iter().enumerate() {
        let channels: Vec<Vec<f64>> = Channel::PATTERN_CHANNELS
            .iter()
            .map(|&c| table.channel(c))
            .collect();
        for idx in subsample_indices(table.len(), samples_per_driver, seed) {
            rows.push(channels.iter().map(|values| values[idx]).collect());
            owners.push(t);
        }
    }

    let points: Vec<[f64; PATTERN_DIMS]> = standardize_columns(&rows)
        .into_iter()
        .map(|row| {
            let mut point = [0.0; PATTERN_DIMS];
            point.copy_from_slice(&row);
            point
        })
        .collect();
    let labels = dbscan_patterns(&points, &params.patterns);

    let dominant = tables
        .iter()
        .enumerate()
        .map(|(t, table)| {
            let mut counts: HashMap<i32, usize> = HashMap::new();
            for (&owner, &label) in owners.iter().zip(&labels) {
                if owner == t && label != NOISE {
                    *counts.entry(label).or_insert(0) += 1;
                }
            }
            let total: usize = counts.values().sum();
            let best = counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                .map(|(label, count)| (label, count as f64 / total as f64));
            (table.driver.clone(), best)
        })
        .collect();

    let summary = PatternSummary {
        n_patterns: count_clusters(&labels),
        n_noise: labels.iter().filter(|&&l| l == NOISE).count(),
        n_samples: labels.len(),
        dominant,
    };

    log::info!(
        "{} patterns, {} noise points ({:.1}%)",
        summary.n_patterns,
        summary.n_noise,
        summary.noise_percent()
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProfileConfig, Session};
    use crate::core::loaders::LapRecord;
    use crate::processors::features::build_profiles;

    fn params(eps: f64, min_samples: usize) -> ClusterParams {
        ClusterParams { eps, min_samples }
    }

    #[test]
    fn test_atomic_union_find_basic() {
        let uf = AtomicUnionFind::new(5);

        assert_eq!(uf.find(0), 0);
        assert_eq!(uf.find(4), 4);

        assert!(uf.union(0, 1));
        assert_eq!(uf.find(0), uf.find(1));

        assert!(uf.union(2, 3));
        assert_ne!(uf.find(0), uf.find(2));

        assert!(uf.union(1, 2));
        assert_eq!(uf.find(0), uf.find(3));

        assert!(!uf.union(0, 3));
    }

    #[test]
    fn test_dbscan_two_clusters() {
        let rows = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![100.0, 100.0],
            vec![101.0, 100.0],
            vec![100.0, 101.0],
        ];
        let labels = dbscan(&rows, &params(2.0, 2));

        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(count_clusters(&labels), 2);
    }

    #[test]
    fn test_dbscan_noise_and_border() {
        let rows = vec![
            vec![0.0],
            vec![0.5],
            vec![1.0],
            // border: within eps of the core at 1.0 but has only 2 neighbours
            vec![1.9],
            vec![50.0],
        ];
        let labels = dbscan(&rows, &params(1.0, 3));

        assert_eq!(labels[0], 0);
        assert_eq!(labels[1], 0);
        assert_eq!(labels[2], 0);
        assert_eq!(labels[3], 0);
        assert_eq!(labels[4], NOISE);
    }

    #[test]
    fn test_dbscan_deterministic() {
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let base = if i % 3 == 0 { 10.0 } else { 0.0 };
                vec![base + (i % 7) as f64 * 0.1, base - (i % 5) as f64 * 0.1]
            })
            .collect();

        let first = dbscan(&rows, &params(0.5, 4));
        for _ in 0..5 {
            assert_eq!(dbscan(&rows, &params(0.5, 4)), first);
        }
    }

    #[test]
    fn test_dbscan_empty_and_single() {
        assert!(dbscan(&[], &params(1.0, 2)).is_empty());
        assert_eq!(dbscan(&[vec![0.0]], &params(1.0, 2)), vec![NOISE]);
        assert_eq!(dbscan(&[vec![0.0]], &params(1.0, 1)), vec![0]);
    }

    fn pattern_point(seed: usize, centre: f64) -> [f64; PATTERN_DIMS] {
        let mut point = [centre; PATTERN_DIMS];
        for (d, v) in point.iter_mut().enumerate() {
            *v += ((seed * 7 + d * 3) % 11) as f64 * 0.005;
        }
        point
    }

    #[test]
    fn test_dbscan_patterns_matches_brute_force() {
        let mut points: Vec<[f64; PATTERN_DIMS]> = Vec::new();
        for i in 0..120 {
            let centre = match i % 3 {
                0 => 0.0,
                1 => 5.0,
                _ => -5.0,
            };
            points.push(pattern_point(i, centre));
        }
        // isolated samples
        points.push([20.0; PATTERN_DIMS]);
        points.push([-20.0; PATTERN_DIMS]);

        let p = params(0.5, 5);
        let rows: Vec<Vec<f64>> = points.iter().map(|pt| pt.to_vec()).collect();
        let labels = dbscan_patterns(&points, &p);

        assert_eq!(labels, dbscan(&rows, &p));
        assert_eq!(count_clusters(&labels), 3);
        assert_eq!(labels[..3], [0, 1, 2]);
        assert_eq!(labels[120], NOISE);
        assert_eq!(labels[121], NOISE);
    }

    #[test]
    fn test_dbscan_patterns_duplicate_samples() {
        // identical samples are each other's neighbours
        let mut points = vec![[0.0; PATTERN_DIMS]; 40];
        points.push([3.0; PATTERN_DIMS]);

        let labels = dbscan_patterns(&points, &params(0.1, 40));
        assert!(labels[..40].iter().all(|&l| l == 0));
        assert_eq!(labels[40], NOISE);
        assert!(dbscan_patterns(&[], &params(0.1, 2)).is_empty());
    }

    #[test]
    fn test_cluster_drivers_opposite_profiles_are_noise() {
        let matrix = FeatureMatrix {
            drivers: vec!["VER".to_string(), "NOR".to_string()],
            feature_names: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            rows: vec![vec![1.0, -2.0, 3.0], vec![-1.0, 2.0, -3.0]],
        };

        match cluster_drivers(&matrix, &params(0.5, 2)) {
            DriverClustering::Complete {
                assignment,
                similarity,
                ..
            } => {
                assert_eq!(assignment.labels, vec![NOISE, NOISE]);
                assert_eq!(assignment.n_noise(), 2);
                assert!(similarity.score(0, 1) < 0.3);
                assert_eq!(similarity.score(0, 0), 1.0);
            }
            other => panic!("Expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn test_cluster_drivers_insufficient() {
        let matrix = FeatureMatrix {
            drivers: vec!["VER".to_string()],
            feature_names: vec!["a".to_string()],
            rows: vec![vec![1.0]],
        };
        assert!(matches!(
            cluster_drivers(&matrix, &params(0.5, 2)),
            DriverClustering::InsufficientData { usable: 1 }
        ));
    }

    #[test]
    fn test_cluster_drivers_from_profiles() {
        let make = |driver: &str, speed: f64, throttle: f64| {
            let records = (0..120)
                .map(|i| LapRecord {
                    distance: i as f64,
                    speed: speed + (i % 10) as f64,
                    throttle: if i % 4 == 0 { 0.0 } else { throttle },
                    gear: 6.0,
                    rpm: 10500.0,
                    brake: if i % 4 == 0 { 1.0 } else { 0.0 },
                })
                .collect();
            LapTable::new("Japan", Session::Qualifying, driver, records)
        };
        let tables = vec![
            make("VER", 220.0, 90.0),
            make("TSU", 221.0, 90.0),
            make("ALB", 180.0, 60.0),
        ];
        let profiles = build_profiles(&tables, &ProfileConfig::default());
        let matrix = FeatureMatrix::new(&profiles).unwrap();

        match cluster_drivers(&matrix, &params(3.5, 2)) {
            DriverClustering::Complete { assignment, similarity, .. } => {
                assert_eq!(assignment.label_of("VER"), assignment.label_of("TSU"));
                assert_ne!(assignment.label_of("VER"), Some(NOISE));
                assert!(similarity.score(0, 1) > similarity.score(0, 2));
            }
            other => panic!("Expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn test_cluster_patterns_summary() {
        let make = |driver: &str, offset: f64| {
            let records = (0..300)
                .map(|i| LapRecord {
                    distance: i as f64,
                    speed: if i % 2 == 0 { 100.0 } else { 300.0 } + offset,
                    throttle: if i % 2 == 0 { 20.0 } else { 100.0 },
                    gear: if i % 2 == 0 { 3.0 } else { 8.0 },
                    rpm: 11000.0,
                    brake: 0.0,
                })
                .collect();
            LapTable::new("Japan", Session::Qualifying, driver, records)
        };
        let tables = vec![make("VER", 0.0), make("NOR", 0.0)];
        let clustering = TrackClustering {
            patterns: params(0.5, 5),
            drivers: params(3.5, 2),
        };

        let summary = cluster_patterns(&tables, &clustering, 200, 42);
        assert_eq!(summary.n_samples, 400);
        assert_eq!(summary.dominant.len(), 2);
        assert!(summary.n_patterns >= 1);
        assert!(summary.noise_percent() <= 100.0);
        assert!(summary.dominant.iter().all(|(_, d)| d.is_some()));
    }
}
