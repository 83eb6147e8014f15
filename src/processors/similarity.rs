//! Pairwise driving style similarity.

use crate::core::transforms::euclidean;
use super::clustering::NOISE;

/// Floor of the score of two drivers sharing a cluster.
pub const SAME_CLUSTER_BASE: f64 = 0.6;

/// Scale of the score of two drivers in different clusters.
pub const CROSS_CLUSTER_WEIGHT: f64 = 0.6;

/// Symmetric driver x driver similarity scores in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    pub drivers: Vec<String>,
    pub scores: Vec<Vec<f64>>,
    /// Euclidean distances between standardised profiles
    pub distances: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    /// Returns the number of drivers.
    #[inline]
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    #[inline]
    pub fn score(&self, a: usize, b: usize) -> f64 {
        self.scores[a][b]
    }

    /// Score between two drivers by code.
    pub fn score_between(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.drivers.iter().position(|d| d == a)?;
        let j = self.drivers.iter().position(|d| d == b)?;
        Some(self.scores[i][j])
    }

    /// Highest-scoring pair of distinct drivers; the earliest pair wins ties.
    pub fn most_similar_pair(&self) -> Option<(&str, &str, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..self.len() {
            for j in (i + 1)..self.len() {
                let s = self.scores[i][j];
                if best.map_or(true, |(_, _, b)| s > b) {
                    best = Some((i, j, s));
                }
            }
        }
        best.map(|(i, j, s)| (self.drivers[i].as_str(), self.drivers[j].as_str(), s))
    }
}

/// Score one pair from cluster labels and proximity (1 = identical, 0 = farthest pair).
pub fn pair_score(label_a: i32, label_b: i32, proximity: f64) -> f64 {
    let proximity = proximity.clamp(0.0, 1.0);
    let score = if label_a == NOISE || label_b == NOISE {
        proximity
    } else if label_a == label_b {
        SAME_CLUSTER_BASE + (1.0 - SAME_CLUSTER_BASE) * proximity
    } else {
        CROSS_CLUSTER_WEIGHT * proximity
    };
    score.clamp(0.0, 1.0)
}

/// Similarity of every driver pair on a track.
///
/// Distances are normalised by the largest pairwise distance of the track,
/// so the farthest pair has proximity 0. The diagonal is always 1.
pub fn compute_similarity(drivers: &[String], rows: &[Vec<f64>], labels: &[i32]) -> SimilarityMatrix {
    let n = rows.len();
    debug_assert_eq!(drivers.len(), n);
    debug_assert_eq!(labels.len(), n);

    let mut distances = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = euclidean(&rows[i], &rows[j]);
            distances[i][j] = d;
            distances[j][i] = d;
        }
    }

    let d_max = distances
        .iter()
        .flat_map(|row| row.iter().copied())
        .fold(0.0, f64::max);

    let mut scores = vec![vec![1.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let proximity = if d_max > 0.0 {
                1.0 - distances[i][j] / d_max
            } else {
                1.0
            };
            let s = pair_score(labels[i], labels[j], proximity);
            scores[i][j] = s;
            scores[j][i] = s;
        }
    }

    SimilarityMatrix {
        drivers: drivers.to_vec(),
        scores,
        distances,
    }
}
