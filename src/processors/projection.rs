//! Two-component principal component projection of driver profiles.
//!
//! Components come from a full symmetric eigen decomposition of the
//! covariance matrix, ordered by eigenvalue. Each component's largest entry
//! is made positive, so identical input always yields identical coordinates.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Driver coordinates on the first two principal components.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// One `[pc1, pc2]` pair per input row
    pub points: Vec<[f64; 2]>,
    /// Share of total variance explained by each component
    pub explained_variance_ratio: [f64; 2],
}

/// Sample covariance of mean-centred rows.
fn covariance(centered: &DMatrix<f64>) -> DMatrix<f64> {
    let denom = (centered.nrows() - 1).max(1) as f64;
    (centered.transpose() * centered) / denom
}

/// Unit eigenvector with its largest-magnitude entry made positive.
fn oriented(mut v: DVector<f64>) -> DVector<f64> {
    if let Some(max) = v.iter().copied().max_by(|a, b| a.abs().total_cmp(&b.abs())) {
        if max < 0.0 {
            v.neg_mut();
        }
    }
    v
}

/// Project rows onto their first two principal components.
///
/// Returns `None` with fewer than two rows.
pub fn project_2d(rows: &[Vec<f64>]) -> Option<Projection> {
    if rows.len() < 2 || rows[0].is_empty() {
        return None;
    }
    let n = rows.len();
    let dims = rows[0].len();

    let data = DMatrix::from_fn(n, dims, |r, c| rows[r][c]);
    let means = data.row_mean();
    let centered = DMatrix::from_fn(n, dims, |r, c| data[(r, c)] - means[c]);

    let cov = covariance(&centered);
    let total_variance = cov.trace();
    let eigen = SymmetricEigen::new(cov);

    // descending eigenvalue, ties broken by column index
    let mut order: Vec<usize> = (0..dims).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .total_cmp(&eigen.eigenvalues[a])
            .then(a.cmp(&b))
    });

    let component = |k: usize| -> (DVector<f64>, f64) {
        match order.get(k) {
            Some(&col) => (
                oriented(eigen.eigenvectors.column(col).into_owned()),
                eigen.eigenvalues[col].max(0.0),
            ),
            None => (DVector::zeros(dims), 0.0),
        }
    };
    let (pc1, lambda1) = component(0);
    let (pc2, lambda2) = component(1);

    let scores1 = &centered * &pc1;
    let scores2 = &centered * &pc2;
    let points = (0..n).map(|i| [scores1[i], scores2[i]]).collect();

    let explained_variance_ratio = if total_variance > f64::EPSILON {
        [lambda1 / total_variance, lambda2 / total_variance]
    } else {
        [0.0, 0.0]
    };

    Some(Projection {
        points,
        explained_variance_ratio,
    })
}
