//! Per-node spatial statistics across a bundle: Mahalanobis distances and
//! the gaussian streamline weights derived from them.
//!
//! At each node position, the coordinates of that node across all
//! streamlines form a small 3D point cloud. Its 3×3 covariance and central
//! statistic define a Mahalanobis distance per streamline, which either
//! feeds the outlier cleaner directly or is inverted and normalized into
//! per-node weights for profile summaries.

use nalgebra::{Matrix3, Vector3};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::streamline::ResampledBundle;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors from bundle node statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightError {
    /// The covariance at a node could not be inverted. Callers may skip
    /// cleaning for the affected bundle instead of aborting the run.
    SingularCovariance { node: usize },
}

impl std::fmt::Display for WeightError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingularCovariance { node } => {
                write!(f, "singular covariance at node {}", node)
            }
        }
    }
}

impl std::error::Error for WeightError {}

// ── Options ────────────────────────────────────────────────────────────────

/// Central statistic of a node's coordinates across streamlines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatistic {
    #[default]
    Mean,
    /// Coordinate-wise median; more robust to gross outliers.
    Median,
}

/// How the per-node 3×3 covariance is assembled before inversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovarianceMode {
    /// Proper symmetric covariance (population normalization).
    #[default]
    Symmetric,
    /// Historical construction with a zeroed lower triangle. Not positive
    /// definite in general; kept selectable for numeric compatibility with
    /// legacy output. Distances may come out NaN where the quadratic form
    /// goes negative.
    Legacy,
}

// ── Node statistics ────────────────────────────────────────────────────────

fn node_coords(bundle: &ResampledBundle, node: usize) -> Vec<Vector3<f64>> {
    (0..bundle.count())
        .map(|sl| {
            let p = bundle.node(sl, node);
            Vector3::new(p[0], p[1], p[2])
        })
        .collect()
}

fn mean(coords: &[Vector3<f64>]) -> Vector3<f64> {
    coords.iter().sum::<Vector3<f64>>() / coords.len() as f64
}

fn median_component(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

fn central_statistic(coords: &[Vector3<f64>], stat: NodeStatistic) -> Vector3<f64> {
    match stat {
        NodeStatistic::Mean => mean(coords),
        NodeStatistic::Median => Vector3::new(
            median_component(coords.iter().map(|c| c.x).collect()),
            median_component(coords.iter().map(|c| c.y).collect()),
            median_component(coords.iter().map(|c| c.z).collect()),
        ),
    }
}

fn covariance(coords: &[Vector3<f64>], mode: CovarianceMode) -> Matrix3<f64> {
    let mu = mean(coords);
    let mut c = Matrix3::zeros();
    for x in coords {
        let d = x - mu;
        c += d * d.transpose();
    }
    c /= coords.len() as f64;
    if mode == CovarianceMode::Legacy {
        c[(1, 0)] = 0.0;
        c[(2, 0)] = 0.0;
        c[(2, 1)] = 0.0;
    }
    c
}

// ── Distances and weights ──────────────────────────────────────────────────

/// Per-(streamline, node) Mahalanobis distance from the node statistic.
///
/// Shape `(count, n_nodes)`. A single-streamline bundle has no meaningful
/// distance and yields all-NaN.
pub fn mahalanobis_distances(
    bundle: &ResampledBundle,
    stat: NodeStatistic,
    mode: CovarianceMode,
) -> Result<Array2<f64>, WeightError> {
    let n = bundle.count();
    let n_nodes = bundle.n_nodes();
    if n == 1 {
        return Ok(Array2::from_elem((1, n_nodes), f64::NAN));
    }
    let mut distances = Array2::zeros((n, n_nodes));
    for node in 0..n_nodes {
        let coords = node_coords(bundle, node);
        let m = central_statistic(&coords, stat);
        let c = covariance(&coords, mode);
        let inv = c
            .try_inverse()
            .ok_or(WeightError::SingularCovariance { node })?;
        for (sl, x) in coords.iter().enumerate() {
            let d = x - m;
            // sqrt of a negative quadratic form (possible in Legacy mode)
            // comes out NaN, matching the historical numerics.
            distances[[sl, node]] = (d.dot(&(inv * d))).sqrt();
        }
    }
    Ok(distances)
}

/// Inverse-Mahalanobis streamline weights, normalized so the weights at
/// every node sum to 1 across streamlines.
///
/// A single-streamline bundle carries the entire weighting: all ones.
pub fn gaussian_weights(
    bundle: &ResampledBundle,
    stat: NodeStatistic,
    mode: CovarianceMode,
) -> Result<Array2<f64>, WeightError> {
    if bundle.count() == 1 {
        return Ok(Array2::from_elem((1, bundle.n_nodes()), 1.0));
    }
    let mut w = mahalanobis_distances(bundle, stat, mode)?;
    w.mapv_inplace(|d| 1.0 / d);
    for mut col in w.columns_mut() {
        let sum: f64 = col.iter().sum();
        col.mapv_inplace(|v| v / sum);
    }
    Ok(w)
}
