//! Distance queries between streamlines and ROI coordinate sets.
//!
//! All queries are squared-Euclidean and scoped to one (streamline, ROI)
//! pair at a time; nothing here materializes an all-streamlines ×
//! all-ROI-points matrix.

use nalgebra::{Matrix4, Vector3};

/// Squared proximity tolerance derived from an affine: the squared distance
/// from a voxel's center to its corner under the voxel-to-world transform.
///
/// A streamline point "touches" an ROI voxel when their squared distance is
/// below this value. One segmentation run uses a single tolerance for every
/// bundle and every ROI.
pub fn voxel_corner_tolerance(affine: &Matrix4<f64>) -> f64 {
    let r = affine.fixed_view::<3, 3>(0, 0);
    let half_diagonal = r * Vector3::new(0.5, 0.5, 0.5);
    half_diagonal.norm_squared()
}

fn sq_dist(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Minimum squared distance between a streamline and a coordinate set,
/// together with the streamline node attaining it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestApproach {
    /// Minimum squared Euclidean distance over all (node, coordinate) pairs.
    pub sq_dist: f64,
    /// Index of the streamline node attaining the minimum.
    pub node: usize,
}

/// Closest approach between `points` and `coords`.
///
/// Returns `None` when either set is empty.
pub fn closest_approach(points: &[[f64; 3]], coords: &[[f64; 3]]) -> Option<ClosestApproach> {
    if points.is_empty() || coords.is_empty() {
        return None;
    }
    let mut best = ClosestApproach { sq_dist: f64::INFINITY, node: 0 };
    for (node, p) in points.iter().enumerate() {
        for c in coords {
            let d = sq_dist(*p, *c);
            if d < best.sq_dist {
                best = ClosestApproach { sq_dist: d, node };
            }
        }
    }
    Some(best)
}

/// Whether any (point, coordinate) pair lies strictly closer than
/// `sq_tolerance`. Short-circuits on the first hit.
pub fn any_within(points: &[[f64; 3]], coords: &[[f64; 3]], sq_tolerance: f64) -> bool {
    points
        .iter()
        .any(|p| coords.iter().any(|c| sq_dist(*p, *c) < sq_tolerance))
}
