//! Hemispheric midline classification.
//!
//! A streamline "crosses the midline" when it has points strictly on both
//! sides of the world origin's left-right coordinate, with the origin mapped
//! into voxel space through the inverse of the reference affine. This module
//! classifies only; it never splits streamlines at the crossing point.

use nalgebra::Matrix4;

use crate::streamline::Streamline;
use crate::volume::{apply_affine, invert_affine, VolumeError};

/// Left-right coordinate of the world origin in the affine's voxel space.
pub fn midline_coordinate(affine: &Matrix4<f64>) -> Result<f64, VolumeError> {
    let inv = invert_affine(affine)?;
    Ok(apply_affine(&inv, [0.0, 0.0, 0.0])[0])
}

/// Whether the streamline has points strictly on both sides of `midline_x`.
pub fn crosses_midline(streamline: &Streamline, midline_x: f64) -> bool {
    let mut left = false;
    let mut right = false;
    for p in streamline.points() {
        if p[0] < midline_x {
            left = true;
        } else if p[0] > midline_x {
            right = true;
        }
        if left && right {
            return true;
        }
    }
    false
}

/// Classify every streamline of a tractogram against one reference affine.
pub fn classify_midline(
    streamlines: &[Streamline],
    affine: &Matrix4<f64>,
) -> Result<Vec<bool>, VolumeError> {
    let mid = midline_coordinate(affine)?;
    Ok(streamlines.iter().map(|sl| crosses_midline(sl, mid)).collect())
}
