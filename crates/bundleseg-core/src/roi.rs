//! ROI warping into subject space.
//!
//! Template-space region masks are inverse-warped through the caller's
//! [`VolumeMapping`], re-thresholded, patched up (interior holes filled) and
//! reduced to the voxel coordinate sets the distance queries run against.
//! Probability maps take the same warp with nearest-neighbor interpolation
//! and no thresholding.

use ndarray::Array3;

use crate::mapping::{Interpolation, VolumeMapping};
use crate::volume::VolumeError;

/// Voxel coordinates of a warped ROI mask, as distance-query targets.
///
/// The coordinates are integer voxel indices stored as `f64` so they can
/// enter squared-distance computations directly.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiCoords {
    coords: Vec<[f64; 3]>,
}

impl RoiCoords {
    /// Coordinates of every `true` voxel, in index order.
    pub fn from_mask(mask: &Array3<bool>) -> Self {
        let mut coords = Vec::new();
        for ((i, j, k), &on) in mask.indexed_iter() {
            if on {
                coords.push([i as f64, j as f64, k as f64]);
            }
        }
        Self { coords }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn coords(&self) -> &[[f64; 3]] {
        &self.coords
    }
}

/// Fill interior cavities of a boolean mask ("patch-up").
///
/// Background voxels reachable from the volume boundary by 6-connected steps
/// stay background; everything else becomes foreground.
pub fn fill_holes(mask: &Array3<bool>) -> Array3<bool> {
    let (nx, ny, nz) = mask.dim();
    let mut outside = Array3::from_elem((nx, ny, nz), false);
    let mut stack: Vec<(usize, usize, usize)> = Vec::new();

    let mut seed = |stack: &mut Vec<(usize, usize, usize)>,
                    outside: &mut Array3<bool>,
                    idx: (usize, usize, usize)| {
        if !mask[[idx.0, idx.1, idx.2]] && !outside[[idx.0, idx.1, idx.2]] {
            outside[[idx.0, idx.1, idx.2]] = true;
            stack.push(idx);
        }
    };

    for i in 0..nx {
        for j in 0..ny {
            seed(&mut stack, &mut outside, (i, j, 0));
            seed(&mut stack, &mut outside, (i, j, nz - 1));
        }
    }
    for i in 0..nx {
        for k in 0..nz {
            seed(&mut stack, &mut outside, (i, 0, k));
            seed(&mut stack, &mut outside, (i, ny - 1, k));
        }
    }
    for j in 0..ny {
        for k in 0..nz {
            seed(&mut stack, &mut outside, (0, j, k));
            seed(&mut stack, &mut outside, (nx - 1, j, k));
        }
    }

    while let Some((i, j, k)) = stack.pop() {
        let mut visit = |idx: (usize, usize, usize)| {
            if !mask[[idx.0, idx.1, idx.2]] && !outside[[idx.0, idx.1, idx.2]] {
                outside[[idx.0, idx.1, idx.2]] = true;
                stack.push(idx);
            }
        };
        if i > 0 {
            visit((i - 1, j, k));
        }
        if i + 1 < nx {
            visit((i + 1, j, k));
        }
        if j > 0 {
            visit((i, j - 1, k));
        }
        if j + 1 < ny {
            visit((i, j + 1, k));
        }
        if k > 0 {
            visit((i, j, k - 1));
        }
        if k + 1 < nz {
            visit((i, j, k + 1));
        }
    }

    Array3::from_shape_fn((nx, ny, nz), |idx| !outside[idx])
}

/// Inverse-warp a template-space ROI into subject space and reduce it to
/// coordinates: linear warp → threshold `> 0` → hole filling → voxels.
pub fn warp_roi(
    template_roi: &Array3<f64>,
    mapping: &dyn VolumeMapping,
) -> Result<RoiCoords, VolumeError> {
    let warped = mapping.inverse_transform(template_roi, Interpolation::Linear)?;
    let mask = warped.mapv(|v| v > 0.0);
    let patched = fill_holes(&mask);
    Ok(RoiCoords::from_mask(&patched))
}

/// Inverse-warp a template-space probability (or label) volume into subject
/// space: nearest-neighbor, no thresholding.
pub fn warp_probability_map(
    template_map: &Array3<f64>,
    mapping: &dyn VolumeMapping,
) -> Result<Array3<f64>, VolumeError> {
    mapping.inverse_transform(template_map, Interpolation::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::IdentityMapping;

    fn hollow_box_mask() -> Array3<bool> {
        // A 5³ solid cube with its center voxel carved out.
        let mut mask = Array3::from_elem((7, 7, 7), false);
        for i in 1..6 {
            for j in 1..6 {
                for k in 1..6 {
                    mask[[i, j, k]] = true;
                }
            }
        }
        mask[[3, 3, 3]] = false;
        mask
    }

    #[test]
    fn test_fill_holes_closes_cavity() {
        let filled = fill_holes(&hollow_box_mask());
        assert!(filled[[3, 3, 3]]);
        // Exterior background stays background.
        assert!(!filled[[0, 0, 0]]);
        assert!(!filled[[6, 3, 3]]);
    }

    #[test]
    fn test_fill_holes_keeps_open_notch() {
        // Carve a channel from the cavity to the boundary: no longer a hole.
        let mut mask = hollow_box_mask();
        for i in 3..7 {
            mask[[i, 3, 3]] = false;
        }
        let filled = fill_holes(&mask);
        assert!(!filled[[3, 3, 3]]);
        assert!(!filled[[5, 3, 3]]);
    }

    #[test]
    fn test_roi_coords_from_mask() {
        let mut mask = Array3::from_elem((3, 3, 3), false);
        mask[[0, 1, 2]] = true;
        mask[[2, 2, 2]] = true;
        let coords = RoiCoords::from_mask(&mask);
        assert_eq!(coords.len(), 2);
        assert_eq!(coords.coords()[0], [0.0, 1.0, 2.0]);
        assert_eq!(coords.coords()[1], [2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_warp_roi_thresholds_and_fills() {
        // Float mask with a zero-valued interior voxel; the warp (identity)
        // keeps values, thresholding keeps > 0, patch-up restores the hole.
        let mut roi = Array3::zeros((7, 7, 7));
        for i in 1..6 {
            for j in 1..6 {
                for k in 1..6 {
                    roi[[i, j, k]] = 0.8;
                }
            }
        }
        roi[[3, 3, 3]] = 0.0;
        let coords = warp_roi(&roi, &IdentityMapping).unwrap();
        assert_eq!(coords.len(), 125);
        assert!(coords.coords().contains(&[3.0, 3.0, 3.0]));
    }

    #[test]
    fn test_warp_probability_map_keeps_values() {
        let mut map = Array3::zeros((4, 4, 4));
        map[[1, 2, 3]] = 0.42;
        let warped = warp_probability_map(&map, &IdentityMapping).unwrap();
        assert_eq!(warped[[1, 2, 3]], 0.42);
        assert_eq!(warped[[0, 0, 0]], 0.0);
    }
}
