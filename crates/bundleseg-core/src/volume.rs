//! Scalar-volume sampling and affine helpers.
//!
//! Volumes are consumed as `(ndarray::Array3<f64>, nalgebra::Matrix4<f64>)`
//! pairs — voxel data plus the voxel-to-world affine — exactly as handed
//! over by whatever loaded them. Sampling clamps to the volume edge; shape
//! disagreements between declared spaces are fatal and never coerced.

use nalgebra::{Matrix4, Vector4};
use ndarray::{Array2, Array3};

use crate::streamline::ResampledBundle;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors arising from volume/affine handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeError {
    /// Two volumes that must share a grid do not.
    ShapeMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },
    /// The affine is not invertible.
    SingularAffine,
}

impl std::fmt::Display for VolumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch { expected, got } => {
                write!(
                    f,
                    "volume shape mismatch: expected {:?}, got {:?}",
                    expected, got
                )
            }
            Self::SingularAffine => write!(f, "affine is singular"),
        }
    }
}

impl std::error::Error for VolumeError {}

// ── Affine helpers ─────────────────────────────────────────────────────────

/// Apply a 4×4 affine to a 3D point.
pub fn apply_affine(affine: &Matrix4<f64>, p: [f64; 3]) -> [f64; 3] {
    let q = affine * Vector4::new(p[0], p[1], p[2], 1.0);
    [q[0], q[1], q[2]]
}

/// Invert an affine, failing explicitly on singularity.
pub fn invert_affine(affine: &Matrix4<f64>) -> Result<Matrix4<f64>, VolumeError> {
    affine.try_inverse().ok_or(VolumeError::SingularAffine)
}

// ── Point sampling ─────────────────────────────────────────────────────────

fn clamped_index(v: f64, len: usize) -> usize {
    (v.max(0.0) as usize).min(len - 1)
}

/// Nearest-neighbor sample at a voxel-space point, clamped to the edge.
pub fn nearest_sample(volume: &Array3<f64>, p: [f64; 3]) -> f64 {
    let (nx, ny, nz) = volume.dim();
    let i = clamped_index(p[0].round(), nx);
    let j = clamped_index(p[1].round(), ny);
    let k = clamped_index(p[2].round(), nz);
    volume[[i, j, k]]
}

/// Trilinear sample at a voxel-space point, clamped to the edge.
pub fn trilinear_sample(volume: &Array3<f64>, p: [f64; 3]) -> f64 {
    let (nx, ny, nz) = volume.dim();

    let x = p[0].clamp(0.0, (nx - 1) as f64);
    let y = p[1].clamp(0.0, (ny - 1) as f64);
    let z = p[2].clamp(0.0, (nz - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let z0 = z.floor() as usize;
    let x1 = (x0 + 1).min(nx - 1);
    let y1 = (y0 + 1).min(ny - 1);
    let z1 = (z0 + 1).min(nz - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;
    let fz = z - z0 as f64;

    let c000 = volume[[x0, y0, z0]];
    let c100 = volume[[x1, y0, z0]];
    let c010 = volume[[x0, y1, z0]];
    let c110 = volume[[x1, y1, z0]];
    let c001 = volume[[x0, y0, z1]];
    let c101 = volume[[x1, y0, z1]];
    let c011 = volume[[x0, y1, z1]];
    let c111 = volume[[x1, y1, z1]];

    let c00 = c000 * (1.0 - fx) + c100 * fx;
    let c10 = c010 * (1.0 - fx) + c110 * fx;
    let c01 = c001 * (1.0 - fx) + c101 * fx;
    let c11 = c011 * (1.0 - fx) + c111 * fx;

    let c0 = c00 * (1.0 - fy) + c10 * fy;
    let c1 = c01 * (1.0 - fy) + c11 * fy;

    c0 * (1.0 - fz) + c1 * fz
}

// ── Bundle sampling ────────────────────────────────────────────────────────

/// Trilinearly sample `volume` at every node of every streamline.
///
/// `affine`, when given, maps node coordinates into the volume's voxel index
/// space; `None` means the nodes already are voxel indices. Returns a
/// `(count, n_nodes)` value table.
pub fn values_from_volume(
    volume: &Array3<f64>,
    bundle: &ResampledBundle,
    affine: Option<&Matrix4<f64>>,
) -> Array2<f64> {
    let mut values = Array2::zeros((bundle.count(), bundle.n_nodes()));
    for sl in 0..bundle.count() {
        for node in 0..bundle.n_nodes() {
            let p = bundle.node(sl, node);
            let p = match affine {
                Some(a) => apply_affine(a, p),
                None => p,
            };
            values[[sl, node]] = trilinear_sample(volume, p);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamline::Streamline;
    use approx::assert_relative_eq;

    fn gradient_volume(nx: usize, ny: usize, nz: usize) -> Array3<f64> {
        Array3::from_shape_fn((nx, ny, nz), |(i, _, _)| i as f64)
    }

    #[test]
    fn test_trilinear_at_voxel_centers() {
        let vol = gradient_volume(5, 4, 3);
        assert_relative_eq!(trilinear_sample(&vol, [2.0, 1.0, 1.0]), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_trilinear_interpolates_between_voxels() {
        let vol = gradient_volume(5, 4, 3);
        assert_relative_eq!(trilinear_sample(&vol, [2.5, 1.0, 1.0]), 2.5, epsilon = 1e-12);
        assert_relative_eq!(trilinear_sample(&vol, [0.25, 0.0, 0.0]), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_sampling_clamps_to_edges() {
        let vol = gradient_volume(5, 4, 3);
        assert_relative_eq!(trilinear_sample(&vol, [-3.0, 0.0, 0.0]), 0.0, epsilon = 1e-12);
        assert_relative_eq!(trilinear_sample(&vol, [40.0, 1.0, 1.0]), 4.0, epsilon = 1e-12);
        assert_relative_eq!(nearest_sample(&vol, [40.0, -1.0, 9.0]), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nearest_rounds() {
        let vol = gradient_volume(5, 4, 3);
        assert_relative_eq!(nearest_sample(&vol, [2.4, 0.0, 0.0]), 2.0, epsilon = 1e-12);
        assert_relative_eq!(nearest_sample(&vol, [2.6, 0.0, 0.0]), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_values_from_volume_with_affine() {
        // World coordinates are 2× voxel indices; the affine maps them back.
        let vol = gradient_volume(8, 4, 4);
        let sls = vec![Streamline::new(vec![[0.0, 0.0, 0.0], [8.0, 0.0, 0.0]])];
        let bundle = ResampledBundle::from_streamlines(&sls, 5).unwrap();
        let mut world_to_voxel = Matrix4::identity();
        world_to_voxel[(0, 0)] = 0.5;
        world_to_voxel[(1, 1)] = 0.5;
        world_to_voxel[(2, 2)] = 0.5;
        let values = values_from_volume(&vol, &bundle, Some(&world_to_voxel));
        assert_eq!(values.shape(), &[1, 5]);
        for (k, v) in values.row(0).iter().enumerate() {
            assert_relative_eq!(*v, k as f64, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invert_affine_singular() {
        let err = invert_affine(&Matrix4::zeros()).unwrap_err();
        assert_eq!(err, VolumeError::SingularAffine);
    }
}
