//! Scalar tract profiles: one summary value per node position along a
//! bundle, reduced across streamlines with caller-controlled weights.

use nalgebra::Matrix4;
use ndarray::{Array2, Array3};

use crate::streamline::{ResampleError, ResampledBundle, Streamline};
use crate::volume::values_from_volume;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors from tract-profile computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// Supplied weights do not match the bundle's `(count, n_nodes)` shape.
    WeightShape {
        expected: (usize, usize),
        got: (usize, usize),
    },
    Resample(ResampleError),
}

impl std::fmt::Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WeightShape { expected, got } => {
                write!(f, "weight shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            Self::Resample(e) => write!(f, "resampling failed: {}", e),
        }
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resample(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ResampleError> for ProfileError {
    fn from(e: ResampleError) -> Self {
        Self::Resample(e)
    }
}

// ── Weights ────────────────────────────────────────────────────────────────

/// Streamline weighting for the cross-streamline reduction.
///
/// Non-uniform weights must sum to 1 across streamlines at every node; this
/// is the caller's contract and is not verified here.
#[derive(Debug, Clone, Copy)]
pub enum ProfileWeights<'a> {
    /// Every streamline contributes `1 / count` at every node.
    Uniform,
    /// One weight per streamline, applied at every node.
    PerStreamline(&'a [f64]),
    /// One weight per (streamline, node), e.g. gaussian weights.
    PerNode(&'a Array2<f64>),
}

// ── Profiles ───────────────────────────────────────────────────────────────

/// Profile a scalar volume along an already-resampled bundle.
///
/// `affine`, when given, maps node coordinates into the volume's voxel index
/// space. Returns one value per node position.
pub fn tract_profile(
    volume: &Array3<f64>,
    bundle: &ResampledBundle,
    affine: Option<&Matrix4<f64>>,
    weights: ProfileWeights<'_>,
) -> Result<Vec<f64>, ProfileError> {
    let count = bundle.count();
    let n_nodes = bundle.n_nodes();
    let values = values_from_volume(volume, bundle, affine);

    let mut profile = vec![0.0; n_nodes];
    match weights {
        ProfileWeights::Uniform => {
            let w = 1.0 / count as f64;
            for sl in 0..count {
                for node in 0..n_nodes {
                    profile[node] += w * values[[sl, node]];
                }
            }
        }
        ProfileWeights::PerStreamline(w) => {
            if w.len() != count {
                return Err(ProfileError::WeightShape {
                    expected: (count, n_nodes),
                    got: (w.len(), n_nodes),
                });
            }
            for sl in 0..count {
                for node in 0..n_nodes {
                    profile[node] += w[sl] * values[[sl, node]];
                }
            }
        }
        ProfileWeights::PerNode(w) => {
            if w.dim() != (count, n_nodes) {
                return Err(ProfileError::WeightShape {
                    expected: (count, n_nodes),
                    got: w.dim(),
                });
            }
            for sl in 0..count {
                for node in 0..n_nodes {
                    profile[node] += w[[sl, node]] * values[[sl, node]];
                }
            }
        }
    }
    Ok(profile)
}

/// Resample raw streamlines to `n_points`, then profile.
pub fn tract_profile_from_streamlines(
    volume: &Array3<f64>,
    streamlines: &[Streamline],
    affine: Option<&Matrix4<f64>>,
    n_points: usize,
    weights: ProfileWeights<'_>,
) -> Result<Vec<f64>, ProfileError> {
    let bundle = ResampledBundle::from_streamlines(streamlines, n_points)?;
    tract_profile(volume, &bundle, affine, weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve(points: Vec<[f64; 3]>) -> Streamline {
        Streamline::new(points)
    }

    #[test]
    fn test_constant_volume_gives_constant_profile() {
        // Value 7 everywhere: the profile is all 7s, whatever the geometry.
        let vol = Array3::from_elem((10, 10, 10), 7.0);
        let sls = vec![
            curve(vec![[0.0, 0.0, 0.0], [9.0, 3.0, 1.0], [2.0, 8.0, 8.0]]),
            curve(vec![[5.0, 5.0, 5.0], [1.0, 1.0, 7.0]]),
        ];
        let profile =
            tract_profile_from_streamlines(&vol, &sls, None, 20, ProfileWeights::Uniform).unwrap();
        assert_eq!(profile.len(), 20);
        for v in profile {
            assert_relative_eq!(v, 7.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gradient_volume_profile_follows_position() {
        let vol = Array3::from_shape_fn((11, 3, 3), |(i, _, _)| i as f64);
        let sls = vec![
            curve(vec![[0.0, 1.0, 1.0], [10.0, 1.0, 1.0]]),
            curve(vec![[0.0, 2.0, 2.0], [10.0, 2.0, 2.0]]),
        ];
        let bundle = ResampledBundle::from_streamlines(&sls, 6).unwrap();
        let profile = tract_profile(&vol, &bundle, None, ProfileWeights::Uniform).unwrap();
        for (k, v) in profile.iter().enumerate() {
            assert_relative_eq!(*v, 2.0 * k as f64, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_per_streamline_weights_select_contributions() {
        let vol = Array3::from_shape_fn((11, 3, 3), |(i, _, _)| i as f64);
        let sls = vec![
            curve(vec![[0.0, 1.0, 1.0], [10.0, 1.0, 1.0]]),
            curve(vec![[10.0, 1.0, 1.0], [0.0, 1.0, 1.0]]),
        ];
        let bundle = ResampledBundle::from_streamlines(&sls, 3).unwrap();
        // All weight on the second (reversed) streamline.
        let profile =
            tract_profile(&vol, &bundle, None, ProfileWeights::PerStreamline(&[0.0, 1.0])).unwrap();
        assert_relative_eq!(profile[0], 10.0, epsilon = 1e-12);
        assert_relative_eq!(profile[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_per_node_weight_shape_is_checked() {
        let vol = Array3::from_elem((4, 4, 4), 1.0);
        let sls = vec![curve(vec![[0.0, 0.0, 0.0], [3.0, 3.0, 3.0]])];
        let bundle = ResampledBundle::from_streamlines(&sls, 5).unwrap();
        let bad = Array2::zeros((2, 5));
        let err = tract_profile(&vol, &bundle, None, ProfileWeights::PerNode(&bad)).unwrap_err();
        assert_eq!(err, ProfileError::WeightShape { expected: (1, 5), got: (2, 5) });
    }

    #[test]
    fn test_affine_maps_world_to_voxel() {
        let vol = Array3::from_shape_fn((6, 3, 3), |(i, _, _)| i as f64);
        // World coordinates at 2 mm spacing.
        let sls = vec![curve(vec![[0.0, 2.0, 2.0], [10.0, 2.0, 2.0]])];
        let bundle = ResampledBundle::from_streamlines(&sls, 6).unwrap();
        let mut world_to_voxel = Matrix4::identity();
        world_to_voxel[(0, 0)] = 0.5;
        world_to_voxel[(1, 1)] = 0.5;
        world_to_voxel[(2, 2)] = 0.5;
        let profile =
            tract_profile(&vol, &bundle, Some(&world_to_voxel), ProfileWeights::Uniform).unwrap();
        for (k, v) in profile.iter().enumerate() {
            assert_relative_eq!(*v, k as f64, epsilon = 1e-12);
        }
    }
}
