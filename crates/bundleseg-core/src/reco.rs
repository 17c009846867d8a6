//! Registration-based bundle recognition.
//!
//! The ROI-independent route to the same [`FiberGroup`] output: register the
//! whole-brain target against an atlas tractogram once, then recognize each
//! named model bundle among the moved streamlines by cluster matching. Both
//! the linear registration and the cluster recognizer are external
//! capabilities consumed through traits; this module orchestrates them and
//! reorients each recognized set against its reference centroid.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::streamline::{ResampleError, Streamline};
use crate::FiberGroup;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors from registration-based recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Whole-brain streamline registration failed.
    Registration(String),
    /// Cluster recognition failed for one bundle.
    Recognition { bundle: String, message: String },
    /// A recognizer returned an index outside the target tractogram.
    IndexOutOfRange { bundle: String, index: usize, len: usize },
    Resample(ResampleError),
}

impl std::fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registration(msg) => write!(f, "streamline registration failed: {}", msg),
            Self::Recognition { bundle, message } => {
                write!(f, "recognition failed for bundle {}: {}", bundle, message)
            }
            Self::IndexOutOfRange { bundle, index, len } => {
                write!(
                    f,
                    "bundle {}: recognized index {} outside target of {} streamlines",
                    bundle, index, len
                )
            }
            Self::Resample(e) => write!(f, "resampling failed: {}", e),
        }
    }
}

impl std::error::Error for RecognitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resample(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ResampleError> for RecognitionError {
    fn from(e: ResampleError) -> Self {
        Self::Resample(e)
    }
}

// ── Parameters ─────────────────────────────────────────────────────────────

/// Streamline-to-streamline distance used for reduction and pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamlineDistance {
    /// Mean of the average closest-point distances in both directions.
    MeanAverageMinimum,
    /// Minimum average direct-flip distance over the two orientations.
    MinimumDirectFlip,
}

/// Metric for the optional per-bundle local registration refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlrMetric {
    Symmetric,
    Asymmetric,
}

/// Cluster-recognition parameters, fixed for every bundle of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionParams {
    /// Clustering threshold applied to the model bundle (mm).
    pub model_cluster_threshold: f64,
    /// Search-reduction distance threshold (mm).
    pub reduction_threshold: f64,
    pub reduction_distance: StreamlineDistance,
    pub pruning_distance: StreamlineDistance,
    /// Refine with a local streamline registration per bundle.
    pub refine_with_slr: bool,
    pub slr_metric: SlrMetric,
}

impl Default for RecognitionParams {
    fn default() -> Self {
        Self {
            model_cluster_threshold: 5.0,
            reduction_threshold: 10.0,
            reduction_distance: StreamlineDistance::MeanAverageMinimum,
            pruning_distance: StreamlineDistance::MeanAverageMinimum,
            refine_with_slr: true,
            slr_metric: SlrMetric::Asymmetric,
        }
    }
}

// ── External capabilities ──────────────────────────────────────────────────

/// Result of whole-brain linear streamline registration.
#[derive(Debug, Clone)]
pub struct SlrOutcome {
    /// The target tractogram moved into atlas space, in target order.
    pub moved: Vec<Streamline>,
    /// The fitted target-to-atlas affine.
    pub transform: Matrix4<f64>,
    /// Cluster centroids of the atlas used for the fit.
    pub atlas_centroids: Vec<Streamline>,
    /// Cluster centroids of the moved target.
    pub target_centroids: Vec<Streamline>,
}

/// Whole-brain linear streamline registration (external capability).
pub trait StreamlineRegistration {
    fn register(
        &self,
        atlas: &[Streamline],
        target: &[Streamline],
    ) -> Result<SlrOutcome, RecognitionError>;
}

/// Cluster-based bundle recognition (external capability).
///
/// Implementations receive the moved target and one model bundle, and
/// return indices of recognized streamlines *in the original target
/// tractogram's ordering*.
pub trait ClusterRecognition {
    fn recognize(
        &self,
        moved_target: &[Streamline],
        model: &[Streamline],
        params: &RecognitionParams,
    ) -> Result<Vec<usize>, RecognitionError>;
}

/// One named model bundle: example streamlines plus a reference centroid.
#[derive(Debug, Clone)]
pub struct BundleModel {
    pub name: String,
    pub streamlines: Vec<Streamline>,
    /// Reference centroid that fixes the bundle's orientation convention.
    pub centroid: Streamline,
}

// ── Orientation ────────────────────────────────────────────────────────────

/// Mean pointwise distance between two equally resampled streamlines.
fn mean_direct_distance(a: &Streamline, b: &Streamline) -> f64 {
    let n = a.len().min(b.len());
    let mut sum = 0.0;
    for i in 0..n {
        let p = a.point(i);
        let q = b.point(i);
        let dx = p[0] - q[0];
        let dy = p[1] - q[1];
        let dz = p[2] - q[2];
        sum += (dx * dx + dy * dy + dz * dz).sqrt();
    }
    sum / n as f64
}

/// Flip every streamline whose reversed form is closer (mean direct-flip
/// distance over `n_nodes` resampled points) to the reference.
pub fn orient_by_reference(
    streamlines: &mut [Streamline],
    reference: &Streamline,
    n_nodes: usize,
) -> Result<(), ResampleError> {
    let reference = reference.resampled(n_nodes)?;
    for sl in streamlines.iter_mut() {
        let forward = sl.resampled(n_nodes)?;
        let mut flipped = forward.clone();
        flipped.reverse();
        if mean_direct_distance(&flipped, &reference) < mean_direct_distance(&forward, &reference)
        {
            sl.reverse();
        }
    }
    Ok(())
}

/// Node count used when comparing orientations against a centroid.
const ORIENT_NODES: usize = 12;

// ── Orchestration ──────────────────────────────────────────────────────────

/// Recognize every model bundle in `target`, without ROI logic.
///
/// Registers `target` against `atlas` once, recognizes each model among the
/// moved streamlines, collects the recognized streamlines from the original
/// (un-moved) target, and orients each group to its reference centroid.
/// Output is structurally identical to the ROI pipeline's.
pub fn recognize_bundles(
    target: &[Streamline],
    atlas: &[Streamline],
    models: &[BundleModel],
    registration: &dyn StreamlineRegistration,
    recognizer: &dyn ClusterRecognition,
    params: &RecognitionParams,
) -> Result<Vec<FiberGroup>, RecognitionError> {
    tracing::info!(
        target = target.len(),
        atlas = atlas.len(),
        bundles = models.len(),
        "whole-brain streamline registration"
    );
    let slr = registration.register(atlas, target)?;

    let mut fiber_groups = Vec::with_capacity(models.len());
    for model in models {
        let labels = recognizer.recognize(&slr.moved, &model.streamlines, params)?;
        let mut streamlines = Vec::with_capacity(labels.len());
        for &index in &labels {
            let sl = target.get(index).cloned().ok_or(RecognitionError::IndexOutOfRange {
                bundle: model.name.clone(),
                index,
                len: target.len(),
            })?;
            streamlines.push(sl);
        }
        orient_by_reference(&mut streamlines, &model.centroid, ORIENT_NODES)?;
        tracing::info!(bundle = %model.name, recognized = labels.len(), "bundle recognized");
        fiber_groups.push(FiberGroup { name: model.name.clone(), indices: labels, streamlines });
    }
    Ok(fiber_groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(from: [f64; 3], to: [f64; 3], n: usize) -> Streamline {
        let pts = (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1) as f64;
                [
                    from[0] + t * (to[0] - from[0]),
                    from[1] + t * (to[1] - from[1]),
                    from[2] + t * (to[2] - from[2]),
                ]
            })
            .collect();
        Streamline::new(pts)
    }

    /// Registration stub: the "moved" target is the target itself.
    struct NoopRegistration;

    impl StreamlineRegistration for NoopRegistration {
        fn register(
            &self,
            _atlas: &[Streamline],
            target: &[Streamline],
        ) -> Result<SlrOutcome, RecognitionError> {
            Ok(SlrOutcome {
                moved: target.to_vec(),
                transform: Matrix4::identity(),
                atlas_centroids: Vec::new(),
                target_centroids: Vec::new(),
            })
        }
    }

    /// Recognizer stub: picks target streamlines whose start lies within the
    /// reduction threshold of the model's first point.
    struct NearbyStartRecognizer;

    impl ClusterRecognition for NearbyStartRecognizer {
        fn recognize(
            &self,
            moved_target: &[Streamline],
            model: &[Streamline],
            params: &RecognitionParams,
        ) -> Result<Vec<usize>, RecognitionError> {
            let anchor = model[0].point(0);
            Ok(moved_target
                .iter()
                .enumerate()
                .filter(|(_, sl)| {
                    let ends = [sl.point(0), sl.point(sl.len() - 1)];
                    ends.iter().any(|p| {
                        let d = ((p[0] - anchor[0]).powi(2)
                            + (p[1] - anchor[1]).powi(2)
                            + (p[2] - anchor[2]).powi(2))
                        .sqrt();
                        d < params.reduction_threshold
                    })
                })
                .map(|(i, _)| i)
                .collect())
        }
    }

    #[test]
    fn test_orient_by_reference_flips_reversed() {
        let reference = line([0.0, 0.0, 0.0], [20.0, 0.0, 0.0], 12);
        let mut sls = vec![
            line([0.0, 1.0, 0.0], [20.0, 1.0, 0.0], 30),
            line([20.0, 2.0, 0.0], [0.0, 2.0, 0.0], 30), // reversed
        ];
        orient_by_reference(&mut sls, &reference, 12).unwrap();
        for sl in &sls {
            assert!(sl.point(0)[0] < sl.point(sl.len() - 1)[0]);
        }
    }

    #[test]
    fn test_recognize_bundles_collects_and_orients() {
        // Two well-separated pseudo-bundles plus an unrelated streamline.
        let target = vec![
            line([0.0, 0.0, 0.0], [20.0, 0.0, 0.0], 15),
            line([20.0, 1.0, 0.0], [0.0, 1.0, 0.0], 15), // reversed member
            line([0.0, 100.0, 0.0], [20.0, 100.0, 0.0], 15),
            line([300.0, 300.0, 300.0], [320.0, 300.0, 300.0], 15),
        ];
        let atlas = target.clone();
        let models = vec![
            BundleModel {
                name: "X_LOW".into(),
                streamlines: vec![line([0.0, 0.5, 0.0], [20.0, 0.5, 0.0], 15)],
                centroid: line([0.0, 0.5, 0.0], [20.0, 0.5, 0.0], 12),
            },
            BundleModel {
                name: "X_HIGH".into(),
                streamlines: vec![line([0.0, 100.0, 0.0], [20.0, 100.0, 0.0], 15)],
                centroid: line([0.0, 100.0, 0.0], [20.0, 100.0, 0.0], 12),
            },
        ];
        let groups = recognize_bundles(
            &target,
            &atlas,
            &models,
            &NoopRegistration,
            &NearbyStartRecognizer,
            &RecognitionParams::default(),
        )
        .unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "X_LOW");
        assert_eq!(groups[0].indices, vec![0, 1]);
        // The reversed member got flipped to match the centroid.
        for sl in &groups[0].streamlines {
            assert!(sl.point(0)[0] < sl.point(sl.len() - 1)[0]);
        }
        assert_eq!(groups[1].indices, vec![2]);
    }

    #[test]
    fn test_out_of_range_label_is_an_error() {
        struct BadRecognizer;
        impl ClusterRecognition for BadRecognizer {
            fn recognize(
                &self,
                _moved_target: &[Streamline],
                _model: &[Streamline],
                _params: &RecognitionParams,
            ) -> Result<Vec<usize>, RecognitionError> {
                Ok(vec![99])
            }
        }
        let target = vec![line([0.0; 3], [1.0, 0.0, 0.0], 5)];
        let models = vec![BundleModel {
            name: "B".into(),
            streamlines: vec![line([0.0; 3], [1.0, 0.0, 0.0], 5)],
            centroid: line([0.0; 3], [1.0, 0.0, 0.0], 5),
        }];
        let err = recognize_bundles(
            &target,
            &target.clone(),
            &models,
            &NoopRegistration,
            &BadRecognizer,
            &RecognitionParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RecognitionError::IndexOutOfRange { index: 99, .. }));
    }
}
