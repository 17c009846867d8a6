//! bundleseg — bundle segmentation for diffusion tractography.
//!
//! Classifies whole-brain streamlines into anatomically named fiber bundles
//! by proximity to waypoint ROIs, probability-map gating and
//! midline-crossing rules, cleans each bundle of statistical outliers
//! (per-node Mahalanobis distance) and computes scalar tract profiles. A
//! registration-based recognition strategy offers the same output without
//! ROI logic.
//!
//! # Public API
//! - [`Segmenter`] as the primary entry point: construct once, segment many
//!   tractograms.
//! - [`BundleDefs`]/[`BundleDef`] for template-space bundle definitions.
//! - [`VolumeMapping`] as the seam to the external registration subsystem.
//! - [`SegmentConfig`]/[`CleanConfig`] for tuning.
//! - Free functions from the core crate for the individual pipeline pieces
//!   (weights, cleaning, profiles, recognition).

mod segmenter;
#[cfg(test)]
mod test_utils;

pub use segmenter::Segmenter;

pub use bundleseg_core::clean::{clean_fiber_group, clean_indices, CleanConfig, CleanError, CleanOutcome};
pub use bundleseg_core::geometry::{closest_approach, voxel_corner_tolerance, ClosestApproach};
pub use bundleseg_core::mapping::{
    AffineMapping, DeformationFieldMapping, IdentityMapping, Interpolation, VolumeMapping,
};
pub use bundleseg_core::midline::{classify_midline, crosses_midline, midline_coordinate};
pub use bundleseg_core::profile::{
    tract_profile, tract_profile_from_streamlines, ProfileError, ProfileWeights,
};
pub use bundleseg_core::reco::{
    recognize_bundles, orient_by_reference, BundleModel, ClusterRecognition, RecognitionError,
    RecognitionParams, SlrMetric, SlrOutcome, StreamlineDistance, StreamlineRegistration,
};
pub use bundleseg_core::roi::{fill_holes, warp_probability_map, warp_roi, RoiCoords};
pub use bundleseg_core::segment::{
    prepare_bundles, segment_bundles, BundleDef, BundleDefs, PreparedBundle, RoiRule,
    SegmentConfig, SegmentError,
};
pub use bundleseg_core::streamline::{
    ResampleError, ResampledBundle, Streamline, Tractogram,
};
pub use bundleseg_core::volume::{apply_affine, invert_affine, VolumeError};
pub use bundleseg_core::weights::{
    gaussian_weights, mahalanobis_distances, CovarianceMode, NodeStatistic, WeightError,
};
pub use bundleseg_core::{BundleCount, FiberGroup, Segmentation, SegmentStats};
