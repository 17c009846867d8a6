//! High-level segmentation API.
//!
//! [`Segmenter`] is the primary entry point: it wraps a [`SegmentConfig`]
//! and a [`CleanConfig`], and provides convenience methods for the common
//! run shapes (segment only, segment + clean, pre-warped bundles).

use nalgebra::Matrix4;

use bundleseg_core::clean::{clean_fiber_group, CleanConfig, CleanError};
use bundleseg_core::mapping::VolumeMapping;
use bundleseg_core::segment::{
    prepare_bundles, segment_bundles, BundleDefs, PreparedBundle, SegmentConfig, SegmentError,
};
use bundleseg_core::streamline::Streamline;
use bundleseg_core::Segmentation;

/// Primary segmentation interface.
///
/// Encapsulates classification and cleaning configuration. Create once,
/// segment many tractograms.
///
/// # Examples
///
/// ```no_run
/// use bundleseg::{BundleDefs, IdentityMapping, Segmenter};
/// use nalgebra::Matrix4;
///
/// let segmenter = Segmenter::new();
/// let defs = BundleDefs::new();
/// let streamlines: Vec<bundleseg::Streamline> = Vec::new();
/// let result = segmenter
///     .segment(&streamlines, &defs, &IdentityMapping, &Matrix4::identity())
///     .unwrap();
/// println!("{} bundles", result.fiber_groups.len());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmentConfig,
    clean: CleanConfig,
}

impl Segmenter {
    /// Segmenter with default classification and cleaning parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with full classification-config control.
    pub fn with_config(config: SegmentConfig) -> Self {
        Self { config, clean: CleanConfig::default() }
    }

    /// Create with full control over both configs.
    pub fn with_configs(config: SegmentConfig, clean: CleanConfig) -> Self {
        Self { config, clean }
    }

    /// Access the classification configuration.
    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// Mutable access for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut SegmentConfig {
        &mut self.config
    }

    /// Access the cleaning configuration.
    pub fn clean_config(&self) -> &CleanConfig {
        &self.clean
    }

    /// Mutable access for post-construction tuning.
    pub fn clean_config_mut(&mut self) -> &mut CleanConfig {
        &mut self.clean
    }

    /// Warp every bundle's ROIs and probability map into subject space.
    ///
    /// Useful when several tractograms share one mapping: prepare once,
    /// then call [`Segmenter::segment_prepared`] per tractogram.
    pub fn prepare(
        &self,
        defs: &BundleDefs,
        mapping: &dyn VolumeMapping,
    ) -> Result<Vec<PreparedBundle>, SegmentError> {
        prepare_bundles(defs, mapping)
    }

    /// Classify a tractogram against template-space bundle definitions.
    pub fn segment(
        &self,
        streamlines: &[Streamline],
        defs: &BundleDefs,
        mapping: &dyn VolumeMapping,
        reference_affine: &Matrix4<f64>,
    ) -> Result<Segmentation, SegmentError> {
        let prepared = prepare_bundles(defs, mapping)?;
        segment_bundles(streamlines, &prepared, reference_affine, &self.config)
    }

    /// Classify against already-warped bundles.
    pub fn segment_prepared(
        &self,
        streamlines: &[Streamline],
        bundles: &[PreparedBundle],
        reference_affine: &Matrix4<f64>,
    ) -> Result<Segmentation, SegmentError> {
        segment_bundles(streamlines, bundles, reference_affine, &self.config)
    }

    /// Classify, then clean each fiber group of Mahalanobis outliers.
    ///
    /// A bundle whose node covariance turns out singular is left uncleaned
    /// with a warning rather than failing the whole run.
    pub fn segment_and_clean(
        &self,
        streamlines: &[Streamline],
        defs: &BundleDefs,
        mapping: &dyn VolumeMapping,
        reference_affine: &Matrix4<f64>,
    ) -> Result<Segmentation, SegmentError> {
        let mut segmentation = self.segment(streamlines, defs, mapping, reference_affine)?;
        for group in &mut segmentation.fiber_groups {
            match clean_fiber_group(group, &self.clean) {
                Ok(cleaned) => *group = cleaned,
                Err(CleanError::Weights(e)) => {
                    tracing::warn!(bundle = %group.name, error = %e, "skipping cleaning");
                }
                Err(CleanError::Resample(e)) => return Err(SegmentError::Resample(e)),
            }
        }
        for count in &mut segmentation.stats.per_bundle {
            if let Some(group) = segmentation.fiber_groups.iter().find(|g| g.name == count.name) {
                count.count = group.len();
            }
        }
        Ok(segmentation)
    }
}
