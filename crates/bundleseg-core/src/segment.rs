//! Bundle membership classification.
//!
//! The classifier runs per (streamline, bundle) with the cheap gates first:
//! probability-map score, then the midline rule, then inclusion-ROI
//! proximity (short-circuiting on the first failed ROI), then exclusion-ROI
//! proximity. Survivors score their mean probability; each scoring
//! streamline is assigned exclusively to its best bundle and oriented so the
//! end nearest the first inclusion ROI comes first.

use nalgebra::Matrix4;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::geometry::{any_within, closest_approach, voxel_corner_tolerance};
use crate::mapping::VolumeMapping;
use crate::midline::{crosses_midline, midline_coordinate};
use crate::roi::{warp_probability_map, warp_roi, RoiCoords};
use crate::streamline::{ResampleError, ResampledBundle, Streamline};
use crate::volume::{values_from_volume, VolumeError};
use crate::{FiberGroup, Segmentation};

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors from bundle preparation and classification.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentError {
    Volume(VolumeError),
    Resample(ResampleError),
    /// A bundle's ROI list and rule list differ in length.
    RuleMismatch { bundle: String, rois: usize, rules: usize },
    /// A bundle has neither ROIs nor a probability map, so there is nothing
    /// to shape its default all-ones probability volume from.
    NoProbabilityShape { bundle: String },
}

impl std::fmt::Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Volume(e) => write!(f, "volume handling failed: {}", e),
            Self::Resample(e) => write!(f, "resampling failed: {}", e),
            Self::RuleMismatch { bundle, rois, rules } => {
                write!(f, "bundle {}: {} ROIs but {} rules", bundle, rois, rules)
            }
            Self::NoProbabilityShape { bundle } => {
                write!(f, "bundle {}: no ROIs and no probability map", bundle)
            }
        }
    }
}

impl std::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Volume(e) => Some(e),
            Self::Resample(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VolumeError> for SegmentError {
    fn from(e: VolumeError) -> Self {
        Self::Volume(e)
    }
}

impl From<ResampleError> for SegmentError {
    fn from(e: ResampleError) -> Self {
        Self::Resample(e)
    }
}

// ── Bundle definitions ─────────────────────────────────────────────────────

/// Role of one ROI within a bundle definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoiRule {
    /// The streamline must pass within tolerance of this ROI.
    Include,
    /// The streamline must stay farther than tolerance from this ROI.
    Exclude,
}

/// Template-space definition of one bundle.
///
/// `rois` and `rules` are aligned positionally. ROI order is significant:
/// the first two inclusion ROIs define the endpoints used for orientation
/// normalization.
#[derive(Debug, Clone)]
pub struct BundleDef {
    pub name: String,
    pub rois: Vec<Array3<f64>>,
    pub rules: Vec<RoiRule>,
    /// Optional template-space probability map; a missing map means an
    /// all-ones volume shaped like the first ROI.
    pub prob_map: Option<Array3<f64>>,
    /// Tri-state midline rule: `Some(true)` requires crossing, `Some(false)`
    /// forbids it, `None` leaves it unconstrained.
    pub cross_midline: Option<bool>,
}

impl BundleDef {
    /// Definition with inclusion ROIs only and no further constraints.
    pub fn waypoints(name: impl Into<String>, rois: Vec<Array3<f64>>) -> Self {
        let rules = vec![RoiRule::Include; rois.len()];
        Self { name: name.into(), rois, rules, prob_map: None, cross_midline: None }
    }
}

/// Ordered, name-addressable collection of bundle definitions.
#[derive(Debug, Clone, Default)]
pub struct BundleDefs {
    bundles: Vec<BundleDef>,
}

impl BundleDefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a definition; a definition with the same name is replaced in
    /// place, keeping its position.
    pub fn push(&mut self, def: BundleDef) {
        match self.bundles.iter_mut().find(|b| b.name == def.name) {
            Some(slot) => *slot = def,
            None => self.bundles.push(def),
        }
    }

    /// Merge another collection into this one (same-name replacement).
    pub fn merge(&mut self, other: BundleDefs) {
        for def in other.bundles {
            self.push(def);
        }
    }

    pub fn get(&self, name: &str) -> Option<&BundleDef> {
        self.bundles.iter().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BundleDef> {
        self.bundles.iter()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

impl From<Vec<BundleDef>> for BundleDefs {
    fn from(bundles: Vec<BundleDef>) -> Self {
        let mut defs = BundleDefs::new();
        for def in bundles {
            defs.push(def);
        }
        defs
    }
}

/// A bundle definition warped into subject space, ready for classification.
#[derive(Debug, Clone)]
pub struct PreparedBundle {
    pub name: String,
    pub include: Vec<RoiCoords>,
    pub exclude: Vec<RoiCoords>,
    pub prob_map: Array3<f64>,
    pub cross_midline: Option<bool>,
}

/// Warp every bundle's ROIs and probability map into subject space.
///
/// Preparation is independent per bundle; the mapping is shared, read-only
/// state.
pub fn prepare_bundles(
    defs: &BundleDefs,
    mapping: &dyn VolumeMapping,
) -> Result<Vec<PreparedBundle>, SegmentError> {
    let mut prepared = Vec::with_capacity(defs.len());
    for def in defs.iter() {
        if def.rois.len() != def.rules.len() {
            return Err(SegmentError::RuleMismatch {
                bundle: def.name.clone(),
                rois: def.rois.len(),
                rules: def.rules.len(),
            });
        }
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for (roi, rule) in def.rois.iter().zip(&def.rules) {
            let coords = warp_roi(roi, mapping)?;
            match rule {
                RoiRule::Include => include.push(coords),
                RoiRule::Exclude => exclude.push(coords),
            }
        }

        let template_map = match (&def.prob_map, def.rois.first()) {
            (Some(map), _) => map.clone(),
            (None, Some(first_roi)) => Array3::ones(first_roi.dim()),
            (None, None) => {
                return Err(SegmentError::NoProbabilityShape { bundle: def.name.clone() })
            }
        };
        let prob_map = warp_probability_map(&template_map, mapping)?;

        tracing::debug!(
            bundle = %def.name,
            include = include.len(),
            exclude = exclude.len(),
            "prepared bundle ROIs"
        );
        prepared.push(PreparedBundle {
            name: def.name.clone(),
            include,
            exclude,
            prob_map,
            cross_midline: def.cross_midline,
        });
    }
    Ok(prepared)
}

// ── Configuration ──────────────────────────────────────────────────────────

/// Classification parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Node count of the fixed-shape table used for probability sampling.
    pub n_points: usize,
    /// Minimum mean probability for a streamline to stay a candidate; the
    /// comparison is strict, so an all-zero map admits nothing.
    pub probability_threshold: f64,
    /// Squared proximity tolerance; `None` derives the voxel-corner
    /// tolerance from the reference affine.
    pub tolerance: Option<f64>,
    /// Optional pre-resampling of the working tractogram before
    /// classification; `None` classifies the raw streamlines.
    pub resample_to: Option<usize>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            n_points: 100,
            probability_threshold: 0.0,
            tolerance: None,
            resample_to: None,
        }
    }
}

// ── Classification ─────────────────────────────────────────────────────────

/// Assign each streamline to at most one bundle.
///
/// `reference_affine` is the subject volume's voxel-to-world affine; it
/// derives the proximity tolerance and the midline coordinate. The output
/// carries one (possibly empty) fiber group per prepared bundle, in order.
pub fn segment_bundles(
    streamlines: &[Streamline],
    bundles: &[PreparedBundle],
    reference_affine: &Matrix4<f64>,
    config: &SegmentConfig,
) -> Result<Segmentation, SegmentError> {
    let tolerance = config
        .tolerance
        .unwrap_or_else(|| voxel_corner_tolerance(reference_affine));

    // Optional pre-resampling of the working set; fiber groups hold the
    // working streamlines either way.
    let resampled_working: Vec<Streamline>;
    let working: &[Streamline] = match config.resample_to {
        Some(n) => {
            resampled_working = streamlines
                .iter()
                .map(|sl| sl.resampled(n))
                .collect::<Result<_, _>>()?;
            &resampled_working
        }
        None => streamlines,
    };

    let n = working.len();
    let n_bundles = bundles.len();
    tracing::info!(
        streamlines = n,
        bundles = n_bundles,
        tolerance,
        "assigning streamlines to fiber groups"
    );

    // Shape consistency across the probability volumes is a hard contract.
    if let Some(first) = bundles.first() {
        let expected = first.prob_map.dim();
        for bundle in bundles {
            if bundle.prob_map.dim() != expected {
                return Err(SegmentError::Volume(VolumeError::ShapeMismatch {
                    expected,
                    got: bundle.prob_map.dim(),
                }));
            }
        }
    }

    let fgarray = ResampledBundle::from_streamlines(working, config.n_points)?;

    // Midline classification runs once, and only when some bundle needs it.
    let crosses: Option<Vec<bool>> = if bundles.iter().any(|b| b.cross_midline.is_some()) {
        let mid = midline_coordinate(reference_affine)?;
        Some(working.iter().map(|sl| crosses_midline(sl, mid)).collect())
    } else {
        None
    };

    let mut scores = Array2::<f64>::zeros((n, n_bundles));
    let mut orient_nodes = vec![[0usize; 2]; n * n_bundles];

    for (b_idx, bundle) in bundles.iter().enumerate() {
        let probabilities = values_from_volume(&bundle.prob_map, &fgarray, None);
        let mut candidates = 0usize;

        for (sl_idx, sl) in working.iter().enumerate() {
            let fiber_probability =
                probabilities.row(sl_idx).iter().sum::<f64>() / config.n_points as f64;
            if fiber_probability <= config.probability_threshold {
                continue;
            }

            if let (Some(rule), Some(crosses)) = (bundle.cross_midline, crosses.as_ref()) {
                if crosses[sl_idx] != rule {
                    continue;
                }
            }

            // Every inclusion ROI must be touched; the first failure ends it.
            let mut near_all = true;
            let mut nodes = [0usize; 2];
            for (roi_idx, roi) in bundle.include.iter().enumerate() {
                match closest_approach(sl.points(), roi.coords()) {
                    Some(ca) if ca.sq_dist <= tolerance => {
                        if roi_idx < 2 {
                            nodes[roi_idx] = ca.node;
                        }
                    }
                    Some(_) => {
                        near_all = false;
                        break;
                    }
                    // An ROI that warped to nothing imposes no constraint.
                    None => {}
                }
            }
            if !near_all {
                continue;
            }

            if bundle
                .exclude
                .iter()
                .any(|roi| any_within(sl.points(), roi.coords(), tolerance))
            {
                continue;
            }

            scores[[sl_idx, b_idx]] = fiber_probability;
            orient_nodes[sl_idx * n_bundles + b_idx] = nodes;
            candidates += 1;
        }
        tracing::debug!(bundle = %bundle.name, candidates, "bundle candidates scored");
    }

    // Exclusive assignment: best score wins, first bundle breaks ties.
    let mut fiber_groups: Vec<FiberGroup> = bundles
        .iter()
        .map(|b| FiberGroup::empty(b.name.clone()))
        .collect();
    let mut n_assigned = 0usize;
    for (sl_idx, sl) in working.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for b_idx in 0..n_bundles {
            let score = scores[[sl_idx, b_idx]];
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((b_idx, score));
            }
        }
        let Some((b_idx, _)) = best else { continue };
        n_assigned += 1;

        // Orient so the end nearest inclusion-ROI0 comes first. The order is
        // arbitrary but consistent across the group.
        let mut sl = sl.clone();
        let nodes = orient_nodes[sl_idx * n_bundles + b_idx];
        let include = &bundles[b_idx].include;
        if include.len() >= 2
            && !include[0].is_empty()
            && !include[1].is_empty()
            && nodes[0] > nodes[1]
        {
            sl.reverse();
        }
        fiber_groups[b_idx].indices.push(sl_idx);
        fiber_groups[b_idx].streamlines.push(sl);
    }

    tracing::info!(assigned = n_assigned, total = n, "streamline assignment finished");

    let stats = crate::SegmentStats {
        n_streamlines: n,
        n_assigned,
        tolerance,
        per_bundle: fiber_groups
            .iter()
            .map(|g| crate::BundleCount { name: g.name.clone(), count: g.len() })
            .collect(),
    };
    Ok(Segmentation { fiber_groups, stats })
}
