//! bundleseg-core — streamline-to-bundle segmentation algorithms for
//! diffusion tractography.
//!
//! The pipeline stages are:
//!
//! 1. **Warp** – inverse-warp template-space ROI masks and probability maps
//!    into subject space through the caller's mapping capability.
//! 2. **Gate** – per (streamline, bundle): probability-map score, midline
//!    rule, inclusion-ROI proximity, exclusion-ROI proximity.
//! 3. **Assign** – exclusive best-score bundle assignment with consistent
//!    intra-bundle orientation (first-inclusion-ROI end first).
//! 4. **Clean** – iterative per-node Mahalanobis outlier removal.
//! 5. **Profile** – weighted scalar summaries along the bundle's nodes.
//!
//! A registration-based recognition strategy ([`reco`]) produces the same
//! [`FiberGroup`] output without ROI logic, from whole-brain streamline
//! registration plus cluster matching.

pub mod clean;
pub mod geometry;
pub mod mapping;
pub mod midline;
pub mod profile;
pub mod reco;
pub mod roi;
pub mod segment;
pub mod streamline;
pub mod volume;
pub mod weights;

use serde::{Deserialize, Serialize};

use crate::streamline::Streamline;

/// A named bundle of consistently oriented streamlines.
///
/// Created by classification (or recognition); the cleaner may remove
/// streamlines and the orientation step may reverse them, nothing else
/// mutates a group. `indices` point back into the tractogram the group was
/// segmented from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberGroup {
    pub name: String,
    pub streamlines: Vec<Streamline>,
    /// Original tractogram index of each streamline, aligned with
    /// `streamlines`.
    pub indices: Vec<usize>,
}

impl FiberGroup {
    /// A bundle that received no streamlines: a normal outcome, not an error.
    pub fn empty(name: impl Into<String>) -> Self {
        Self { name: name.into(), streamlines: Vec::new(), indices: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.streamlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streamlines.is_empty()
    }
}

/// Assignment count for one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleCount {
    pub name: String,
    pub count: usize,
}

/// Summary statistics for one classification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStats {
    /// Streamlines presented to the classifier.
    pub n_streamlines: usize,
    /// Streamlines assigned to some bundle.
    pub n_assigned: usize,
    /// Squared proximity tolerance used for every ROI test.
    pub tolerance: f64,
    /// Per-bundle assignment counts, in bundle order.
    pub per_bundle: Vec<BundleCount>,
}

/// Full result of one classification run: one fiber group per bundle
/// definition (possibly empty), in definition order, plus run statistics.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub fiber_groups: Vec<FiberGroup>,
    pub stats: SegmentStats,
}

impl Segmentation {
    /// Look up a fiber group by bundle name.
    pub fn group(&self, name: &str) -> Option<&FiberGroup> {
        self.fiber_groups.iter().find(|g| g.name == name)
    }
}
