//! Iterative Mahalanobis cleaning of a segmented fiber group.
//!
//! Each round recomputes node statistics from scratch on the current
//! survivor set; nothing is carried across rounds. Survivor indices are
//! tracked cumulatively against the original ordering so the caller gets
//! back original (non-resampled) streamlines.

use serde::{Deserialize, Serialize};

use crate::streamline::{ResampleError, ResampledBundle, Streamline};
use crate::weights::{mahalanobis_distances, CovarianceMode, NodeStatistic, WeightError};
use crate::FiberGroup;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors from fiber-group cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanError {
    Resample(ResampleError),
    Weights(WeightError),
}

impl std::fmt::Display for CleanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resample(e) => write!(f, "resampling failed: {}", e),
            Self::Weights(e) => write!(f, "node statistics failed: {}", e),
        }
    }
}

impl std::error::Error for CleanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resample(e) => Some(e),
            Self::Weights(e) => Some(e),
        }
    }
}

impl From<ResampleError> for CleanError {
    fn from(e: ResampleError) -> Self {
        Self::Resample(e)
    }
}

impl From<WeightError> for CleanError {
    fn from(e: WeightError) -> Self {
        Self::Weights(e)
    }
}

// ── Configuration ──────────────────────────────────────────────────────────

/// Cleaning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Node count for the working resampled table.
    pub n_points: usize,
    /// Maximum number of removal rounds.
    pub clean_rounds: usize,
    /// Mahalanobis threshold in standard deviations; a streamline survives a
    /// round only if it is below this at every node.
    pub distance_threshold: f64,
    /// Bundles smaller than this are returned untouched, and no round may
    /// shrink a bundle to or below it.
    pub min_streamlines: usize,
    /// Central statistic for the per-node distances.
    pub stat: NodeStatistic,
    /// Covariance construction (symmetric, or legacy-compatible).
    pub covariance: CovarianceMode,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            n_points: 100,
            clean_rounds: 5,
            distance_threshold: 3.0,
            min_streamlines: 20,
            stat: NodeStatistic::Mean,
            covariance: CovarianceMode::Symmetric,
        }
    }
}

// ── Cleaning ───────────────────────────────────────────────────────────────

/// Survivor indices (into the original ordering) and the number of removal
/// rounds that ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOutcome {
    pub kept: Vec<usize>,
    pub rounds: usize,
}

/// Iteratively remove outlier streamlines by per-node Mahalanobis distance.
///
/// A no-op (all indices kept) when the input is smaller than
/// `min_streamlines`. Stops early when no distance exceeds the threshold or
/// when a round would leave at most `min_streamlines` survivors.
pub fn clean_indices(
    streamlines: &[Streamline],
    config: &CleanConfig,
) -> Result<CleanOutcome, CleanError> {
    let n = streamlines.len();
    if n < config.min_streamlines {
        return Ok(CleanOutcome { kept: (0..n).collect(), rounds: 0 });
    }

    let mut bundle = ResampledBundle::from_streamlines(streamlines, config.n_points)?;
    let mut kept: Vec<usize> = (0..n).collect();
    let mut distances = mahalanobis_distances(&bundle, config.stat, config.covariance)?;
    let mut rounds = 0;

    while rounds < config.clean_rounds
        && distances.iter().any(|&d| d > config.distance_threshold)
    {
        let survivors: Vec<usize> = (0..bundle.count())
            .filter(|&sl| {
                distances
                    .row(sl)
                    .iter()
                    .all(|&d| d < config.distance_threshold)
            })
            .collect();

        if survivors.len() <= config.min_streamlines {
            tracing::debug!(
                survivors = survivors.len(),
                floor = config.min_streamlines,
                "cleaning stopped at the size floor"
            );
            break;
        }

        let removed = bundle.count() - survivors.len();
        kept = survivors.iter().map(|&sl| kept[sl]).collect();
        bundle = bundle.select(&survivors);
        distances = mahalanobis_distances(&bundle, config.stat, config.covariance)?;
        rounds += 1;
        tracing::debug!(round = rounds, removed, remaining = bundle.count(), "cleaning round");
    }

    Ok(CleanOutcome { kept, rounds })
}

/// Clean a fiber group, returning a group holding the surviving original
/// streamlines (and their original tractogram indices).
pub fn clean_fiber_group(
    group: &FiberGroup,
    config: &CleanConfig,
) -> Result<FiberGroup, CleanError> {
    let outcome = clean_indices(&group.streamlines, config)?;
    tracing::info!(
        bundle = %group.name,
        before = group.len(),
        after = outcome.kept.len(),
        rounds = outcome.rounds,
        "cleaned fiber group"
    );
    Ok(FiberGroup {
        name: group.name.clone(),
        streamlines: outcome.kept.iter().map(|&i| group.streamlines[i].clone()).collect(),
        indices: outcome.kept.iter().map(|&i| group.indices[i]).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 25 parallel x-aligned streamlines on a 5×5 (y, z) grid, with a small
    /// x offset pattern chosen orthogonal to the grid axes so the per-node
    /// covariance is diagonal and every inlier stays well under 3σ.
    fn grid_bundle(n_points: usize) -> Vec<Streamline> {
        let f = [1.0, -1.0, 1.0, -1.0, 0.0];
        let g = [1.0, 1.0, -1.0, -1.0, 0.0];
        (0..25)
            .map(|i| {
                let y0 = (i % 5) as f64;
                let z0 = (i / 5) as f64;
                let x_off = 0.01 * f[i % 5] * g[i / 5];
                let pts = (0..n_points).map(|k| [k as f64 + x_off, y0, z0]).collect();
                Streamline::new(pts)
            })
            .collect()
    }

    fn offset_copy(sl: &Streamline, delta: [f64; 3]) -> Streamline {
        Streamline::new(
            sl.points()
                .iter()
                .map(|p| [p[0] + delta[0], p[1] + delta[1], p[2] + delta[2]])
                .collect(),
        )
    }

    #[test]
    fn test_noop_below_min_size() {
        let sls: Vec<Streamline> = grid_bundle(50).into_iter().take(10).collect();
        let outcome = clean_indices(&sls, &CleanConfig::default()).unwrap();
        assert_eq!(outcome.kept, (0..10).collect::<Vec<_>>());
        assert_eq!(outcome.rounds, 0);
    }

    #[test]
    fn test_removes_gross_outlier() {
        // 25 parallel streamlines of 100 nodes plus one offset by 50 units
        // at every node: exactly the outlier goes, within 5 rounds.
        let mut sls = grid_bundle(100);
        let outlier = offset_copy(&sls[0], [50.0, 50.0, 50.0]);
        sls.push(outlier);

        let config = CleanConfig {
            clean_rounds: 5,
            distance_threshold: 3.0,
            min_streamlines: 20,
            ..Default::default()
        };
        let outcome = clean_indices(&sls, &config).unwrap();
        assert_eq!(outcome.kept, (0..25).collect::<Vec<_>>());
        assert!(outcome.rounds <= 5);
    }

    #[test]
    fn test_kept_indices_refer_to_original_ordering() {
        let mut sls = grid_bundle(60);
        let outlier = offset_copy(&sls[4], [0.0, 80.0, -80.0]);
        sls.insert(13, outlier);

        let outcome = clean_indices(&sls, &CleanConfig::default()).unwrap();
        let expected: Vec<usize> = (0..26).filter(|&i| i != 13).collect();
        assert_eq!(outcome.kept, expected);
    }

    #[test]
    fn test_stops_at_size_floor_without_applying() {
        // Removing the outlier would leave 21 survivors; with the floor at
        // 21 the round is not applied and the bundle stays intact.
        let mut sls: Vec<Streamline> = grid_bundle(40).into_iter().take(21).collect();
        sls.push(offset_copy(&sls[0], [50.0, 50.0, 50.0]));

        let config = CleanConfig { min_streamlines: 21, ..Default::default() };
        let outcome = clean_indices(&sls, &config).unwrap();
        assert_eq!(outcome.kept.len(), 22);
        assert_eq!(outcome.rounds, 0);
    }

    #[test]
    fn test_clean_fiber_group_filters_indices() {
        let mut sls = grid_bundle(50);
        sls.push(offset_copy(&sls[0], [-60.0, 60.0, 60.0]));

        let group = FiberGroup {
            name: "ARC_L".into(),
            indices: (100..126).collect(),
            streamlines: sls,
        };
        let cleaned = clean_fiber_group(&group, &CleanConfig::default()).unwrap();
        assert_eq!(cleaned.name, "ARC_L");
        assert_eq!(cleaned.len(), 25);
        assert_eq!(cleaned.indices, (100..125).collect::<Vec<_>>());
        assert!(!cleaned.indices.contains(&125));
    }
}
