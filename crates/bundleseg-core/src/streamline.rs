//! Streamline and tractogram data model.
//!
//! Two representations exist and are never silently interchanged:
//! - [`Streamline`] — a raw variable-length 3D polyline as produced by
//!   tractography; the system of record.
//! - [`ResampledBundle`] — a fixed-shape `(count, n_nodes, 3)` table obtained
//!   from a set of streamlines by arc-length-uniform resampling; a derived,
//!   disposable view used for probability sampling, node statistics and
//!   profiles.
//!
//! Conversion is one-directional: [`ResampledBundle::from_streamlines`].

use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors that can occur when resampling streamlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResampleError {
    /// An input streamline has fewer than two points.
    TooFewPoints { index: usize, got: usize },
    /// The requested node count is below two.
    TooFewNodes { got: usize },
}

impl std::fmt::Display for ResampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPoints { index, got } => {
                write!(f, "streamline {} has too few points: need 2, got {}", index, got)
            }
            Self::TooFewNodes { got } => {
                write!(f, "too few resampling nodes: need 2, got {}", got)
            }
        }
    }
}

impl std::error::Error for ResampleError {}

// ── Streamline ─────────────────────────────────────────────────────────────

/// One traced fiber path: an ordered 3D polyline with at least two points.
///
/// Coordinates live in whatever space the tractography produced (native
/// subject space unless stated otherwise). The point order may be reversed
/// for orientation normalization; the geometry is otherwise immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Streamline {
    points: Vec<[f64; 3]>,
}

/// The full ordered streamline collection for one subject.
///
/// Order carries no anatomical meaning, but index identity is preserved
/// through every filtering step (fiber groups record original indices).
pub type Tractogram = Vec<Streamline>;

impl Streamline {
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Number of points along the curve.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn point(&self, i: usize) -> [f64; 3] {
        self.points[i]
    }

    /// Flip the point order in place (orientation normalization).
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Arc-length-uniform resampling to exactly `n_nodes` points.
    ///
    /// The first and last points are preserved; interior nodes are linearly
    /// interpolated at equal arc-length spacing.
    pub fn resampled(&self, n_nodes: usize) -> Result<Streamline, ResampleError> {
        if n_nodes < 2 {
            return Err(ResampleError::TooFewNodes { got: n_nodes });
        }
        if self.points.len() < 2 {
            return Err(ResampleError::TooFewPoints { index: 0, got: self.points.len() });
        }
        Ok(Streamline::new(resample_polyline(&self.points, n_nodes)))
    }

    /// Total arc length of the polyline.
    pub fn arc_length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| segment_length(w[0], w[1]))
            .sum()
    }
}

impl From<Vec<[f64; 3]>> for Streamline {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self::new(points)
    }
}

fn segment_length(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Resample a polyline (≥ 2 points) to `n` (≥ 2) arc-length-uniform points.
fn resample_polyline(points: &[[f64; 3]], n: usize) -> Vec<[f64; 3]> {
    // Cumulative arc length at each input vertex.
    let mut cum = Vec::with_capacity(points.len());
    cum.push(0.0);
    for w in points.windows(2) {
        let last = *cum.last().unwrap_or(&0.0);
        cum.push(last + segment_length(w[0], w[1]));
    }
    let total = *cum.last().unwrap_or(&0.0);

    // Degenerate curve with zero extent: every node collapses onto the start.
    if total <= 0.0 {
        return vec![points[0]; n];
    }

    let mut out = Vec::with_capacity(n);
    let mut seg = 0usize;
    for k in 0..n {
        let target = total * k as f64 / (n - 1) as f64;
        while seg + 2 < points.len() && cum[seg + 1] < target {
            seg += 1;
        }
        let seg_len = cum[seg + 1] - cum[seg];
        let t = if seg_len > 0.0 { (target - cum[seg]) / seg_len } else { 0.0 };
        let t = t.clamp(0.0, 1.0);
        let a = points[seg];
        let b = points[seg + 1];
        out.push([
            a[0] + t * (b[0] - a[0]),
            a[1] + t * (b[1] - a[1]),
            a[2] + t * (b[2] - a[2]),
        ]);
    }
    out
}

// ── Resampled bundle ───────────────────────────────────────────────────────

/// Fixed-shape `(count, n_nodes, 3)` table of resampled streamlines.
///
/// One row per streamline, in input order. Derived data only — keep the
/// original [`Streamline`]s around for anything that outlives the current
/// computation.
#[derive(Debug, Clone)]
pub struct ResampledBundle {
    data: Array3<f64>,
}

impl ResampledBundle {
    /// Resample every streamline to exactly `n_nodes` points.
    ///
    /// Fails if `n_nodes < 2` or any streamline has fewer than two points.
    pub fn from_streamlines(
        streamlines: &[Streamline],
        n_nodes: usize,
    ) -> Result<Self, ResampleError> {
        if n_nodes < 2 {
            return Err(ResampleError::TooFewNodes { got: n_nodes });
        }
        let mut data = Array3::zeros((streamlines.len(), n_nodes, 3));
        for (i, sl) in streamlines.iter().enumerate() {
            if sl.len() < 2 {
                return Err(ResampleError::TooFewPoints { index: i, got: sl.len() });
            }
            for (j, p) in resample_polyline(sl.points(), n_nodes).into_iter().enumerate() {
                data[[i, j, 0]] = p[0];
                data[[i, j, 1]] = p[1];
                data[[i, j, 2]] = p[2];
            }
        }
        Ok(Self { data })
    }

    /// Number of streamlines (rows).
    pub fn count(&self) -> usize {
        self.data.shape()[0]
    }

    /// Node count per streamline.
    pub fn n_nodes(&self) -> usize {
        self.data.shape()[1]
    }

    /// Coordinate of node `node` on streamline `sl`.
    pub fn node(&self, sl: usize, node: usize) -> [f64; 3] {
        [
            self.data[[sl, node, 0]],
            self.data[[sl, node, 1]],
            self.data[[sl, node, 2]],
        ]
    }

    /// `(n_nodes, 3)` view of one streamline's nodes.
    pub fn row(&self, sl: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), sl)
    }

    /// Raw `(count, n_nodes, 3)` table.
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// New bundle containing only the given rows, in the given order.
    pub fn select(&self, rows: &[usize]) -> ResampledBundle {
        ResampledBundle {
            data: self.data.select(Axis(0), rows),
        }
    }
}
