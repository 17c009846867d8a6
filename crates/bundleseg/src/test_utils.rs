//! Shared synthetic-data helpers for unit tests.

use bundleseg_core::segment::{BundleDef, BundleDefs};
use bundleseg_core::streamline::Streamline;
use ndarray::Array3;

/// Box mask in a `dim³` volume covering the half-open per-axis ranges.
pub(crate) fn box_roi(
    dim: usize,
    x: (usize, usize),
    y: (usize, usize),
    z: (usize, usize),
) -> Array3<f64> {
    Array3::from_shape_fn((dim, dim, dim), |(i, j, k)| {
        if i >= x.0 && i < x.1 && j >= y.0 && j < y.1 && k >= z.0 && k < z.1 {
            1.0
        } else {
            0.0
        }
    })
}

/// X-aligned streamline at the given y/z, spanning the whole volume.
pub(crate) fn corridor_line(y: f64, z: f64, dim: usize) -> Streamline {
    Streamline::new((0..dim).map(|i| [i as f64, y, z]).collect())
}

/// One "CORRIDOR" bundle with waypoint boxes near x=2 and x=13, both
/// straddling the y∈[1,4), z∈[1,6) corridor.
pub(crate) fn waypoint_defs(dim: usize) -> BundleDefs {
    BundleDefs::from(vec![BundleDef::waypoints(
        "CORRIDOR",
        vec![
            box_roi(dim, (1, 3), (1, 4), (1, 6)),
            box_roi(dim, (12, 14), (1, 4), (1, 6)),
        ],
    )])
}
