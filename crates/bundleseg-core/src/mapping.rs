//! Template↔subject volume mapping.
//!
//! The registration subsystem that produces subject↔template mappings is an
//! external collaborator; this crate only consumes its inverse-warp
//! capability through [`VolumeMapping`]. The trait replaces the loose
//! "anything with a transform-inverse method" convention with one named
//! operation and an explicit interpolation mode.

use nalgebra::Matrix4;
use ndarray::{Array3, Array4};

use crate::volume::{apply_affine, nearest_sample, trilinear_sample, VolumeError};

/// Interpolation mode for the inverse warp.
///
/// Masks are warped linearly (and re-thresholded afterwards); probability
/// and label volumes use nearest-neighbor to avoid inventing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Nearest,
}

/// Inverse-warp capability: pull a template-space volume into subject space.
///
/// Supplied by the caller, read-only, and shared across every bundle of one
/// segmentation run. Implementations must be deterministic for a given
/// input volume.
pub trait VolumeMapping {
    /// Warp `volume` (template space) into subject space.
    fn inverse_transform(
        &self,
        volume: &Array3<f64>,
        interpolation: Interpolation,
    ) -> Result<Array3<f64>, VolumeError>;
}

// ── Identity ───────────────────────────────────────────────────────────────

/// Mapping for data already in subject space: the warp is a copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapping;

impl VolumeMapping for IdentityMapping {
    fn inverse_transform(
        &self,
        volume: &Array3<f64>,
        _interpolation: Interpolation,
    ) -> Result<Array3<f64>, VolumeError> {
        Ok(volume.clone())
    }
}

// ── Affine-only ────────────────────────────────────────────────────────────

/// Affine-only mapping: each subject voxel pulls its value from the template
/// coordinate `template_from_subject * voxel`.
#[derive(Debug, Clone)]
pub struct AffineMapping {
    template_from_subject: Matrix4<f64>,
    subject_shape: (usize, usize, usize),
}

impl AffineMapping {
    pub fn new(template_from_subject: Matrix4<f64>, subject_shape: (usize, usize, usize)) -> Self {
        Self { template_from_subject, subject_shape }
    }
}

impl VolumeMapping for AffineMapping {
    fn inverse_transform(
        &self,
        volume: &Array3<f64>,
        interpolation: Interpolation,
    ) -> Result<Array3<f64>, VolumeError> {
        let (nx, ny, nz) = self.subject_shape;
        let mut out = Array3::zeros((nx, ny, nz));
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    let p = apply_affine(&self.template_from_subject, [i as f64, j as f64, k as f64]);
                    out[[i, j, k]] = match interpolation {
                        Interpolation::Linear => trilinear_sample(volume, p),
                        Interpolation::Nearest => nearest_sample(volume, p),
                    };
                }
            }
        }
        Ok(out)
    }
}

// ── Deformation field ──────────────────────────────────────────────────────

/// Dense nonlinear mapping: a `(nx, ny, nz, 3)` field giving, for each
/// subject voxel, the template-space coordinate to pull from.
#[derive(Debug, Clone)]
pub struct DeformationFieldMapping {
    field: Array4<f64>,
}

impl DeformationFieldMapping {
    /// Build from a pull-coordinate field with a trailing axis of length 3.
    pub fn new(field: Array4<f64>) -> Result<Self, VolumeError> {
        let dims = field.dim();
        if dims.3 != 3 {
            return Err(VolumeError::ShapeMismatch {
                expected: (dims.0, dims.1, 3),
                got: (dims.0, dims.1, dims.3),
            });
        }
        Ok(Self { field })
    }

    pub fn subject_shape(&self) -> (usize, usize, usize) {
        let dims = self.field.dim();
        (dims.0, dims.1, dims.2)
    }
}

impl VolumeMapping for DeformationFieldMapping {
    fn inverse_transform(
        &self,
        volume: &Array3<f64>,
        interpolation: Interpolation,
    ) -> Result<Array3<f64>, VolumeError> {
        let (nx, ny, nz) = self.subject_shape();
        let mut out = Array3::zeros((nx, ny, nz));
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    let p = [
                        self.field[[i, j, k, 0]],
                        self.field[[i, j, k, 1]],
                        self.field[[i, j, k, 2]],
                    ];
                    out[[i, j, k]] = match interpolation {
                        Interpolation::Linear => trilinear_sample(volume, p),
                        Interpolation::Nearest => nearest_sample(volume, p),
                    };
                }
            }
        }
        Ok(out)
    }
}
