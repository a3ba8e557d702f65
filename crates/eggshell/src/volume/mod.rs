//! Volumetric sources sampled by the projector and the detection sweep.
//!
//! A source exposes, per timepoint and resolution level, a source-voxel to
//! world affine, an interpolated scalar sample at a real-valued voxel
//! coordinate, and its integer voxel bounds.

mod band;
mod dense;

use nalgebra::{Matrix4, Point3, Vector3};

pub use band::{DistanceBandVolume, BAND_VALUE};
pub use dense::{DenseVolume, Interpolation, VolumeError};

/// Source-voxel to world transform.
pub type Affine = nalgebra::Affine3<f64>;

/// Read access to a scalar 3D(+t) image.
///
/// Implementations must be safe to sample from several threads at once.
pub trait VolumeSource: Sync {
    fn num_timepoints(&self) -> usize;

    /// Source-voxel to world transform at `(timepoint, level)`.
    fn source_transform(&self, timepoint: usize, level: usize) -> Affine;

    /// Interpolated value at a real-valued voxel coordinate.
    fn sample(&self, timepoint: usize, level: usize, source_xyz: &Vector3<f64>) -> f64;

    /// Voxel bounds at `(timepoint, level)`.
    fn interval(&self, timepoint: usize, level: usize) -> VoxelInterval;
}

/// Affine with independent axis scaling followed by a translation.
pub fn scale_translate(scale: Vector3<f64>, translation: Vector3<f64>) -> Affine {
    let mut m = Matrix4::identity();
    for i in 0..3 {
        m[(i, i)] = scale[i];
        m[(i, 3)] = translation[i];
    }
    Affine::from_matrix_unchecked(m)
}

/// Build an affine from a row-major 3×4 matrix `[R | t]`.
pub fn affine_from_rows(rows: &[[f64; 4]; 3]) -> Affine {
    let mut m = Matrix4::identity();
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            m[(i, j)] = v;
        }
    }
    Affine::from_matrix_unchecked(m)
}

/// Length of the world-space image of each source axis.
pub fn axis_scales(transform: &Affine) -> Vector3<f64> {
    let m = transform.matrix();
    Vector3::new(
        m.fixed_view::<3, 1>(0, 0).norm(),
        m.fixed_view::<3, 1>(0, 1).norm(),
        m.fixed_view::<3, 1>(0, 2).norm(),
    )
}

pub(crate) fn apply(transform: &Affine, p: &Vector3<f64>) -> Vector3<f64> {
    transform.transform_point(&Point3::from(*p)).coords
}

/// Inclusive integer box in voxel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VoxelInterval {
    pub min: [i64; 3],
    pub max: [i64; 3],
}

impl VoxelInterval {
    pub fn new(min: [i64; 3], max: [i64; 3]) -> Self {
        Self { min, max }
    }

    /// Interval `[0, dims - 1]` of an image with the given dimensions.
    pub fn from_dims(dims: [usize; 3]) -> Self {
        Self {
            min: [0; 3],
            max: dims.map(|d| d as i64 - 1),
        }
    }

    /// True if some axis has `max < min`.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.max[i] < self.min[i])
    }

    /// Number of voxels along each axis (0 for empty axes).
    pub fn dims(&self) -> [usize; 3] {
        let mut d = [0usize; 3];
        for (i, slot) in d.iter_mut().enumerate() {
            *slot = (self.max[i] - self.min[i] + 1).max(0) as usize;
        }
        d
    }

    pub fn contains(&self, p: &[i64; 3]) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// The 8 corners as real coordinates.
    pub fn corners(&self) -> [Vector3<f64>; 8] {
        let lo = self.min.map(|v| v as f64);
        let hi = self.max.map(|v| v as f64);
        let mut out = [Vector3::zeros(); 8];
        for (k, c) in out.iter_mut().enumerate() {
            *c = Vector3::new(
                if k & 1 == 0 { lo[0] } else { hi[0] },
                if k & 2 == 0 { lo[1] } else { hi[1] },
                if k & 4 == 0 { lo[2] } else { hi[2] },
            );
        }
        out
    }

    pub fn intersect(&self, other: &VoxelInterval) -> VoxelInterval {
        let mut min = [0i64; 3];
        let mut max = [0i64; 3];
        for i in 0..3 {
            min[i] = self.min[i].max(other.min[i]);
            max[i] = self.max[i].min(other.max[i]);
        }
        VoxelInterval { min, max }
    }

    /// Smallest integer interval containing all `points` (floor/ceil).
    /// `None` for an empty slice or non-finite coordinates.
    pub fn smallest_containing(points: &[Vector3<f64>]) -> Option<VoxelInterval> {
        let first = points.first()?;
        let mut lo = *first;
        let mut hi = *first;
        for p in &points[1..] {
            lo = lo.inf(p);
            hi = hi.sup(p);
        }
        if !lo.iter().chain(hi.iter()).all(|v| v.is_finite()) {
            return None;
        }
        Some(VoxelInterval {
            min: [0, 1, 2].map(|i| lo[i].floor() as i64),
            max: [0, 1, 2].map(|i| hi[i].ceil() as i64),
        })
    }
}
