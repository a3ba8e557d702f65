use nalgebra::Vector3;

use super::{Affine, VolumeSource, VoxelInterval};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VolumeError {
    #[error("timepoint {timepoint}: expected {expected} voxels, got {got}")]
    ShapeMismatch {
        timepoint: usize,
        expected: usize,
        got: usize,
    },
}

/// Resampling used by [`DenseVolume::sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Trilinear,
}

/// In-memory `f32` voxel grid, one buffer per timepoint, x fastest.
///
/// A single resolution level; the `level` argument of [`VolumeSource`] is
/// ignored. Voxels outside the grid read as zero.
#[derive(Debug, Clone)]
pub struct DenseVolume {
    dims: [usize; 3],
    frames: Vec<Vec<f32>>,
    transform: Affine,
    interpolation: Interpolation,
}

impl DenseVolume {
    pub fn new(
        dims: [usize; 3],
        frames: Vec<Vec<f32>>,
        transform: Affine,
    ) -> Result<Self, VolumeError> {
        let expected = dims[0] * dims[1] * dims[2];
        for (timepoint, frame) in frames.iter().enumerate() {
            if frame.len() != expected {
                return Err(VolumeError::ShapeMismatch {
                    timepoint,
                    expected,
                    got: frame.len(),
                });
            }
        }
        Ok(Self {
            dims,
            frames,
            transform,
            interpolation: Interpolation::default(),
        })
    }

    /// Fill every timepoint by evaluating `f(t, x, y, z)` at integer voxels.
    pub fn from_fn(
        dims: [usize; 3],
        timepoints: usize,
        transform: Affine,
        mut f: impl FnMut(usize, usize, usize, usize) -> f32,
    ) -> Self {
        let frames = (0..timepoints)
            .map(|t| {
                let mut frame = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
                for z in 0..dims[2] {
                    for y in 0..dims[1] {
                        for x in 0..dims[0] {
                            frame.push(f(t, x, y, z));
                        }
                    }
                }
                frame
            })
            .collect();
        Self {
            dims,
            frames,
            transform,
            interpolation: Interpolation::default(),
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Voxel value, zero outside the grid or for an unknown timepoint.
    pub fn voxel(&self, timepoint: usize, x: i64, y: i64, z: i64) -> f32 {
        let [w, h, d] = self.dims;
        if x < 0 || y < 0 || z < 0 || x as usize >= w || y as usize >= h || z as usize >= d {
            return 0.0;
        }
        self.frames
            .get(timepoint)
            .map_or(0.0, |f| f[x as usize + w * (y as usize + h * z as usize)])
    }

    fn trilinear(&self, timepoint: usize, p: &Vector3<f64>) -> f64 {
        let base = p.map(f64::floor);
        let frac = p - base;
        let (x0, y0, z0) = (base[0] as i64, base[1] as i64, base[2] as i64);
        let mut acc = 0.0;
        for k in 0..8 {
            let (dx, dy, dz) = (k & 1, (k >> 1) & 1, (k >> 2) & 1);
            let wx = if dx == 0 { 1.0 - frac[0] } else { frac[0] };
            let wy = if dy == 0 { 1.0 - frac[1] } else { frac[1] };
            let wz = if dz == 0 { 1.0 - frac[2] } else { frac[2] };
            let w = wx * wy * wz;
            if w != 0.0 {
                acc += w * self.voxel(timepoint, x0 + dx, y0 + dy, z0 + dz) as f64;
            }
        }
        acc
    }
}

impl VolumeSource for DenseVolume {
    fn num_timepoints(&self) -> usize {
        self.frames.len()
    }

    fn source_transform(&self, _timepoint: usize, _level: usize) -> Affine {
        self.transform
    }

    fn sample(&self, timepoint: usize, _level: usize, source_xyz: &Vector3<f64>) -> f64 {
        if !source_xyz.iter().all(|v| v.is_finite()) {
            return 0.0;
        }
        match self.interpolation {
            Interpolation::Nearest => {
                let r = source_xyz.map(f64::round);
                self.voxel(timepoint, r[0] as i64, r[1] as i64, r[2] as i64) as f64
            }
            Interpolation::Trilinear => self.trilinear(timepoint, source_xyz),
        }
    }

    fn interval(&self, _timepoint: usize, _level: usize) -> VoxelInterval {
        VoxelInterval::from_dims(self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::scale_translate;
    use approx::assert_relative_eq;

    fn ramp() -> DenseVolume {
        // value = x + 10 y + 100 z + 1000 t
        DenseVolume::from_fn([4, 3, 2], 2, Affine::identity(), |t, x, y, z| {
            (x + 10 * y + 100 * z + 1000 * t) as f32
        })
    }

    #[test]
    fn rejects_wrong_buffer_length() {
        let err = DenseVolume::new([2, 2, 2], vec![vec![0.0; 8], vec![0.0; 7]], Affine::identity())
            .unwrap_err();
        assert_eq!(
            err,
            VolumeError::ShapeMismatch {
                timepoint: 1,
                expected: 8,
                got: 7
            }
        );
    }

    #[test]
    fn nearest_and_trilinear_sampling() {
        let v = ramp();
        assert_eq!(v.voxel(1, 3, 2, 1), 1123.0);

        let p = Vector3::new(1.25, 0.5, 0.75);
        // Linear field: trilinear is exact inside the grid.
        assert_relative_eq!(v.sample(0, 0, &p), 1.25 + 5.0 + 75.0, epsilon = 1e-9);

        let nearest = v.clone().with_interpolation(Interpolation::Nearest);
        assert_relative_eq!(nearest.sample(1, 0, &Vector3::new(1.4, 1.6, 0.2)), 1021.0);
    }

    #[test]
    fn outside_reads_zero() {
        let v = ramp();
        assert_eq!(v.voxel(0, -1, 0, 0), 0.0);
        assert_eq!(v.voxel(0, 4, 0, 0), 0.0);
        assert_eq!(v.voxel(5, 0, 0, 0), 0.0);
        assert_eq!(v.sample(0, 0, &Vector3::new(10.0, 10.0, 10.0)), 0.0);
        // Half-way past the last voxel blends with zero.
        assert_relative_eq!(v.sample(0, 0, &Vector3::new(3.5, 0.0, 0.0)), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn reports_interval_and_transform() {
        let t = scale_translate(Vector3::new(1.0, 1.0, 3.0), Vector3::zeros());
        let v = DenseVolume::from_fn([5, 6, 7], 1, t, |_, _, _, _| 1.0);
        assert_eq!(v.interval(0, 0), VoxelInterval::new([0, 0, 0], [4, 5, 6]));
        assert_eq!(v.source_transform(0, 0), t);
        assert_eq!(v.num_timepoints(), 1);
    }
}
