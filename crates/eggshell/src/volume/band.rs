//! Synthetic source marking a shell of signed distances around an ellipsoid.

use nalgebra::Vector3;

use super::{Affine, VolumeSource, VoxelInterval};
use crate::ellipsoid::Ellipsoid;

/// Value returned inside the band.
pub const BAND_VALUE: f64 = 1000.0;

/// Returns [`BAND_VALUE`] where the signed distance to the ellipsoid lies in
/// `[min_distance, max_distance]` and 0 elsewhere.
///
/// Source coordinates are world coordinates; the interval and timepoint count
/// only mirror the source the band is previewed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceBandVolume {
    pub ellipsoid: Ellipsoid,
    pub min_distance: f64,
    pub max_distance: f64,
    pub interval: VoxelInterval,
    pub timepoints: usize,
}

impl DistanceBandVolume {
    pub fn new(ellipsoid: Ellipsoid, min_distance: f64, max_distance: f64) -> Self {
        Self {
            ellipsoid,
            min_distance,
            max_distance,
            interval: bounding_interval(&ellipsoid, max_distance.max(0.0)),
            timepoints: 1,
        }
    }

    pub fn in_band(&self, world: &Vector3<f64>) -> bool {
        let d = self.ellipsoid.signed_distance(world);
        d >= self.min_distance && d <= self.max_distance
    }
}

/// Axis-aligned voxel box containing the ellipsoid grown by `margin`.
fn bounding_interval(e: &Ellipsoid, margin: f64) -> VoxelInterval {
    // Half-extent along world axis k: sqrt(Σᵢ (rᵢ aᵢₖ)²).
    let mut half = Vector3::zeros();
    for (axis, r) in e.axes().iter().zip(e.radii().iter()) {
        half += (axis * *r).map(|v| v * v);
    }
    let half = half.map(f64::sqrt).add_scalar(margin);
    let c = e.center();
    VoxelInterval::smallest_containing(&[c - half, c + half])
        .unwrap_or(VoxelInterval::new([0; 3], [-1; 3]))
}

impl VolumeSource for DistanceBandVolume {
    fn num_timepoints(&self) -> usize {
        self.timepoints
    }

    fn source_transform(&self, _timepoint: usize, _level: usize) -> Affine {
        Affine::identity()
    }

    fn sample(&self, _timepoint: usize, _level: usize, source_xyz: &Vector3<f64>) -> f64 {
        if self.in_band(source_xyz) {
            BAND_VALUE
        } else {
            0.0
        }
    }

    fn interval(&self, _timepoint: usize, _level: usize) -> VoxelInterval {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_around_sphere() {
        let sphere =
            Ellipsoid::axis_aligned(Vector3::new(5.0, 5.0, 5.0), Vector3::new(10.0, 10.0, 10.0))
                .unwrap();
        let band = DistanceBandVolume::new(sphere, -2.0, 3.0);

        let at = |r: f64| band.sample(0, 0, &Vector3::new(5.0 + r, 5.0, 5.0));
        assert_eq!(at(0.0), 0.0);
        assert_eq!(at(7.9), 0.0);
        assert_eq!(at(8.5), BAND_VALUE);
        assert_eq!(at(10.0), BAND_VALUE);
        assert_eq!(at(12.9), BAND_VALUE);
        assert_eq!(at(13.5), 0.0);

        assert_eq!(band.interval(0, 0), VoxelInterval::new([-8; 3], [18; 3]));
    }
}
