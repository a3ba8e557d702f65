//! Shared fixtures for unit tests.

use nalgebra::{Rotation3, Vector3};
use rand::Rng;

use crate::ellipsoid::Ellipsoid;
use crate::volume::{Affine, VolumeSource, VoxelInterval};

/// Elongated, rotated ellipsoid away from the origin.
pub(crate) fn rotated_test_ellipsoid() -> Ellipsoid {
    let rot = Rotation3::from_euler_angles(0.3, -0.5, 1.1);
    let m = rot.matrix();
    Ellipsoid::from_axes_radii(
        Vector3::new(12.0, -7.0, 30.0),
        [
            m.column(0).into_owned(),
            m.column(1).into_owned(),
            m.column(2).into_owned(),
        ],
        Vector3::new(40.0, 25.0, 18.0),
    )
    .expect("valid fixture")
}

/// Radii in ascending order.
pub(crate) fn sorted_radii(e: &Ellipsoid) -> [f64; 3] {
    let mut r = [e.radii()[0], e.radii()[1], e.radii()[2]];
    r.sort_by(|a, b| a.total_cmp(b));
    r
}

/// Add uniform noise in `[-amplitude, amplitude]` to every coordinate.
pub(crate) fn jitter(points: &mut [[f64; 3]], amplitude: f64, rng: &mut impl Rng) {
    for p in points.iter_mut() {
        for c in p.iter_mut() {
            *c += rng.gen_range(-amplitude..amplitude);
        }
    }
}

/// Uniform random points in an axis-aligned box, rejecting those within
/// `min_gap` of the ellipsoid surface.
pub(crate) fn outliers_around(
    e: &Ellipsoid,
    count: usize,
    half_extent: f64,
    min_gap: f64,
    rng: &mut impl Rng,
) -> Vec<[f64; 3]> {
    let c = e.center();
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let p = Vector3::new(
            c[0] + rng.gen_range(-half_extent..half_extent),
            c[1] + rng.gen_range(-half_extent..half_extent),
            c[2] + rng.gen_range(-half_extent..half_extent),
        );
        if crate::ellipsoid::distance_to_ellipsoid(&p, e).distance > min_gap {
            out.push([p[0], p[1], p[2]]);
        }
    }
    out
}

/// Volume returning the same value everywhere.
pub(crate) struct ConstantVolume {
    pub value: f64,
    pub transform: Affine,
    pub timepoints: usize,
}

impl VolumeSource for ConstantVolume {
    fn num_timepoints(&self) -> usize {
        self.timepoints
    }

    fn source_transform(&self, _timepoint: usize, _level: usize) -> Affine {
        self.transform
    }

    fn sample(&self, _timepoint: usize, _level: usize, _source_xyz: &Vector3<f64>) -> f64 {
        self.value
    }

    fn interval(&self, _timepoint: usize, _level: usize) -> VoxelInterval {
        VoxelInterval::new([0, 0, 0], [99, 99, 99])
    }
}
