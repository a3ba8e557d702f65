//! Orthonormal unwrap frame `{A, Z, L}` derived from an ellipsoid.

use nalgebra::{Matrix3, Vector3};

use crate::ellipsoid::Ellipsoid;

/// Unwrap frame. `l` is the cylinder axis (spherical pole); `a` and `z`
/// span the azimuthal plane with azimuth 0 along `a`.
///
/// The rows `(a, z, l)` always form a right-handed basis since `z = l × a`;
/// `flip_z` only selects the sign of `a.z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylinderFrame {
    pub a: Vector3<f64>,
    pub z: Vector3<f64>,
    pub l: Vector3<f64>,
}

impl CylinderFrame {
    /// Frame for `ellipsoid`.
    ///
    /// `L` is `(0, -1, 0)` with `align_y`, otherwise the longest ellipsoid
    /// axis with non-positive `y`. `A` is the world `Z` direction made
    /// orthogonal to `L`, with `A.z ≥ 0` if `flip_z` and `A.z ≤ 0` otherwise.
    pub fn new(ellipsoid: &Ellipsoid, flip_z: bool, align_y: bool) -> Self {
        let l = if align_y {
            Vector3::new(0.0, -1.0, 0.0)
        } else {
            let l = ellipsoid.axes()[ellipsoid.largest_axis_index()];
            if l.y > 0.0 {
                -l
            } else {
                l
            }
        };

        let mut a = orthogonal_reference(&l, &Vector3::z());
        if flip_z {
            if a.z < 0.0 {
                a = -a;
            }
        } else if a.z > 0.0 {
            a = -a;
        }
        let z = l.cross(&a);
        Self { a, z, l }
    }

    /// Rows `a, z, l`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::from_rows(&[self.a.transpose(), self.z.transpose(), self.l.transpose()])
    }

    /// Frame-local direction mapped to world orientation (`Mᵀ u`).
    pub fn to_world(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.a * local.x + self.z * local.y + self.l * local.z
    }
}

/// `normalize(l × (r × l))`, the component of `r` orthogonal to `l`.
/// Falls back to world `Y` when `l` is parallel to `r`.
fn orthogonal_reference(l: &Vector3<f64>, r: &Vector3<f64>) -> Vector3<f64> {
    let v = l.cross(&r.cross(l));
    if v.norm() > 1e-9 {
        return v.normalize();
    }
    l.cross(&Vector3::y().cross(l)).normalize()
}

impl std::fmt::Display for CylinderFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let row = |v: &Vector3<f64>| format!("[{:.6}, {:.6}, {:.6}]", v.x, v.y, v.z);
        write!(f, "A={} Z={} L={}", row(&self.a), row(&self.z), row(&self.l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::rotated_test_ellipsoid;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn check_orthonormal(f: &CylinderFrame) {
        for v in [f.a, f.z, f.l] {
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        }
        assert!(f.a.dot(&f.z).abs() < 1e-12);
        assert!(f.a.dot(&f.l).abs() < 1e-12);
        assert!(f.z.dot(&f.l).abs() < 1e-12);
        assert_relative_eq!(f.matrix().determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn orthonormal_for_all_flag_combinations() {
        let mut ellipsoids = vec![rotated_test_ellipsoid()];
        for (i, angles) in [(0.1, 0.2, 0.3), (-1.2, 0.7, 2.5), (2.0, -0.4, -1.0)]
            .iter()
            .enumerate()
        {
            let m = *Rotation3::from_euler_angles(angles.0, angles.1, angles.2).matrix();
            ellipsoids.push(
                Ellipsoid::from_axes_radii(
                    Vector3::new(i as f64, 0.0, 0.0),
                    [
                        m.column(0).into_owned(),
                        m.column(1).into_owned(),
                        m.column(2).into_owned(),
                    ],
                    Vector3::new(3.0, 9.0, 5.0),
                )
                .unwrap(),
            );
        }

        for e in &ellipsoids {
            for flip_z in [false, true] {
                for align_y in [false, true] {
                    let f = CylinderFrame::new(e, flip_z, align_y);
                    check_orthonormal(&f);
                    assert!(f.l.y <= 0.0);
                    if flip_z {
                        assert!(f.a.z >= 0.0);
                    } else {
                        assert!(f.a.z <= 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn picks_longest_axis_pointing_down_y() {
        let e = Ellipsoid::axis_aligned(Vector3::zeros(), Vector3::new(2.0, 7.0, 3.0)).unwrap();
        let f = CylinderFrame::new(&e, false, false);
        assert_relative_eq!(f.l, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(f.a, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
        assert_relative_eq!(f.z, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);

        let flipped = CylinderFrame::new(&e, true, false);
        assert_relative_eq!(flipped.a, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(flipped.z, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn tied_longest_axes_pick_the_later_one() {
        let e = Ellipsoid::axis_aligned(Vector3::zeros(), Vector3::new(5.0, 5.0, 2.0)).unwrap();
        let f = CylinderFrame::new(&e, false, false);
        assert_relative_eq!(f.l, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn long_axis_along_world_z_uses_y_reference() {
        let e = Ellipsoid::axis_aligned(Vector3::zeros(), Vector3::new(2.0, 3.0, 9.0)).unwrap();
        let f = CylinderFrame::new(&e, false, false);
        check_orthonormal(&f);
        assert_relative_eq!(f.l.cross(&Vector3::z()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn to_world_is_transpose_product() {
        let f = CylinderFrame::new(&rotated_test_ellipsoid(), true, false);
        let u = Vector3::new(0.3, -0.8, 0.52);
        assert_relative_eq!(f.to_world(&u), f.matrix().transpose() * u, epsilon = 1e-12);
    }
}
