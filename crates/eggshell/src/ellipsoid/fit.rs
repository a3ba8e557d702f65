//! Direct algebraic least-squares ellipsoid fitting.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use super::types::{DegenerateReason, Ellipsoid, FitError};

/// Minimum number of points determining the 9 quadric coefficients.
pub const MIN_FIT_POINTS: usize = 9;

/// Singular value ratio below which the design matrix counts as rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

/// Fit an ellipsoid to a set of 3D points by linear least squares.
///
/// Solves for the unrestricted quadric
/// `a x² + b y² + c z² + d xy + e xz + f yz + g x + h y + i z = 1`
/// and recenters it into `(x - c)ᵀ P (x - c) = 1`. Points are shifted to their
/// centroid and scaled before the solve; the result is mapped back.
///
/// Requires at least [`MIN_FIT_POINTS`] points. Fails with
/// [`FitError::Degenerate`] if the system is rank deficient or the quadric
/// is not an ellipsoid.
pub fn fit_ellipsoid(points: &[[f64; 3]]) -> Result<Ellipsoid, FitError> {
    let n = points.len();
    if n < MIN_FIT_POINTS {
        return Err(FitError::InsufficientPoints {
            needed: MIN_FIT_POINTS,
            got: n,
        });
    }

    let (mean, scale) = normalization_params(points);

    // Design matrix rows [x², y², z², xy, xz, yz, x, y, z] in normalized coords
    let mut d = DMatrix::<f64>::zeros(n, 9);
    for (row, p) in points.iter().enumerate() {
        let x = (p[0] - mean[0]) * scale;
        let y = (p[1] - mean[1]) * scale;
        let z = (p[2] - mean[2]) * scale;
        d[(row, 0)] = x * x;
        d[(row, 1)] = y * y;
        d[(row, 2)] = z * z;
        d[(row, 3)] = x * y;
        d[(row, 4)] = x * z;
        d[(row, 5)] = y * z;
        d[(row, 6)] = x;
        d[(row, 7)] = y;
        d[(row, 8)] = z;
    }
    let rhs = DVector::<f64>::from_element(n, 1.0);

    let svd = d.svd(true, true);
    let s_max = svd.singular_values.max();
    let s_min = svd.singular_values.min();
    if !s_max.is_finite() || s_max <= 0.0 || s_min <= s_max * RANK_TOLERANCE {
        return Err(DegenerateReason::RankDeficient.into());
    }
    let v = svd
        .solve(&rhs, 0.0)
        .map_err(|_| FitError::from(DegenerateReason::RankDeficient))?;
    if !v.iter().all(|c| c.is_finite()) {
        return Err(DegenerateReason::NonFinite.into());
    }

    let (center_n, precision_n) = recenter_quadric(v.as_slice())?;

    // x' = s (x - m)  =>  center = m + c'/s, precision = s² P'
    let center = mean + center_n / scale;
    let precision = precision_n * (scale * scale);
    Ok(Ellipsoid::from_precision(center, precision)?)
}

/// Turn the 9 quadric coefficients into a center and precision matrix.
///
/// The quadric `xᵀ A x + bᵀ x = 1` has center `c = -½ A⁻¹ b` and satisfies
/// `(x - c)ᵀ A (x - c) = k` with `k = 1 + ¼ bᵀ A⁻¹ b`, so `P = A / k`.
fn recenter_quadric(v: &[f64]) -> Result<(Vector3<f64>, Matrix3<f64>), DegenerateReason> {
    let a = Matrix3::new(
        v[0],
        v[3] * 0.5,
        v[4] * 0.5,
        v[3] * 0.5,
        v[1],
        v[5] * 0.5,
        v[4] * 0.5,
        v[5] * 0.5,
        v[2],
    );
    let b = Vector3::new(v[6], v[7], v[8]);

    let a_inv = a
        .try_inverse()
        .ok_or(DegenerateReason::SingularQuadratic)?;
    let a_inv_b = a_inv * b;
    let center = a_inv_b * -0.5;
    let k = 1.0 + 0.25 * b.dot(&a_inv_b);
    if !k.is_finite() || k.abs() < 1e-15 {
        return Err(DegenerateReason::NotPositiveDefinite);
    }

    Ok((center, a / k))
}

/// Centroid and isotropic scale that maps the mean distance from the
/// centroid to √3.
pub(crate) fn normalization_params(points: &[[f64; 3]]) -> (Vector3<f64>, f64) {
    let n = points.len() as f64;
    let mut mean = Vector3::zeros();
    for p in points {
        mean += Vector3::new(p[0], p[1], p[2]);
    }
    mean /= n;

    let mean_dist = points
        .iter()
        .map(|p| (Vector3::new(p[0], p[1], p[2]) - mean).norm())
        .sum::<f64>()
        / n;

    let scale = if mean_dist > 1e-15 {
        3f64.sqrt() / mean_dist
    } else {
        1.0
    };
    (mean, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{rotated_test_ellipsoid, sorted_radii};
    use approx::assert_relative_eq;
    use rand::prelude::*;

    #[test]
    fn fit_exact_points_recovers_ellipsoid() {
        let e = rotated_test_ellipsoid();
        let pts = e.sample_surface(250);

        let fitted = fit_ellipsoid(&pts).expect("fit should succeed");

        assert_relative_eq!(fitted.center(), e.center(), max_relative = 1e-6);
        let got = sorted_radii(&fitted);
        let want = sorted_radii(&e);
        for i in 0..3 {
            assert_relative_eq!(got[i], want[i], max_relative = 1e-6);
        }
        assert_relative_eq!(fitted.precision(), e.precision(), epsilon = 1e-9);
    }

    #[test]
    fn fit_sphere() {
        let e = Ellipsoid::axis_aligned(Vector3::new(10.0, -5.0, 2.0), Vector3::new(8.0, 8.0, 8.0))
            .unwrap();
        let fitted = fit_ellipsoid(&e.sample_surface(100)).expect("sphere fit should succeed");
        assert_relative_eq!(fitted.center(), e.center(), epsilon = 1e-8);
        for r in fitted.radii().iter() {
            assert_relative_eq!(*r, 8.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn fit_minimal_nine_points() {
        let e = rotated_test_ellipsoid();
        let pts = e.sample_surface(9);
        let fitted = fit_ellipsoid(&pts).expect("9 generic points determine the quadric");
        assert_relative_eq!(fitted.center(), e.center(), epsilon = 1e-6);
    }

    #[test]
    fn fit_noisy_points() {
        let e = rotated_test_ellipsoid();
        let mut pts = e.sample_surface(500);
        let mut rng = StdRng::seed_from_u64(123);
        let noise = 0.2;
        for p in &mut pts {
            for c in p.iter_mut() {
                *c += (rng.gen::<f64>() - 0.5) * 2.0 * noise;
            }
        }

        let fitted = fit_ellipsoid(&pts).expect("fit should succeed with noise");
        assert_relative_eq!(fitted.center(), e.center(), epsilon = 0.5);
        let got = sorted_radii(&fitted);
        let want = sorted_radii(&e);
        for i in 0..3 {
            assert_relative_eq!(got[i], want[i], epsilon = 0.5);
        }
    }

    #[test]
    fn too_few_points() {
        let pts = vec![[1.0, 2.0, 3.0]; 8];
        assert_eq!(
            fit_ellipsoid(&pts),
            Err(FitError::InsufficientPoints { needed: 9, got: 8 })
        );
    }

    #[test]
    fn degenerate_configurations_rejected() {
        // Coplanar
        let plane: Vec<[f64; 3]> = (0..30)
            .map(|i| {
                let t = i as f64 * 0.37;
                [5.0 * t.cos(), 3.0 * t.sin(), 0.0]
            })
            .collect();
        assert_eq!(
            fit_ellipsoid(&plane),
            Err(FitError::Degenerate(DegenerateReason::RankDeficient))
        );

        // Collinear
        let line: Vec<[f64; 3]> = (0..12).map(|i| [i as f64, 2.0 * i as f64, 0.5]).collect();
        assert!(matches!(fit_ellipsoid(&line), Err(FitError::Degenerate(_))));

        // Duplicates
        let dup = vec![[1.0, 1.0, 1.0]; 20];
        assert!(matches!(fit_ellipsoid(&dup), Err(FitError::Degenerate(_))));
    }

    #[test]
    fn hyperboloid_is_not_an_ellipsoid() {
        // x² + y² - z²/4 = 1
        let mut pts = Vec::new();
        for i in 0..12 {
            for j in 0..5 {
                let theta = i as f64 * std::f64::consts::TAU / 12.0;
                let z = -2.0 + j as f64;
                let rho = (1.0 + z * z / 4.0).sqrt();
                pts.push([rho * theta.cos(), rho * theta.sin(), z]);
            }
        }
        assert_eq!(
            fit_ellipsoid(&pts),
            Err(FitError::Degenerate(DegenerateReason::NotPositiveDefinite))
        );
    }
}
