//! Core ellipsoid type and fitting errors.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};

// ── Error types ────────────────────────────────────────────────────────────

/// Why a quadric system could not be turned into an ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DegenerateReason {
    /// The least-squares design matrix does not have full column rank
    /// (collinear, coplanar or repeated points).
    #[error("quadric system is rank deficient")]
    RankDeficient,
    /// The quadratic part is singular, so no center exists.
    #[error("quadratic part is singular")]
    SingularQuadratic,
    /// The recentered quadratic form has a non-positive eigenvalue.
    #[error("quadratic form is not positive definite")]
    NotPositiveDefinite,
    /// The solve produced NaN or infinite values.
    #[error("non-finite quadric coefficients")]
    NonFinite,
}

/// Why the robust estimator could not produce a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NoValidFitReason {
    /// Every random trial was degenerate.
    #[error("all {trials} trials were degenerate")]
    AllTrialsDegenerate {
        /// Number of attempted trials.
        trials: usize,
    },
    /// The best candidate had too few inliers to be refit.
    #[error("too few inliers for refit: need {needed}, found {found}")]
    TooFewInliers {
        /// Minimum number of inliers for a refit.
        needed: usize,
        /// Inliers of the best candidate.
        found: usize,
    },
    /// Refitting on the inliers of the best candidate was degenerate.
    #[error("inlier refit failed: {0}")]
    RefitDegenerate(DegenerateReason),
}

/// Errors that can occur during ellipsoid fitting and estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FitError {
    /// The quadric system is singular or does not describe an ellipsoid.
    #[error("degenerate ellipsoid fit: {0}")]
    Degenerate(DegenerateReason),
    /// Too few points for the requested operation.
    #[error("too few points: need {needed}, got {got}")]
    InsufficientPoints {
        /// Required minimum number of points.
        needed: usize,
        /// Provided number of points.
        got: usize,
    },
    /// The robust estimator did not produce a usable model.
    #[error("no valid ellipsoid fit: {0}")]
    NoValidFit(NoValidFitReason),
    /// Estimation was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("ellipsoid estimation cancelled")]
    Cancelled,
}

impl From<DegenerateReason> for FitError {
    fn from(reason: DegenerateReason) -> Self {
        Self::Degenerate(reason)
    }
}

// ── Ellipsoid ──────────────────────────────────────────────────────────────

/// A 3D ellipsoid `(x - c)ᵀ P (x - c) = 1`.
///
/// Both views are stored and kept consistent at construction:
/// `P = Σᵢ aᵢ aᵢᵀ / rᵢ²` for principal axes `aᵢ` and radii `rᵢ`.
/// The value is immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    center: Vector3<f64>,
    axes: [Vector3<f64>; 3],
    radii: Vector3<f64>,
    precision: Matrix3<f64>,
}

impl Ellipsoid {
    /// Build from a center, three principal directions and their radii.
    ///
    /// The directions are normalized. Fails if any radius is not a positive
    /// finite number or the directions are not (numerically) orthogonal.
    pub fn from_axes_radii(
        center: Vector3<f64>,
        axes: [Vector3<f64>; 3],
        radii: Vector3<f64>,
    ) -> Result<Self, DegenerateReason> {
        if !center.iter().all(|v| v.is_finite()) {
            return Err(DegenerateReason::NonFinite);
        }
        if !radii.iter().all(|&r| r.is_finite() && r > 0.0) {
            return Err(DegenerateReason::NotPositiveDefinite);
        }
        let mut unit = axes;
        for a in &mut unit {
            let n = a.norm();
            if !n.is_finite() || n < 1e-12 {
                return Err(DegenerateReason::NonFinite);
            }
            *a /= n;
        }
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            if unit[i].dot(&unit[j]).abs() > 1e-6 {
                return Err(DegenerateReason::RankDeficient);
            }
        }

        let mut precision = Matrix3::zeros();
        for (a, r) in unit.iter().zip(radii.iter()) {
            precision += a * a.transpose() / (r * r);
        }

        Ok(Self {
            center,
            axes: unit,
            radii,
            precision,
        })
    }

    /// Build from a center and a symmetric positive-definite precision matrix.
    ///
    /// Axes and radii come from the eigendecomposition of `precision`:
    /// `rᵢ = 1 / sqrt(λᵢ)`.
    pub fn from_precision(
        center: Vector3<f64>,
        precision: Matrix3<f64>,
    ) -> Result<Self, DegenerateReason> {
        if !center.iter().all(|v| v.is_finite()) || !precision.iter().all(|v| v.is_finite()) {
            return Err(DegenerateReason::NonFinite);
        }
        let sym = (precision + precision.transpose()) * 0.5;
        let eig = SymmetricEigen::new(sym);
        if eig.eigenvalues.iter().any(|&l| l <= 0.0 || !l.is_finite()) {
            return Err(DegenerateReason::NotPositiveDefinite);
        }

        let axes = [
            eig.eigenvectors.column(0).normalize(),
            eig.eigenvectors.column(1).normalize(),
            eig.eigenvectors.column(2).normalize(),
        ];
        let radii = eig.eigenvalues.map(|l| 1.0 / l.sqrt());

        Ok(Self {
            center,
            axes,
            radii,
            precision: sym,
        })
    }

    /// Axis-aligned ellipsoid, convenient for tests and synthetic data.
    pub fn axis_aligned(
        center: Vector3<f64>,
        radii: Vector3<f64>,
    ) -> Result<Self, DegenerateReason> {
        Self::from_axes_radii(
            center,
            [Vector3::x(), Vector3::y(), Vector3::z()],
            radii,
        )
    }

    /// World-space center.
    pub fn center(&self) -> &Vector3<f64> {
        &self.center
    }

    /// Unit principal directions; `axes()[i]` has radius `radii()[i]`.
    pub fn axes(&self) -> &[Vector3<f64>; 3] {
        &self.axes
    }

    /// Semi-axis lengths.
    pub fn radii(&self) -> &Vector3<f64> {
        &self.radii
    }

    /// The quadratic form recentered at the origin.
    pub fn precision(&self) -> &Matrix3<f64> {
        &self.precision
    }

    /// Index of the largest radius (last one on ties).
    pub fn largest_axis_index(&self) -> usize {
        let r = &self.radii;
        if r[0] > r[1] {
            if r[0] > r[2] {
                0
            } else {
                2
            }
        } else if r[1] > r[2] {
            1
        } else {
            2
        }
    }

    /// Index of the smallest radius (first one on ties).
    pub fn smallest_axis_index(&self) -> usize {
        let r = &self.radii;
        if r[0] <= r[1] {
            if r[0] <= r[2] {
                0
            } else {
                2
            }
        } else if r[1] <= r[2] {
            1
        } else {
            2
        }
    }

    /// Quadratic form `(x - c)ᵀ P (x - c)`; 1 on the surface.
    pub fn quadratic_form(&self, point: &Vector3<f64>) -> f64 {
        let d = point - self.center;
        d.dot(&(self.precision * d))
    }

    /// Whether `point` lies inside or on the surface.
    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        self.quadratic_form(point) <= 1.0
    }

    /// Express a world point in the principal frame (centered, `yᵢ = aᵢ·(x - c)`).
    pub fn to_principal(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let d = point - self.center;
        Vector3::new(
            self.axes[0].dot(&d),
            self.axes[1].dot(&d),
            self.axes[2].dot(&d),
        )
    }

    /// Map a principal-frame point back to world coordinates.
    pub fn from_principal(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.center + self.axes[0] * local[0] + self.axes[1] * local[1] + self.axes[2] * local[2]
    }

    /// Surface point hit by the ray from the center along `direction`.
    ///
    /// `direction` need not be normalized. Returns `None` for a zero direction.
    pub fn surface_point_in_direction(&self, direction: &Vector3<f64>) -> Option<Vector3<f64>> {
        let q = direction.dot(&(self.precision * direction));
        if q <= 0.0 || !q.is_finite() {
            return None;
        }
        Some(self.center + direction * (1.0 / q).sqrt())
    }

    /// Outward unit normal at a world-space surface point.
    pub fn outward_normal(&self, surface_point: &Vector3<f64>) -> Vector3<f64> {
        (self.precision * (surface_point - self.center)).normalize()
    }

    /// Check basic validity: positive finite radii, finite center.
    pub fn is_valid(&self) -> bool {
        self.center.iter().all(|v| v.is_finite())
            && self.radii.iter().all(|&r| r.is_finite() && r > 0.0)
    }

    /// Roughly uniform points on the surface (Fibonacci lattice on the
    /// unit sphere, stretched by the radii and rotated into world space).
    pub fn sample_surface(&self, n: usize) -> Vec<[f64; 3]> {
        let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
        (0..n)
            .map(|i| {
                let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
                let rho = (1.0 - z * z).max(0.0).sqrt();
                let phi = golden * i as f64;
                let local = Vector3::new(
                    self.radii[0] * rho * phi.cos(),
                    self.radii[1] * rho * phi.sin(),
                    self.radii[2] * z,
                );
                let p = self.from_principal(&local);
                [p[0], p[1], p[2]]
            })
            .collect()
    }
}

impl std::fmt::Display for Ellipsoid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.center;
        let r = &self.radii;
        write!(
            f,
            "center=({:.3}, {:.3}, {:.3}) radii=({:.3}, {:.3}, {:.3})",
            c[0], c[1], c[2], r[0], r[1], r[2]
        )?;
        for (i, a) in self.axes.iter().enumerate() {
            write!(f, " axis{}=({:.4}, {:.4}, {:.4})", i, a[0], a[1], a[2])?;
        }
        Ok(())
    }
}
