//! Exact point-to-ellipsoid distance.
//!
//! In the principal frame the closest point is `pᵢ = rᵢ² yᵢ / (t + rᵢ²)` where
//! `t` is the root of the strictly decreasing
//! `F(t) = Σᵢ (rᵢ yᵢ / (t + rᵢ²))² − 1` on `t > −min rᵢ²`.
//! The search runs in `s = t + r_m²`, `m` the shortest non-zero axis, so that
//! `p_m = r_m² y_m / s` keeps full relative precision when `y_m` is tiny.
//! The root is bracketed analytically and found with safeguarded Newton
//! iterations. Axis-degenerate inputs (some `yᵢ = 0`) are resolved first.

use nalgebra::Vector3;

use super::types::Ellipsoid;

/// Iteration cap of the root search; only reached on floating-point edge cases.
const MAX_ROOT_ITERS: usize = 128;

/// Normalized coordinates below this are treated as lying on a principal plane.
const AXIS_EPS: f64 = 1e-14;

/// Closest surface point and distance of a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDistance {
    /// Closest point on the ellipsoid surface, world coordinates.
    pub closest_point: Vector3<f64>,
    /// Euclidean distance to `closest_point` (non-negative).
    pub distance: f64,
    /// Whether the query point is inside the ellipsoid.
    pub inside: bool,
}

impl SurfaceDistance {
    /// Distance with sign: negative inside, positive outside.
    pub fn signed_distance(&self) -> f64 {
        if self.inside {
            -self.distance
        } else {
            self.distance
        }
    }
}

/// Distance from `point` to the surface of `ellipsoid`.
///
/// At the exact center the closest point is ambiguous; the point on the
/// positive direction of the shortest axis is returned (distance = smallest
/// radius).
pub fn distance_to_ellipsoid(point: &Vector3<f64>, ellipsoid: &Ellipsoid) -> SurfaceDistance {
    let y = ellipsoid.to_principal(point);
    let r = ellipsoid.radii();
    let scale = r.max();

    let rn = [r[0] / scale, r[1] / scale, r[2] / scale];
    let yn = [y[0].abs() / scale, y[1].abs() / scale, y[2].abs() / scale];
    let q = closest_in_first_octant(&rn, &yn);

    let local = Vector3::new(
        q[0] * side(y[0]) * scale,
        q[1] * side(y[1]) * scale,
        q[2] * side(y[2]) * scale,
    );
    let closest_point = ellipsoid.from_principal(&local);

    SurfaceDistance {
        closest_point,
        distance: (point - closest_point).norm(),
        inside: ellipsoid.contains(point),
    }
}

impl Ellipsoid {
    /// See [`distance_to_ellipsoid`].
    pub fn distance_to(&self, point: &Vector3<f64>) -> SurfaceDistance {
        distance_to_ellipsoid(point, self)
    }

    /// Signed surface distance: negative inside, positive outside.
    pub fn signed_distance(&self, point: &Vector3<f64>) -> f64 {
        distance_to_ellipsoid(point, self).signed_distance()
    }
}

/// Sign of a principal coordinate; zero (of either sign) maps to +1.
fn side(v: f64) -> f64 {
    if v < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Closest point for a query with non-negative principal coordinates `y`
/// and radii `r` (max radius normalized to 1).
fn closest_in_first_octant(r: &[f64; 3], y: &[f64; 3]) -> [f64; 3] {
    let mut idx = [0usize; 3];
    let mut count = 0;
    for i in 0..3 {
        if y[i] > AXIS_EPS {
            idx[count] = i;
            count += 1;
        }
    }
    let nonzero = &idx[..count];

    if nonzero.is_empty() {
        let m = min_radius_index(r, [0, 1, 2].iter().copied());
        let mut p = [0.0; 3];
        p[m] = r[m];
        return p;
    }

    let m_nz = min_radius_index(r, nonzero.iter().copied());
    let r_min_nz = r[m_nz];

    // A zero coordinate on an axis shorter than every non-zero one can pull
    // the closest point off the principal plane (interior points only).
    let zero_axes = (0..3).filter(|&i| y[i] <= AXIS_EPS);
    let shortest_zero = zero_axes.min_by(|&a, &b| r[a].total_cmp(&r[b]));
    if let Some(m) = shortest_zero {
        if r[m] < r_min_nz {
            let d = shifted_squares(r, m);
            if secular(r, y, nonzero, &d, 0.0) <= 0.0 {
                let mut p = [0.0; 3];
                let mut sum = 0.0;
                for &i in nonzero {
                    p[i] = r[i] * r[i] * y[i] / d[i];
                    sum += (p[i] / r[i]).powi(2);
                }
                p[m] = r[m] * (1.0 - sum).max(0.0).sqrt();
                return p;
            }
        }
    }

    let d = shifted_squares(r, m_nz);
    let s = find_root(r, y, nonzero, &d, m_nz);
    let mut p = [0.0; 3];
    for &i in nonzero {
        p[i] = r[i] * r[i] * y[i] / (s + d[i]);
    }
    p
}

fn min_radius_index(r: &[f64; 3], indices: impl Iterator<Item = usize>) -> usize {
    indices
        .min_by(|&a, &b| r[a].total_cmp(&r[b]))
        .unwrap_or(0)
}

/// `rᵢ² − r_m²`, so that `t + rᵢ² = s + dᵢ` with `d_m = 0` exactly.
fn shifted_squares(r: &[f64; 3], m: usize) -> [f64; 3] {
    let r2 = r[m] * r[m];
    [r[0] * r[0] - r2, r[1] * r[1] - r2, r[2] * r[2] - r2]
}

/// `F` in the shifted variable, restricted to the non-zero coordinates.
fn secular(r: &[f64; 3], y: &[f64; 3], nonzero: &[usize], d: &[f64; 3], s: f64) -> f64 {
    nonzero
        .iter()
        .map(|&i| (r[i] * y[i] / (s + d[i])).powi(2))
        .sum::<f64>()
        - 1.0
}

/// `F(s)` and `F'(s)`.
fn secular_with_derivative(
    r: &[f64; 3],
    y: &[f64; 3],
    nonzero: &[usize],
    d: &[f64; 3],
    s: f64,
) -> (f64, f64) {
    let mut f = -1.0;
    let mut df = 0.0;
    for &i in nonzero {
        let denom = s + d[i];
        let ratio = r[i] * y[i] / denom;
        f += ratio * ratio;
        df -= 2.0 * ratio * ratio / denom;
    }
    (f, df)
}

/// Root `s = t + r_m²` of `F` on `(0, ∞)`.
///
/// `F(r_m y_m) ≥ 0` and `F(|r ∘ y|) ≤ 0` bracket the root.
/// Newton steps start from the left end, where convexity makes them
/// monotone; any step leaving the bracket is replaced by bisection.
fn find_root(r: &[f64; 3], y: &[f64; 3], nonzero: &[usize], d: &[f64; 3], m: usize) -> f64 {
    let norm_ry = nonzero
        .iter()
        .map(|&i| (r[i] * y[i]).powi(2))
        .sum::<f64>()
        .sqrt();
    let mut lo = r[m] * y[m];
    let mut hi = norm_ry;
    if hi <= lo {
        return lo;
    }

    let mut s = lo;
    for _ in 0..MAX_ROOT_ITERS {
        let (f, df) = secular_with_derivative(r, y, nonzero, d, s);
        if f == 0.0 {
            return s;
        }
        if f > 0.0 {
            lo = s;
        } else {
            hi = s;
        }

        let newton = s - f / df;
        let next = if df < 0.0 && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
        let tol = f64::EPSILON * s;
        if (next - s).abs() <= tol || hi - lo <= tol {
            return next;
        }
        s = next;
    }

    tracing::trace!("ellipsoid root search hit the iteration cap");
    0.5 * (lo + hi)
}
