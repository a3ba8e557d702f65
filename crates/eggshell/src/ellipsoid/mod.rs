//! Ellipsoid model, fitting and distance primitives.
//!
//! Implements:
//! - Unrestricted algebraic quadric fit recentered into `(x - c)ᵀ P (x - c) = 1`.
//! - Exact closest-point / distance query in the principal frame.
//! - Bounded-cost minimal-sample estimator for outlier-robust fitting.

mod cost;
mod distance;
mod fit;
mod sample;
mod types;

pub use cost::{AbsoluteDistanceCost, BoundedCost, Cost, CostKind, SquaredDistanceCost};
pub use distance::{distance_to_ellipsoid, SurfaceDistance};
pub use fit::{fit_ellipsoid, MIN_FIT_POINTS};
pub use sample::{
    estimate_ellipsoid, estimate_ellipsoid_with_cancel, EstimateResult, EstimatorConfig,
};
pub use types::{DegenerateReason, Ellipsoid, FitError, NoValidFitReason};
