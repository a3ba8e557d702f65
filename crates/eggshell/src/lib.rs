//! Ellipsoid surface extraction from volumetric (3D + time) images.
//!
//! The stages are:
//!
//! 1. **Detection** – an external blob detector is swept over a bounding box
//!    and its peaks are collected into a world-space [`PointCloud`].
//! 2. **Fitting** – a bounded-cost minimal-sample estimator around an
//!    algebraic quadric fit turns the cloud into an [`Ellipsoid`].
//! 3. **Distance** – exact closest point on the ellipsoid surface, used for
//!    scoring and inlier selection.
//! 4. **Projection** – cylindrical or spherical unwrapping of a
//!    [`VolumeSource`] over a band of offsets around the surface into a
//!    [`ProjectionStack`].
//!
//! With the default `rayon` feature, trial scoring and projection planes run
//! in parallel. Results do not depend on the feature.

mod cancel;
pub mod detection;
pub mod ellipsoid;
pub mod projection;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cancel::CancelToken;
pub use detection::{
    collect_detections, BlobDetector, BlobQuery, BoundingBox, DetectionError, DetectionSweep,
    PointCloud,
};
pub use ellipsoid::{
    distance_to_ellipsoid, estimate_ellipsoid, estimate_ellipsoid_with_cancel, fit_ellipsoid,
    CostKind, DegenerateReason, Ellipsoid, EstimateResult, EstimatorConfig, FitError,
    NoValidFitReason, SurfaceDistance, MIN_FIT_POINTS,
};
pub use projection::{
    project, project_with_cancel, CylinderFrame, InvalidRangeReason, ProjectionError,
    ProjectionMethod, ProjectionRequest, ProjectionStack,
};
pub use volume::{
    Affine, DenseVolume, DistanceBandVolume, Interpolation, VolumeError, VolumeSource,
    VoxelInterval,
};

use nalgebra::Vector3;

/// Ellipsoid parameters for serialization.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EllipsoidParams {
    /// World-space center.
    pub center: [f64; 3],
    /// Unit principal directions; `axes[i]` belongs to `radii[i]`.
    pub axes: [[f64; 3]; 3],
    /// Semi-axis lengths.
    pub radii: [f64; 3],
}

impl From<Ellipsoid> for EllipsoidParams {
    fn from(e: Ellipsoid) -> Self {
        let v = |v: &Vector3<f64>| [v.x, v.y, v.z];
        Self {
            center: v(e.center()),
            axes: [v(&e.axes()[0]), v(&e.axes()[1]), v(&e.axes()[2])],
            radii: v(e.radii()),
        }
    }
}

impl TryFrom<EllipsoidParams> for Ellipsoid {
    type Error = DegenerateReason;

    fn try_from(p: EllipsoidParams) -> Result<Self, Self::Error> {
        Ellipsoid::from_axes_radii(
            Vector3::from(p.center),
            p.axes.map(Vector3::from),
            Vector3::from(p.radii),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ellipsoid_params_json_roundtrip() {
        let e = test_utils::rotated_test_ellipsoid();
        let json = serde_json::to_string(&EllipsoidParams::from(e)).unwrap();
        let params: EllipsoidParams = serde_json::from_str(&json).unwrap();
        let back = Ellipsoid::try_from(params).unwrap();
        assert_relative_eq!(back.center(), e.center(), epsilon = 1e-12);
        assert_relative_eq!(back.precision(), e.precision(), epsilon = 1e-12);
    }

    #[test]
    fn invalid_params_rejected() {
        let params = EllipsoidParams {
            center: [0.0; 3],
            axes: [[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            radii: [1.0, 2.0, 3.0],
        };
        assert!(Ellipsoid::try_from(params).is_err());
    }

    #[test]
    fn default_configs_deserialize_from_empty_json() {
        let est: EstimatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(est, EstimatorConfig::default());
        let req: ProjectionRequest = serde_json::from_str(r#"{"method":"spherical"}"#).unwrap();
        assert_eq!(req.method, ProjectionMethod::Spherical);
        assert_eq!(req.width, 800);
        let sweep: DetectionSweep = serde_json::from_str(r#"{"sigmas":[2.5]}"#).unwrap();
        assert_eq!(sweep.steps_per_octave, 4);
        assert_eq!(sweep.sigmas, vec![2.5]);
    }
}
