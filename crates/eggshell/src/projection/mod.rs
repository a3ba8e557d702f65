//! Cylindrical and spherical unwrapping of a volume around an ellipsoid.
//!
//! Every output pixel defines a direction in the [`CylinderFrame`]. The ray
//! from the ellipsoid center along it hits the surface at `pe` with outward
//! normal `ne`; slice `k` samples the source at `pe + dₖ ne` with
//! `dₖ = min_distance + k · slice_step`.

mod error;
mod frame;
mod stack;

use std::f64::consts::{PI, TAU};
use std::time::Instant;

use nalgebra::Vector3;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

pub use error::{InvalidRangeReason, ProjectionError};
pub use frame::CylinderFrame;
pub use stack::ProjectionStack;

use crate::cancel::CancelToken;
use crate::ellipsoid::Ellipsoid;
use crate::volume::{apply, Affine, VolumeSource};

/// Surface parameterization of the output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMethod {
    /// Azimuth along x, height along the frame axis along y.
    #[default]
    Cylindrical,
    /// Azimuth along x, inclination from the frame axis along y.
    Spherical,
}

/// Parameters of one projection run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProjectionRequest {
    pub width: usize,
    pub height: usize,
    /// Signed offset of the first slice along the outward normal.
    pub min_distance: f64,
    pub max_distance: f64,
    pub slice_step: f64,
    /// First source timepoint (inclusive).
    pub min_timepoint: usize,
    /// Last source timepoint (inclusive).
    pub max_timepoint: usize,
    pub flip_z: bool,
    pub align_y: bool,
    pub method: ProjectionMethod,
}

impl Default for ProjectionRequest {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
            min_distance: 5.0,
            max_distance: 50.0,
            slice_step: 1.0,
            min_timepoint: 0,
            max_timepoint: 0,
            flip_z: false,
            align_y: false,
            method: ProjectionMethod::Cylindrical,
        }
    }
}

impl ProjectionRequest {
    /// Reject empty, reversed or unaddressable ranges.
    pub fn validate(&self) -> Result<(), InvalidRangeReason> {
        if self.width == 0 || self.height == 0 {
            return Err(InvalidRangeReason::EmptyImage {
                width: self.width,
                height: self.height,
            });
        }
        if !self.min_distance.is_finite()
            || !self.max_distance.is_finite()
            || self.max_distance < self.min_distance
        {
            return Err(InvalidRangeReason::DistanceRange {
                min: self.min_distance,
                max: self.max_distance,
            });
        }
        if !self.slice_step.is_finite() || self.slice_step <= 0.0 {
            return Err(InvalidRangeReason::SliceStep(self.slice_step));
        }
        if self.max_timepoint < self.min_timepoint {
            return Err(InvalidRangeReason::TimepointRange {
                min: self.min_timepoint,
                max: self.max_timepoint,
            });
        }
        if self.checked_len().is_none() {
            return Err(InvalidRangeReason::TooLarge {
                width: self.width,
                height: self.height,
                slices: ((self.max_distance - self.min_distance) / self.slice_step).ceil() + 1.0,
                timepoints: (self.max_timepoint - self.min_timepoint).saturating_add(1),
            });
        }
        Ok(())
    }

    /// Total sample count, `None` when it cannot be allocated as one `f32` buffer.
    fn checked_len(&self) -> Option<usize> {
        let slices = ((self.max_distance - self.min_distance) / self.slice_step).ceil();
        if slices >= usize::MAX as f64 {
            return None;
        }
        let depth = (slices as usize).checked_add(1)?;
        let timepoints = (self.max_timepoint - self.min_timepoint).checked_add(1)?;
        let len = self
            .width
            .checked_mul(self.height)?
            .checked_mul(depth)?
            .checked_mul(timepoints)?;
        (len <= isize::MAX as usize / std::mem::size_of::<f32>()).then_some(len)
    }

    /// `ceil((max - min) / step) + 1`. Assumes a validated request.
    pub fn depth_slices(&self) -> usize {
        ((self.max_distance - self.min_distance) / self.slice_step).ceil() as usize + 1
    }

    pub fn num_timepoints(&self) -> usize {
        self.max_timepoint - self.min_timepoint + 1
    }

    /// Offset along the normal of slice `index`.
    pub fn slice_distance(&self, index: usize) -> f64 {
        self.min_distance + index as f64 * self.slice_step
    }
}

/// Frame-local unit direction of output pixel `(x, y)`.
pub fn pixel_direction(
    method: ProjectionMethod,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) -> Vector3<f64> {
    let azimuth = TAU * x as f64 / width as f64;
    match method {
        ProjectionMethod::Cylindrical => {
            let ly = TAU.atan2(width as f64);
            let h = ly * ((height / 2) as f64 - y as f64);
            Vector3::new(azimuth.cos(), azimuth.sin(), h)
        }
        ProjectionMethod::Spherical => {
            let inclination = PI * y as f64 / height as f64;
            let s = inclination.sin();
            Vector3::new(s * azimuth.cos(), s * azimuth.sin(), inclination.cos())
        }
    }
}

/// Surface point and outward unit normal for one output pixel.
#[derive(Debug, Clone, Copy)]
struct SurfaceSample {
    point: Vector3<f64>,
    normal: Vector3<f64>,
}

fn surface_samples(
    ellipsoid: &Ellipsoid,
    frame: &CylinderFrame,
    request: &ProjectionRequest,
) -> Vec<Option<SurfaceSample>> {
    let (w, h) = (request.width, request.height);
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let local = pixel_direction(request.method, x, y, w, h);
            let dir = frame.to_world(&local).normalize();
            out.push(ellipsoid.surface_point_in_direction(&dir).map(|point| SurfaceSample {
                point,
                normal: ellipsoid.outward_normal(&point),
            }));
        }
    }
    out
}

/// Project `source` onto the surface band of `ellipsoid`.
pub fn project(
    ellipsoid: &Ellipsoid,
    request: &ProjectionRequest,
    source: &dyn VolumeSource,
) -> Result<ProjectionStack, ProjectionError> {
    project_with_cancel(ellipsoid, request, source, &CancelToken::new())
}

/// [`project`] that stops with [`ProjectionError::Cancelled`] once `cancel`
/// is triggered. Cancellation is checked before every output plane.
pub fn project_with_cancel(
    ellipsoid: &Ellipsoid,
    request: &ProjectionRequest,
    source: &dyn VolumeSource,
    cancel: &CancelToken,
) -> Result<ProjectionStack, ProjectionError> {
    request.validate()?;
    let available = source.num_timepoints();
    if request.max_timepoint >= available {
        return Err(InvalidRangeReason::TimepointOutOfRange {
            max: request.max_timepoint,
            available,
        }
        .into());
    }

    let frame = CylinderFrame::new(ellipsoid, request.flip_z, request.align_y);
    tracing::info!(?request, %ellipsoid, %frame, "projection");
    let start = Instant::now();

    let world_to_source: Vec<Affine> = (request.min_timepoint..=request.max_timepoint)
        .map(|t| {
            source
                .source_transform(t, 0)
                .try_inverse()
                .ok_or(ProjectionError::NonInvertibleTransform { timepoint: t })
        })
        .collect::<Result<_, _>>()?;

    let samples = surface_samples(ellipsoid, &frame, request);
    let depth = request.depth_slices();
    let mut stack = ProjectionStack::zeros(
        request.width,
        request.height,
        depth,
        request.num_timepoints(),
    );
    let plane_len = stack.plane_len();

    let fill = |(index, plane): (usize, &mut [f32])| -> Result<(), ProjectionError> {
        if cancel.is_cancelled() {
            return Err(ProjectionError::Cancelled);
        }
        let plane_start = Instant::now();
        let (ti, slice) = (index / depth, index % depth);
        let timepoint = request.min_timepoint + ti;
        let distance = request.slice_distance(slice);
        let inverse = &world_to_source[ti];
        for (out, sample) in plane.iter_mut().zip(&samples) {
            *out = match sample {
                Some(s) => {
                    let world = s.point + s.normal * distance;
                    source.sample(timepoint, 0, &apply(inverse, &world)) as f32
                }
                None => 0.0,
            };
        }
        tracing::debug!(
            timepoint,
            slice,
            distance,
            elapsed_ms = plane_start.elapsed().as_millis() as u64,
            "plane projected"
        );
        Ok(())
    };

    #[cfg(feature = "rayon")]
    let result = stack
        .data_mut()
        .par_chunks_mut(plane_len)
        .enumerate()
        .try_for_each(fill);
    #[cfg(not(feature = "rayon"))]
    let result = stack
        .data_mut()
        .chunks_mut(plane_len)
        .enumerate()
        .try_for_each(fill);

    if let Err(e) = result {
        tracing::info!("projection cancelled");
        return Err(e);
    }

    tracing::info!(
        planes = stack.num_planes(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "projection done"
    );
    Ok(stack)
}
