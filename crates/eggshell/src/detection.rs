//! Point-cloud acquisition through an external blob detector.
//!
//! A [`DetectionSweep`] runs the detector once per
//! `(timepoint, sigma, min_peak_value)` combination inside a world-space
//! [`BoundingBox`] and concatenates all peaks, mapped to world coordinates,
//! into one [`PointCloud`].

use nalgebra::Vector3;

use crate::volume::{apply, axis_scales, Affine, VolumeSource, VoxelInterval};

/// Ordered, immutable set of world-space detections.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PointCloud(Vec<[f64; 3]>);

impl PointCloud {
    pub fn points(&self) -> &[[f64; 3]] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<[f64; 3]> {
        self.0
    }
}

impl From<Vec<[f64; 3]>> for PointCloud {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self(points)
    }
}

impl AsRef<[[f64; 3]]> for PointCloud {
    fn as_ref(&self) -> &[[f64; 3]] {
        &self.0
    }
}

/// Box given as an integer interval in its own coordinates plus the
/// box-to-world affine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub interval: VoxelInterval,
    pub transform: Affine,
}

impl BoundingBox {
    pub fn world_corners(&self) -> [Vector3<f64>; 8] {
        self.interval.corners().map(|c| apply(&self.transform, &c))
    }

    /// Smallest voxel interval of a source (with source-to-world
    /// `source_transform`) covering the box, not clipped to the source.
    /// `None` if the transform is not invertible.
    pub fn source_interval(&self, source_transform: &Affine) -> Option<VoxelInterval> {
        let world_to_source = source_transform.try_inverse()?;
        let corners = self.world_corners().map(|c| apply(&world_to_source, &c));
        VoxelInterval::smallest_containing(&corners)
    }
}

/// Inputs of one detector invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobQuery {
    pub timepoint: usize,
    /// Source voxel region to search.
    pub interval: VoxelInterval,
    /// Relative voxel size `[1, sy / sx, sz / sx]`.
    pub pixel_size: [f64; 3],
    pub sigma1: f64,
    pub sigma2: f64,
    pub min_peak_value: f64,
}

/// Difference-of-Gaussians style peak finder.
pub trait BlobDetector {
    /// Sub-voxel peak positions in source voxel coordinates.
    fn detect(&self, source: &dyn VolumeSource, query: &BlobQuery) -> Vec<Vector3<f64>>;
}

/// Parameter grid of a detection run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DetectionSweep {
    pub sigmas: Vec<f64>,
    pub min_peak_values: Vec<f64>,
    pub timepoints: Vec<usize>,
    /// Scale ratio `sigma2 / sigma1 = 2^(1 / steps_per_octave)`.
    pub steps_per_octave: u32,
}

impl Default for DetectionSweep {
    fn default() -> Self {
        Self {
            sigmas: vec![3.0],
            min_peak_values: vec![250.0],
            timepoints: vec![0],
            steps_per_octave: 4,
        }
    }
}

impl DetectionSweep {
    /// DoG scale pair for `sigma`.
    pub fn scale_pair(&self, sigma: f64) -> (f64, f64) {
        let k = 2f64.powf(1.0 / self.steps_per_octave.max(1) as f64);
        (sigma, sigma * k)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DetectionError {
    #[error("timepoint {timepoint} not available, source has {available}")]
    TimepointOutOfRange { timepoint: usize, available: usize },
    #[error("source transform of timepoint {timepoint} is not invertible")]
    NonInvertibleTransform { timepoint: usize },
}

/// Run `detector` over every configuration of `sweep`.
///
/// Timepoints where the box misses the source contribute no points.
pub fn collect_detections(
    source: &dyn VolumeSource,
    bbox: &BoundingBox,
    sweep: &DetectionSweep,
    detector: &dyn BlobDetector,
) -> Result<PointCloud, DetectionError> {
    let mut points = Vec::new();
    for &timepoint in &sweep.timepoints {
        let available = source.num_timepoints();
        if timepoint >= available {
            return Err(DetectionError::TimepointOutOfRange {
                timepoint,
                available,
            });
        }

        let source_to_world = source.source_transform(timepoint, 0);
        let interval = bbox
            .source_interval(&source_to_world)
            .ok_or(DetectionError::NonInvertibleTransform { timepoint })?
            .intersect(&source.interval(timepoint, 0));
        if interval.is_empty() {
            tracing::warn!(timepoint, "bounding box does not overlap the source");
            continue;
        }

        let s = axis_scales(&source_to_world);
        let pixel_size = [1.0, s.y / s.x, s.z / s.x];

        for &sigma in &sweep.sigmas {
            let (sigma1, sigma2) = sweep.scale_pair(sigma);
            for &min_peak_value in &sweep.min_peak_values {
                let query = BlobQuery {
                    timepoint,
                    interval,
                    pixel_size,
                    sigma1,
                    sigma2,
                    min_peak_value,
                };
                let peaks = detector.detect(source, &query);
                tracing::info!(
                    timepoint,
                    sigma,
                    min_peak_value,
                    peaks = peaks.len(),
                    "blob detection"
                );
                points.extend(peaks.iter().map(|p| {
                    let w = apply(&source_to_world, p);
                    [w.x, w.y, w.z]
                }));
            }
        }
    }
    Ok(PointCloud(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ConstantVolume;
    use crate::volume::scale_translate;
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    /// Returns the interval's min corner and records every query.
    #[derive(Default)]
    struct RecordingDetector {
        queries: Mutex<Vec<BlobQuery>>,
    }

    impl BlobDetector for RecordingDetector {
        fn detect(&self, _source: &dyn VolumeSource, query: &BlobQuery) -> Vec<Vector3<f64>> {
            self.queries.lock().unwrap().push(*query);
            let m = query.interval.min;
            vec![Vector3::new(m[0] as f64, m[1] as f64, m[2] as f64)]
        }
    }

    fn anisotropic_source() -> ConstantVolume {
        ConstantVolume {
            value: 0.0,
            transform: scale_translate(Vector3::new(0.5, 0.5, 2.0), Vector3::new(10.0, 0.0, 0.0)),
            timepoints: 2,
        }
    }

    #[test]
    fn sweep_queries_every_combination() {
        let source = anisotropic_source();
        // World box [12, 14] x [1, 3] x [4, 8]
        let bbox = BoundingBox {
            interval: VoxelInterval::new([12, 1, 4], [14, 3, 8]),
            transform: Affine::identity(),
        };
        let sweep = DetectionSweep {
            sigmas: vec![2.0, 4.0],
            min_peak_values: vec![100.0, 200.0, 300.0],
            timepoints: vec![0, 1],
            steps_per_octave: 4,
        };
        let detector = RecordingDetector::default();

        let cloud = collect_detections(&source, &bbox, &sweep, &detector).unwrap();
        assert_eq!(cloud.len(), 12);

        let queries = detector.queries.lock().unwrap();
        assert_eq!(queries.len(), 12);
        let q = queries[0];
        // Source voxels: x in [4, 8], y in [2, 6], z in [2, 4]
        assert_eq!(q.interval, VoxelInterval::new([4, 2, 2], [8, 6, 4]));
        assert_eq!(q.pixel_size, [1.0, 1.0, 4.0]);
        assert_relative_eq!(q.sigma1, 2.0);
        assert_relative_eq!(q.sigma2, 2.0 * 2f64.powf(0.25));
        assert_eq!(queries[3].sigma1, 4.0);
        assert_eq!(queries[6].timepoint, 1);

        // Peak at the source min corner maps back to the world box corner.
        assert_relative_eq!(cloud.points()[0][0], 12.0);
        assert_relative_eq!(cloud.points()[0][1], 1.0);
        assert_relative_eq!(cloud.points()[0][2], 4.0);
    }

    #[test]
    fn box_is_clipped_to_source() {
        let source = anisotropic_source();
        let bbox = BoundingBox {
            interval: VoxelInterval::new([0, -10, -10], [20, 10, 10]),
            transform: Affine::identity(),
        };
        let detector = RecordingDetector::default();
        collect_detections(&source, &bbox, &DetectionSweep::default(), &detector).unwrap();
        let q = detector.queries.lock().unwrap()[0];
        assert_eq!(q.interval, VoxelInterval::new([0, 0, 0], [20, 20, 5]));
    }

    #[test]
    fn disjoint_box_yields_no_points() {
        let source = anisotropic_source();
        let bbox = BoundingBox {
            interval: VoxelInterval::new([500, 500, 500], [510, 510, 510]),
            transform: Affine::identity(),
        };
        let detector = RecordingDetector::default();
        let cloud = collect_detections(&source, &bbox, &DetectionSweep::default(), &detector)
            .unwrap();
        assert!(cloud.is_empty());
        assert!(detector.queries.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_timepoint_rejected() {
        let sweep = DetectionSweep {
            timepoints: vec![0, 7],
            ..DetectionSweep::default()
        };
        let bbox = BoundingBox {
            interval: VoxelInterval::new([0; 3], [1; 3]),
            transform: Affine::identity(),
        };
        let res = collect_detections(
            &anisotropic_source(),
            &bbox,
            &sweep,
            &RecordingDetector::default(),
        );
        assert_eq!(
            res,
            Err(DetectionError::TimepointOutOfRange {
                timepoint: 7,
                available: 2
            })
        );
    }
}
