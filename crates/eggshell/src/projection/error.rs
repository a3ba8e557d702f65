/// Reason a [`ProjectionRequest`](super::ProjectionRequest) was rejected.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum InvalidRangeReason {
    #[error("output size {width}x{height} is empty")]
    EmptyImage { width: usize, height: usize },
    #[error("max distance {max} is below min distance {min}")]
    DistanceRange { min: f64, max: f64 },
    #[error("slice step {0} must be positive and finite")]
    SliceStep(f64),
    #[error("max timepoint {max} is below min timepoint {min}")]
    TimepointRange { min: usize, max: usize },
    #[error("timepoint {max} not available, source has {available}")]
    TimepointOutOfRange { max: usize, available: usize },
    #[error("output {width}x{height}, {slices} slices, {timepoints} timepoints is too large")]
    TooLarge {
        width: usize,
        height: usize,
        slices: f64,
        timepoints: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    #[error("invalid projection request: {0}")]
    InvalidRange(InvalidRangeReason),
    #[error("source transform of timepoint {timepoint} is not invertible")]
    NonInvertibleTransform { timepoint: usize },
    #[error("projection cancelled")]
    Cancelled,
}

impl From<InvalidRangeReason> for ProjectionError {
    fn from(reason: InvalidRangeReason) -> Self {
        Self::InvalidRange(reason)
    }
}
