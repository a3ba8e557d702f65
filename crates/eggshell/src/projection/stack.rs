/// 4D projection output `[x][y][slice][timepoint]`, x fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionStack {
    width: usize,
    height: usize,
    depth: usize,
    timepoints: usize,
    data: Vec<f32>,
}

impl ProjectionStack {
    pub fn zeros(width: usize, height: usize, depth: usize, timepoints: usize) -> Self {
        Self {
            width,
            height,
            depth,
            timepoints,
            data: vec![0.0; width * height * depth * timepoints],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of depth slices.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn timepoints(&self) -> usize {
        self.timepoints
    }

    /// `[width, height, depth, timepoints]`.
    pub fn shape(&self) -> [usize; 4] {
        [self.width, self.height, self.depth, self.timepoints]
    }

    pub fn plane_len(&self) -> usize {
        self.width * self.height
    }

    /// Planes in `(timepoint, slice)` order, slice fastest.
    pub fn num_planes(&self) -> usize {
        self.depth * self.timepoints
    }

    /// # Panics
    /// If any index is out of range.
    pub fn get(&self, x: usize, y: usize, slice: usize, timepoint: usize) -> f32 {
        assert!(
            x < self.width && y < self.height && slice < self.depth && timepoint < self.timepoints
        );
        self.data[x + self.width * (y + self.height * (slice + self.depth * timepoint))]
    }

    /// Row-major `width × height` plane.
    pub fn plane(&self, slice: usize, timepoint: usize) -> &[f32] {
        let start = (slice + self.depth * timepoint) * self.plane_len();
        &self.data[start..start + self.plane_len()]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Minimum and maximum over all samples; `None` for an empty stack.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut it = self.data.iter().copied();
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}
