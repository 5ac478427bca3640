//! Axis-aligned sub-regions of a volume.

/// An axis-aligned box of voxels, `[start, start + shape)` along Z, Y and X.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// First voxel of the region (ZYX).
    pub start: [usize; 3],
    /// Extent of the region (ZYX).
    pub shape: [usize; 3],
}

impl Region {
    /// Create a region from its first voxel and extent.
    pub fn new(start: [usize; 3], shape: [usize; 3]) -> Self {
        Self { start, shape }
    }

    /// The region covering a whole volume of the given shape.
    pub fn full(shape: [usize; 3]) -> Self {
        Self::new([0, 0, 0], shape)
    }

    /// Strip `margin` voxels from both sides of every axis.
    ///
    /// Returns `None` when the margin would leave an empty region.
    pub fn from_margin(shape: [usize; 3], margin: [usize; 3]) -> Option<Self> {
        let mut start = [0; 3];
        let mut extent = [0; 3];
        for axis in 0..3 {
            if 2 * margin[axis] >= shape[axis] {
                return None;
            }
            start[axis] = margin[axis];
            extent[axis] = shape[axis] - 2 * margin[axis];
        }
        Some(Self::new(start, extent))
    }

    /// One past the last voxel along each axis.
    pub fn end(&self) -> [usize; 3] {
        [
            self.start[0] + self.shape[0],
            self.start[1] + self.shape[1],
            self.start[2] + self.shape[2],
        ]
    }

    /// Number of voxels in the region.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// True when the region holds no voxel.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Geometric centre of the region in the coordinates of the parent volume.
    pub fn centre(&self) -> [f64; 3] {
        let mut centre = [0.0; 3];
        for axis in 0..3 {
            centre[axis] =
                self.start[axis] as f64 + (self.shape[axis] as f64 - 1.0).max(0.0) / 2.0;
        }
        centre
    }

    /// True when the region lies inside a volume of the given shape.
    pub fn fits_in(&self, shape: [usize; 3]) -> bool {
        let end = self.end();
        (0..3).all(|axis| end[axis] <= shape[axis])
    }

    /// Shift the region by a non-negative offset.
    pub fn offset_by(&self, offset: [usize; 3]) -> Self {
        Self::new(
            [
                self.start[0] + offset[0],
                self.start[1] + offset[1],
                self.start[2] + offset[2],
            ],
            self.shape,
        )
    }
}
