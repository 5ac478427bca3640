//! Per-voxel element labels for mesh-based correlation.

use crate::error::{CoreError, Result};

/// Voxel-to-element assignment: `0` means outside the mesh, `k` means element `k - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVolume {
    shape: [usize; 3],
    data: Vec<u32>,
}

impl LabelVolume {
    /// Wrap a row-major ZYX buffer of labels.
    pub fn new(shape: [usize; 3], data: Vec<u32>) -> Result<Self> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected || expected == 0 {
            return Err(CoreError::ShapeMismatch {
                expected: vec![expected],
                actual: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    /// A label volume with every voxel outside the mesh.
    pub fn empty(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![0; shape.iter().product()],
        }
    }

    /// Label extents (Z, Y, X).
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Raw row-major labels.
    pub fn data(&self) -> &[u32] {
        &self.data
    }

    /// Mutable raw row-major labels.
    pub fn data_mut(&mut self) -> &mut [u32] {
        &mut self.data
    }

    /// Element index containing voxel (z, y, x), if any.
    #[inline]
    pub fn element(&self, z: usize, y: usize, x: usize) -> Option<usize> {
        match self.data[(z * self.shape[1] + y) * self.shape[2] + x] {
            0 => None,
            k => Some(k as usize - 1),
        }
    }

    /// Highest element index referenced by the labels.
    pub fn max_element(&self) -> Option<usize> {
        self.data
            .iter()
            .copied()
            .max()
            .filter(|&k| k > 0)
            .map(|k| k as usize - 1)
    }
}
