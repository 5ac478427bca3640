//! Boolean correlation masks.

use rayon::prelude::*;

use super::region::Region;
use super::volume::Volume;
use crate::error::{CoreError, Result};

/// Same-shaped boolean companion of a [`Volume`]; `true` means "correlate this voxel".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    shape: [usize; 3],
    data: Vec<bool>,
}

impl Mask {
    /// Wrap a row-major ZYX buffer of flags.
    pub fn new(shape: [usize; 3], data: Vec<bool>) -> Result<Self> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected || expected == 0 {
            return Err(CoreError::ShapeMismatch {
                expected: vec![expected],
                actual: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    /// A mask selecting every voxel.
    pub fn all(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![true; shape.iter().product()],
        }
    }

    /// Build a mask by evaluating `f(z, y, x)` at every voxel.
    pub fn from_fn<F>(shape: [usize; 3], f: F) -> Self
    where
        F: Fn(usize, usize, usize) -> bool + Sync,
    {
        let [_, ny, nx] = shape;
        let data = (0..shape.iter().product::<usize>())
            .into_par_iter()
            .map(|i| {
                let x = i % nx;
                let y = (i / nx) % ny;
                let z = i / (nx * ny);
                f(z, y, x)
            })
            .collect();
        Self { shape, data }
    }

    /// Mask extents (Z, Y, X).
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Raw row-major flags.
    pub fn data(&self) -> &[bool] {
        &self.data
    }

    /// Flag at voxel (z, y, x).
    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> bool {
        self.data[(z * self.shape[1] + y) * self.shape[2] + x]
    }

    /// Number of selected voxels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    /// Copy out a sub-region.
    pub fn crop(&self, region: &Region) -> Result<Mask> {
        if !region.fits_in(self.shape) {
            return Err(CoreError::ShapeMismatch {
                expected: self.shape.to_vec(),
                actual: region.end().to_vec(),
            });
        }
        let mut data = Vec::with_capacity(region.len());
        for z in region.start[0]..region.end()[0] {
            for y in region.start[1]..region.end()[1] {
                let begin = (z * self.shape[1] + y) * self.shape[2] + region.start[2];
                data.extend_from_slice(&self.data[begin..begin + region.shape[2]]);
            }
        }
        Ok(Self {
            shape: region.shape,
            data,
        })
    }

    /// Set every unselected voxel of `volume` to NaN.
    pub fn apply_nan(&self, volume: &mut Volume) -> Result<()> {
        if volume.shape() != self.shape {
            return Err(CoreError::ShapeMismatch {
                expected: self.shape.to_vec(),
                actual: volume.shape().to_vec(),
            });
        }
        volume
            .data_mut()
            .par_iter_mut()
            .zip(self.data.par_iter())
            .for_each(|(v, &keep)| {
                if !keep {
                    *v = f32::NAN;
                }
            });
        Ok(())
    }
}
