//! Dense single-precision volumes.
//!
//! A [`Volume`] is a row-major ZYX array of `f32`. Two-dimensional images are
//! represented as volumes with a Z extent of one, so every algorithm runs the
//! same 3D code path on them. NaN voxels mean "do not correlate".

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rayon::prelude::*;

use super::region::Region;
use crate::error::{CoreError, Result};

/// Dense 3D array of `f32` with semantic axes (Z, Y, X).
///
/// # Examples
/// ```rust
/// use voxcorr_core::Volume;
///
/// let volume = Volume::from_fn([4, 5, 6], |z, y, x| (z + y + x) as f32);
/// assert_eq!(volume.shape(), [4, 5, 6]);
/// assert_eq!(volume.get(1, 2, 3), 6.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl Volume {
    /// Wrap a row-major ZYX buffer.
    ///
    /// Fails when an extent is zero or the buffer length does not match.
    pub fn new(shape: [usize; 3], data: Vec<f32>) -> Result<Self> {
        if shape.iter().any(|&n| n == 0) {
            return Err(CoreError::invalid_shape(format!(
                "volume extents must be non-zero, got {:?}",
                shape
            )));
        }
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(CoreError::ShapeMismatch {
                expected: vec![expected],
                actual: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    /// Wrap a row-major YX buffer as a single-slice volume.
    pub fn from_plane(ny: usize, nx: usize, data: Vec<f32>) -> Result<Self> {
        Self::new([1, ny, nx], data)
    }

    /// A volume filled with zeros.
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self::filled(shape, 0.0)
    }

    /// A volume filled with a constant.
    pub fn filled(shape: [usize; 3], value: f32) -> Self {
        Self {
            shape,
            data: vec![value; shape.iter().product()],
        }
    }

    /// Build a volume by evaluating `f(z, y, x)` at every voxel.
    pub fn from_fn<F>(shape: [usize; 3], f: F) -> Self
    where
        F: Fn(usize, usize, usize) -> f32 + Sync,
    {
        let [_, ny, nx] = shape;
        let mut data = vec![0.0f32; shape.iter().product()];
        if nx > 0 {
            data.par_chunks_mut(nx).enumerate().for_each(|(row, line)| {
                let z = row / ny.max(1);
                let y = row % ny.max(1);
                for (x, value) in line.iter_mut().enumerate() {
                    *value = f(z, y, x);
                }
            });
        }
        Self { shape, data }
    }

    /// Volume extents (Z, Y, X).
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the volume holds no voxel.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True for single-slice (2D) volumes.
    pub fn is_planar(&self) -> bool {
        self.shape[0] == 1
    }

    /// Raw row-major buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable raw row-major buffer.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Linear offset of voxel (z, y, x).
    #[inline]
    pub fn offset(&self, z: usize, y: usize, x: usize) -> usize {
        (z * self.shape[1] + y) * self.shape[2] + x
    }

    /// Value at voxel (z, y, x).
    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> f32 {
        self.data[self.offset(z, y, x)]
    }

    /// Overwrite voxel (z, y, x).
    #[inline]
    pub fn set(&mut self, z: usize, y: usize, x: usize, value: f32) {
        let offset = self.offset(z, y, x);
        self.data[offset] = value;
    }

    /// Geometric centre `(n - 1) / 2` along each axis.
    pub fn centre(&self) -> [f64; 3] {
        Region::full(self.shape).centre()
    }

    /// Copy out a sub-region.
    pub fn crop(&self, region: &Region) -> Result<Volume> {
        if !region.fits_in(self.shape) {
            return Err(CoreError::ShapeMismatch {
                expected: self.shape.to_vec(),
                actual: region.end().to_vec(),
            });
        }
        let [_, ry, rx] = region.shape;
        let mut data = Vec::with_capacity(region.len());
        for z in 0..region.shape[0] {
            for y in 0..ry {
                let begin = self.offset(region.start[0] + z, region.start[1] + y, region.start[2]);
                data.extend_from_slice(&self.data[begin..begin + rx]);
            }
        }
        Ok(Self {
            shape: region.shape,
            data,
        })
    }

    /// Sum of all finite voxels.
    pub fn finite_sum(&self) -> f64 {
        self.data
            .par_iter()
            .filter(|v| v.is_finite())
            .map(|&v| v as f64)
            .sum()
    }

    /// Number of finite voxels.
    pub fn finite_count(&self) -> usize {
        self.data.par_iter().filter(|v| v.is_finite()).count()
    }

    /// Upload the volume as a `[Z, Y, X]` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        Tensor::<B, 3>::from_data(
            TensorData::new(self.data.clone(), self.shape),
            device,
        )
    }

    /// Download a `[Z, Y, X]` tensor into a volume.
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 3>) -> Result<Self> {
        let shape: [usize; 3] = tensor.dims();
        let data = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::backend(format!("{:?}", e)))?;
        Self::new(shape, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_new_rejects_bad_length() {
        let err = Volume::new([2, 2, 2], vec![0.0; 7]).unwrap_err();
        assert!(matches!(err, CoreError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_new_rejects_zero_extent() {
        assert!(Volume::new([0, 2, 2], vec![]).is_err());
    }

    #[test]
    fn test_from_fn_layout() {
        let volume = Volume::from_fn([2, 3, 4], |z, y, x| (100 * z + 10 * y + x) as f32);
        assert_eq!(volume.get(1, 2, 3), 123.0);
        assert_eq!(volume.data()[volume.offset(1, 0, 2)], 102.0);
    }

    #[test]
    fn test_crop() {
        let volume = Volume::from_fn([4, 4, 4], |z, y, x| (100 * z + 10 * y + x) as f32);
        let crop = volume.crop(&Region::new([1, 1, 2], [2, 2, 2])).unwrap();
        assert_eq!(crop.shape(), [2, 2, 2]);
        assert_eq!(crop.get(0, 0, 0), 112.0);
        assert_eq!(crop.get(1, 1, 1), 223.0);
        assert!(volume.crop(&Region::new([3, 0, 0], [2, 1, 1])).is_err());
    }

    #[test]
    fn test_finite_sum_skips_nan() {
        let volume = Volume::new([1, 1, 3], vec![1.0, f32::NAN, 2.5]).unwrap();
        assert_eq!(volume.finite_sum(), 3.5);
        assert_eq!(volume.finite_count(), 2);
    }

    #[test]
    fn test_planar_centre() {
        let volume = Volume::zeros([1, 5, 8]);
        assert!(volume.is_planar());
        assert_eq!(volume.centre(), [0.0, 2.0, 3.5]);
    }

    #[test]
    fn test_tensor_roundtrip() {
        let device = Default::default();
        let volume = Volume::from_fn([2, 3, 4], |z, y, x| (z * 12 + y * 4 + x) as f32);
        let tensor = volume.to_tensor::<TestBackend>(&device);
        assert_eq!(tensor.dims(), [2, 3, 4]);
        let back = Volume::from_tensor(tensor).unwrap();
        assert_eq!(back, volume);
    }
}
