//! burn tensor sampler.
//!
//! The output grid is processed in chunks: positions are obtained with one
//! matmul of the homogeneous grid against the transposed mapping, then every
//! separable tap is a `gather` into the flattened volume.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use super::trait_::{InterpolationOrder, Sampler, SamplingGrid, BOUNDS_TOLERANCE};
use crate::error::{CoreError, Result};
use crate::volume::Volume;

/// Output voxels processed per tensor round trip.
pub const CHUNK_VOXELS: usize = 32_768;

/// Tensor sampler on an arbitrary burn backend.
#[derive(Debug, Clone)]
pub struct TensorSampler<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Default for TensorSampler<B> {
    fn default() -> Self {
        Self {
            device: Default::default(),
        }
    }
}

impl<B: Backend> TensorSampler<B> {
    /// Create a sampler running on `device`.
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Taps along one axis: clamped indices and weights.
    fn axis_taps(
        coord: Tensor<B, 1>,
        n: usize,
        order: InterpolationOrder,
    ) -> Vec<(Tensor<B, 1, Int>, Tensor<B, 1>)> {
        let max = (n - 1) as f64;
        match order {
            InterpolationOrder::Nearest => {
                let index = (coord.clone() + 0.5).floor().clamp(0.0, max).int();
                vec![(index, coord.ones_like())]
            }
            InterpolationOrder::Linear => {
                let base = coord.clone().floor();
                let t = coord - base.clone();
                let i0 = base.clone().clamp(0.0, max).int();
                let i1 = (base + 1.0).clamp(0.0, max).int();
                vec![(i0, t.ones_like() - t.clone()), (i1, t)]
            }
            InterpolationOrder::Cubic => {
                let base = coord.clone().floor();
                let t = coord - base.clone();
                let t2 = t.clone() * t.clone();
                let t3 = t2.clone() * t.clone();
                let w0 = (t2.clone() * 2.0 - t3.clone() - t.clone()) * 0.5;
                let w1 = (t3.clone() * 3.0 - t2.clone() * 5.0 + 2.0) * 0.5;
                let w2 = (t2.clone() * 4.0 - t3.clone() * 3.0 + t) * 0.5;
                let w3 = (t3 - t2) * 0.5;
                [(-1.0, w0), (0.0, w1), (1.0, w2), (2.0, w3)]
                    .into_iter()
                    .map(|(shift, w)| ((base.clone() + shift).clamp(0.0, max).int(), w))
                    .collect()
            }
        }
    }

    /// Boolean-as-float in-bounds indicator for one axis.
    fn in_bounds(coord: Tensor<B, 1>, n: usize) -> Tensor<B, 1> {
        let upper = (n as f64 - 1.0) + BOUNDS_TOLERANCE;
        let lo = coord.clone().greater_equal_elem(-BOUNDS_TOLERANCE).float();
        let hi = coord.lower_equal_elem(upper).float();
        lo * hi
    }

    fn sample_chunk(
        &self,
        flat: &Tensor<B, 1>,
        shape: [usize; 3],
        grid: &SamplingGrid,
        first: usize,
        count: usize,
        order: InterpolationOrder,
    ) -> Result<Vec<f32>> {
        let [_, ry, rx] = grid.region.shape;
        let mut homogeneous = Vec::with_capacity(count * 4);
        for linear in first..first + count {
            let x = linear % rx;
            let y = (linear / rx) % ry;
            let z = linear / (rx * ry);
            homogeneous.push(((grid.region.start[0] + z) as f64 - grid.centre[0]) as f32);
            homogeneous.push(((grid.region.start[1] + y) as f64 - grid.centre[1]) as f32);
            homogeneous.push(((grid.region.start[2] + x) as f64 - grid.centre[2]) as f32);
            homogeneous.push(1.0);
        }
        let points = Tensor::<B, 2>::from_data(
            TensorData::new(homogeneous, [count, 4]),
            &self.device,
        );
        // Column-major iteration of the mapping is the row-major transpose.
        let mapping: Vec<f32> = grid.mapping.iter().map(|&v| v as f32).collect();
        let mapping_t = Tensor::<B, 2>::from_data(
            TensorData::new(mapping, [4, 4]),
            &self.device,
        );
        let positions = points.matmul(mapping_t);

        let coords: Vec<Tensor<B, 1>> = (0..3)
            .map(|axis| {
                positions.clone().narrow(1, axis, 1).squeeze::<1>(1) + grid.centre[axis] as f32
            })
            .collect();

        let inside = Self::in_bounds(coords[0].clone(), shape[0])
            * Self::in_bounds(coords[1].clone(), shape[1])
            * Self::in_bounds(coords[2].clone(), shape[2]);

        let stride_z = (shape[1] * shape[2]) as i32;
        let stride_y = shape[2] as i32;
        let taps_z = Self::axis_taps(coords[0].clone(), shape[0], order);
        let taps_y = Self::axis_taps(coords[1].clone(), shape[1], order);
        let taps_x = Self::axis_taps(coords[2].clone(), shape[2], order);

        let mut value = Tensor::<B, 1>::zeros([count], &self.device);
        for (iz, wz) in &taps_z {
            for (iy, wy) in &taps_y {
                let base = iz.clone() * stride_z + iy.clone() * stride_y;
                let wzy = wz.clone() * wy.clone();
                for (ix, wx) in &taps_x {
                    let idx = base.clone() + ix.clone();
                    let weight = wzy.clone() * wx.clone();
                    let unused = weight.clone().equal_elem(0.0);
                    let gathered = flat.clone().gather(0, idx).mask_fill(unused, 0.0);
                    value = value + gathered * weight;
                }
            }
        }

        let outside = inside.lower_elem(0.5);
        value
            .mask_fill(outside, f32::NAN)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| CoreError::backend(format!("{:?}", e)))
    }
}

impl<B: Backend> Sampler for TensorSampler<B> {
    fn sample(
        &self,
        volume: &Volume,
        grid: &SamplingGrid,
        order: InterpolationOrder,
    ) -> Result<Volume> {
        let shape = volume.shape();
        let flat = Tensor::<B, 1>::from_data(
            TensorData::new(volume.data().to_vec(), [volume.len()]),
            &self.device,
        );
        let total = grid.region.len();
        let mut data = Vec::with_capacity(total);
        let mut first = 0;
        while first < total {
            let count = CHUNK_VOXELS.min(total - first);
            data.extend(self.sample_chunk(&flat, shape, grid, first, count, order)?);
            first += count;
        }
        Volume::new(grid.region.shape, data)
    }
}
