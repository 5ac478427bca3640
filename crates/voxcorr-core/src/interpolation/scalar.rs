//! rayon-parallel scalar sampler.

use rayon::prelude::*;

use super::kernel::{axis_taps, in_bounds};
use super::trait_::{InterpolationOrder, Sampler, SamplingGrid};
use crate::error::Result;
use crate::volume::Volume;

/// Scalar sampler, parallel over output rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarSampler;

impl ScalarSampler {
    /// Interpolate `volume` at a single position; NaN when out of bounds.
    pub fn sample_at(volume: &Volume, position: [f64; 3], order: InterpolationOrder) -> f32 {
        let [nz, ny, nx] = volume.shape();
        if !(in_bounds(position[0], nz) && in_bounds(position[1], ny) && in_bounds(position[2], nx))
        {
            return f32::NAN;
        }
        let tz = axis_taps(position[0], nz, order);
        let ty = axis_taps(position[1], ny, order);
        let tx = axis_taps(position[2], nx, order);
        let data = volume.data();

        // Zero-weight taps are skipped so a NaN neighbour cannot spoil an on-grid sample.
        let mut value = 0.0f64;
        for a in (0..tz.len).filter(|&a| tz.weight[a] != 0.0) {
            let plane = tz.index[a] * ny;
            let mut row_sum = 0.0f64;
            for b in (0..ty.len).filter(|&b| ty.weight[b] != 0.0) {
                let row = (plane + ty.index[b]) * nx;
                let mut sum = 0.0f64;
                for c in (0..tx.len).filter(|&c| tx.weight[c] != 0.0) {
                    sum += tx.weight[c] * data[row + tx.index[c]] as f64;
                }
                row_sum += ty.weight[b] * sum;
            }
            value += tz.weight[a] * row_sum;
        }
        value as f32
    }
}

impl Sampler for ScalarSampler {
    fn sample(
        &self,
        volume: &Volume,
        grid: &SamplingGrid,
        order: InterpolationOrder,
    ) -> Result<Volume> {
        let [_, ny, nx] = grid.region.shape;
        let mut data = vec![f32::NAN; grid.region.len()];
        data.par_chunks_mut(nx).enumerate().for_each(|(row, line)| {
            let z = row / ny;
            let y = row % ny;
            for (x, value) in line.iter_mut().enumerate() {
                *value = Self::sample_at(volume, grid.position(z, y, x), order);
            }
        });
        Volume::new(grid.region.shape, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_midpoint() {
        let volume = Volume::from_fn([1, 2, 2], |_, y, x| (2 * y + x) as f32);
        let v = ScalarSampler::sample_at(&volume, [0.0, 0.5, 0.5], InterpolationOrder::Linear);
        assert!((v - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_cubic_reproduces_linear_ramp() {
        let volume = Volume::from_fn([1, 8, 8], |_, y, x| (3 * y + x) as f32);
        let v = ScalarSampler::sample_at(&volume, [0.0, 3.3, 4.6], InterpolationOrder::Cubic);
        assert!((v - (3.0 * 3.3 + 4.6)).abs() < 1e-4);
    }

    #[test]
    fn test_out_of_bounds_is_nan() {
        let volume = Volume::zeros([2, 2, 2]);
        let sample = |position, order| ScalarSampler::sample_at(&volume, position, order);
        assert!(sample([0.0, 0.0, -0.5], InterpolationOrder::Linear).is_nan());
        assert!(sample([1.2, 0.0, 0.0], InterpolationOrder::Nearest).is_nan());
    }

    #[test]
    fn test_nan_propagates_from_taps() {
        let volume = Volume::new([1, 1, 3], vec![1.0, f32::NAN, 3.0]).unwrap();
        let v = ScalarSampler::sample_at(&volume, [0.0, 0.0, 0.5], InterpolationOrder::Linear);
        assert!(v.is_nan());
        let v = ScalarSampler::sample_at(&volume, [0.0, 0.0, 2.0], InterpolationOrder::Nearest);
        assert_eq!(v, 3.0);
    }

    #[test]
    fn test_on_grid_sample_ignores_nan_neighbour() {
        let volume = Volume::new([1, 1, 4], vec![1.0, 2.0, f32::NAN, 4.0]).unwrap();
        for order in [InterpolationOrder::Linear, InterpolationOrder::Cubic] {
            assert_eq!(ScalarSampler::sample_at(&volume, [0.0, 0.0, 1.0], order), 2.0);
            assert_eq!(ScalarSampler::sample_at(&volume, [0.0, 0.0, 3.0], order), 4.0);
            assert!(ScalarSampler::sample_at(&volume, [0.0, 0.0, 1.5], order).is_nan());
        }
    }
}
