//! Finite-difference gradients.

use rayon::prelude::*;

use crate::volume::Volume;

/// Per-voxel gradient along Z, Y and X.
///
/// Interior voxels use central differences, the first and last voxels of an
/// axis one-sided differences. An axis of extent one has a zero derivative,
/// which makes the Z gradient of a 2D image the zero volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientFilter;

impl GradientFilter {
    /// Create a new gradient filter.
    pub fn new() -> Self {
        Self
    }

    /// Compute `[dz, dy, dx]` of `volume`.
    pub fn apply(&self, volume: &Volume) -> [Volume; 3] {
        [
            Self::derivative(volume, 0),
            Self::derivative(volume, 1),
            Self::derivative(volume, 2),
        ]
    }

    fn derivative(volume: &Volume, axis: usize) -> Volume {
        let shape = volume.shape();
        let n = shape[axis];
        if n < 2 {
            return Volume::zeros(shape);
        }
        let stride = match axis {
            0 => shape[1] * shape[2],
            1 => shape[2],
            _ => 1,
        };
        let [_, ny, nx] = shape;
        let data = volume.data();
        Volume::from_fn(shape, |z, y, x| {
            let i = [z, y, x][axis];
            let at = (z * ny + y) * nx + x;
            if i == 0 {
                data[at + stride] - data[at]
            } else if i == n - 1 {
                data[at] - data[at - stride]
            } else {
                0.5 * (data[at + stride] - data[at - stride])
            }
        })
    }
}

/// Squared gradient magnitude summed over finite voxels.
pub fn gradient_energy(gradient: &[Volume; 3]) -> f64 {
    gradient
        .par_iter()
        .map(|g| {
            g.data()
                .iter()
                .filter(|v| v.is_finite())
                .map(|&v| (v as f64) * (v as f64))
                .sum::<f64>()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_ramp_gradient() {
        let volume = Volume::from_fn([3, 4, 5], |z, y, x| (2 * z + 3 * y) as f32 + 0.5 * x as f32);
        let [dz, dy, dx] = GradientFilter::new().apply(&volume);
        for &v in dz.data() {
            assert!((v - 2.0).abs() < 1e-6);
        }
        for &v in dy.data() {
            assert!((v - 3.0).abs() < 1e-6);
        }
        for &v in dx.data() {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_edges_are_one_sided() {
        let volume = Volume::new([1, 1, 4], vec![0.0, 1.0, 4.0, 9.0]).unwrap();
        let [_, _, dx] = GradientFilter::new().apply(&volume);
        assert_eq!(dx.data(), &[1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_planar_z_gradient_is_zero() {
        let volume = Volume::from_fn([1, 6, 6], |_, y, x| (y * x) as f32);
        let [dz, _, _] = GradientFilter::new().apply(&volume);
        assert!(dz.data().iter().all(|&v| v == 0.0));
        assert!(gradient_energy(&GradientFilter::new().apply(&volume)) > 0.0);
    }
}
