//! One-dimensional interpolation kernels.
//!
//! Separable sampling along each axis reduces to a short list of taps
//! (clamped voxel index plus weight). Both sampler backends use the same
//! weights so they agree to floating point tolerance.

use super::trait_::{InterpolationOrder, BOUNDS_TOLERANCE};

/// Up to four taps along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTaps {
    pub index: [usize; 4],
    pub weight: [f64; 4],
    pub len: usize,
}

/// True when `c` lies within the sampling bounds of an axis of extent `n`.
#[inline]
pub fn in_bounds(c: f64, n: usize) -> bool {
    c >= -BOUNDS_TOLERANCE && c <= (n as f64 - 1.0) + BOUNDS_TOLERANCE
}

#[inline]
fn clamp_index(i: i64, n: usize) -> usize {
    i.clamp(0, n as i64 - 1) as usize
}

/// Catmull-Rom weights for fractional offset `t` in `[0, 1)`.
#[inline]
pub fn cubic_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

/// Taps for coordinate `c` along an axis of extent `n`.
pub fn axis_taps(c: f64, n: usize, order: InterpolationOrder) -> AxisTaps {
    match order {
        InterpolationOrder::Nearest => AxisTaps {
            index: [clamp_index((c + 0.5).floor() as i64, n), 0, 0, 0],
            weight: [1.0, 0.0, 0.0, 0.0],
            len: 1,
        },
        InterpolationOrder::Linear => {
            let base = c.floor();
            let t = c - base;
            let i0 = base as i64;
            AxisTaps {
                index: [clamp_index(i0, n), clamp_index(i0 + 1, n), 0, 0],
                weight: [1.0 - t, t, 0.0, 0.0],
                len: 2,
            }
        }
        InterpolationOrder::Cubic => {
            let base = c.floor();
            let t = c - base;
            let i0 = base as i64;
            AxisTaps {
                index: [
                    clamp_index(i0 - 1, n),
                    clamp_index(i0, n),
                    clamp_index(i0 + 1, n),
                    clamp_index(i0 + 2, n),
                ],
                weight: cubic_weights(t),
                len: 4,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubic_weights_partition_unity() {
        for &t in &[0.0, 0.25, 0.5, 0.9] {
            let w = cubic_weights(t);
            assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
        assert_eq!(cubic_weights(0.0), [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_linear_taps_clamped() {
        let taps = axis_taps(4.0, 5, InterpolationOrder::Linear);
        assert_eq!(&taps.index[..2], &[4, 4]);
        assert_eq!(&taps.weight[..2], &[1.0, 0.0]);
    }

    #[test]
    fn test_nearest_rounds() {
        assert_eq!(axis_taps(2.49, 5, InterpolationOrder::Nearest).index[0], 2);
        assert_eq!(axis_taps(2.5, 5, InterpolationOrder::Nearest).index[0], 3);
    }

    #[test]
    fn test_bounds() {
        assert!(in_bounds(-0.0005, 4));
        assert!(in_bounds(3.0005, 4));
        assert!(!in_bounds(3.01, 4));
        assert!(in_bounds(0.0, 1));
        assert!(!in_bounds(0.5, 1));
    }
}
