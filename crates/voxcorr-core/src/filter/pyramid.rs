use super::binning::{bin_mask, downsample};
use crate::error::{CoreError, Result};
use crate::volume::{Mask, Volume};

/// One level of a coarse-to-fine pyramid: binned copies of the pair and mask.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Binning factor of this level relative to the input.
    pub binning: usize,
    pub im1: Volume,
    pub im2: Volume,
    pub mask: Option<Mask>,
}

impl PyramidLevel {
    /// Downsample the reference, moving volume and optional mask by `binning`.
    pub fn build(im1: &Volume, im2: &Volume, mask: Option<&Mask>, binning: usize) -> Result<Self> {
        let mask = mask.map(|m| bin_mask(m, binning)).transpose()?;
        Ok(Self {
            binning,
            im1: downsample(im1, binning)?,
            im2: downsample(im2, binning)?,
            mask,
        })
    }
}

/// Round `n` to the nearest power of two (ties go up).
pub fn nearest_power_of_two(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    let upper = n.next_power_of_two();
    let lower = upper / 2;
    if n - lower < upper - n {
        lower
    } else {
        upper
    }
}

/// Binning factors from coarsest to finest.
///
/// E.g. `binning_schedule(8, 1)` -> `[8, 4, 2, 1]`.
pub fn binning_schedule(start: usize, stop: usize) -> Result<Vec<usize>> {
    if !start.is_power_of_two() || !stop.is_power_of_two() {
        return Err(CoreError::invalid_shape(format!(
            "binning levels must be powers of two, got {} and {}",
            start, stop
        )));
    }
    if start < stop {
        return Err(CoreError::invalid_shape(format!(
            "binning start {} is finer than stop {}",
            start, stop
        )));
    }
    let mut schedule = Vec::new();
    let mut level = start;
    while level >= stop {
        schedule.push(level);
        level /= 2;
        if level == 0 {
            break;
        }
    }
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule() {
        assert_eq!(binning_schedule(8, 1).unwrap(), vec![8, 4, 2, 1]);
        assert_eq!(binning_schedule(4, 4).unwrap(), vec![4]);
        assert!(binning_schedule(2, 4).is_err());
        assert!(binning_schedule(6, 1).is_err());
    }

    #[test]
    fn test_nearest_power_of_two() {
        assert_eq!(nearest_power_of_two(1), 1);
        assert_eq!(nearest_power_of_two(3), 4);
        assert_eq!(nearest_power_of_two(5), 4);
        assert_eq!(nearest_power_of_two(6), 8);
        assert_eq!(nearest_power_of_two(12), 16);
        assert_eq!(nearest_power_of_two(11), 8);
    }

    #[test]
    fn test_build_level() {
        let im1 = Volume::from_fn([8, 8, 8], |z, y, x| (z + y + x) as f32);
        let mask = Mask::all([8, 8, 8]);
        let level = PyramidLevel::build(&im1, &im1, Some(&mask), 2).unwrap();
        assert_eq!(level.im1.shape(), [4, 4, 4]);
        assert_eq!(level.mask.as_ref().map(|m| m.count()), Some(64));
    }
}
