//! Integer-factor downsampling.
//!
//! Volumes are binned by averaging `b^3` blocks (finite voxels only). Single
//! slice images are instead zoomed with an order-1 resampling in Y and X.
//! Both keep the same geometry: output voxel `i` sits at input coordinate
//! `(i + 0.5) b - 0.5`, so a displacement of `d` voxels becomes `d / b`.

use rayon::prelude::*;

use crate::error::{CoreError, Result};
use crate::interpolation::{InterpolationOrder, ScalarSampler};
use crate::volume::{Mask, Volume};

/// Shape of `shape` after binning by `factor`.
pub fn binned_shape(shape: [usize; 3], factor: usize) -> [usize; 3] {
    if shape[0] == 1 {
        [1, shape[1] / factor, shape[2] / factor]
    } else {
        [shape[0] / factor, shape[1] / factor, shape[2] / factor]
    }
}

/// Box-mean binning over finite voxels; a block with none yields NaN.
pub fn bin_volume(volume: &Volume, factor: usize) -> Result<Volume> {
    check_factor(factor)?;
    if factor == 1 {
        return Ok(volume.clone());
    }
    let out_shape = binned_shape(volume.shape(), factor);
    if out_shape.iter().any(|&n| n == 0) {
        return Err(CoreError::invalid_shape(format!(
            "binning {:?} by {} leaves an empty volume",
            volume.shape(),
            factor
        )));
    }
    Ok(Volume::from_fn(out_shape, |z, y, x| {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for dz in 0..factor {
            for dy in 0..factor {
                for dx in 0..factor {
                    let v = volume.get(z * factor + dz, y * factor + dy, x * factor + dx);
                    if v.is_finite() {
                        sum += v as f64;
                        count += 1;
                    }
                }
            }
        }
        if count == 0 {
            f32::NAN
        } else {
            (sum / count as f64) as f32
        }
    }))
}

/// Majority-vote binning of a mask.
pub fn bin_mask(mask: &Mask, factor: usize) -> Result<Mask> {
    check_factor(factor)?;
    if factor == 1 {
        return Ok(mask.clone());
    }
    let shape = mask.shape();
    let as_float = Volume::new(
        shape,
        mask.data().par_iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
    )?;
    let binned = downsample(&as_float, factor)?;
    Mask::new(
        binned.shape(),
        binned.data().par_iter().map(|&v| v > 0.5).collect(),
    )
}

/// Order-1 zoom of a single-slice image by `1 / factor` in Y and X.
///
/// Output pixel `i` samples input coordinate `(i + 0.5) * factor - 0.5`.
pub fn zoom_plane(volume: &Volume, factor: usize) -> Result<Volume> {
    check_factor(factor)?;
    if !volume.is_planar() {
        return Err(CoreError::invalid_shape(format!(
            "zoom_plane expects a single slice, got {:?}",
            volume.shape()
        )));
    }
    let out_shape = binned_shape(volume.shape(), factor);
    if out_shape.iter().any(|&n| n == 0) {
        return Err(CoreError::invalid_shape(format!(
            "zooming {:?} by 1/{} leaves an empty image",
            volume.shape(),
            factor
        )));
    }
    let at = |i: usize| (i as f64 + 0.5) * factor as f64 - 0.5;
    Ok(Volume::from_fn(out_shape, |_, y, x| {
        ScalarSampler::sample_at(volume, [0.0, at(y), at(x)], InterpolationOrder::Linear)
    }))
}

/// Downsample by `factor`: box binning in 3D, order-1 zoom for a single slice.
pub fn downsample(volume: &Volume, factor: usize) -> Result<Volume> {
    check_factor(factor)?;
    if factor == 1 {
        return Ok(volume.clone());
    }
    if volume.is_planar() {
        zoom_plane(volume, factor)
    } else {
        bin_volume(volume, factor)
    }
}

fn check_factor(factor: usize) -> Result<()> {
    if factor == 0 {
        return Err(CoreError::invalid_shape("binning factor must be at least 1"));
    }
    Ok(())
}
