//! Validation of inputs and configuration.
//!
//! Everything here runs before any numeric work so that malformed input
//! fails fast with a descriptive error.

use voxcorr_core::filter::nearest_power_of_two;
use voxcorr_core::{Mask, Region, Volume};

use crate::config::{DivergenceThresholds, Margin, RegistrationConfig};
use crate::error::{RegistrationError, Result};

/// Fraction of the largest reference dimension used as default margin.
pub const DEFAULT_MARGIN_FRACTION: f64 = 0.1;

/// The moving volume must be at least as large as the reference on every axis.
pub fn validate_pair(im1: &Volume, im2: &Volume) -> Result<()> {
    let (s1, s2) = (im1.shape(), im2.shape());
    if (0..3).any(|axis| s2[axis] < s1[axis]) {
        return Err(RegistrationError::ShapeMismatch {
            expected: s1.to_vec(),
            actual: s2.to_vec(),
        });
    }
    if im1.is_planar() != im2.is_planar() {
        return Err(RegistrationError::dimension_mismatch(format!(
            "cannot register a 2D image against a 3D volume ({:?} vs {:?})",
            s1, s2
        )));
    }
    Ok(())
}

/// The mask must match the reference shape.
pub fn validate_mask(im1: &Volume, mask: Option<&Mask>) -> Result<()> {
    if let Some(mask) = mask {
        if mask.shape() != im1.shape() {
            return Err(RegistrationError::ShapeMismatch {
                expected: im1.shape().to_vec(),
                actual: mask.shape().to_vec(),
            });
        }
    }
    Ok(())
}

/// Validate iteration count.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(RegistrationError::invalid_configuration(
            "max_iterations must be at least 1",
        ));
    }
    Ok(())
}

/// Validate a convergence threshold.
pub fn validate_tolerance(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} must be finite and positive, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validate the divergence heuristics.
pub fn validate_divergence(divergence: &DivergenceThresholds) -> Result<()> {
    let DivergenceThresholds {
        error_ratio,
        min_volume_ratio,
        max_volume_ratio,
    } = *divergence;
    if !(error_ratio > 0.0 && error_ratio.is_finite()) {
        return Err(RegistrationError::invalid_configuration(format!(
            "error ratio must be positive, got {}",
            error_ratio
        )));
    }
    if !(min_volume_ratio > 0.0 && min_volume_ratio < max_volume_ratio) {
        return Err(RegistrationError::invalid_configuration(format!(
            "volume ratio bounds must satisfy 0 < min < max, got ({}, {})",
            min_volume_ratio, max_volume_ratio
        )));
    }
    Ok(())
}

/// Validate a whole single-scale config.
pub fn validate_config(config: &RegistrationConfig) -> Result<()> {
    validate_iterations(config.max_iterations)?;
    validate_tolerance("delta_phi_min", config.delta_phi_min)?;
    validate_divergence(&config.divergence)?;
    if let Some(Margin::PerAxis(list)) = &config.margin {
        if list.len() != 3 {
            return Err(RegistrationError::invalid_configuration(format!(
                "per-axis margin needs 3 entries (ZYX), got {}",
                list.len()
            )));
        }
    }
    Ok(())
}

/// Turn an optional margin setting into per-axis margins for this pair.
///
/// The default is `ceil(0.1 * max(im1 shape))`. A single-slice image never
/// has a Z margin. Equal-sized pairs keep at least one voxel on every
/// non-singleton axis so that interpolation has a border to work with.
pub fn resolve_margin(
    margin: Option<&Margin>,
    im1_shape: [usize; 3],
    im2_shape: [usize; 3],
) -> Result<[usize; 3]> {
    let mut resolved = match margin {
        None => {
            let largest = im1_shape.iter().copied().max().unwrap_or(0);
            let m = (DEFAULT_MARGIN_FRACTION * largest as f64).ceil() as usize;
            [m; 3]
        }
        Some(Margin::Uniform(m)) => [*m; 3],
        Some(Margin::PerAxis(list)) => {
            if list.len() != 3 {
                return Err(RegistrationError::invalid_configuration(format!(
                    "per-axis margin needs 3 entries (ZYX), got {}",
                    list.len()
                )));
            }
            [list[0], list[1], list[2]]
        }
    };
    for axis in 0..3 {
        if im1_shape[axis] == 1 {
            resolved[axis] = 0;
        } else if im1_shape == im2_shape && resolved[axis] == 0 {
            resolved[axis] = 1;
        }
    }
    if Region::from_margin(im1_shape, resolved).is_none() {
        return Err(RegistrationError::invalid_configuration(format!(
            "margin {:?} leaves no voxel of a {:?} reference",
            resolved, im1_shape
        )));
    }
    Ok(resolved)
}

/// Round a binning factor to the nearest power of two, warning when it changes.
pub fn resolve_binning(name: &str, binning: usize) -> Result<usize> {
    if binning == 0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} must be at least 1",
            name
        )));
    }
    let rounded = nearest_power_of_two(binning);
    if rounded != binning {
        tracing::warn!(
            "{} = {} is not a power of two, using {}",
            name,
            binning,
            rounded
        );
    }
    Ok(rounded)
}
