//! Coarse-to-fine registration over a binning pyramid.
//!
//! Levels run from `bin_start` down to `bin_stop`. Translations live in the
//! voxel units of the current level: the initial guess is divided by the
//! first binning, each finer level doubles it and the final operator is
//! multiplied by the last binning that ran. The moving crop of every level is
//! placed from the full-resolution padding, so a larger moving volume does not
//! bias the coarse levels.

use std::sync::Arc;

use voxcorr_core::filter::{binning_schedule, PyramidLevel};
use voxcorr_core::{Mask, Phi, Volume};

use crate::config::{Margin, MultiscaleConfig};
use crate::error::{RegistrationError, Result};
use crate::progress::{IterationObserver, ProgressTracker};
use crate::registration::{
    moving_padding, progress_tracker, CropGeometry, Registration, RegistrationResult,
};
use crate::status::ReturnStatus;
use crate::validation::{
    resolve_binning, resolve_margin, validate_config, validate_mask, validate_pair,
};

/// Outcome of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSummary {
    pub binning: usize,
    pub status: ReturnStatus,
    pub iterations: usize,
    pub error: f64,
    /// Level result with its translation expressed at full resolution.
    pub phi: Phi,
}

/// Outcome of a multiscale run.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiscaleResult {
    /// Final operator, translation at full resolution.
    pub phi: Phi,
    /// Status of the last level that ran.
    pub status: ReturnStatus,
    /// Error of the last level that ran.
    pub error: f64,
    /// Iterations of the last level that ran.
    pub iterations: usize,
    /// Increment norm of the last level that ran.
    pub delta_phi_norm: f64,
    /// One entry per level, coarsest first.
    pub levels: Vec<LevelSummary>,
}

impl MultiscaleResult {
    /// Integer status code.
    pub fn return_status(&self) -> i32 {
        self.status.code()
    }

    /// Iterations summed over every level.
    pub fn total_iterations(&self) -> usize {
        self.levels.iter().map(|l| l.iterations).sum()
    }
}

/// Multiscale registration driver.
#[derive(Clone)]
pub struct MultiscaleRegistration {
    config: MultiscaleConfig,
    initial_phi: Phi,
    observer: Option<Arc<dyn IterationObserver>>,
}

impl MultiscaleRegistration {
    pub fn new(config: MultiscaleConfig) -> Self {
        Self {
            config,
            initial_phi: Phi::identity(),
            observer: None,
        }
    }

    /// Start from `phi` (translation at full resolution).
    pub fn with_initial_phi(mut self, phi: Phi) -> Self {
        self.initial_phi = phi;
        self
    }

    /// Attach a progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn IterationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &MultiscaleConfig {
        &self.config
    }

    /// Register `im1` against `im2` level by level.
    pub fn register(
        &self,
        im1: &Volume,
        im2: &Volume,
        mask: Option<&Mask>,
    ) -> Result<MultiscaleResult> {
        let level_config = &self.config.registration;
        validate_config(level_config)?;
        validate_pair(im1, im2)?;
        validate_mask(im1, mask)?;

        let bin_start = resolve_binning("bin_start", self.config.bin_start)?;
        let bin_stop = resolve_binning("bin_stop", self.config.bin_stop)?;
        let schedule = binning_schedule(bin_start, bin_stop)
            .map_err(|e| RegistrationError::invalid_configuration(e.to_string()))?;
        let margin = resolve_margin(level_config.margin.as_ref(), im1.shape(), im2.shape())?;
        let padding = moving_padding(im1.shape(), im2.shape());

        let mut tracker = progress_tracker(self.observer.clone(), level_config.display_progress);
        tracker.start();

        let mut phi = self.initial_phi.scale_translation(1.0 / bin_start as f64);
        let mut levels = Vec::with_capacity(schedule.len());
        let mut last: Option<RegistrationResult> = None;

        for (index, &binning) in schedule.iter().enumerate() {
            if index > 0 {
                phi = phi.scale_translation(2.0);
            }
            let level = PyramidLevel::build(im1, im2, mask, binning)?;
            let level_margin = scaled_margin(margin, binning);
            let level_margin = resolve_margin(
                Some(&Margin::PerAxis(level_margin.to_vec())),
                level.im1.shape(),
                level.im2.shape(),
            )
            .map_err(|e| {
                RegistrationError::invalid_configuration(format!(
                    "binning {} is too coarse: {}",
                    binning, e
                ))
            })?;
            let geometry =
                CropGeometry::binned(level.im1.shape(), padding, level_margin, binning)?;

            tracing::info!(
                "binning {}: reference {:?}, margin {:?}",
                binning,
                level.im1.shape(),
                level_margin
            );
            tracker.level(binning);

            let result = Registration::new(level_config.clone())
                .with_initial_phi(phi)
                .run(&level.im1, &level.im2, level.mask.as_ref(), &geometry, &tracker)?;

            levels.push(LevelSummary {
                binning,
                status: result.status,
                iterations: result.iterations,
                error: result.error,
                phi: result.phi.scale_translation(binning as f64),
            });
            phi = result.phi;
            let finished_at = binning;
            last = Some(result);

            if result.status != ReturnStatus::Converged
                && !self.config.force_all_levels
                && binning != bin_stop
            {
                tracing::warn!(
                    "binning {} ended with {}, stopping before finer levels",
                    binning,
                    result.status
                );
                return Ok(self.finish(&tracker, result, finished_at, levels));
            }
        }

        let result = last.ok_or_else(|| {
            RegistrationError::invalid_configuration("empty binning schedule")
        })?;
        Ok(self.finish(&tracker, result, bin_stop, levels))
    }

    fn finish(
        &self,
        tracker: &ProgressTracker,
        result: RegistrationResult,
        binning: usize,
        levels: Vec<LevelSummary>,
    ) -> MultiscaleResult {
        let info = tracker.snapshot(
            result.iterations,
            self.config.registration.max_iterations,
            result.error,
            result.delta_phi_norm,
        );
        tracker.complete(result.status, &info);
        MultiscaleResult {
            phi: result.phi.scale_translation(binning as f64),
            status: result.status,
            error: result.error,
            iterations: result.iterations,
            delta_phi_norm: result.delta_phi_norm,
            levels,
        }
    }
}

/// Full-resolution margin expressed at `binning`, rounded up.
pub fn scaled_margin(margin: [usize; 3], binning: usize) -> [usize; 3] {
    let mut scaled = [0; 3];
    for axis in 0..3 {
        scaled[axis] = margin[axis].div_ceil(binning);
    }
    scaled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_margin() {
        assert_eq!(scaled_margin([0, 10, 9], 4), [0, 3, 3]);
        assert_eq!(scaled_margin([3, 3, 3], 1), [3, 3, 3]);
    }

    #[test]
    fn test_identity_pair_converges_on_every_level() {
        let im = Volume::from_fn([1, 64, 64], |_, y, x| {
            let (y, x) = (y as f32, x as f32);
            2.0 + (0.2 * x).sin() * (0.15 * y).cos() + 0.3 * (0.5 * x + 0.4 * y).sin()
        });
        let config = MultiscaleConfig::default().with_binning(4, 1);
        let result = MultiscaleRegistration::new(config).register(&im, &im, None).unwrap();
        assert_eq!(result.status, ReturnStatus::Converged);
        assert_eq!(
            result.levels.iter().map(|l| l.binning).collect::<Vec<_>>(),
            vec![4, 2, 1]
        );
        assert!(result.phi.translation().iter().all(|t| t.abs() < 1e-3));
    }

    #[test]
    fn test_rejects_inverted_binning() {
        let im = Volume::zeros([1, 32, 32]);
        let config = MultiscaleConfig::default().with_binning(1, 4);
        assert!(MultiscaleRegistration::new(config).register(&im, &im, None).is_err());
    }

    #[test]
    fn test_rejects_binning_that_empties_the_crop() {
        let im = Volume::from_fn([12, 12, 12], |z, y, x| (z * y + x) as f32);
        let config = MultiscaleConfig::default().with_binning(16, 1);
        assert!(MultiscaleRegistration::new(config).register(&im, &im, None).is_err());
    }
}
