//! Single-scale Gauss-Newton registration.
//!
//! The loop matches a reference `im1` against a moving `im2` through a
//! 12-parameter operator `Phi`, so that `im1(x) ~ im2(Phi(x))` over the
//! reference crop. Each iteration builds the normal equations, solves for an
//! increment, composes it and re-samples the moving image, then runs the
//! divergence and convergence tests in that order.

use std::sync::Arc;

use voxcorr_core::filter::GradientFilter;
use voxcorr_core::interpolation::SamplingGrid;
use voxcorr_core::{Mask, Phi, PhiComponents, Region, Volume};

use crate::config::RegistrationConfig;
use crate::error::{RegistrationError, Result};
use crate::normal_equations::{residual_sum_of_squares, NormalEquations};
use crate::progress::{IterationObserver, ProgressTracker, TracingObserver};
use crate::solver::{PhiSolver, SolveOutcome};
use crate::status::ReturnStatus;
use crate::validation::{resolve_margin, validate_config, validate_mask, validate_pair};

/// Outcome of a registration call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrationResult {
    /// Final operator (the last accepted one).
    pub phi: Phi,
    /// Terminal status.
    pub status: ReturnStatus,
    /// Normalised error of `phi`.
    pub error: f64,
    /// Iterations run, including a rejected last one.
    pub iterations: usize,
    /// Norm of the last increment.
    pub delta_phi_norm: f64,
}

impl RegistrationResult {
    /// Physical decomposition of the final operator.
    pub fn components(&self) -> PhiComponents {
        self.phi.decompose()
    }

    /// Integer status code.
    pub fn return_status(&self) -> i32 {
        self.status.code()
    }
}

/// Reference crop of one registration call and where it sits in the moving volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropGeometry {
    /// Correlated voxels of the reference.
    pub reference: Region,
    /// Shift from reference to moving voxel coordinates (ZYX), fractional on
    /// binned levels.
    pub moving_offset: [f64; 3],
}

impl CropGeometry {
    /// Strip `margin` from the reference and centre the same box in the moving volume.
    pub fn new(im1_shape: [usize; 3], im2_shape: [usize; 3], margin: [usize; 3]) -> Result<Self> {
        Self::binned(im1_shape, moving_padding(im1_shape, im2_shape), margin, 1)
    }

    /// Geometry of a level binned by `binning`.
    ///
    /// `level_shape` and `margin` are in binned voxels, `padding` is the
    /// full-resolution [`moving_padding`]. Binned voxel `i` covers full
    /// resolution voxels `[i b, (i + 1) b)`, so the padding scales to `padding / b`
    /// exactly, whatever the rounding of the binned shapes.
    pub fn binned(
        level_shape: [usize; 3],
        padding: [usize; 3],
        margin: [usize; 3],
        binning: usize,
    ) -> Result<Self> {
        let reference = Region::from_margin(level_shape, margin).ok_or_else(|| {
            RegistrationError::invalid_configuration(format!(
                "margin {:?} leaves no voxel of a {:?} reference",
                margin, level_shape
            ))
        })?;
        let mut moving_offset = [0.0; 3];
        for axis in 0..3 {
            moving_offset[axis] = padding[axis] as f64 / binning as f64;
        }
        Ok(Self {
            reference,
            moving_offset,
        })
    }

    /// Centre of the moving crop, the point about which `Phi` acts.
    pub fn moving_centre(&self) -> [f64; 3] {
        let mut centre = self.reference.centre();
        for axis in 0..3 {
            centre[axis] += self.moving_offset[axis];
        }
        centre
    }

    /// Grid sampling the moving volume at `Phi` of every reference crop voxel.
    ///
    /// Reference voxel `x` is read at `c + F (x + o - c) + t`, with `c` the
    /// moving centre and `o` the moving offset.
    pub fn moving_grid(&self, phi: &Phi) -> SamplingGrid {
        let mut mapping = *phi.matrix();
        for axis in 0..3 {
            mapping[(axis, 3)] += self.moving_offset[axis];
        }
        SamplingGrid {
            region: self.reference,
            centre: self.reference.centre(),
            mapping,
        }
    }
}

/// Extra extent of the moving volume on the low side of every axis.
pub fn moving_padding(im1_shape: [usize; 3], im2_shape: [usize; 3]) -> [usize; 3] {
    let mut pad = [0; 3];
    for axis in 0..3 {
        pad[axis] = im2_shape[axis].saturating_sub(im1_shape[axis]) / 2;
    }
    pad
}

/// Single-scale registration.
///
/// # Example
/// ```rust,no_run
/// use voxcorr_core::Volume;
/// use voxcorr_registration::{Registration, RegistrationConfig};
///
/// # fn run(im1: &Volume, im2: &Volume) -> voxcorr_registration::Result<()> {
/// let result = Registration::new(RegistrationConfig::default()).register(im1, im2, None)?;
/// println!("status {} translation {:?}", result.status, result.phi.translation());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Registration {
    config: RegistrationConfig,
    initial_phi: Phi,
    observer: Option<Arc<dyn IterationObserver>>,
}

impl Registration {
    /// Create a registration with the given settings and an identity guess.
    pub fn new(config: RegistrationConfig) -> Self {
        Self {
            config,
            initial_phi: Phi::identity(),
            observer: None,
        }
    }

    /// Start from `phi` instead of the identity.
    pub fn with_initial_phi(mut self, phi: Phi) -> Self {
        self.initial_phi = phi;
        self
    }

    /// Attach a progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn IterationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The settings in use.
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    fn tracker(&self) -> ProgressTracker {
        progress_tracker(self.observer.clone(), self.config.display_progress)
    }

    /// Register `im1` (reference) against `im2` (moving).
    ///
    /// `im2` must be at least as large as `im1` on every axis; any extra
    /// extent is split evenly around the reference crop. `mask`, if given,
    /// has the shape of `im1` and selects the voxels to correlate.
    pub fn register(
        &self,
        im1: &Volume,
        im2: &Volume,
        mask: Option<&Mask>,
    ) -> Result<RegistrationResult> {
        validate_config(&self.config)?;
        validate_pair(im1, im2)?;
        validate_mask(im1, mask)?;
        let margin = resolve_margin(self.config.margin.as_ref(), im1.shape(), im2.shape())?;
        let geometry = CropGeometry::new(im1.shape(), im2.shape(), margin)?;
        let mut tracker = self.tracker();
        tracker.start();
        let result = self.run(im1, im2, mask, &geometry, &tracker)?;
        tracker.complete(
            result.status,
            &tracker.snapshot(
                result.iterations,
                self.config.max_iterations,
                result.error,
                result.delta_phi_norm,
            ),
        );
        Ok(result)
    }

    /// The iteration proper, on validated inputs.
    pub(crate) fn run(
        &self,
        im1: &Volume,
        im2: &Volume,
        mask: Option<&Mask>,
        geometry: &CropGeometry,
        tracker: &ProgressTracker,
    ) -> Result<RegistrationResult> {
        let config = &self.config;
        let planar = im1.is_planar();
        let solver = PhiSolver::new(config.rigid, planar);

        let mut phi = if planar {
            self.initial_phi.restrict_to_plane()
        } else {
            self.initial_phi
        };
        if !phi.is_invertible() {
            return Err(RegistrationError::invalid_configuration(
                "initial deformation operator is not invertible",
            ));
        }

        let unmasked = im1.crop(&geometry.reference)?;
        let mut gradient = GradientFilter::new().apply(&unmasked);
        let mut im1crop = unmasked;
        if let Some(mask) = mask {
            mask.crop(&geometry.reference)?.apply_nan(&mut im1crop)?;
        }

        let normalisation = match im1crop.finite_sum() {
            sum if sum == 0.0 => 1.0,
            sum => sum,
        };

        let deform = |phi: &Phi| -> Result<Volume> {
            let grid = geometry.moving_grid(phi);
            Ok(config.sampler.sample(im2, &grid, config.interpolation)?)
        };

        let mut im2def = deform(&phi)?;
        let mut error = residual_sum_of_squares(&im1crop, &im2def) / normalisation;
        let mut equations = NormalEquations::new();
        let mut delta_phi_norm = f64::INFINITY;
        let mut iteration = 0;

        tracing::debug!(
            "registering {:?} crop, margin start {:?}, initial error {:.6}",
            geometry.reference.shape,
            geometry.reference.start,
            error
        );

        let status = loop {
            iteration += 1;

            if iteration == 1 || config.update_gradient {
                if config.update_gradient {
                    gradient = GradientFilter::new().apply(&im2def);
                }
                equations.rebuild_full(&im1crop, &im2def, &gradient)?;
            } else {
                equations.rebuild_residual_only(&im1crop, &im2def, &gradient)?;
            }

            let (candidate, norm) = match solver.step(&phi, &equations) {
                SolveOutcome::Updated { phi, norm } => (phi, norm),
                SolveOutcome::Singular => {
                    tracing::warn!("singular normal equations at iteration {}", iteration);
                    break ReturnStatus::SingularMatrix;
                }
            };
            if !candidate.is_invertible() {
                tracing::warn!("non-invertible operator at iteration {}", iteration);
                break ReturnStatus::DivergedVolume;
            }

            let candidate_def = deform(&candidate)?;
            let candidate_error =
                residual_sum_of_squares(&im1crop, &candidate_def) / normalisation;

            if iteration as f64 > config.max_iterations as f64 * 0.5
                && candidate_error > config.divergence.error_ratio * error
            {
                tracing::debug!(
                    "error {:.6} against previous {:.6} at iteration {}",
                    candidate_error,
                    error,
                    iteration
                );
                break ReturnStatus::DivergedError;
            }

            let volume_ratio = candidate.decompose().volume_ratio;
            if !(volume_ratio > config.divergence.min_volume_ratio
                && volume_ratio < config.divergence.max_volume_ratio)
            {
                tracing::warn!(
                    "volume ratio {:.4} out of range at iteration {}",
                    volume_ratio,
                    iteration
                );
                break ReturnStatus::DivergedVolume;
            }

            phi = candidate;
            im2def = candidate_def;
            error = candidate_error;
            delta_phi_norm = norm;

            tracing::debug!(
                "iteration {}: error {:.6}, |dPhi| {:.3e}",
                iteration,
                error,
                delta_phi_norm
            );
            tracker.update(&tracker.snapshot(iteration, config.max_iterations, error, norm));

            if delta_phi_norm <= config.delta_phi_min {
                break ReturnStatus::Converged;
            }
            if iteration >= config.max_iterations {
                break ReturnStatus::MaxIterations;
            }
        };

        tracing::debug!(
            "registration finished: {} after {} iterations, error {:.6}",
            status,
            iteration,
            error
        );
        Ok(RegistrationResult {
            phi,
            status,
            error,
            iterations: iteration,
            delta_phi_norm,
        })
    }
}

/// Tracker for an optional observer, plus a [`TracingObserver`] when progress is displayed.
pub(crate) fn progress_tracker(
    observer: Option<Arc<dyn IterationObserver>>,
    display_progress: bool,
) -> ProgressTracker {
    let mut tracker = ProgressTracker::with_observer(observer);
    if display_progress {
        tracker.add_observer(Arc::new(TracingObserver::default()));
    }
    tracker
}

/// Register with the given settings and an identity initial guess.
pub fn register(
    im1: &Volume,
    im2: &Volume,
    mask: Option<&Mask>,
    config: &RegistrationConfig,
) -> Result<RegistrationResult> {
    Registration::new(config.clone()).register(im1, im2, mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Margin;

    fn speckle(shape: [usize; 3]) -> Volume {
        Volume::from_fn(shape, |z, y, x| {
            let (z, y, x) = (z as f32, y as f32, x as f32);
            3.0 + (0.6 * x + 0.2 * y).sin() * (0.45 * y - 0.3 * z).cos()
                + 0.5 * (0.5 * z + 0.35 * x).sin()
        })
    }

    #[test]
    fn test_crop_geometry_centres_moving_region() {
        let g = CropGeometry::new([10, 10, 10], [10, 14, 15], [2, 2, 2]).unwrap();
        assert_eq!(g.reference.start, [2, 2, 2]);
        assert_eq!(g.moving_offset, [0.0, 2.0, 2.0]);
        assert_eq!(g.moving_centre(), [4.5, 6.5, 6.5]);
        let grid = g.moving_grid(&Phi::identity());
        assert_eq!(grid.position(0, 0, 0), [2.0, 4.0, 4.0]);
    }

    #[test]
    fn test_binned_geometry_keeps_fractional_padding() {
        // Full resolution 128 against 138: padding 5, which is 1.25 voxels at binning 4.
        let g = CropGeometry::binned([1, 32, 32], [0, 5, 5], [0, 3, 3], 4).unwrap();
        assert_eq!(g.moving_offset, [0.0, 1.25, 1.25]);
        let phi = Phi::from_translation([0.0, 0.5, -0.25]);
        let grid = g.moving_grid(&phi);
        assert_eq!(grid.position(0, 0, 0), [0.0, 4.75, 4.0]);
    }

    #[test]
    fn test_linear_part_acts_about_moving_centre() {
        let g = CropGeometry::new([1, 9, 9], [1, 13, 13], [0, 1, 1]).unwrap();
        let mut linear = nalgebra::Matrix3::identity();
        linear[(2, 2)] = 2.0;
        let grid = g.moving_grid(&Phi::from_parts(linear, [0.0; 3]));
        let centre = g.moving_centre();
        // The reference crop centre lands on the moving centre whatever the zoom.
        let mid = grid.position(0, 3, 3);
        assert_eq!(mid, centre);
        assert_eq!(grid.position(0, 3, 4)[2], centre[2] + 2.0);
    }

    #[test]
    fn test_identity_converges_immediately() {
        let im = speckle([16, 16, 16]);
        let result = register(&im, &im, None, &RegistrationConfig::default()).unwrap();
        assert_eq!(result.status, ReturnStatus::Converged);
        assert_eq!(result.iterations, 1);
        assert!(result.error < 1e-12);
        assert!((result.phi.matrix() - Phi::identity().matrix()).norm() < 1e-3);
    }

    #[test]
    fn test_rejects_smaller_moving_volume() {
        let im1 = speckle([8, 10, 10]);
        let im2 = speckle([8, 9, 10]);
        let err = register(&im1, &im2, None, &RegistrationConfig::default()).unwrap_err();
        assert!(matches!(err, RegistrationError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let im = speckle([8, 8, 8]);
        let config = RegistrationConfig::default().with_max_iterations(0);
        assert!(register(&im, &im, None, &config).is_err());
    }

    #[test]
    fn test_uniform_pair_is_singular() {
        let im = Volume::filled([10, 10, 10], 1.0);
        let config = RegistrationConfig::default().with_margin(Margin::Uniform(2));
        let result = register(&im, &im, None, &config).unwrap();
        assert_eq!(result.status, ReturnStatus::SingularMatrix);
        assert_eq!(result.return_status(), -2);
        assert_eq!(result.phi, Phi::identity());
    }
}
