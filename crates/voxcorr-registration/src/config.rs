//! Configuration values for the correlation entry points.
//!
//! Every config is a plain value passed per call; defaults follow the
//! usual DIC/DVC settings.

use serde::{Deserialize, Serialize};
use voxcorr_core::{InterpolationOrder, SamplerBackend};

/// Error ratio above which a late iteration counts as diverging.
pub const DEFAULT_ERROR_RATIO: f64 = 0.8;
/// Smallest admissible `det U`.
pub const DEFAULT_MIN_VOLUME_RATIO: f64 = 0.2;
/// Largest admissible `det U`.
pub const DEFAULT_MAX_VOLUME_RATIO: f64 = 3.0;

/// Border excluded from the correlation, in voxels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Margin {
    /// Same margin on every axis.
    Uniform(usize),
    /// One margin per axis (ZYX); must have three entries.
    PerAxis(Vec<usize>),
}

/// Divergence heuristics of the single-scale loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivergenceThresholds {
    /// Past half the iteration budget, `error > error_ratio * previous` diverges.
    pub error_ratio: f64,
    /// Lower bound (exclusive) on the volume ratio `det U`.
    pub min_volume_ratio: f64,
    /// Upper bound (exclusive) on the volume ratio `det U`.
    pub max_volume_ratio: f64,
}

impl Default for DivergenceThresholds {
    fn default() -> Self {
        Self {
            error_ratio: DEFAULT_ERROR_RATIO,
            min_volume_ratio: DEFAULT_MIN_VOLUME_RATIO,
            max_volume_ratio: DEFAULT_MAX_VOLUME_RATIO,
        }
    }
}

/// Settings of the single-scale registration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Restrict updates to rotation and translation.
    pub rigid: bool,
    /// Border excluded from the reference; `None` means 10% of the largest dimension.
    pub margin: Option<Margin>,
    /// Iteration budget.
    pub max_iterations: usize,
    /// Convergence threshold on the increment norm.
    pub delta_phi_min: f64,
    /// Recompute the gradient on the deformed moving image every iteration.
    pub update_gradient: bool,
    /// Interpolation order of the moving image.
    pub interpolation: InterpolationOrder,
    /// Sampling implementation.
    pub sampler: SamplerBackend,
    /// Also report every iteration through `tracing`.
    pub display_progress: bool,
    /// Divergence heuristics.
    pub divergence: DivergenceThresholds,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            rigid: false,
            margin: None,
            max_iterations: 25,
            delta_phi_min: 0.001,
            update_gradient: false,
            interpolation: InterpolationOrder::Linear,
            sampler: SamplerBackend::Scalar,
            display_progress: false,
            divergence: DivergenceThresholds::default(),
        }
    }
}

impl RegistrationConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable rigid mode.
    pub fn with_rigid(mut self, rigid: bool) -> Self {
        self.rigid = rigid;
        self
    }

    /// Set the margin.
    pub fn with_margin(mut self, margin: Margin) -> Self {
        self.margin = Some(margin);
        self
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold.
    pub fn with_delta_phi_min(mut self, delta_phi_min: f64) -> Self {
        self.delta_phi_min = delta_phi_min;
        self
    }

    /// Enable or disable gradient updates.
    pub fn with_update_gradient(mut self, update_gradient: bool) -> Self {
        self.update_gradient = update_gradient;
        self
    }

    /// Set the interpolation order.
    pub fn with_interpolation(mut self, interpolation: InterpolationOrder) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Set the sampling implementation.
    pub fn with_sampler(mut self, sampler: SamplerBackend) -> Self {
        self.sampler = sampler;
        self
    }

    /// Enable or disable progress logging.
    pub fn with_display_progress(mut self, display_progress: bool) -> Self {
        self.display_progress = display_progress;
        self
    }

    /// Override the divergence heuristics.
    pub fn with_divergence(mut self, divergence: DivergenceThresholds) -> Self {
        self.divergence = divergence;
        self
    }
}

/// Settings of the coarse-to-fine driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiscaleConfig {
    /// Coarsest binning factor (power of two).
    pub bin_start: usize,
    /// Finest binning factor (power of two).
    pub bin_stop: usize,
    /// Keep going when a level does not converge.
    pub force_all_levels: bool,
    /// Per-level loop settings; the margin is given at full resolution.
    pub registration: RegistrationConfig,
}

impl Default for MultiscaleConfig {
    fn default() -> Self {
        Self {
            bin_start: 4,
            bin_stop: 1,
            force_all_levels: false,
            registration: RegistrationConfig {
                max_iterations: 100,
                delta_phi_min: 1e-4,
                ..RegistrationConfig::default()
            },
        }
    }
}

impl MultiscaleConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the binning range.
    pub fn with_binning(mut self, bin_start: usize, bin_stop: usize) -> Self {
        self.bin_start = bin_start;
        self.bin_stop = bin_stop;
        self
    }

    /// Continue through every level regardless of convergence.
    pub fn with_force_all_levels(mut self, force: bool) -> Self {
        self.force_all_levels = force;
        self
    }

    /// Set the per-level loop settings.
    pub fn with_registration(mut self, registration: RegistrationConfig) -> Self {
        self.registration = registration;
        self
    }
}

/// Prescribed total displacement of one nodal degree of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirichletCondition {
    /// Node index.
    pub node: usize,
    /// Axis (0 = Z, 1 = Y, 2 = X).
    pub axis: usize,
    /// Prescribed displacement.
    pub value: f64,
}

/// Settings of the mesh-based global correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalCorrelationConfig {
    /// Iteration budget.
    pub max_iterations: usize,
    /// Convergence threshold on the Euclidean norm of the increment.
    pub tolerance: f64,
    /// Interpolation order of the warped image.
    pub interpolation: InterpolationOrder,
    /// Constrained degrees of freedom.
    pub dirichlet: Vec<DirichletCondition>,
}

impl Default for GlobalCorrelationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-3,
            interpolation: InterpolationOrder::Linear,
            dirichlet: Vec::new(),
        }
    }
}

impl GlobalCorrelationConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Add a prescribed displacement.
    pub fn with_dirichlet(mut self, node: usize, axis: usize, value: f64) -> Self {
        self.dirichlet.push(DirichletCondition { node, axis, value });
        self
    }
}

/// Settings of the discrete integer search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSearchConfig {
    /// `[min, max]` offset of the reference origin inside the candidate, per axis (ZYX).
    pub search_range: [[i64; 2]; 3],
}

impl PixelSearchConfig {
    /// Search the given inclusive offset ranges.
    pub fn new(search_range: [[i64; 2]; 3]) -> Self {
        Self { search_range }
    }

    /// Search every offset that keeps the reference inside the candidate.
    pub fn exhaustive() -> Self {
        Self {
            search_range: [[0, i64::MAX]; 3],
        }
    }
}

impl Default for PixelSearchConfig {
    fn default() -> Self {
        Self::exhaustive()
    }
}
