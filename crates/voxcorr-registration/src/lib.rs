//! Gauss-Newton correlation of images and volumes.
//!
//! [`Registration`] fits a single 12-parameter operator, [`MultiscaleRegistration`]
//! drives it over a binning pyramid, [`pixel_search`] finds the best integer
//! offset by exhaustive correlation and [`global::GlobalCorrelation`] fits a
//! displacement field over a tetrahedral mesh.

pub mod config;
pub mod error;
pub mod global;
pub mod multiscale;
pub mod normal_equations;
pub mod pixel_search;
pub mod progress;
pub mod registration;
pub mod solver;
pub mod status;
pub mod validation;

pub use config::{
    DirichletCondition, DivergenceThresholds, GlobalCorrelationConfig, Margin, MultiscaleConfig,
    PixelSearchConfig, RegistrationConfig,
};
pub use error::{RegistrationError, Result};
pub use global::{global_correlation, GlobalCorrelation, Mesh, MeshCorrelationResult};
pub use multiscale::{LevelSummary, MultiscaleRegistration, MultiscaleResult};
pub use normal_equations::NormalEquations;
pub use pixel_search::{pixel_search, PixelSearchResult};
pub use progress::{
    HistoryObserver, IterationInfo, IterationObserver, ProgressTracker, TracingObserver,
};
pub use registration::{register, Registration, RegistrationResult};
pub use solver::{PhiSolver, SolveOutcome};
pub use status::ReturnStatus;
