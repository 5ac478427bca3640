//! Interpolation and resampling under a deformation operator.
//!
//! This module provides the [`Sampler`] strategy with a rayon scalar backend
//! and a burn tensor backend, plus the `apply_phi` entry points.

pub mod kernel;
pub mod scalar;
pub mod tensor;
pub mod trait_;

pub use scalar::ScalarSampler;
pub use tensor::TensorSampler;
pub use trait_::{
    apply_phi, apply_phi_region, InterpolationOrder, Sampler, SamplerBackend, SamplingGrid,
    BOUNDS_TOLERANCE,
};
