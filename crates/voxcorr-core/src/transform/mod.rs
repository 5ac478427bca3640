//! Deformation operators.
//!
//! This module provides the 4x4 homogeneous operator `Phi` and its polar
//! decomposition into translation, rotation, zoom and shear.

pub mod decompose;
pub mod phi;

pub use decompose::PhiComponents;
pub use phi::{Phi, PHI_PARAMETERS, PLANAR_PARAMETERS};
