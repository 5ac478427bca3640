pub mod error;
pub mod filter;
pub mod interpolation;
pub mod transform;
pub mod volume;

pub use error::{CoreError, Result};
pub use interpolation::{apply_phi, apply_phi_region, InterpolationOrder, Sampler, SamplerBackend};
pub use transform::{Phi, PhiComponents};
pub use volume::{LabelVolume, Mask, Region, Volume};
