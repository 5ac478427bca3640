//! Volume containers.
//!
//! Volumes, masks and label volumes share the same row-major ZYX layout.
//! A 2D image is a volume whose Z extent is one.

pub mod labels;
pub mod mask;
pub mod region;
#[allow(clippy::module_inception)]
pub mod volume;

pub use labels::LabelVolume;
pub use mask::Mask;
pub use region::Region;
pub use volume::Volume;
