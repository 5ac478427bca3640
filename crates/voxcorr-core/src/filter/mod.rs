pub mod binning;
pub mod gradient;
pub mod pyramid;

pub use binning::{bin_mask, bin_volume, binned_shape, downsample, zoom_plane};
pub use gradient::{gradient_energy, GradientFilter};
pub use pyramid::{binning_schedule, nearest_power_of_two, PyramidLevel};
