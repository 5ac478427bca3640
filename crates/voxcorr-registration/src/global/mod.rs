//! Mesh-based global correlation.
//!
//! Instead of one 12-parameter operator, the displacement is a linear field
//! over a tetrahedral mesh and every node carries three unknowns. The
//! iteration follows the single-operator loop: warp, assemble, solve,
//! accumulate, test the increment norm.

pub mod assembly;
pub mod correlation;
pub mod mesh;

pub use assembly::{DofMap, ElementSystem};
pub use correlation::{global_correlation, GlobalCorrelation, MeshCorrelationResult};
pub use mesh::{box_mesh, label_tetrahedra, warp_by_mesh, Mesh};
