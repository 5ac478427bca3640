//! Newton iteration over nodal displacements.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;
use nalgebra_sparse::factorization::CscCholesky;
use voxcorr_core::filter::GradientFilter;
use voxcorr_core::{LabelVolume, Volume};

use super::assembly::{assemble_reduced, element_systems, DofMap};
use super::mesh::{label_tetrahedra, warp_by_mesh, Mesh};
use crate::config::GlobalCorrelationConfig;
use crate::error::{RegistrationError, Result};
use crate::normal_equations::residual_sum_of_squares;
use crate::progress::{IterationObserver, ProgressTracker};
use crate::status::ReturnStatus;
use crate::validation::{validate_iterations, validate_tolerance};

/// Outcome of a mesh correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshCorrelationResult {
    /// One ZYX displacement per node.
    pub displacements: Vec<[f64; 3]>,
    pub status: ReturnStatus,
    pub iterations: usize,
    /// Euclidean norm of the last increment.
    pub increment_norm: f64,
    /// Normalised error of the final displacements.
    pub error: f64,
}

impl MeshCorrelationResult {
    /// Integer status code.
    pub fn return_status(&self) -> i32 {
        self.status.code()
    }
}

/// Finite-element correlation of `im1` against `im2` on a tetrahedral mesh.
///
/// Seeks nodal displacements `u` such that `im1(X) ~ im2(X + u(X))` inside
/// the mesh, with `u` linear over every element.
#[derive(Clone)]
pub struct GlobalCorrelation {
    config: GlobalCorrelationConfig,
    initial_displacements: Option<Vec<[f64; 3]>>,
    observer: Option<Arc<dyn IterationObserver>>,
}

impl GlobalCorrelation {
    pub fn new(config: GlobalCorrelationConfig) -> Self {
        Self {
            config,
            initial_displacements: None,
            observer: None,
        }
    }

    /// Start from the given nodal displacements instead of zero.
    pub fn with_initial_displacements(mut self, displacements: Vec<[f64; 3]>) -> Self {
        self.initial_displacements = Some(displacements);
        self
    }

    /// Attach a progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn IterationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &GlobalCorrelationConfig {
        &self.config
    }

    /// Run the correlation. `labels` defaults to [`label_tetrahedra`] of the mesh.
    pub fn correlate(
        &self,
        im1: &Volume,
        im2: &Volume,
        mesh: &Mesh,
        labels: Option<&LabelVolume>,
    ) -> Result<MeshCorrelationResult> {
        let config = &self.config;
        validate_iterations(config.max_iterations)?;
        validate_tolerance("tolerance", config.tolerance)?;
        if im1.shape() != im2.shape() {
            return Err(RegistrationError::ShapeMismatch {
                expected: im1.shape().to_vec(),
                actual: im2.shape().to_vec(),
            });
        }
        if im1.is_planar() {
            return Err(RegistrationError::dimension_mismatch(
                "mesh correlation needs a 3D volume",
            ));
        }

        let computed;
        let labels = match labels {
            Some(labels) => labels,
            None => {
                computed = label_tetrahedra(im1.shape(), mesh);
                &computed
            }
        };
        if labels.shape() != im1.shape() {
            return Err(RegistrationError::ShapeMismatch {
                expected: im1.shape().to_vec(),
                actual: labels.shape().to_vec(),
            });
        }
        if labels.max_element().is_none() {
            return Err(RegistrationError::mesh("mesh covers no voxel of the volume"));
        }

        let mut displacements = match &self.initial_displacements {
            Some(initial) => initial.clone(),
            None => vec![[0.0; 3]; mesh.node_count()],
        };
        if displacements.len() != mesh.node_count() {
            return Err(RegistrationError::ShapeMismatch {
                expected: vec![mesh.node_count(), 3],
                actual: vec![displacements.len(), 3],
            });
        }
        for condition in &config.dirichlet {
            if condition.node >= mesh.node_count() || condition.axis > 2 {
                return Err(RegistrationError::invalid_configuration(format!(
                    "boundary condition on node {} axis {} is outside the mesh",
                    condition.node, condition.axis
                )));
            }
        }

        let gradient = GradientFilter::new().apply(im1);
        let normalisation = match inside_sum(im1, labels) {
            sum if sum == 0.0 => 1.0,
            sum => sum,
        };

        let mut tracker = ProgressTracker::with_observer(self.observer.clone());
        tracker.start();
        tracing::debug!(
            "mesh correlation: {} nodes, {} elements, {} constrained dofs",
            mesh.node_count(),
            mesh.element_count(),
            config.dirichlet.len()
        );

        let mut iteration = 0;
        let mut increment_norm = f64::INFINITY;
        let status = loop {
            iteration += 1;
            let im2def = warp_by_mesh(im2, labels, mesh, &displacements, config.interpolation)?;
            let error = residual_sum_of_squares(im1, &im2def) / normalisation;

            let systems = element_systems(mesh, labels, im1, &im2def, &gradient);
            let prescribed: Vec<(usize, f64)> = config
                .dirichlet
                .iter()
                .map(|c| (3 * c.node + c.axis, c.value - displacements[c.node][c.axis]))
                .collect();
            let dofs = DofMap::new(mesh.dof_count(), &prescribed);
            let (stiffness, rhs) = assemble_reduced(mesh, &systems, &dofs);

            let Some(solution) = solve_reduced(&stiffness, &rhs, iteration) else {
                break ReturnStatus::SingularMatrix;
            };

            let increment = dofs.expand(&solution);
            for (node, u) in displacements.iter_mut().enumerate() {
                for axis in 0..3 {
                    u[axis] += increment[3 * node + axis];
                }
            }
            increment_norm = increment.iter().map(|v| v * v).sum::<f64>().sqrt();

            tracing::debug!(
                "iteration {}: error {:.6}, |du| {:.3e}",
                iteration,
                error,
                increment_norm
            );
            tracker.update(&tracker.snapshot(
                iteration,
                config.max_iterations,
                error,
                increment_norm,
            ));

            if increment_norm <= config.tolerance {
                break ReturnStatus::Converged;
            }
            if iteration >= config.max_iterations {
                break ReturnStatus::MaxIterations;
            }
        };

        let im2def = warp_by_mesh(im2, labels, mesh, &displacements, config.interpolation)?;
        let error = residual_sum_of_squares(im1, &im2def) / normalisation;
        tracker.complete(
            status,
            &tracker.snapshot(iteration, config.max_iterations, error, increment_norm),
        );
        tracing::debug!(
            "mesh correlation finished: {} after {} iterations, error {:.6}",
            status,
            iteration,
            error
        );

        Ok(MeshCorrelationResult {
            displacements,
            status,
            iterations: iteration,
            increment_norm,
            error,
        })
    }
}

/// Correlate with the given settings, zero initial displacements and mesh-derived labels.
pub fn global_correlation(
    im1: &Volume,
    im2: &Volume,
    mesh: &Mesh,
    config: &GlobalCorrelationConfig,
) -> Result<MeshCorrelationResult> {
    GlobalCorrelation::new(config.clone()).correlate(im1, im2, mesh, None)
}

/// Sparse Cholesky solve of the reduced system; `None` when it is not positive definite.
fn solve_reduced(
    stiffness: &CscMatrix<f64>,
    rhs: &DVector<f64>,
    iteration: usize,
) -> Option<DVector<f64>> {
    if rhs.is_empty() {
        return Some(DVector::zeros(0));
    }
    let cholesky = match CscCholesky::factor(stiffness) {
        Ok(cholesky) => cholesky,
        Err(err) => {
            tracing::warn!(
                "global system not factorisable at iteration {}: {:?}",
                iteration,
                err
            );
            return None;
        }
    };
    let rhs = DMatrix::from_column_slice(rhs.len(), 1, rhs.as_slice());
    let solution = cholesky.solve(&rhs).column(0).into_owned();
    if solution.iter().any(|v| !v.is_finite()) {
        tracing::warn!("non-finite increment at iteration {}", iteration);
        return None;
    }
    Some(solution)
}

fn inside_sum(volume: &Volume, labels: &LabelVolume) -> f64 {
    volume
        .data()
        .iter()
        .zip(labels.data())
        .filter(|(v, l)| **l > 0 && v.is_finite())
        .map(|(&v, _)| v as f64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::mesh::box_mesh;

    fn texture(shape: [usize; 3]) -> Volume {
        Volume::from_fn(shape, |z, y, x| {
            let (z, y, x) = (z as f32, y as f32, x as f32);
            3.0 + (0.5 * x + 0.2 * z).sin() + (0.45 * y).cos() * (0.3 * x).cos() + (0.55 * z).sin()
        })
    }

    #[test]
    fn test_identical_volumes_converge_at_rest() {
        let im = texture([12, 12, 12]);
        let mesh = box_mesh([2.0, 2.0, 2.0], [7.0, 7.0, 7.0]).unwrap();
        let result =
            global_correlation(&im, &im, &mesh, &GlobalCorrelationConfig::default()).unwrap();
        assert_eq!(result.status, ReturnStatus::Converged);
        assert_eq!(result.iterations, 1);
        assert!(result.error < 1e-12);
        assert!(result.displacements.iter().flatten().all(|u| u.abs() < 1e-6));
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        let mesh = box_mesh([1.0, 1.0, 1.0], [3.0, 3.0, 3.0]).unwrap();
        let err = global_correlation(
            &texture([6, 6, 6]),
            &texture([6, 6, 7]),
            &mesh,
            &GlobalCorrelationConfig::default(),
        );
        assert!(matches!(err, Err(RegistrationError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_rejects_boundary_condition_outside_mesh() {
        let im = texture([6, 6, 6]);
        let mesh = box_mesh([1.0, 1.0, 1.0], [3.0, 3.0, 3.0]).unwrap();
        let config = GlobalCorrelationConfig::default().with_dirichlet(8, 0, 0.0);
        assert!(global_correlation(&im, &im, &mesh, &config).is_err());
    }

    #[test]
    fn test_mesh_outside_volume_is_rejected() {
        let im = texture([6, 6, 6]);
        let mesh = box_mesh([20.0, 20.0, 20.0], [3.0, 3.0, 3.0]).unwrap();
        let err = global_correlation(&im, &im, &mesh, &GlobalCorrelationConfig::default());
        assert!(matches!(err, Err(RegistrationError::Mesh(_))));
    }
}
