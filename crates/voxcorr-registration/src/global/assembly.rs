//! Elementary and global systems of mesh correlation.
//!
//! Degrees of freedom are numbered `3 * node + axis`. For element `e` and
//! every labelled voxel where the reference, the warped image and the
//! reference gradient are finite:
//!
//! ```text
//! Me[3a + i][3b + j] += g_i g_j N_a N_b
//! Fe[3a + i]         += (im1 - im2def) N_a g_i
//! ```
//!
//! Constrained degrees of freedom are removed by static condensation: with
//! prescribed increments `d_c` the reduced system is
//! `K_ff d_f = F_f - K_fc d_c`.

use nalgebra::{DVector, SMatrix, SVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use rayon::prelude::*;
use voxcorr_core::{LabelVolume, Volume};

use super::mesh::Mesh;

pub type ElementMatrix = SMatrix<f64, 12, 12>;
pub type ElementVector = SVector<f64, 12>;

/// Contribution of one tetrahedron.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSystem {
    pub matrix: ElementMatrix,
    pub vector: ElementVector,
    pub voxels: usize,
}

/// Accumulate the elementary system of element `e`.
pub fn element_system(
    e: usize,
    mesh: &Mesh,
    labels: &LabelVolume,
    im1: &Volume,
    im2def: &Volume,
    gradient: &[Volume; 3],
) -> ElementSystem {
    let mut matrix = ElementMatrix::zeros();
    let mut vector = ElementVector::zeros();
    let mut voxels = 0;
    let bounds = mesh.bounding_box(e, labels.shape());

    for z in bounds[0].0..bounds[0].1 {
        for y in bounds[1].0..bounds[1].1 {
            for x in bounds[2].0..bounds[2].1 {
                if labels.element(z, y, x) != Some(e) {
                    continue;
                }
                let (f, g) = (im1.get(z, y, x), im2def.get(z, y, x));
                let grad = [
                    gradient[0].get(z, y, x),
                    gradient[1].get(z, y, x),
                    gradient[2].get(z, y, x),
                ];
                if !(f.is_finite() && g.is_finite()) || grad.iter().any(|v| !v.is_finite()) {
                    continue;
                }
                let n = mesh.shape_functions(e, [z as f64, y as f64, x as f64]);
                let mut jacobian = [0.0f64; 12];
                for a in 0..4 {
                    for i in 0..3 {
                        jacobian[3 * a + i] = n[a] * grad[i] as f64;
                    }
                }
                let residual = f as f64 - g as f64;
                for p in 0..12 {
                    vector[p] += jacobian[p] * residual;
                    for q in p..12 {
                        matrix[(p, q)] += jacobian[p] * jacobian[q];
                    }
                }
                voxels += 1;
            }
        }
    }
    for p in 0..12 {
        for q in 0..p {
            matrix[(p, q)] = matrix[(q, p)];
        }
    }
    ElementSystem {
        matrix,
        vector,
        voxels,
    }
}

/// Elementary systems of every element, computed in parallel.
pub fn element_systems(
    mesh: &Mesh,
    labels: &LabelVolume,
    im1: &Volume,
    im2def: &Volume,
    gradient: &[Volume; 3],
) -> Vec<ElementSystem> {
    (0..mesh.element_count())
        .into_par_iter()
        .map(|e| element_system(e, mesh, labels, im1, im2def, gradient))
        .collect()
}

/// Split of the degrees of freedom into free and prescribed ones.
#[derive(Debug, Clone, PartialEq)]
pub struct DofMap {
    reduced: Vec<Option<usize>>,
    prescribed: Vec<f64>,
    free: usize,
}

impl DofMap {
    /// `prescribed` lists `(dof, increment)` pairs; later entries win.
    pub fn new(dof_count: usize, prescribed: &[(usize, f64)]) -> Self {
        let mut constrained = vec![None; dof_count];
        for &(dof, value) in prescribed {
            constrained[dof] = Some(value);
        }
        let mut reduced = vec![None; dof_count];
        let mut values = vec![0.0; dof_count];
        let mut free = 0;
        for dof in 0..dof_count {
            match constrained[dof] {
                Some(value) => values[dof] = value,
                None => {
                    reduced[dof] = Some(free);
                    free += 1;
                }
            }
        }
        Self {
            reduced,
            prescribed: values,
            free,
        }
    }

    /// Number of unknowns of the reduced system.
    pub fn free_count(&self) -> usize {
        self.free
    }

    /// Reduced index of `dof`, `None` when it is prescribed.
    pub fn reduced_index(&self, dof: usize) -> Option<usize> {
        self.reduced[dof]
    }

    /// Scatter a reduced solution into a full increment vector.
    pub fn expand(&self, solution: &DVector<f64>) -> Vec<f64> {
        self.reduced
            .iter()
            .zip(&self.prescribed)
            .map(|(index, &value)| index.map_or(value, |k| solution[k]))
            .collect()
    }
}

/// Assemble the condensed global system `K_ff`, `F_f - K_fc d_c`.
pub fn assemble_reduced(
    mesh: &Mesh,
    systems: &[ElementSystem],
    dofs: &DofMap,
) -> (CscMatrix<f64>, DVector<f64>) {
    let n = dofs.free_count();
    let mut coo = CooMatrix::new(n, n);
    let mut rhs = DVector::zeros(n);

    // Explicit diagonal keeps the sparsity pattern complete for the factorisation.
    for k in 0..n {
        coo.push(k, k, 0.0);
    }

    for (element, system) in mesh.connectivity().iter().zip(systems) {
        let dof = |local: usize| 3 * element[local / 3] + local % 3;
        for p in 0..12 {
            let Some(row) = dofs.reduced_index(dof(p)) else {
                continue;
            };
            rhs[row] += system.vector[p];
            for q in 0..12 {
                let value = system.matrix[(p, q)];
                match dofs.reduced_index(dof(q)) {
                    Some(column) => coo.push(row, column, value),
                    None => rhs[row] -= value * dofs.prescribed[dof(q)],
                }
            }
        }
    }
    (CscMatrix::from(&coo), rhs)
}
