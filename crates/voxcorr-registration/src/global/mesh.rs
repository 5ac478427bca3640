//! Tetrahedral meshes, voxel labelling and mesh-driven warping.
//!
//! Coordinates are voxel positions in ZYX order. Inside element `e` the
//! linear shape functions are the barycentric coordinates of the point:
//! with `P` the 4x4 matrix whose rows are `[1, z_a, y_a, x_a]`, the
//! coefficients `C = P^-1` give `N_a(z, y, x) = [1, z, y, x] . C[.., a]` and
//! the constant spatial gradient `dN_a / dx_k = C[k + 1, a]`.

use nalgebra::{Matrix4, Vector4};
use rayon::prelude::*;
use voxcorr_core::interpolation::ScalarSampler;
use voxcorr_core::{InterpolationOrder, LabelVolume, Volume};

use crate::error::{RegistrationError, Result};

/// Elements with `|det P| / 6` below this are rejected.
const MIN_ELEMENT_VOLUME: f64 = 1e-9;
/// Slack on barycentric coordinates when testing containment.
const CONTAINMENT_TOLERANCE: f64 = 1e-9;

/// Linear tetrahedral mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    nodes: Vec<[f64; 3]>,
    connectivity: Vec<[usize; 4]>,
    coefficients: Vec<Matrix4<f64>>,
}

impl Mesh {
    /// Validate and wrap node coordinates and element connectivity.
    pub fn new(nodes: Vec<[f64; 3]>, connectivity: Vec<[usize; 4]>) -> Result<Self> {
        if connectivity.is_empty() {
            return Err(RegistrationError::mesh("mesh has no element"));
        }
        let mut coefficients = Vec::with_capacity(connectivity.len());
        for (e, element) in connectivity.iter().enumerate() {
            if let Some(&node) = element.iter().find(|&&n| n >= nodes.len()) {
                return Err(RegistrationError::mesh(format!(
                    "element {} references node {} of {}",
                    e,
                    node,
                    nodes.len()
                )));
            }
            let p = Matrix4::from_fn(|a, k| if k == 0 { 1.0 } else { nodes[element[a]][k - 1] });
            if !(p.determinant().abs() / 6.0 > MIN_ELEMENT_VOLUME) {
                return Err(RegistrationError::mesh(format!("element {} is degenerate", e)));
            }
            let c = p
                .try_inverse()
                .ok_or_else(|| RegistrationError::mesh(format!("element {} is degenerate", e)))?;
            coefficients.push(c);
        }
        Ok(Self {
            nodes,
            connectivity,
            coefficients,
        })
    }

    pub fn nodes(&self) -> &[[f64; 3]] {
        &self.nodes
    }

    pub fn connectivity(&self) -> &[[usize; 4]] {
        &self.connectivity
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn element_count(&self) -> usize {
        self.connectivity.len()
    }

    /// Three degrees of freedom per node.
    pub fn dof_count(&self) -> usize {
        3 * self.nodes.len()
    }

    /// Shape function values of element `e` at `point`.
    #[inline]
    pub fn shape_functions(&self, e: usize, point: [f64; 3]) -> [f64; 4] {
        let q = Vector4::new(1.0, point[0], point[1], point[2]);
        let n = self.coefficients[e].transpose() * q;
        [n[0], n[1], n[2], n[3]]
    }

    /// Spatial gradient `dN_a / dx_k` of element `e`, indexed `[a][k]`.
    pub fn shape_gradients(&self, e: usize) -> [[f64; 3]; 4] {
        let c = &self.coefficients[e];
        let mut g = [[0.0; 3]; 4];
        for (a, row) in g.iter_mut().enumerate() {
            for (k, v) in row.iter_mut().enumerate() {
                *v = c[(k + 1, a)];
            }
        }
        g
    }

    /// True when `point` lies inside element `e` (faces included).
    pub fn contains(&self, e: usize, point: [f64; 3]) -> bool {
        self.shape_functions(e, point)
            .iter()
            .all(|&n| n >= -CONTAINMENT_TOLERANCE)
    }

    /// Displacement interpolated inside element `e`.
    pub fn interpolate(&self, e: usize, point: [f64; 3], displacements: &[[f64; 3]]) -> [f64; 3] {
        let n = self.shape_functions(e, point);
        let mut u = [0.0; 3];
        for (a, &node) in self.connectivity[e].iter().enumerate() {
            for k in 0..3 {
                u[k] += n[a] * displacements[node][k];
            }
        }
        u
    }

    /// Voxel index range `[lo, hi)` per axis covering element `e` inside `shape`.
    pub fn bounding_box(&self, e: usize, shape: [usize; 3]) -> [(usize, usize); 3] {
        let mut bounds = [(0, 0); 3];
        for k in 0..3 {
            let coords = self.connectivity[e].map(|n| self.nodes[n][k]);
            let lo = coords.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = coords.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let lo = lo.ceil().max(0.0) as usize;
            let hi = ((hi.floor() + 1.0).max(0.0) as usize).min(shape[k]);
            bounds[k] = (lo.min(hi), hi);
        }
        bounds
    }
}

/// Assign every voxel of a `shape` grid to the first element containing it.
pub fn label_tetrahedra(shape: [usize; 3], mesh: &Mesh) -> LabelVolume {
    let [_, ny, nx] = shape;
    let mut labels = LabelVolume::empty(shape);
    if ny * nx == 0 {
        return labels;
    }
    let boxes: Vec<_> = (0..mesh.element_count())
        .map(|e| mesh.bounding_box(e, shape))
        .collect();

    labels
        .data_mut()
        .par_chunks_mut(ny * nx)
        .enumerate()
        .for_each(|(z, slice)| {
            for (e, bounds) in boxes.iter().enumerate() {
                if z < bounds[0].0 || z >= bounds[0].1 {
                    continue;
                }
                for y in bounds[1].0..bounds[1].1 {
                    for x in bounds[2].0..bounds[2].1 {
                        let label = &mut slice[y * nx + x];
                        if *label == 0 && mesh.contains(e, [z as f64, y as f64, x as f64]) {
                            *label = e as u32 + 1;
                        }
                    }
                }
            }
        });
    labels
}

/// Sample `volume` at `X + u(X)` for every labelled voxel `X`; NaN elsewhere.
pub fn warp_by_mesh(
    volume: &Volume,
    labels: &LabelVolume,
    mesh: &Mesh,
    displacements: &[[f64; 3]],
    order: InterpolationOrder,
) -> Result<Volume> {
    if displacements.len() != mesh.node_count() {
        return Err(RegistrationError::ShapeMismatch {
            expected: vec![mesh.node_count(), 3],
            actual: vec![displacements.len(), 3],
        });
    }
    if labels.max_element().is_some_and(|e| e >= mesh.element_count()) {
        return Err(RegistrationError::mesh(
            "labels reference an element outside the mesh",
        ));
    }
    Ok(Volume::from_fn(labels.shape(), |z, y, x| {
        match labels.element(z, y, x) {
            Some(e) => {
                let point = [z as f64, y as f64, x as f64];
                let u = mesh.interpolate(e, point, displacements);
                ScalarSampler::sample_at(
                    volume,
                    [point[0] + u[0], point[1] + u[1], point[2] + u[2]],
                    order,
                )
            }
            None => f32::NAN,
        }
    }))
}

/// Six tetrahedra filling the box between `origin` and `origin + size`.
///
/// Nodes are the eight corners, indexed `4 * bz + 2 * by + bx`. Every element
/// shares the main diagonal from corner 0 to corner 7.
pub fn box_mesh(origin: [f64; 3], size: [f64; 3]) -> Result<Mesh> {
    let mut nodes = Vec::with_capacity(8);
    for corner in 0..8usize {
        let bits = [(corner >> 2) & 1, (corner >> 1) & 1, corner & 1];
        nodes.push([
            origin[0] + bits[0] as f64 * size[0],
            origin[1] + bits[1] as f64 * size[1],
            origin[2] + bits[2] as f64 * size[2],
        ]);
    }
    let axis_bit = [4usize, 2, 1];
    let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let connectivity = permutations
        .iter()
        .map(|p| {
            let first = axis_bit[p[0]];
            let second = first + axis_bit[p[1]];
            [0, first, second, 7]
        })
        .collect();
    Mesh::new(nodes, connectivity)
}
