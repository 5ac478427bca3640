//! Linearised least-squares system of the 12-parameter operator.
//!
//! For parameter `m = 4 * i + j` (gradient component `i` in Z, Y, X and
//! coordinate `j` in `z - cz`, `y - cy`, `x - cx`, `1`) the per-voxel Jacobian
//! is `J_m = g_i * x_j`. Over every voxel where the reference, the deformed
//! moving image and the gradient are all finite:
//!
//! ```text
//! M[p][q] += J_p J_q
//! A[p]    += J_p (im1 - im2def)
//! ```
//!
//! `M` only depends on the gradient, so with a static gradient it is built
//! once and only `A` is refreshed afterwards.

use nalgebra::{SMatrix, SVector};
use rayon::prelude::*;
use voxcorr_core::transform::PHI_PARAMETERS;
use voxcorr_core::{Region, Volume};

use crate::error::{RegistrationError, Result};

pub type Matrix12 = SMatrix<f64, PHI_PARAMETERS, PHI_PARAMETERS>;
pub type Vector12 = SVector<f64, PHI_PARAMETERS>;

/// The pair `(M, A)` owned by one registration call.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    m: Matrix12,
    a: Vector12,
    voxels: usize,
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalEquations {
    /// An empty system.
    pub fn new() -> Self {
        Self {
            m: Matrix12::zeros(),
            a: Vector12::zeros(),
            voxels: 0,
        }
    }

    /// The 12x12 matrix `M`.
    pub fn matrix(&self) -> &Matrix12 {
        &self.m
    }

    /// The 12-vector `A`.
    pub fn vector(&self) -> &Vector12 {
        &self.a
    }

    /// Number of voxels accumulated by the last rebuild.
    pub fn voxels(&self) -> usize {
        self.voxels
    }

    /// Recompute both `M` and `A`.
    pub fn rebuild_full(
        &mut self,
        im1: &Volume,
        im2def: &Volume,
        gradient: &[Volume; 3],
    ) -> Result<()> {
        check_shapes(im1, im2def, gradient)?;
        let (m, a, voxels) = accumulate(im1, im2def, gradient, true);
        self.m = m;
        self.a = a;
        self.voxels = voxels;
        Ok(())
    }

    /// Recompute `A` only, keeping the cached `M`.
    pub fn rebuild_residual_only(
        &mut self,
        im1: &Volume,
        im2def: &Volume,
        gradient: &[Volume; 3],
    ) -> Result<()> {
        check_shapes(im1, im2def, gradient)?;
        let (_, a, voxels) = accumulate(im1, im2def, gradient, false);
        self.a = a;
        self.voxels = voxels;
        Ok(())
    }
}

/// Sum of squared residuals over voxels finite in both crops.
pub fn residual_sum_of_squares(im1: &Volume, im2def: &Volume) -> f64 {
    im1.data()
        .par_iter()
        .zip(im2def.data().par_iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| {
            let r = a as f64 - b as f64;
            r * r
        })
        .sum()
}

fn check_shapes(im1: &Volume, im2def: &Volume, gradient: &[Volume; 3]) -> Result<()> {
    let expected = im1.shape();
    for other in std::iter::once(im2def).chain(gradient.iter()) {
        if other.shape() != expected {
            return Err(RegistrationError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: other.shape().to_vec(),
            });
        }
    }
    Ok(())
}

fn accumulate(
    im1: &Volume,
    im2def: &Volume,
    gradient: &[Volume; 3],
    with_matrix: bool,
) -> (Matrix12, Vector12, usize) {
    let [nz, ny, nx] = im1.shape();
    let centre = Region::full(im1.shape()).centre();
    let (f, g) = (im1.data(), im2def.data());
    let (gz, gy, gx) = (gradient[0].data(), gradient[1].data(), gradient[2].data());

    let (mut m, a, voxels) = (0..nz * ny)
        .into_par_iter()
        .fold(
            || (Matrix12::zeros(), Vector12::zeros(), 0usize),
            |(mut m, mut a, mut voxels), row| {
                let z = (row / ny) as f64 - centre[0];
                let y = (row % ny) as f64 - centre[1];
                for ix in 0..nx {
                    let at = row * nx + ix;
                    let grad = [gz[at], gy[at], gx[at]];
                    if !(f[at].is_finite() && g[at].is_finite())
                        || grad.iter().any(|v| !v.is_finite())
                    {
                        continue;
                    }
                    let coords = [z, y, ix as f64 - centre[2], 1.0];
                    let mut jacobian = [0.0f64; PHI_PARAMETERS];
                    for i in 0..3 {
                        for j in 0..4 {
                            jacobian[4 * i + j] = grad[i] as f64 * coords[j];
                        }
                    }
                    let residual = f[at] as f64 - g[at] as f64;
                    for p in 0..PHI_PARAMETERS {
                        a[p] += jacobian[p] * residual;
                        if with_matrix {
                            for q in p..PHI_PARAMETERS {
                                m[(p, q)] += jacobian[p] * jacobian[q];
                            }
                        }
                    }
                    voxels += 1;
                }
                (m, a, voxels)
            },
        )
        .reduce(
            || (Matrix12::zeros(), Vector12::zeros(), 0usize),
            |(m1, a1, n1), (m2, a2, n2)| (m1 + m2, a1 + a2, n1 + n2),
        );

    if with_matrix {
        for p in 0..PHI_PARAMETERS {
            for q in 0..p {
                m[(p, q)] = m[(q, p)];
            }
        }
    }
    (m, a, voxels)
}
