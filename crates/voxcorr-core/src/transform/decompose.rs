//! Polar decomposition of a [`Phi`] into physical components.
//!
//! The linear part is split as `F = R U` with `R` a rotation and `U`
//! the symmetric right stretch tensor `sqrt(F^T F)`. Zoom is the diagonal of
//! `U`, shear its off-diagonal terms and the volume change `det U`.

use nalgebra::{Matrix3, Rotation3, Vector3};

use super::phi::Phi;

/// Physical reading of a deformation operator. All vectors are ZYX.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhiComponents {
    /// Translation column.
    pub translation: [f64; 3],
    /// Rotation vector (axis times angle, radians).
    pub rotation: [f64; 3],
    /// Diagonal of the stretch tensor.
    pub zoom: [f64; 3],
    /// Off-diagonal stretch terms `(zy, zx, yx)`.
    pub shear: [f64; 3],
    /// `det U`, the local volume change ratio.
    pub volume_ratio: f64,
    /// Right stretch tensor `U`.
    pub stretch: Matrix3<f64>,
    /// Rotation matrix `R`.
    pub rotation_matrix: Matrix3<f64>,
}

impl Phi {
    /// Decompose into translation, rotation, zoom and shear.
    ///
    /// A singular linear part yields a zero volume ratio and an identity rotation.
    pub fn decompose(&self) -> PhiComponents {
        let f = self.linear();
        let stretch = right_stretch(&f);
        let rotation_matrix = stretch
            .try_inverse()
            .map(|inverse| f * inverse)
            .unwrap_or_else(Matrix3::identity);
        let rotation = Rotation3::from_matrix(&rotation_matrix).scaled_axis();
        let volume_ratio = stretch.determinant();

        PhiComponents {
            translation: self.translation(),
            rotation: [rotation[0], rotation[1], rotation[2]],
            zoom: [stretch[(0, 0)], stretch[(1, 1)], stretch[(2, 2)]],
            shear: [stretch[(0, 1)], stretch[(0, 2)], stretch[(1, 2)]],
            volume_ratio: if volume_ratio.is_finite() { volume_ratio } else { 0.0 },
            stretch,
            rotation_matrix,
        }
    }

    /// Rebuild an operator from translation, rotation vector, zoom and shear.
    pub fn from_components(
        translation: [f64; 3],
        rotation: [f64; 3],
        zoom: [f64; 3],
        shear: [f64; 3],
    ) -> Phi {
        let r = Rotation3::new(Vector3::new(rotation[0], rotation[1], rotation[2])).into_inner();
        let u = Matrix3::new(
            zoom[0], shear[0], shear[1], //
            shear[0], zoom[1], shear[2], //
            shear[1], shear[2], zoom[2],
        );
        Phi::from_parts(r * u, translation)
    }
}

/// `sqrt(F^T F)` through the symmetric eigen-decomposition.
fn right_stretch(f: &Matrix3<f64>) -> Matrix3<f64> {
    let eigen = (f.transpose() * f).symmetric_eigen();
    let roots = eigen.eigenvalues.map(|lambda| lambda.max(0.0).sqrt());
    eigen.eigenvectors * Matrix3::from_diagonal(&roots) * eigen.eigenvectors.transpose()
}
