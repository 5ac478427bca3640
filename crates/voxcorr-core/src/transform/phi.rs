//! The homogeneous deformation operator.
//!
//! `Phi` maps reference coordinates to moving coordinates about a centre `c`:
//!
//! ```text
//! x' = c + F (x - c) + t
//! ```
//!
//! where `F` is the top-left 3x3 block and `t` the last column. All axes are
//! ordered (Z, Y, X), so row/column 0 is the out-of-plane axis of a 2D image.

use nalgebra::{Matrix3, Matrix4, RowVector4, Vector3, Vector4};

use crate::error::{CoreError, Result};

/// Number of free parameters of a `Phi` (the top three rows).
pub const PHI_PARAMETERS: usize = 12;

/// Parameter indices that stay meaningful for a single-slice image.
///
/// Parameter `4 * i + j` is entry `(i, j)` of the operator; these are the
/// Y and X rows restricted to the Y, X and translation columns.
pub const PLANAR_PARAMETERS: [usize; 6] = [5, 6, 7, 9, 10, 11];

/// 4x4 homogeneous deformation operator with bottom row `[0, 0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phi {
    matrix: Matrix4<f64>,
}

impl Default for Phi {
    fn default() -> Self {
        Self::identity()
    }
}

impl Phi {
    /// The identity operator.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// A pure translation (ZYX).
    pub fn from_translation(translation: [f64; 3]) -> Self {
        let mut matrix = Matrix4::identity();
        for axis in 0..3 {
            matrix[(axis, 3)] = translation[axis];
        }
        Self { matrix }
    }

    /// Assemble an operator from a linear part and a translation.
    pub fn from_parts(linear: Matrix3<f64>, translation: [f64; 3]) -> Self {
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        for axis in 0..3 {
            matrix[(axis, 3)] = translation[axis];
        }
        Self { matrix }
    }

    /// Wrap a 4x4 matrix, rejecting anything whose bottom row is not `[0, 0, 0, 1]`.
    pub fn try_from_matrix(matrix: Matrix4<f64>) -> Result<Self> {
        let bottom = matrix.row(3);
        if bottom != RowVector4::new(0.0, 0.0, 0.0, 1.0) {
            return Err(CoreError::invalid_shape(format!(
                "deformation operator bottom row must be [0, 0, 0, 1], got {:?}",
                [bottom[0], bottom[1], bottom[2], bottom[3]]
            )));
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::invalid_shape(
                "deformation operator contains non-finite entries",
            ));
        }
        Ok(Self { matrix })
    }

    /// Build the increment `I + delta` from twelve parameters, `delta[4 * i + j] -> (i, j)`.
    pub fn from_increment(delta: &[f64; PHI_PARAMETERS]) -> Self {
        let mut matrix = Matrix4::identity();
        for (m, value) in delta.iter().enumerate() {
            matrix[(m / 4, m % 4)] += value;
        }
        Self { matrix }
    }

    /// The underlying 4x4 matrix.
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    /// The 3x3 linear part `F`.
    pub fn linear(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// The translation column `t` (ZYX).
    pub fn translation(&self) -> [f64; 3] {
        [self.matrix[(0, 3)], self.matrix[(1, 3)], self.matrix[(2, 3)]]
    }

    /// Replace the translation column.
    pub fn with_translation(mut self, translation: [f64; 3]) -> Self {
        for axis in 0..3 {
            self.matrix[(axis, 3)] = translation[axis];
        }
        self
    }

    /// Multiply the translation column by `factor` (used between binning levels).
    pub fn scale_translation(self, factor: f64) -> Self {
        let t = self.translation();
        self.with_translation([t[0] * factor, t[1] * factor, t[2] * factor])
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Phi) -> Phi {
        Phi {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Matrix inverse, failing for a singular linear part.
    pub fn try_inverse(&self) -> Result<Phi> {
        let inverse = self
            .matrix
            .try_inverse()
            .ok_or(CoreError::NonInvertibleOperator)?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::NonInvertibleOperator);
        }
        Ok(Phi { matrix: inverse })
    }

    /// True when the linear part has a non-zero, finite determinant.
    pub fn is_invertible(&self) -> bool {
        let det = self.linear().determinant();
        det.is_finite() && det != 0.0
    }

    /// Map a point (ZYX) about `centre`.
    pub fn transform_point(&self, point: [f64; 3], centre: [f64; 3]) -> [f64; 3] {
        let local = Vector4::new(
            point[0] - centre[0],
            point[1] - centre[1],
            point[2] - centre[2],
            1.0,
        );
        let mapped = self.matrix * local;
        [
            mapped[0] + centre[0],
            mapped[1] + centre[1],
            mapped[2] + centre[2],
        ]
    }

    /// The rotation-plus-translation part: `F` is replaced by its closest rotation.
    pub fn rigid_part(&self) -> Phi {
        let rotation = closest_rotation(&self.linear());
        Phi::from_parts(rotation, self.translation())
    }

    /// Reset row and column Z to the identity so no out-of-plane motion survives.
    pub fn restrict_to_plane(mut self) -> Self {
        for k in 0..4 {
            self.matrix[(0, k)] = 0.0;
            self.matrix[(k, 0)] = 0.0;
        }
        self.matrix[(0, 0)] = 1.0;
        self.matrix[(3, 3)] = 1.0;
        self
    }

    /// The twelve free parameters of `self - I`.
    pub fn increment_parameters(&self) -> [f64; PHI_PARAMETERS] {
        let mut delta = [0.0; PHI_PARAMETERS];
        for (m, value) in delta.iter_mut().enumerate() {
            let (i, j) = (m / 4, m % 4);
            *value = self.matrix[(i, j)] - if i == j { 1.0 } else { 0.0 };
        }
        delta
    }

    /// Entries as nested rows, for display and logging.
    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = self.matrix[(i, j)];
            }
        }
        rows
    }
}

/// Closest proper rotation to `f` in the Frobenius sense (`W V^T` from the SVD).
pub(crate) fn closest_rotation(f: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = f.svd(true, true);
    let (Some(mut w), Some(v_t)) = (svd.u, svd.v_t) else {
        return Matrix3::identity();
    };
    let mut rotation = w * v_t;
    if rotation.determinant() < 0.0 {
        // Flip the axis of the smallest singular value.
        let smallest = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(2);
        let flipped: Vector3<f64> = -w.column(smallest).into_owned();
        w.set_column(smallest, &flipped);
        rotation = w * v_t;
    }
    rotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{} vs {}", a, b);
    }

    #[test]
    fn test_try_from_matrix_rejects_bottom_row() {
        let mut m = Matrix4::identity();
        m[(3, 0)] = 0.5;
        assert!(Phi::try_from_matrix(m).is_err());
        assert!(Phi::try_from_matrix(Matrix4::identity()).is_ok());
    }

    #[test]
    fn test_transform_point_about_centre() {
        let linear = Matrix3::from_diagonal(&Vector3::new(1.0, 2.0, 1.0));
        let phi = Phi::from_parts(linear, [0.0, 0.5, -1.0]);
        let p = phi.transform_point([3.0, 6.0, 4.0], [3.0, 5.0, 5.0]);
        assert_close(p[0], 3.0, 1e-12);
        assert_close(p[1], 7.5, 1e-12);
        assert_close(p[2], 3.0, 1e-12);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let rot = Rotation3::new(Vector3::new(0.1, -0.2, 0.05)).into_inner();
        let phi = Phi::from_parts(rot * 1.1, [1.0, -2.0, 0.5]);
        let id = phi.compose(&phi.try_inverse().unwrap());
        assert!((id.matrix() - Matrix4::identity()).norm() < 1e-12);
    }

    #[test]
    fn test_singular_has_no_inverse() {
        let phi = Phi::from_parts(Matrix3::zeros(), [0.0; 3]);
        assert!(phi.try_inverse().is_err());
        assert!(!phi.is_invertible());
    }

    #[test]
    fn test_increment_layout() {
        let mut delta = [0.0; PHI_PARAMETERS];
        delta[3] = 2.0;
        delta[6] = 0.1;
        let phi = Phi::from_increment(&delta);
        assert_eq!(phi.translation(), [2.0, 0.0, 0.0]);
        assert_eq!(phi.matrix()[(1, 2)], 0.1);
        assert_eq!(phi.increment_parameters(), delta);
    }

    #[test]
    fn test_rigid_part_drops_stretch() {
        let rot = Rotation3::new(Vector3::new(0.0, 0.0, 0.3)).into_inner();
        let stretch = Matrix3::from_diagonal(&Vector3::new(1.2, 0.9, 1.0));
        let phi = Phi::from_parts(rot * stretch, [1.0, 2.0, 3.0]);
        let rigid = phi.rigid_part();
        assert!((rigid.linear() - rot).norm() < 1e-9);
        assert_eq!(rigid.translation(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_restrict_to_plane() {
        let mut m = Matrix4::identity();
        m[(0, 1)] = 0.3;
        m[(2, 0)] = 0.2;
        m[(0, 3)] = 4.0;
        m[(1, 3)] = 1.5;
        let phi = Phi::try_from_matrix(m).unwrap().restrict_to_plane();
        assert_eq!(phi.translation(), [0.0, 1.5, 0.0]);
        assert_eq!(phi.matrix().row(0), Matrix4::<f64>::identity().row(0));
        assert_eq!(phi.matrix().column(0), Matrix4::<f64>::identity().column(0));
    }
}
