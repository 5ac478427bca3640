//! Solving the normal equations and composing the increment.

use nalgebra::{DMatrix, DVector};
use voxcorr_core::transform::{PHI_PARAMETERS, PLANAR_PARAMETERS};
use voxcorr_core::Phi;

use crate::normal_equations::NormalEquations;

/// Relative pivot size below which `M` is treated as singular.
pub const SINGULAR_PIVOT_RATIO: f64 = 1e-12;

/// Result of one solver step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveOutcome {
    /// The system was solved; `phi` already includes the increment.
    Updated { phi: Phi, norm: f64 },
    /// `M` could not be inverted.
    Singular,
}

/// Solves `M delta = A` and applies `Phi <- Phi (I + delta)`.
///
/// In rigid mode the increment is reduced to its rotation and translation
/// before composing, and the norm is taken over that rigid increment. For a
/// single-slice image only the six in-plane parameters enter the solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiSolver {
    rigid: bool,
    planar: bool,
}

impl PhiSolver {
    pub fn new(rigid: bool, planar: bool) -> Self {
        Self { rigid, planar }
    }

    /// Parameters that take part in the solve.
    pub fn active_parameters(&self) -> Vec<usize> {
        if self.planar {
            PLANAR_PARAMETERS.to_vec()
        } else {
            (0..PHI_PARAMETERS).collect()
        }
    }

    /// Solve for the twelve parameters; excluded ones come back as zero.
    pub fn solve(&self, equations: &NormalEquations) -> Option<[f64; PHI_PARAMETERS]> {
        let active = self.active_parameters();
        let n = active.len();
        let m = DMatrix::from_fn(n, n, |r, c| equations.matrix()[(active[r], active[c])]);
        let a = DVector::from_fn(n, |r, _| equations.vector()[active[r]]);

        let lu = m.lu();
        let u = lu.u();
        let pivots = u.diagonal().map(f64::abs);
        let largest = pivots.max();
        if !(largest > 0.0) || pivots.min() <= SINGULAR_PIVOT_RATIO * largest {
            return None;
        }
        let solution = lu.solve(&a)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let mut delta = [0.0; PHI_PARAMETERS];
        for (k, &p) in active.iter().enumerate() {
            delta[p] = solution[k];
        }
        Some(delta)
    }

    /// Increment operator and its convergence norm for a solved `delta`.
    pub fn increment(&self, delta: &[f64; PHI_PARAMETERS]) -> (Phi, f64) {
        let increment = Phi::from_increment(delta);
        if self.rigid {
            let mut rigid = increment.rigid_part();
            if self.planar {
                rigid = rigid.restrict_to_plane();
            }
            let norm = rigid
                .increment_parameters()
                .iter()
                .map(|v| v * v)
                .sum::<f64>()
                .sqrt();
            (rigid, norm)
        } else {
            let norm = delta.iter().map(|v| v * v).sum::<f64>().sqrt();
            (increment, norm)
        }
    }

    /// Solve, then compose the increment onto `phi`.
    pub fn step(&self, phi: &Phi, equations: &NormalEquations) -> SolveOutcome {
        match self.solve(equations) {
            Some(delta) => {
                let (increment, norm) = self.increment(&delta);
                let mut updated = phi.compose(&increment);
                if self.planar {
                    updated = updated.restrict_to_plane();
                }
                SolveOutcome::Updated { phi: updated, norm }
            }
            None => SolveOutcome::Singular,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxcorr_core::filter::GradientFilter;
    use voxcorr_core::Volume;

    fn textured(shape: [usize; 3]) -> Volume {
        Volume::from_fn(shape, |z, y, x| {
            let (z, y, x) = (z as f32, y as f32, x as f32);
            (0.7 * x + 0.3 * y).sin() + (0.5 * y - 0.4 * z).cos() + (0.6 * z + 0.2 * x).sin()
        })
    }

    #[test]
    fn test_uniform_image_is_singular() {
        let im = Volume::filled([6, 6, 6], 3.0);
        let gradient = GradientFilter::new().apply(&im);
        let mut ne = NormalEquations::new();
        ne.rebuild_full(&im, &im, &gradient).unwrap();
        let solver = PhiSolver::new(false, false);
        assert!(solver.solve(&ne).is_none());
        assert_eq!(solver.step(&Phi::identity(), &ne), SolveOutcome::Singular);
    }

    #[test]
    fn test_planar_solve_is_not_singular() {
        let im = textured([1, 16, 16]);
        let gradient = GradientFilter::new().apply(&im);
        let mut ne = NormalEquations::new();
        ne.rebuild_full(&im, &im, &gradient).unwrap();
        assert!(PhiSolver::new(false, false).solve(&ne).is_none());
        let delta = PhiSolver::new(false, true).solve(&ne).unwrap();
        for p in [0, 1, 2, 3, 4, 8] {
            assert_eq!(delta[p], 0.0);
        }
    }

    #[test]
    fn test_rigid_increment_drops_stretch() {
        let mut delta = [0.0; PHI_PARAMETERS];
        delta[0] = 0.1;
        delta[3] = 0.5;
        let (rigid, norm) = PhiSolver::new(true, false).increment(&delta);
        assert!((rigid.linear() - nalgebra::Matrix3::identity()).norm() < 1e-12);
        assert!((norm - 0.5).abs() < 1e-12);

        let (general, norm) = PhiSolver::new(false, false).increment(&delta);
        assert_eq!(general.matrix()[(0, 0)], 1.1);
        assert!((norm - (0.01f64 + 0.25).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_step_composes_on_the_right() {
        let im = textured([8, 8, 8]);
        let gradient = GradientFilter::new().apply(&im);
        let mut ne = NormalEquations::new();
        ne.rebuild_full(&im, &im, &gradient).unwrap();
        let phi = Phi::from_translation([1.0, 0.0, 0.0]);
        match PhiSolver::new(false, false).step(&phi, &ne) {
            SolveOutcome::Updated { phi: updated, norm } => {
                assert!(norm < 1e-9);
                assert!((updated.matrix() - phi.matrix()).norm() < 1e-9);
            }
            SolveOutcome::Singular => panic!("textured volume must be solvable"),
        }
    }
}
