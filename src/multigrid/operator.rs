use super::{prolongation_matrix, schwarz_seeds, GmgLevel, GmgOptions, Smoother};
use crate::error::{DimensionMismatchError, GmgError};
use log::{debug, info};
use minrule_sparse::cg::LinearOperator;
use minrule_sparse::csr::{csr_mul_vector, csr_transpose_mul_vector};
use minrule_sparse::direct::CholeskySolver;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

#[derive(Debug)]
enum CoarseSolver {
    Direct(CholeskySolver<f64>),
    Recursive(Box<GmgOperator>),
}

impl CoarseSolver {
    fn direct(coarse_stiffness: &CsrMatrix<f64>) -> Result<Self, GmgError> {
        let solver = CholeskySolver::factor(coarse_stiffness).map_err(|_| GmgError::SingularCoarseMatrix)?;
        Ok(Self::Direct(solver))
    }

    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, GmgError> {
        match self {
            Self::Direct(solver) => Ok(solver.solve(rhs)),
            Self::Recursive(operator) => operator.apply_inverse(rhs),
        }
    }
}

/// Geometric multigrid approximation of the inverse of a fine stiffness matrix.
///
/// With smoother `S`, prolongation `P`, fine stiffness `A` and coarse correction
/// `C = P A_c^-1 P^T`, applying the operator to `x` computes
///
/// - `y = S x; y += C (x - A y)` with smoothing before the coarse solve,
/// - `y = C x + S x` otherwise,
///
/// followed by `y += S (x - A y)` if smoothing after the coarse solve is enabled.
/// `A_c = P^T A P` is solved directly on the coarsest pair of levels, and by a nested
/// operator for the remaining levels otherwise.
///
/// The operator stores only matrices: the levels it was built from need not outlive it.
#[derive(Debug)]
pub struct GmgOperator {
    options: GmgOptions,
    fine_stiffness: CsrMatrix<f64>,
    prolongation: CsrMatrix<f64>,
    coarse_stiffness: CsrMatrix<f64>,
    smoother_seeds: Vec<Vec<usize>>,
    smoother: Smoother,
    coarse_solver: CoarseSolver,
}

fn galerkin_product(fine_stiffness: &CsrMatrix<f64>, prolongation: &CsrMatrix<f64>) -> CsrMatrix<f64> {
    let ap = fine_stiffness * prolongation;
    &prolongation.transpose() * &ap
}

impl GmgOperator {
    /// Builds the operator for a hierarchy of levels, coarsest first. The fine stiffness matrix
    /// lives on the index space of the last level.
    pub fn new(levels: &[GmgLevel], fine_stiffness: CsrMatrix<f64>, options: GmgOptions) -> Result<Self, GmgError> {
        let n = levels.len();
        if n < 2 {
            return Err(GmgError::TooFewLevels(n));
        }
        for (index, level) in levels.iter().enumerate() {
            if level.dofs.is_condensed() != options.use_static_condensation {
                return Err(GmgError::CondensationMismatch { level: index });
            }
        }
        let (coarse, fine) = (&levels[n - 2], &levels[n - 1]);
        let fine_dofs = fine.dofs.global_dof_count();
        DimensionMismatchError::check("fine stiffness rows", fine_dofs, fine_stiffness.nrows())?;
        DimensionMismatchError::check("fine stiffness columns", fine_dofs, fine_stiffness.ncols())?;

        let prolongation = prolongation_matrix(coarse, fine)?;
        let coarse_stiffness = galerkin_product(&fine_stiffness, &prolongation);
        let coarse_solver = if n == 2 {
            CoarseSolver::direct(&coarse_stiffness)?
        } else {
            let nested = GmgOperator::new(&levels[..n - 1], coarse_stiffness.clone(), options.clone())?;
            CoarseSolver::Recursive(Box::new(nested))
        };
        let smoother_seeds = schwarz_seeds(options.smoother, fine.dofs)?;
        let smoother = Smoother::new(options.smoother, &fine_stiffness, &smoother_seeds, options.schwarz_overlap)?;
        info!(
            "built multigrid operator with {} levels: {} fine DOFs, {} coarse DOFs",
            n,
            fine_dofs,
            coarse_stiffness.nrows()
        );
        Ok(Self {
            options,
            fine_stiffness,
            prolongation,
            coarse_stiffness,
            smoother_seeds,
            smoother,
            coarse_solver,
        })
    }

    pub fn options(&self) -> &GmgOptions {
        &self.options
    }

    pub fn dim(&self) -> usize {
        self.fine_stiffness.nrows()
    }

    /// Replaces the fine stiffness matrix, recomputing the coarse matrices and smoothers of
    /// all levels. The prolongation operators are kept.
    pub fn set_fine_stiffness_matrix(&mut self, fine_stiffness: CsrMatrix<f64>) -> Result<(), GmgError> {
        DimensionMismatchError::check("fine stiffness rows", self.dim(), fine_stiffness.nrows())?;
        DimensionMismatchError::check("fine stiffness columns", self.dim(), fine_stiffness.ncols())?;
        let coarse_stiffness = galerkin_product(&fine_stiffness, &self.prolongation);
        if let CoarseSolver::Recursive(nested) = &mut self.coarse_solver {
            nested.set_fine_stiffness_matrix(coarse_stiffness.clone())?;
        } else {
            self.coarse_solver = CoarseSolver::direct(&coarse_stiffness)?;
        }
        self.smoother = Smoother::new(
            self.options.smoother,
            &fine_stiffness,
            &self.smoother_seeds,
            self.options.schwarz_overlap,
        )?;
        self.coarse_stiffness = coarse_stiffness;
        self.fine_stiffness = fine_stiffness;
        debug!("updated multigrid stiffness matrices");
        Ok(())
    }

    /// Overrides the diagonal used by a point Jacobi smoother on the finest level.
    pub fn set_stiffness_diagonal(&mut self, diagonal: &DVector<f64>) -> Result<(), GmgError> {
        DimensionMismatchError::check("stiffness diagonal", self.dim(), diagonal.len())?;
        self.smoother.set_diagonal(diagonal);
        Ok(())
    }

    /// Enables or disables smoothing before the coarse solve on every level.
    pub fn set_smooth_before_coarse_solve(&mut self, smooth: bool) {
        self.options.smooth_before_coarse_solve = smooth;
        if let CoarseSolver::Recursive(nested) = &mut self.coarse_solver {
            nested.set_smooth_before_coarse_solve(smooth);
        }
    }

    /// Enables or disables smoothing after the coarse solve on every level.
    pub fn set_smooth_after_coarse_solve(&mut self, smooth: bool) {
        self.options.smooth_after_coarse_solve = smooth;
        if let CoarseSolver::Recursive(nested) = &mut self.coarse_solver {
            nested.set_smooth_after_coarse_solve(smooth);
        }
    }

    fn coarse_correction(&self, residual: &DVector<f64>) -> Result<DVector<f64>, GmgError> {
        let restricted = csr_transpose_mul_vector(&self.prolongation, residual);
        let coarse_solution = self.coarse_solver.solve(&restricted)?;
        Ok(csr_mul_vector(&self.prolongation, &coarse_solution))
    }

    fn residual(&self, x: &DVector<f64>, y: &DVector<f64>) -> DVector<f64> {
        x - csr_mul_vector(&self.fine_stiffness, y)
    }

    /// Applies the multigrid approximation of `A^-1` to `x`.
    pub fn apply_inverse(&self, x: &DVector<f64>) -> Result<DVector<f64>, GmgError> {
        DimensionMismatchError::check("multigrid operand", self.dim(), x.len())?;
        let mut y = if self.options.smooth_before_coarse_solve {
            let mut y = self.smoother.apply(x);
            let residual = self.residual(x, &y);
            y += self.coarse_correction(&residual)?;
            y
        } else {
            self.coarse_correction(x)? + self.smoother.apply(x)
        };
        if self.options.smooth_after_coarse_solve {
            let residual = self.residual(x, &y);
            y += self.smoother.apply(&residual);
        }
        Ok(y)
    }

    /// The dense matrix of [`apply_inverse`](Self::apply_inverse), one column per unit vector.
    pub fn matrix_representation(&self) -> Result<DMatrix<f64>, GmgError> {
        let n = self.dim();
        let mut matrix = DMatrix::zeros(n, n);
        for j in 0..n {
            let mut unit = DVector::zeros(n);
            unit[j] = 1.0;
            let column = self.apply_inverse(&unit)?;
            matrix.set_column(j, &column);
        }
        Ok(matrix)
    }

    /// The prolongation from the next coarser level.
    pub fn prolongation_operator(&self) -> &CsrMatrix<f64> {
        &self.prolongation
    }

    /// The Galerkin coarse matrix `P^T A P`.
    pub fn coarse_stiffness_matrix(&self) -> &CsrMatrix<f64> {
        &self.coarse_stiffness
    }

    pub fn fine_stiffness_matrix(&self) -> &CsrMatrix<f64> {
        &self.fine_stiffness
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    pub fn smoother_as_matrix(&self) -> DMatrix<f64> {
        self.smoother.to_matrix(self.dim())
    }

    /// The operator of the next coarser pair of levels, if there are more than two levels.
    pub fn coarse_operator(&self) -> Option<&GmgOperator> {
        match &self.coarse_solver {
            CoarseSolver::Direct(_) => None,
            CoarseSolver::Recursive(nested) => Some(nested),
        }
    }
}

impl LinearOperator<f64> for GmgOperator {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let result = self.apply_inverse(&x.clone_owned())?;
        y.copy_from(&result);
        Ok(())
    }
}
