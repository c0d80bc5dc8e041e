//! Direct sparse solvers.
use crate::cg::LinearOperator;
use core::fmt;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, RealField};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use std::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DirectSolveError {
    NotSquare { nrows: usize, ncols: usize },
    NotPositiveDefinite,
}

impl fmt::Display for DirectSolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSquare { nrows, ncols } => {
                write!(f, "Cannot factor non-square {}x{} matrix", nrows, ncols)
            }
            Self::NotPositiveDefinite => write!(f, "Matrix is not positive definite"),
        }
    }
}

impl Error for DirectSolveError {}

/// Sparse Cholesky factorization of a symmetric positive definite CSR matrix.
pub struct CholeskySolver<T: RealField> {
    factor: CscCholesky<T>,
    dim: usize,
}

impl<T: RealField> fmt::Debug for CholeskySolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CholeskySolver").field("dim", &self.dim).finish()
    }
}

impl<T: RealField> CholeskySolver<T> {
    pub fn factor(matrix: &CsrMatrix<T>) -> Result<Self, DirectSolveError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(DirectSolveError::NotSquare {
                nrows: matrix.nrows(),
                ncols: matrix.ncols(),
            });
        }
        let csc = CscMatrix::from(matrix);
        let factor = CscCholesky::factor(&csc).map_err(|_| DirectSolveError::NotPositiveDefinite)?;
        Ok(Self {
            factor,
            dim: matrix.nrows(),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Solves `A x = b`.
    pub fn solve(&self, b: &DVector<T>) -> DVector<T> {
        assert_eq!(b.len(), self.dim, "Right-hand side must match matrix dimension.");
        let rhs = DMatrix::from_column_slice(self.dim, 1, b.as_slice());
        let solution = self.factor.solve(&rhs);
        DVector::from_column_slice(solution.as_slice())
    }
}

/// Applies the inverse of the factored matrix.
impl<T: RealField> LinearOperator<T> for CholeskySolver<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        if x.len() != self.dim || y.len() != self.dim {
            return Err(Box::new(DirectSolveError::NotSquare {
                nrows: y.len(),
                ncols: x.len(),
            }));
        }
        let solution = self.solve(&x.clone_owned());
        y.copy_from(&solution);
        Ok(())
    }
}
