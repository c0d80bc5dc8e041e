//! Small helpers for CSR matrices that are used throughout the multigrid code.
use nalgebra::{ClosedAdd, ClosedMul, DVector, Scalar};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use num::{One, Zero};

/// Computes `y = A x`.
///
/// Panics if the dimensions are incompatible.
pub fn csr_mul_vector<T>(a: &CsrMatrix<T>, x: &DVector<T>) -> DVector<T>
where
    T: Scalar + Zero + One + ClosedAdd + ClosedMul,
{
    assert_eq!(a.ncols(), x.len(), "Matrix and vector dimensions must be compatible.");
    let mut y = DVector::zeros(a.nrows());
    spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(a), Op::NoOp(x));
    y
}

/// Computes `y = A^T x` without forming the transpose.
///
/// Panics if the dimensions are incompatible.
pub fn csr_transpose_mul_vector<T>(a: &CsrMatrix<T>, x: &DVector<T>) -> DVector<T>
where
    T: Scalar + Zero + One + ClosedAdd + ClosedMul,
{
    assert_eq!(a.nrows(), x.len(), "Matrix and vector dimensions must be compatible.");
    let mut y = DVector::zeros(a.ncols());
    spmm_csr_dense(T::zero(), &mut y, T::one(), Op::Transpose(a), Op::NoOp(x));
    y
}

/// Extracts the diagonal of a square CSR matrix. Missing entries are zero.
pub fn csr_diagonal<T>(a: &CsrMatrix<T>) -> DVector<T>
where
    T: Scalar + Zero,
{
    let n = a.nrows().min(a.ncols());
    let mut diagonal = DVector::zeros(n);
    for (i, row) in a.row_iter().enumerate().take(n) {
        if let Some(entry) = row.get_entry(i) {
            diagonal[i] = entry.into_value();
        }
    }
    diagonal
}
