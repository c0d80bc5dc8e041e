use nalgebra::DMatrix;

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Largest entry of `|A - A^T|` relative to the largest entry of `|A|`.
pub fn relative_asymmetry(matrix: &DMatrix<f64>) -> f64 {
    assert_eq!(matrix.nrows(), matrix.ncols(), "Matrix must be square.");
    let scale = matrix.abs().max();
    if scale == 0.0 {
        return 0.0;
    }
    (matrix - matrix.transpose()).abs().max() / scale
}

/// Checks positive definiteness of the symmetric part by attempting a dense Cholesky factorization.
pub fn is_positive_definite(matrix: &DMatrix<f64>) -> bool {
    let symmetric_part = (matrix + matrix.transpose()) * 0.5;
    symmetric_part.cholesky().is_some()
}
