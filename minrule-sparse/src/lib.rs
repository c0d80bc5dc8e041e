//! Sparse linear algebra for `minrule`: linear operators, a preconditioned conjugate gradient
//! solver with Lanczos condition estimation, sparse matrix-vector helpers and a direct
//! Cholesky solver used for coarse-grid solves.

pub mod cg;
pub mod csr;
pub mod direct;
