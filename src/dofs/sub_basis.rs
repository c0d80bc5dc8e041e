use crate::error::DimensionMismatchError;
use nalgebra::DMatrix;
use std::sync::Arc;

/// Maps a subset of a cell's local basis functions to global DOFs.
///
/// A direct mapper sends the `i`-th filtered basis function to the `i`-th mapped global DOF.
/// A constrained mapper carries an interpolation matrix `C` with one row per filtered basis
/// function and one column per mapped global DOF: the local coefficient of filtered function
/// `i` is `sum_j C[i, j] g_j`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubBasisDofMapper {
    basis_dof_ordinal_filter: Vec<usize>,
    mapped_global_dof_ordinals: Vec<usize>,
    constraint: Option<Arc<DMatrix<f64>>>,
}

impl SubBasisDofMapper {
    pub fn direct(
        basis_dof_ordinal_filter: Vec<usize>,
        mapped_global_dof_ordinals: Vec<usize>,
    ) -> Result<Self, DimensionMismatchError> {
        DimensionMismatchError::check(
            "direct sub-basis mapper",
            basis_dof_ordinal_filter.len(),
            mapped_global_dof_ordinals.len(),
        )?;
        Ok(Self {
            basis_dof_ordinal_filter,
            mapped_global_dof_ordinals,
            constraint: None,
        })
    }

    pub fn constrained(
        basis_dof_ordinal_filter: Vec<usize>,
        mapped_global_dof_ordinals: Vec<usize>,
        constraint: Arc<DMatrix<f64>>,
    ) -> Result<Self, DimensionMismatchError> {
        DimensionMismatchError::check(
            "constraint matrix rows",
            basis_dof_ordinal_filter.len(),
            constraint.nrows(),
        )?;
        DimensionMismatchError::check(
            "constraint matrix columns",
            mapped_global_dof_ordinals.len(),
            constraint.ncols(),
        )?;
        Ok(Self {
            basis_dof_ordinal_filter,
            mapped_global_dof_ordinals,
            constraint: Some(constraint),
        })
    }

    /// Local basis ordinals covered by this mapper.
    pub fn basis_dof_ordinal_filter(&self) -> &[usize] {
        &self.basis_dof_ordinal_filter
    }

    /// Global DOFs the covered basis functions map to.
    pub fn mapped_global_dof_ordinals(&self) -> &[usize] {
        &self.mapped_global_dof_ordinals
    }

    pub fn constraint_matrix(&self) -> Option<&DMatrix<f64>> {
        self.constraint.as_deref()
    }

    pub fn is_direct(&self) -> bool {
        self.constraint.is_none()
    }

    /// Weight of mapped global DOF `j` in the coefficient of filtered basis function `i`.
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        match &self.constraint {
            Some(c) => c[(i, j)],
            None if i == j => 1.0,
            None => 0.0,
        }
    }

    /// Applies the mapper to a block of data.
    ///
    /// With `transpose_constraint == false`, the rows of `data` correspond to the filtered local
    /// basis functions, and the result, with one row per mapped global DOF, is `C^T data`. This
    /// is the direction used for scattering element contributions.
    ///
    /// With `transpose_constraint == true`, the rows of `data` correspond to the mapped global
    /// DOFs, and the result, with one row per filtered basis function, is `C data`. This is the
    /// direction used for gathering global coefficients into a cell.
    pub fn map_data(&self, transpose_constraint: bool, data: &DMatrix<f64>) -> Result<DMatrix<f64>, DimensionMismatchError> {
        let expected_rows = if transpose_constraint {
            self.mapped_global_dof_ordinals.len()
        } else {
            self.basis_dof_ordinal_filter.len()
        };
        DimensionMismatchError::check("sub-basis mapper data rows", expected_rows, data.nrows())?;
        Ok(match (&self.constraint, transpose_constraint) {
            (None, _) => data.clone(),
            (Some(c), false) => c.tr_mul(data),
            (Some(c), true) => &**c * data,
        })
    }
}
