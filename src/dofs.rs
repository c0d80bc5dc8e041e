//! Global DOF numbering under the minimum rule, and the local-to-global maps built on it.
use crate::error::{DimensionMismatchError, DofError};
use crate::space::DofOrdering;
use crate::CellId;
use nalgebra::{DMatrix, DVector, DVectorView};
use std::sync::Arc;

mod assignment;
mod condensed;
pub mod constraints;
mod local;
mod partition;
pub mod sub_basis;

pub use assignment::*;
pub use condensed::*;
pub use local::*;
pub use partition::*;

/// Translates between the local DOFs of a cell and a global DOF index space.
///
/// Implemented by [`GlobalDofAssignment`], which numbers every DOF of the mesh, and by
/// [`CondensedDofInterpreter`], which eliminates cell-interior DOFs.
pub trait DofInterpreter {
    fn global_dof_count(&self) -> usize;

    fn partition_map(&self) -> &PartitionMap;

    /// Active cells in increasing order.
    fn active_cells(&self) -> &[CellId];

    fn cell_partition(&self, cell: CellId) -> Option<usize>;

    fn dof_ordering(&self, cell: CellId) -> Result<Arc<DofOrdering>, DofError>;

    /// Whether cell-interior DOFs have been eliminated from the global index space.
    fn is_condensed(&self) -> bool {
        false
    }

    /// Global DOFs the cell contributes to, in increasing order.
    fn cell_global_dofs(&self, cell: CellId) -> Result<Vec<usize>, DofError>;

    /// Scatters a local vector, returning values aligned with the returned global indices.
    fn interpret_local_data(
        &self,
        cell: CellId,
        local: &DVector<f64>,
        accumulate: bool,
    ) -> Result<(DVector<f64>, Vec<usize>), DofError>;

    /// Transforms a local matrix into a matrix over the returned global indices.
    fn interpret_local_matrix(&self, cell: CellId, local: &DMatrix<f64>) -> Result<(DMatrix<f64>, Vec<usize>), DofError>;

    /// Gathers the local DOFs of a cell from a global vector.
    fn interpret_global_data(
        &self,
        cell: CellId,
        local: &mut DVector<f64>,
        global: DVectorView<f64>,
        accumulate: bool,
    ) -> Result<(), DofError>;

    /// The dense operator from the returned global indices to all local DOFs of the cell.
    fn local_to_global_operator(&self, cell: CellId) -> Result<(DMatrix<f64>, Vec<usize>), DofError>;

    /// `(local, global)` pairs of local DOFs that coincide with a single global DOF.
    fn direct_local_dofs(&self, cell: CellId) -> Result<Vec<(usize, usize)>, DofError>;

    /// Recovers global coefficients from a consistent local representation.
    fn interpret_local_coefficients(
        &self,
        cell: CellId,
        local: &DVector<f64>,
    ) -> Result<(DVector<f64>, Vec<usize>), DofError> {
        let ordering = self.dof_ordering(cell)?;
        DimensionMismatchError::check("local coefficient length", ordering.local_dof_count(), local.len())?;
        let mut pairs = self.direct_local_dofs(cell)?;
        pairs.sort_unstable_by_key(|&(_, global)| global);
        let values = DVector::from_iterator(pairs.len(), pairs.iter().map(|&(l, _)| local[l]));
        Ok((values, pairs.into_iter().map(|(_, g)| g).collect()))
    }
}
