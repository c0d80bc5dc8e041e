//! Static condensation of cell-interior DOFs.
//!
//! Interior DOFs belong to exactly one cell, so they can be eliminated cell by cell. For a cell
//! stiffness matrix split into boundary (`B`) and interior (`I`) blocks, the condensed matrix is
//! the Schur complement `K_BB - K_BI K_II^-1 K_IB`, and interior values are recovered from
//! boundary values by the harmonic extension `x_I = K_II^-1 (f_I - K_IB x_B)`.
//!
//! The condensed index space keeps the remaining DOFs of the underlying assignment in their
//! original order, so it stays contiguous per partition.
use super::{DofInterpreter, GlobalDofAssignment, PartitionMap};
use crate::error::{DimensionMismatchError, DofError};
use crate::space::DofOrdering;
use crate::CellId;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, DVectorView, Dyn};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

fn select(matrix: &DMatrix<f64>, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols.len(), |i, j| matrix[(rows[i], cols[j])])
}

fn select_entries(vector: &DVector<f64>, entries: &[usize]) -> DVector<f64> {
    DVector::from_iterator(entries.len(), entries.iter().map(|&i| vector[i]))
}

fn factor_interior_block(cell: CellId, k_ii: DMatrix<f64>) -> Result<Cholesky<f64, Dyn>, DofError> {
    Cholesky::new(k_ii).ok_or(DofError::SingularInteriorBlock(cell))
}

#[derive(Debug, Clone)]
struct CondensedCell {
    /// Positions of boundary DOFs among the cell's global DOFs in the underlying assignment.
    boundary: Vec<usize>,
    /// Positions of interior DOFs among the cell's global DOFs in the underlying assignment.
    interior: Vec<usize>,
    /// Condensed indices of the boundary DOFs.
    condensed_globals: Vec<usize>,
    /// `K_II^-1 K_IB`.
    extension: DMatrix<f64>,
    /// `K_BI K_II^-1`.
    load_condensation: DMatrix<f64>,
    /// `K_II^-1 f_I`, when a load was provided.
    interior_particular: Option<DVector<f64>>,
}

impl CondensedCell {
    /// The harmonic extension operator from boundary values to all of the cell's global DOFs.
    fn extension_operator(&self, cell_dof_count: usize) -> DMatrix<f64> {
        let mut h = DMatrix::zeros(cell_dof_count, self.boundary.len());
        for (j, &b) in self.boundary.iter().enumerate() {
            h[(b, j)] = 1.0;
        }
        for (i, &interior) in self.interior.iter().enumerate() {
            for j in 0..self.boundary.len() {
                h[(interior, j)] = -self.extension[(i, j)];
            }
        }
        h
    }

    /// Values of all of the cell's global DOFs, given its boundary values.
    fn expand(&self, boundary_values: &DVector<f64>, cell_dof_count: usize) -> DVector<f64> {
        let mut values = DVector::zeros(cell_dof_count);
        for (j, &b) in self.boundary.iter().enumerate() {
            values[b] = boundary_values[j];
        }
        let mut interior_values = -(&self.extension * boundary_values);
        if let Some(particular) = &self.interior_particular {
            interior_values += particular;
        }
        for (i, &interior) in self.interior.iter().enumerate() {
            values[interior] = interior_values[i];
        }
        values
    }
}

/// A [`DofInterpreter`] over the DOFs of a [`GlobalDofAssignment`] that are not cell-interior.
#[derive(Debug)]
pub struct CondensedDofInterpreter<'a> {
    base: &'a GlobalDofAssignment,
    cells: FxHashMap<CellId, CondensedCell>,
    /// Condensed index of each DOF of the underlying assignment, `None` for interior DOFs.
    condensed_index: Vec<Option<usize>>,
    base_index: Vec<usize>,
    partition_map: PartitionMap,
}

impl<'a> CondensedDofInterpreter<'a> {
    /// Condenses with the given local stiffness matrices, one per active cell.
    pub fn new(base: &'a GlobalDofAssignment, local_stiffness: &BTreeMap<CellId, DMatrix<f64>>) -> Result<Self, DofError> {
        Self::with_loads(base, local_stiffness, None)
    }

    /// Condenses with local stiffness matrices and local load vectors. The loads only enter the
    /// recovery of interior values.
    pub fn with_loads(
        base: &'a GlobalDofAssignment,
        local_stiffness: &BTreeMap<CellId, DMatrix<f64>>,
        local_loads: Option<&BTreeMap<CellId, DVector<f64>>>,
    ) -> Result<Self, DofError> {
        let base_count = base.global_dof_count();
        let mut is_interior = vec![false; base_count];
        for &cell in base.active_cells() {
            for global in interior_globals(base, cell)? {
                is_interior[global] = true;
            }
        }

        let mut condensed_index = vec![None; base_count];
        let mut base_index = Vec::new();
        for (global, interior) in is_interior.iter().enumerate() {
            if !interior {
                condensed_index[global] = Some(base_index.len());
                base_index.push(global);
            }
        }

        let base_map = base.partition_map();
        let counts: Vec<usize> = (0..base_map.num_partitions())
            .map(|k| {
                base_map
                    .partition_range(k)
                    .filter(|&global| !is_interior[global])
                    .count()
            })
            .collect();

        let mut cells = FxHashMap::default();
        for &cell in base.active_cells() {
            let stiffness = local_stiffness
                .get(&cell)
                .ok_or(DofError::MissingLocalMatrix(cell))?;
            let mapper = base.local_dof_mapper(cell)?;
            let k = mapper.map_local_matrix(stiffness)?;
            let globals = mapper.global_dofs();
            let (boundary, interior): (Vec<usize>, Vec<usize>) =
                (0..globals.len()).partition(|&pos| !is_interior[globals[pos]]);
            let condensed_globals = boundary
                .iter()
                .filter_map(|&pos| condensed_index[globals[pos]])
                .collect();

            let (extension, load_condensation, interior_particular) = if interior.is_empty() {
                (
                    DMatrix::zeros(0, boundary.len()),
                    DMatrix::zeros(boundary.len(), 0),
                    None,
                )
            } else {
                let cholesky = factor_interior_block(cell, select(&k, &interior, &interior))?;
                let extension = cholesky.solve(&select(&k, &interior, &boundary));
                let load_condensation = cholesky
                    .solve(&select(&k, &boundary, &interior).transpose())
                    .transpose();
                let particular = match local_loads.and_then(|loads| loads.get(&cell)) {
                    Some(load) => {
                        let f = mapper.map_local_data(load, true)?;
                        Some(cholesky.solve(&select_entries(&f, &interior)))
                    }
                    None => None,
                };
                (extension, load_condensation, particular)
            };
            cells.insert(
                cell,
                CondensedCell {
                    boundary,
                    interior,
                    condensed_globals,
                    extension,
                    load_condensation,
                    interior_particular,
                },
            );
        }

        Ok(Self {
            base,
            cells,
            condensed_index,
            base_index,
            partition_map: PartitionMap::from_counts(&counts),
        })
    }

    pub fn base(&self) -> &'a GlobalDofAssignment {
        self.base
    }

    pub fn interior_dof_count(&self) -> usize {
        self.condensed_index.len() - self.base_index.len()
    }

    /// Condensed index of a DOF of the underlying assignment, `None` if it was eliminated.
    pub fn condensed_index(&self, base_global: usize) -> Option<usize> {
        self.condensed_index.get(base_global).copied().flatten()
    }

    /// The DOF of the underlying assignment for a condensed index.
    pub fn base_index(&self, condensed: usize) -> usize {
        self.base_index[condensed]
    }

    fn cell(&self, cell: CellId) -> Result<&CondensedCell, DofError> {
        // Surfaces stale lookups before the missing-cell case
        self.base.local_dof_mapper(cell)?;
        self.cells
            .get(&cell)
            .ok_or(DofError::MissingLocalMatrix(cell))
    }

    /// Reconstructs a full solution of the underlying assignment from a condensed solution.
    pub fn expand_global_solution(&self, condensed: &DVector<f64>) -> Result<DVector<f64>, DofError> {
        DimensionMismatchError::check("condensed solution length", self.base_index.len(), condensed.len())?;
        let mut full = DVector::zeros(self.condensed_index.len());
        for (c, &base) in self.base_index.iter().enumerate() {
            full[base] = condensed[c];
        }
        for &cell in self.base.active_cells() {
            let condensed_cell = self.cell(cell)?;
            let globals = self.base.local_dof_mapper(cell)?.global_dofs();
            let boundary_values = DVector::from_iterator(
                condensed_cell.condensed_globals.len(),
                condensed_cell.condensed_globals.iter().map(|&c| condensed[c]),
            );
            let values = condensed_cell.expand(&boundary_values, globals.len());
            for &pos in &condensed_cell.interior {
                full[globals[pos]] = values[pos];
            }
        }
        Ok(full)
    }
}

/// Global DOFs of the cell's interior entity, for all variables.
fn interior_globals(base: &GlobalDofAssignment, cell: CellId) -> Result<Vec<usize>, DofError> {
    let dimension = base.dof_ordering(cell)?.topology().dimension();
    Ok(base
        .local_dof_mapper(cell)?
        .groups()
        .iter()
        .filter(|group| group.subcell.dimension == dimension)
        .flat_map(|group| group.mapper.mapped_global_dof_ordinals().iter().copied())
        .collect())
}

impl<'a> DofInterpreter for CondensedDofInterpreter<'a> {
    fn global_dof_count(&self) -> usize {
        self.base_index.len()
    }

    fn partition_map(&self) -> &PartitionMap {
        &self.partition_map
    }

    fn active_cells(&self) -> &[CellId] {
        self.base.active_cells()
    }

    fn cell_partition(&self, cell: CellId) -> Option<usize> {
        self.base.cell_partition(cell)
    }

    fn dof_ordering(&self, cell: CellId) -> Result<Arc<DofOrdering>, DofError> {
        self.base.dof_ordering(cell)
    }

    fn is_condensed(&self) -> bool {
        true
    }

    fn cell_global_dofs(&self, cell: CellId) -> Result<Vec<usize>, DofError> {
        Ok(self.cell(cell)?.condensed_globals.clone())
    }

    fn interpret_local_data(
        &self,
        cell: CellId,
        local: &DVector<f64>,
        accumulate: bool,
    ) -> Result<(DVector<f64>, Vec<usize>), DofError> {
        let condensed_cell = self.cell(cell)?;
        let f = self
            .base
            .local_dof_mapper(cell)?
            .map_local_data(local, accumulate)?;
        let mut values = select_entries(&f, &condensed_cell.boundary);
        if !condensed_cell.interior.is_empty() {
            values -= &condensed_cell.load_condensation * select_entries(&f, &condensed_cell.interior);
        }
        Ok((values, condensed_cell.condensed_globals.clone()))
    }

    fn interpret_local_matrix(&self, cell: CellId, local: &DMatrix<f64>) -> Result<(DMatrix<f64>, Vec<usize>), DofError> {
        let condensed_cell = self.cell(cell)?;
        let k = self.base.local_dof_mapper(cell)?.map_local_matrix(local)?;
        let (boundary, interior) = (&condensed_cell.boundary, &condensed_cell.interior);
        let mut schur = select(&k, boundary, boundary);
        if !interior.is_empty() {
            let cholesky = factor_interior_block(cell, select(&k, interior, interior))?;
            let k_bi = select(&k, boundary, interior);
            schur -= &k_bi * cholesky.solve(&select(&k, interior, boundary));
        }
        Ok((schur, condensed_cell.condensed_globals.clone()))
    }

    fn interpret_global_data(
        &self,
        cell: CellId,
        local: &mut DVector<f64>,
        global: DVectorView<f64>,
        accumulate: bool,
    ) -> Result<(), DofError> {
        DimensionMismatchError::check("global data length", self.global_dof_count(), global.len())?;
        let condensed_cell = self.cell(cell)?;
        let mapper = self.base.local_dof_mapper(cell)?;
        DimensionMismatchError::check("local data length", mapper.local_dof_count(), local.len())?;
        let boundary_values = DVector::from_iterator(
            condensed_cell.condensed_globals.len(),
            condensed_cell.condensed_globals.iter().map(|&c| global[c]),
        );
        let cell_values = condensed_cell.expand(&boundary_values, mapper.global_dofs().len());
        let values = mapper.local_to_global_matrix() * cell_values;
        if accumulate {
            *local += values;
        } else {
            local.copy_from(&values);
        }
        Ok(())
    }

    fn local_to_global_operator(&self, cell: CellId) -> Result<(DMatrix<f64>, Vec<usize>), DofError> {
        let condensed_cell = self.cell(cell)?;
        let mapper = self.base.local_dof_mapper(cell)?;
        let h = condensed_cell.extension_operator(mapper.global_dofs().len());
        Ok((
            mapper.local_to_global_matrix() * h,
            condensed_cell.condensed_globals.clone(),
        ))
    }

    fn direct_local_dofs(&self, cell: CellId) -> Result<Vec<(usize, usize)>, DofError> {
        Ok(self
            .base
            .direct_local_dofs(cell)?
            .into_iter()
            .filter_map(|(local, global)| self.condensed_index(global).map(|c| (local, c)))
            .collect())
    }
}
