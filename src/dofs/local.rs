use crate::dofs::sub_basis::SubBasisDofMapper;
use crate::error::DimensionMismatchError;
use crate::space::{Subcell, VarId};
use nalgebra::{DMatrix, DVector, DVectorView};

/// The sub-basis mapper of one subcell of one variable (or one side of a trace variable).
#[derive(Debug, Clone, PartialEq)]
pub struct MappedGroup {
    pub var: VarId,
    pub side: Option<usize>,
    pub subcell: Subcell,
    pub mapper: SubBasisDofMapper,
}

/// Maps the full local DOF vector of one cell to global DOFs and back.
///
/// Every local DOF is covered by exactly one group. The global DOFs touched by the cell are kept
/// sorted, and scattered data is returned in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDofMapper {
    local_dof_count: usize,
    groups: Vec<MappedGroup>,
    global_dofs: Vec<usize>,
}

impl LocalDofMapper {
    pub fn new(local_dof_count: usize, groups: Vec<MappedGroup>) -> Self {
        let mut global_dofs: Vec<usize> = groups
            .iter()
            .flat_map(|group| group.mapper.mapped_global_dof_ordinals().iter().copied())
            .collect();
        global_dofs.sort_unstable();
        global_dofs.dedup();
        Self {
            local_dof_count,
            groups,
            global_dofs,
        }
    }

    pub fn local_dof_count(&self) -> usize {
        self.local_dof_count
    }

    pub fn groups(&self) -> &[MappedGroup] {
        &self.groups
    }

    /// The global DOFs the cell contributes to, in increasing order.
    pub fn global_dofs(&self) -> &[usize] {
        &self.global_dofs
    }

    pub fn groups_for(&self, var: VarId, side: Option<usize>) -> impl Iterator<Item = &MappedGroup> {
        self.groups
            .iter()
            .filter(move |group| group.var == var && group.side == side)
    }

    fn global_position(&self, global: usize) -> usize {
        // Every mapped global is in the sorted list by construction
        self.global_dofs.binary_search(&global).unwrap_or_else(|pos| pos)
    }

    /// The dense operator `M` with `local = M * cell_globals`, of size
    /// `local_dof_count x global_dofs().len()`.
    pub fn local_to_global_matrix(&self) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(self.local_dof_count, self.global_dofs.len());
        for group in &self.groups {
            let mapper = &group.mapper;
            for (i, &local) in mapper.basis_dof_ordinal_filter().iter().enumerate() {
                for (j, &global) in mapper.mapped_global_dof_ordinals().iter().enumerate() {
                    m[(local, self.global_position(global))] += mapper.weight(i, j);
                }
            }
        }
        m
    }

    /// Scatters local data to the cell's global DOFs, returning values aligned with
    /// [`global_dofs`](Self::global_dofs).
    ///
    /// With `accumulate`, contributions of different groups to the same global DOF are summed.
    /// Otherwise a later group overwrites the value written by an earlier one.
    pub fn map_local_data(
        &self,
        local: &DVector<f64>,
        accumulate: bool,
    ) -> Result<DVector<f64>, DimensionMismatchError> {
        DimensionMismatchError::check("local data length", self.local_dof_count, local.len())?;
        let mut values = DVector::zeros(self.global_dofs.len());
        for group in &self.groups {
            let mapper = &group.mapper;
            let filtered = DMatrix::from_iterator(
                mapper.basis_dof_ordinal_filter().len(),
                1,
                mapper.basis_dof_ordinal_filter().iter().map(|&i| local[i]),
            );
            let mapped = mapper.map_data(false, &filtered)?;
            for (j, &global) in mapper.mapped_global_dof_ordinals().iter().enumerate() {
                let pos = self.global_position(global);
                if accumulate {
                    values[pos] += mapped[(j, 0)];
                } else {
                    values[pos] = mapped[(j, 0)];
                }
            }
        }
        Ok(values)
    }

    /// Computes `M^T K M` for a local matrix `K`, with rows and columns aligned with
    /// [`global_dofs`](Self::global_dofs).
    pub fn map_local_matrix(&self, local: &DMatrix<f64>) -> Result<DMatrix<f64>, DimensionMismatchError> {
        DimensionMismatchError::check("local matrix rows", self.local_dof_count, local.nrows())?;
        DimensionMismatchError::check("local matrix columns", self.local_dof_count, local.ncols())?;
        let m = self.local_to_global_matrix();
        Ok(m.tr_mul(&(local * &m)))
    }

    /// Gathers values of the cell's local DOFs from a full global vector.
    ///
    /// With `accumulate`, the gathered values are added to `local`. Otherwise the entries of
    /// `local` covered by the mapper are overwritten.
    pub fn map_global_data(
        &self,
        global: DVectorView<f64>,
        local: &mut DVector<f64>,
        accumulate: bool,
    ) -> Result<(), DimensionMismatchError> {
        DimensionMismatchError::check("local data length", self.local_dof_count, local.len())?;
        if let Some(&max) = self.global_dofs.last() {
            if max >= global.len() {
                return Err(DimensionMismatchError::new("global data length", max + 1, global.len()));
            }
        }
        for group in &self.groups {
            let mapper = &group.mapper;
            let coefficients = DMatrix::from_iterator(
                mapper.mapped_global_dof_ordinals().len(),
                1,
                mapper.mapped_global_dof_ordinals().iter().map(|&g| global[g]),
            );
            let mapped = mapper.map_data(true, &coefficients)?;
            for (i, &l) in mapper.basis_dof_ordinal_filter().iter().enumerate() {
                if accumulate {
                    local[l] += mapped[(i, 0)];
                } else {
                    local[l] = mapped[(i, 0)];
                }
            }
        }
        Ok(())
    }

    /// `(local, global)` pairs of all local DOFs mapped one-to-one onto a global DOF.
    pub fn direct_local_dofs(&self) -> Vec<(usize, usize)> {
        self.groups
            .iter()
            .filter(|group| group.mapper.is_direct())
            .flat_map(|group| {
                let mapper = &group.mapper;
                mapper
                    .basis_dof_ordinal_filter()
                    .iter()
                    .copied()
                    .zip(mapper.mapped_global_dof_ordinals().iter().copied())
            })
            .collect()
    }

    /// Recovers global coefficients from local coefficients, using only DOFs the cell maps
    /// one-to-one. Global DOFs the cell only reaches through a constraint are left out.
    pub fn fit_local_coefficients(
        &self,
        local: &DVector<f64>,
    ) -> Result<(DVector<f64>, Vec<usize>), DimensionMismatchError> {
        DimensionMismatchError::check("local coefficient length", self.local_dof_count, local.len())?;
        let mut pairs = self.direct_local_dofs();
        pairs.sort_unstable_by_key(|&(_, global)| global);
        let values = DVector::from_iterator(pairs.len(), pairs.iter().map(|&(l, _)| local[l]));
        let globals = pairs.into_iter().map(|(_, g)| g).collect();
        Ok((values, globals))
    }
}
