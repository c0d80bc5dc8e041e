use crate::assembly::local::ElementAssembler;
use crate::dofs::DofInterpreter;
use crate::error::DimensionMismatchError;
use crate::mesh::Mesh;
use crate::CellId;
use eyre::WrapErr;
use nalgebra::{DMatrix, DVector, DVectorViewMut};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Element matrices of all active cells, in the local DOF ordering of each cell.
pub fn compute_local_stiffness_matrices<D>(
    mesh: &Mesh,
    dofs: &D,
    assembler: &dyn ElementAssembler,
) -> eyre::Result<BTreeMap<CellId, DMatrix<f64>>>
where
    D: DofInterpreter + Sync + ?Sized,
{
    dofs.active_cells()
        .par_iter()
        .map(|&cell| -> eyre::Result<(CellId, DMatrix<f64>)> {
            let ordering = dofs.dof_ordering(cell)?;
            let matrix = assembler
                .assemble_element_matrix(mesh, cell, &ordering)
                .wrap_err_with(|| format!("failed to assemble element matrix of cell {}", cell))?;
            Ok((cell, matrix))
        })
        .collect()
}

/// Element load vectors of all active cells.
pub fn compute_local_load_vectors<D>(
    mesh: &Mesh,
    dofs: &D,
    assembler: &dyn ElementAssembler,
) -> eyre::Result<BTreeMap<CellId, DVector<f64>>>
where
    D: DofInterpreter + Sync + ?Sized,
{
    dofs.active_cells()
        .par_iter()
        .map(|&cell| -> eyre::Result<(CellId, DVector<f64>)> {
            let ordering = dofs.dof_ordering(cell)?;
            let vector = assembler
                .assemble_element_vector(mesh, cell, &ordering)
                .wrap_err_with(|| format!("failed to assemble element vector of cell {}", cell))?;
            Ok((cell, vector))
        })
        .collect()
}

/// Assembles the global stiffness matrix and load vector.
///
/// Element contributions are scattered with accumulation, so that every constrained
/// contribution ends up in the global DOFs it is interpolated from.
pub fn assemble_system<D>(
    mesh: &Mesh,
    dofs: &D,
    assembler: &dyn ElementAssembler,
) -> eyre::Result<(CsrMatrix<f64>, DVector<f64>)>
where
    D: DofInterpreter + Sync + ?Sized,
{
    let matrices = compute_local_stiffness_matrices(mesh, dofs, assembler)?;
    let vectors = compute_local_load_vectors(mesh, dofs, assembler)?;
    let matrix = assemble_matrix_from_local(dofs, &matrices)?;
    let rhs = assemble_vector_from_local(dofs, &vectors)?;
    Ok((matrix, rhs))
}

/// Assembles a global CSR matrix from precomputed element matrices.
pub fn assemble_matrix_from_local<D: DofInterpreter + ?Sized>(
    dofs: &D,
    local_matrices: &BTreeMap<CellId, DMatrix<f64>>,
) -> eyre::Result<CsrMatrix<f64>> {
    let n = dofs.global_dof_count();
    let mut coo = CooMatrix::new(n, n);
    for (&cell, local) in local_matrices {
        let (matrix, globals) = dofs.interpret_local_matrix(cell, local)?;
        for (i, &row) in globals.iter().enumerate() {
            for (j, &col) in globals.iter().enumerate() {
                coo.push(row, col, matrix[(i, j)]);
            }
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Assembles a global vector from precomputed element vectors.
pub fn assemble_vector_from_local<D: DofInterpreter + ?Sized>(
    dofs: &D,
    local_vectors: &BTreeMap<CellId, DVector<f64>>,
) -> eyre::Result<DVector<f64>> {
    let mut rhs = DVector::zeros(dofs.global_dof_count());
    for (&cell, local) in local_vectors {
        let (values, globals) = dofs.interpret_local_data(cell, local, true)?;
        for (value, &global) in values.iter().zip(&globals) {
            rhs[global] += value;
        }
    }
    Ok(rhs)
}

pub fn apply_homogeneous_dirichlet_bc_csr(matrix: &mut CsrMatrix<f64>, dofs: &[usize]) -> Result<(), DimensionMismatchError> {
    DimensionMismatchError::check("square matrix", matrix.nrows(), matrix.ncols())?;
    let n = matrix.nrows();
    if let Some(&max) = dofs.iter().max() {
        if max >= n {
            return Err(DimensionMismatchError::new("Dirichlet DOF bound", n, max + 1));
        }
    }

    // Clamped rows get the magnitude of the first nonzero diagonal entry rather than 1
    let scale = (0..n)
        .filter_map(|i| {
            matrix
                .row(i)
                .get_entry(i)
                .map(|entry| entry.into_value())
        })
        .find(|&x| x != 0.0)
        .map(f64::abs)
        .unwrap_or(1.0);

    let mut is_dirichlet = vec![false; n];
    for &dof in dofs {
        is_dirichlet[dof] = true;
    }

    // Rows and columns are zeroed in a single pass over the stored entries
    let (row_offsets, col_indices, values) = matrix.csr_data_mut();
    for row in 0..n {
        for idx in row_offsets[row]..row_offsets[row + 1] {
            let col = col_indices[idx];
            if is_dirichlet[row] || is_dirichlet[col] {
                values[idx] = if row == col { scale } else { 0.0 };
            }
        }
    }
    Ok(())
}

pub fn apply_homogeneous_dirichlet_bc_rhs<'a>(rhs: impl Into<DVectorViewMut<'a, f64>>, dofs: &[usize]) {
    let mut rhs = rhs.into();
    for &dof in dofs {
        rhs[dof] = 0.0;
    }
}
