//! Transfer of global coefficients from a coarse level to a nested fine level.
use super::GmgLevel;
use crate::error::{GmgError, MeshTopologyError};
use crate::mesh::Mesh;
use crate::space::{BasisBlock, BasisNode, DofOrdering};
use crate::CellId;
use log::debug;
use nalgebra::{DVector, Point2};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Prolongation weights below this magnitude are not stored.
const DROP_TOLERANCE: f64 = 1e-14;
const MAX_ANCESTRY_DEPTH: usize = 256;
const GEOMETRY_TOLERANCE: f64 = 1e-12;

/// Finds the ancestor of a fine cell that is active in the coarse mesh.
///
/// Returns the ancestor together with the child ordinals on the path from the fine cell up to
/// the ancestor, finest first. If the fine cell itself is active in the coarse mesh the path is
/// empty.
pub fn coarse_ancestor(coarse: &Mesh, fine: &Mesh, fine_cell: CellId) -> Result<(CellId, Vec<usize>), MeshTopologyError> {
    let mut current = fine_cell;
    let mut ordinals = Vec::new();
    for _ in 0..MAX_ANCESTRY_DEPTH {
        if coarse.topology().active_cell(current).is_ok() {
            let coarse_geometry = coarse.topology().cell_geometry(current)?;
            let fine_geometry = fine.topology().cell_geometry(current)?;
            let matches = coarse_geometry
                .vertices()
                .iter()
                .zip(fine_geometry.vertices())
                .all(|(a, b)| (a - b).norm() <= GEOMETRY_TOLERANCE * (1.0 + a.coords.norm()));
            return if matches {
                Ok((current, ordinals))
            } else {
                Err(MeshTopologyError::NotNested { fine_cell })
            };
        }
        let cell = fine.cell(current)?;
        match (cell.parent(), cell.child_ordinal()) {
            (Some(parent), Some(ordinal)) => {
                ordinals.push(ordinal);
                current = parent;
            }
            _ => return Err(MeshTopologyError::NotNested { fine_cell }),
        }
    }
    Err(MeshTopologyError::NotNested { fine_cell })
}

/// Computes the prolongation matrix (fine global DOFs x coarse global DOFs).
///
/// Every fine global DOF is the value of a nodal basis function, so its row is the coarse
/// solution evaluated at the node: the coarse local basis at the node's position in the
/// coarse ancestor, composed with the coarse local-to-global operator. Rows are computed
/// from the first fine cell in which the DOF is reached by a direct mapping.
pub fn prolongation_matrix(coarse: &GmgLevel, fine: &GmgLevel) -> Result<CsrMatrix<f64>, GmgError> {
    let n_fine = fine.dofs.global_dof_count();
    let n_coarse = coarse.dofs.global_dof_count();
    let mut written = vec![false; n_fine];
    let mut coo = CooMatrix::new(n_fine, n_coarse);

    for &fine_cell in fine.dofs.active_cells() {
        let direct = fine.dofs.direct_local_dofs(fine_cell)?;
        if direct.iter().all(|&(_, global)| written[global]) {
            continue;
        }
        let (coarse_cell, ordinals) = coarse_ancestor(coarse.mesh, fine.mesh, fine_cell)?;
        let fine_ordering = fine.dofs.dof_ordering(fine_cell)?;
        let coarse_ordering = coarse.dofs.dof_ordering(coarse_cell)?;
        let (coarse_operator, coarse_globals) = coarse.dofs.local_to_global_operator(coarse_cell)?;
        let topology = fine_ordering.topology();

        for (local, global) in direct {
            if written[global] {
                continue;
            }
            written[global] = true;
            let Some((block, node)) = locate_node(&fine_ordering, local) else {
                continue;
            };
            let xi = ordinals
                .iter()
                .fold(node.reference_point, |xi, &ordinal| topology.child_to_parent(ordinal, &xi));
            let basis_values = coarse_basis_values(&coarse_ordering, block, &xi);
            let row = coarse_operator.tr_mul(&basis_values);
            for (&coarse_global, &weight) in coarse_globals.iter().zip(row.iter()) {
                if weight.abs() > DROP_TOLERANCE {
                    coo.push(global, coarse_global, weight);
                }
            }
        }
    }

    let prolongation = CsrMatrix::from(&coo);
    debug!(
        "prolongation {}x{} with {} nonzeros",
        prolongation.nrows(),
        prolongation.ncols(),
        prolongation.nnz()
    );
    Ok(prolongation)
}

fn locate_node(ordering: &DofOrdering, local: usize) -> Option<(&BasisBlock, &BasisNode)> {
    let block = ordering
        .blocks()
        .iter()
        .find(|block| block.local_indices().contains(&local))?;
    Some((block, &block.nodes()[local - block.offset()]))
}

/// Values of the coarse local basis functions of the fine block's variable at `xi`, as a vector
/// over all coarse local DOFs.
fn coarse_basis_values(coarse: &DofOrdering, fine_block: &BasisBlock, xi: &Point2<f64>) -> DVector<f64> {
    let mut values = DVector::zeros(coarse.local_dof_count());
    let topology = coarse.topology();
    match fine_block.side() {
        None => {
            if let Some(block) = coarse.block(fine_block.var(), None) {
                let phi = block.basis().evaluate(xi);
                values.rows_mut(block.offset(), block.len()).copy_from(&phi);
            }
        }
        Some(_) => {
            // Trace functions vanish away from the coarse skeleton
            let coarse_side = (0..topology.side_count()).find(|&side| topology.is_on_side(side, xi));
            if let Some(side) = coarse_side {
                if let Some(block) = coarse.block(fine_block.var(), Some(side)) {
                    let t = topology.side_parameter(side, xi);
                    let phi = block.basis().evaluate(&Point2::new(t, 0.0));
                    values.rows_mut(block.offset(), block.len()).copy_from(&phi);
                }
            }
        }
    }
    values
}
