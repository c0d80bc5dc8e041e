//! Global coefficient vectors tied to a DOF interpretation.
use crate::dofs::DofInterpreter;
use crate::error::{DimensionMismatchError, DofError};
use crate::mesh::Mesh;
use crate::space::VarId;
use crate::CellId;
use nalgebra::{DVector, Point2};

/// Global coefficients of a discrete solution.
///
/// The solution borrows the interpreter that defines its index space, so it cannot outlive
/// the DOF assignment (and, through it, the mesh) it was computed on.
#[derive(Debug)]
pub struct Solution<'a, D: DofInterpreter + ?Sized> {
    dofs: &'a D,
    coefficients: DVector<f64>,
}

impl<'a, D: DofInterpreter + ?Sized> Solution<'a, D> {
    /// The zero solution.
    pub fn new(dofs: &'a D) -> Self {
        Self {
            dofs,
            coefficients: DVector::zeros(dofs.global_dof_count()),
        }
    }

    pub fn from_coefficients(dofs: &'a D, coefficients: DVector<f64>) -> Result<Self, DimensionMismatchError> {
        DimensionMismatchError::check("solution coefficients", dofs.global_dof_count(), coefficients.len())?;
        Ok(Self { dofs, coefficients })
    }

    pub fn dofs(&self) -> &'a D {
        self.dofs
    }

    pub fn coefficients(&self) -> &DVector<f64> {
        &self.coefficients
    }

    pub fn coefficients_mut(&mut self) -> &mut DVector<f64> {
        &mut self.coefficients
    }

    pub fn into_coefficients(self) -> DVector<f64> {
        self.coefficients
    }

    /// Local coefficients of a cell, including constrained DOFs.
    pub fn local_coefficients(&self, cell: CellId) -> Result<DVector<f64>, DofError> {
        let ordering = self.dofs.dof_ordering(cell)?;
        let mut local = DVector::zeros(ordering.local_dof_count());
        self.dofs
            .interpret_global_data(cell, &mut local, (&self.coefficients).into(), false)?;
        Ok(local)
    }

    /// Interpolates `f` into the variable by nodal evaluation.
    ///
    /// Only global DOFs that coincide with a single local DOF are written. Constrained DOFs are
    /// determined by the DOFs they interpolate from, and are therefore left alone.
    pub fn project_onto_mesh(&mut self, mesh: &Mesh, var: VarId, f: impl Fn(&Point2<f64>) -> f64) -> Result<(), DofError> {
        for &cell in self.dofs.active_cells() {
            let ordering = self.dofs.dof_ordering(cell)?;
            let geometry = mesh.topology().cell_geometry(cell)?;
            let mut values = vec![None; ordering.local_dof_count()];
            let mut var_found = false;
            for block in ordering.blocks_for_var(var) {
                var_found = true;
                for (local, node) in block.local_indices().zip(block.nodes()) {
                    let x = geometry.map_reference_coords(&node.reference_point);
                    values[local] = Some(f(&x));
                }
            }
            if !var_found {
                return Err(DofError::UnknownVariable(var));
            }
            for (local, global) in self.dofs.direct_local_dofs(cell)? {
                if let Some(value) = values[local] {
                    self.coefficients[global] = value;
                }
            }
        }
        Ok(())
    }

    /// Value of a field variable at reference coordinates `xi` of a cell.
    pub fn evaluate(&self, cell: CellId, var: VarId, xi: &Point2<f64>) -> Result<f64, DofError> {
        let ordering = self.dofs.dof_ordering(cell)?;
        let block = ordering.block(var, None).ok_or(DofError::UnknownVariable(var))?;
        let local = self.local_coefficients(cell)?;
        let phi = block.basis().evaluate(xi);
        Ok(local.rows(block.offset(), block.len()).dot(&phi))
    }
}
