use crate::mesh::Mesh;
use crate::quadrature::QuadratureRule;
use crate::space::{BasisBlock, DofOrdering, VarId};
use crate::CellId;
use eyre::eyre;
use nalgebra::{DMatrix, DVector, Point2};

/// Computes element matrices and vectors in the local DOF ordering of a cell.
pub trait ElementAssembler: Sync {
    fn assemble_element_matrix(&self, mesh: &Mesh, cell: CellId, ordering: &DofOrdering) -> eyre::Result<DMatrix<f64>>;

    fn assemble_element_vector(&self, mesh: &Mesh, cell: CellId, ordering: &DofOrdering) -> eyre::Result<DVector<f64>>;
}

/// Standard Galerkin discretization of `-div(kappa grad u) + r u = f` for one field variable.
///
/// Local DOFs of other variables get zero rows and columns.
#[derive(Debug, Clone)]
pub struct PoissonAssembler<F> {
    var: VarId,
    diffusion: f64,
    reaction: f64,
    source: F,
}

impl<F> PoissonAssembler<F>
where
    F: Fn(&Point2<f64>) -> f64 + Sync,
{
    pub fn new(var: VarId, source: F) -> Self {
        Self {
            var,
            diffusion: 1.0,
            reaction: 0.0,
            source,
        }
    }

    pub fn with_diffusion(self, diffusion: f64) -> Self {
        Self { diffusion, ..self }
    }

    pub fn with_reaction(self, reaction: f64) -> Self {
        Self { reaction, ..self }
    }

    fn block<'a>(&self, ordering: &'a DofOrdering) -> eyre::Result<&'a BasisBlock> {
        ordering
            .block(self.var, None)
            .ok_or_else(|| eyre!("variable {} is not a field variable of the DOF ordering", self.var))
    }

    fn quadrature(&self, block: &BasisBlock) -> QuadratureRule {
        QuadratureRule::gauss(block.basis().topology(), block.basis().order() + 2)
    }
}

impl<F> ElementAssembler for PoissonAssembler<F>
where
    F: Fn(&Point2<f64>) -> f64 + Sync,
{
    fn assemble_element_matrix(&self, mesh: &Mesh, cell: CellId, ordering: &DofOrdering) -> eyre::Result<DMatrix<f64>> {
        let block = self.block(ordering)?;
        let basis = block.basis();
        let geometry = mesh.topology().cell_geometry(cell)?;
        let n = ordering.local_dof_count();
        let mut matrix = DMatrix::zeros(n, n);
        let mut block_matrix = DMatrix::zeros(block.len(), block.len());

        let quadrature = self.quadrature(block);
        for (w, xi) in quadrature.weights.iter().zip(&quadrature.points) {
            let jacobian = geometry.reference_jacobian(xi);
            let det = jacobian.determinant();
            let jacobian_inv = jacobian
                .try_inverse()
                .ok_or_else(|| eyre!("degenerate geometry in cell {}", cell))?;
            let phi = basis.evaluate(xi);
            // Row k holds the physical gradient of basis function k
            let gradients = basis.evaluate_gradients(xi) * jacobian_inv;
            let scale = w * det.abs();
            block_matrix += (&gradients * gradients.transpose()) * (self.diffusion * scale);
            if self.reaction != 0.0 {
                block_matrix += (&phi * phi.transpose()) * (self.reaction * scale);
            }
        }

        let offset = block.offset();
        matrix
            .view_mut((offset, offset), (block.len(), block.len()))
            .copy_from(&block_matrix);
        Ok(matrix)
    }

    fn assemble_element_vector(&self, mesh: &Mesh, cell: CellId, ordering: &DofOrdering) -> eyre::Result<DVector<f64>> {
        let block = self.block(ordering)?;
        let basis = block.basis();
        let geometry = mesh.topology().cell_geometry(cell)?;
        let mut vector = DVector::zeros(ordering.local_dof_count());

        let quadrature = self.quadrature(block);
        for (w, xi) in quadrature.weights.iter().zip(&quadrature.points) {
            let det = geometry.reference_jacobian(xi).determinant();
            let x = geometry.map_reference_coords(xi);
            let f = (self.source)(&x);
            let phi = basis.evaluate(xi);
            let mut rows = vector.rows_mut(block.offset(), block.len());
            rows.axpy(w * det.abs() * f, &phi, 1.0);
        }
        Ok(vector)
    }
}
