use super::SmootherChoice;
use crate::dofs::DofInterpreter;
use crate::error::{DofError, GmgError};
use log::debug;
use minrule_sparse::csr::csr_diagonal;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};
use nalgebra_sparse::CsrMatrix;
use rustc_hash::{FxHashMap, FxHashSet};

/// One overlapping subdomain of an additive Schwarz smoother.
#[derive(Debug, Clone)]
pub struct SchwarzBlock {
    indices: Vec<usize>,
    factor: Cholesky<f64, Dyn>,
}

impl SchwarzBlock {
    /// Global indices of the block, in increasing order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

/// The smoothing operator `S` of a multigrid level, an approximation of `A^-1`.
#[derive(Debug, Clone)]
pub enum Smoother {
    Identity,
    Jacobi { inverse_diagonal: DVector<f64> },
    AdditiveSchwarz { blocks: Vec<SchwarzBlock> },
}

impl Smoother {
    /// Point Jacobi with the given diagonal. Zero diagonal entries are left out of the smoother.
    pub fn point_jacobi(diagonal: &DVector<f64>) -> Self {
        let inverse_diagonal = diagonal.map(|d| if d != 0.0 { 1.0 / d } else { 0.0 });
        Self::Jacobi { inverse_diagonal }
    }

    /// Additive Schwarz with dense Cholesky solves on the seed blocks grown by `overlap` layers
    /// of the matrix graph.
    pub fn additive_schwarz(matrix: &CsrMatrix<f64>, seeds: &[Vec<usize>], overlap: usize) -> Result<Self, GmgError> {
        let blocks = seeds
            .iter()
            .filter(|seed| !seed.is_empty())
            .enumerate()
            .map(|(block, seed)| {
                let indices = grow_block(matrix, seed, overlap);
                let dense = extract_block(matrix, &indices);
                let factor = Cholesky::new(dense).ok_or(GmgError::SmootherBlockFactorization { block })?;
                Ok(SchwarzBlock { indices, factor })
            })
            .collect::<Result<Vec<_>, GmgError>>()?;
        debug!(
            "additive Schwarz smoother with {} blocks, largest block has {} DOFs",
            blocks.len(),
            blocks.iter().map(|b| b.indices.len()).max().unwrap_or(0)
        );
        Ok(Self::AdditiveSchwarz { blocks })
    }

    /// Builds the smoother selected in the options. `seeds` are the initial Schwarz blocks, see
    /// [`schwarz_seeds`].
    pub fn new(
        choice: SmootherChoice,
        matrix: &CsrMatrix<f64>,
        seeds: &[Vec<usize>],
        overlap: usize,
    ) -> Result<Self, GmgError> {
        match choice {
            SmootherChoice::None => Ok(Self::Identity),
            SmootherChoice::PointJacobi => Ok(Self::point_jacobi(&csr_diagonal(matrix))),
            SmootherChoice::IfpackAdditiveSchwarz | SmootherChoice::NativeAdditiveSchwarz => {
                Self::additive_schwarz(matrix, seeds, overlap)
            }
        }
    }

    /// Computes `S x`.
    pub fn apply(&self, x: &DVector<f64>) -> DVector<f64> {
        match self {
            Self::Identity => x.clone(),
            Self::Jacobi { inverse_diagonal } => inverse_diagonal.component_mul(x),
            Self::AdditiveSchwarz { blocks } => {
                let mut y = DVector::zeros(x.len());
                for block in blocks {
                    let local = DVector::from_iterator(block.indices.len(), block.indices.iter().map(|&i| x[i]));
                    let solution = block.factor.solve(&local);
                    for (&i, value) in block.indices.iter().zip(solution.iter()) {
                        y[i] += value;
                    }
                }
                y
            }
        }
    }

    /// The dense matrix of the smoother on an index space of dimension `n`.
    pub fn to_matrix(&self, n: usize) -> DMatrix<f64> {
        match self {
            Self::Identity => DMatrix::identity(n, n),
            Self::Jacobi { inverse_diagonal } => DMatrix::from_diagonal(inverse_diagonal),
            Self::AdditiveSchwarz { blocks } => {
                let mut matrix = DMatrix::zeros(n, n);
                for block in blocks {
                    let inverse = block.factor.inverse();
                    for (a, &i) in block.indices.iter().enumerate() {
                        for (b, &j) in block.indices.iter().enumerate() {
                            matrix[(i, j)] += inverse[(a, b)];
                        }
                    }
                }
                matrix
            }
        }
    }

    /// Replaces the diagonal used by point Jacobi. Other smoothers are unaffected.
    pub fn set_diagonal(&mut self, diagonal: &DVector<f64>) {
        if let Self::Jacobi { .. } = self {
            *self = Self::point_jacobi(diagonal);
        }
    }
}

/// Initial (non-overlapping) Schwarz blocks of a level.
pub fn schwarz_seeds(choice: SmootherChoice, dofs: &dyn DofInterpreter) -> Result<Vec<Vec<usize>>, DofError> {
    match choice {
        SmootherChoice::IfpackAdditiveSchwarz => {
            let map = dofs.partition_map();
            Ok((0..map.num_partitions())
                .map(|p| map.partition_range(p).collect::<Vec<_>>())
                .filter(|block| !block.is_empty())
                .collect())
        }
        SmootherChoice::NativeAdditiveSchwarz => dofs
            .active_cells()
            .iter()
            .map(|&cell| dofs.cell_global_dofs(cell))
            .filter(|dofs| dofs.as_ref().map_or(true, |dofs| !dofs.is_empty()))
            .collect(),
        SmootherChoice::None | SmootherChoice::PointJacobi => Ok(Vec::new()),
    }
}

fn grow_block(matrix: &CsrMatrix<f64>, seed: &[usize], overlap: usize) -> Vec<usize> {
    let mut members: FxHashSet<usize> = seed.iter().copied().collect();
    let mut frontier: Vec<usize> = seed.to_vec();
    for _ in 0..overlap {
        let mut next = Vec::new();
        for &row in &frontier {
            for &col in matrix.row(row).col_indices() {
                if members.insert(col) {
                    next.push(col);
                }
            }
        }
        frontier = next;
    }
    let mut indices: Vec<usize> = members.into_iter().collect();
    indices.sort_unstable();
    indices
}

fn extract_block(matrix: &CsrMatrix<f64>, indices: &[usize]) -> DMatrix<f64> {
    let position: FxHashMap<usize, usize> = indices.iter().enumerate().map(|(a, &i)| (i, a)).collect();
    let mut block = DMatrix::zeros(indices.len(), indices.len());
    for (a, &i) in indices.iter().enumerate() {
        let row = matrix.row(i);
        for (col, value) in row.col_indices().iter().zip(row.values()) {
            if let Some(&b) = position.get(col) {
                block[(a, b)] += value;
            }
        }
    }
    block
}
