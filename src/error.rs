//! Error types.
//!
//! Topology and dimension errors are fatal and surface immediately. Non-convergence of the
//! iterative solver is not an error: it is reported as a [`SolveStatus`](crate::multigrid::SolveStatus).
use crate::space::VarId;
use crate::CellId;
use thiserror::Error;

/// The mesh is inconsistent, or a request does not make sense for its current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MeshTopologyError {
    #[error("cell {0} does not exist")]
    UnknownCell(CellId),
    #[error("vertex {0} does not exist")]
    UnknownVertex(usize),
    #[error("cell {0} is not active")]
    InactiveCell(CellId),
    #[error("cell {0} has no children")]
    NotRefined(CellId),
    #[error("cannot unrefine cell {parent}: child {child} is refined")]
    RefinedChild { parent: CellId, child: CellId },
    #[error("hanging vertex {vertex} does not lie on a resolvable constraining edge")]
    DanglingConstraint { vertex: usize },
    #[error("entity {entity} of dimension {dimension} has no active owner")]
    UnresolvableOwnership { dimension: usize, entity: usize },
    #[error("constraint resolution starting at entity {entity} of dimension {dimension} does not terminate")]
    CyclicConstraint { dimension: usize, entity: usize },
    #[error("fine cell {fine_cell} has no ancestor among the active cells of the coarse mesh")]
    NotNested { fine_cell: CellId },
    #[error("polynomial order must be at least 1, got {0}")]
    InvalidOrder(usize),
    #[error("cell geometry needs {expected} vertices, got {actual}")]
    VertexCount { expected: usize, actual: usize },
}

/// Sizes of related objects disagree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
pub struct DimensionMismatchError {
    pub context: &'static str,
    pub expected: usize,
    pub actual: usize,
}

impl DimensionMismatchError {
    pub fn new(context: &'static str, expected: usize, actual: usize) -> Self {
        Self {
            context,
            expected,
            actual,
        }
    }

    /// Returns an error if `expected != actual`.
    pub fn check(context: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::new(context, expected, actual))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DofError {
    #[error(transparent)]
    MeshTopology(#[from] MeshTopologyError),
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatchError),
    #[error("DOF lookups were built for topology version {built}, but the mesh is at version {current}")]
    StaleLookups { built: u64, current: u64 },
    #[error("unknown variable {0}")]
    UnknownVariable(VarId),
    #[error("interior block of cell {0} is singular")]
    SingularInteriorBlock(CellId),
    #[error("no local stiffness matrix was provided for cell {0}")]
    MissingLocalMatrix(CellId),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GmgError {
    #[error(transparent)]
    Dof(#[from] DofError),
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatchError),
    #[error("a multigrid hierarchy needs at least two levels, got {0}")]
    TooFewLevels(usize),
    #[error("the coarse stiffness matrix is singular or not positive definite")]
    SingularCoarseMatrix,
    #[error("smoother block {block} is not positive definite")]
    SmootherBlockFactorization { block: usize },
    #[error("level {level} does not match the static condensation setting of the options")]
    CondensationMismatch { level: usize },
    #[error("failed to apply operator: {0}")]
    OperatorApplication(String),
}

impl From<MeshTopologyError> for GmgError {
    fn from(err: MeshTopologyError) -> Self {
        Self::Dof(DofError::MeshTopology(err))
    }
}
