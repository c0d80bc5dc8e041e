//! Geometric multigrid on nested hp-meshes.
//!
//! A hierarchy is a list of [`GmgLevel`]s, coarsest first. Adjacent levels are connected by a
//! prolongation matrix computed from the two DOF interpretations, and the resulting
//! [`GmgOperator`] is used as a preconditioner for conjugate gradient by [`GmgSolver`].
use crate::dofs::DofInterpreter;
use crate::mesh::Mesh;
use serde::{Deserialize, Serialize};
use std::fmt;

mod operator;
mod prolongation;
mod smoother;
mod solver;

pub use operator::*;
pub use prolongation::*;
pub use smoother::*;
pub use solver::*;

/// Smoother applied on the fine level of every pair of levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmootherChoice {
    /// The identity.
    None,
    /// The inverse of the stiffness diagonal.
    #[default]
    PointJacobi,
    /// One overlapping block per partition of the fine index space.
    IfpackAdditiveSchwarz,
    /// One overlapping block per active fine cell.
    NativeAdditiveSchwarz,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmgOptions {
    pub smoother: SmootherChoice,
    pub smooth_before_coarse_solve: bool,
    pub smooth_after_coarse_solve: bool,
    /// Every level must then be interpreted by a
    /// [`CondensedDofInterpreter`](crate::dofs::CondensedDofInterpreter).
    pub use_static_condensation: bool,
    pub max_iterations: usize,
    /// Tolerance on the residual norm relative to the norm of the right-hand side.
    pub tolerance: f64,
    pub compute_condition_number_estimate: bool,
    /// Number of matrix-graph layers added around each additive Schwarz block.
    pub schwarz_overlap: usize,
}

impl Default for GmgOptions {
    fn default() -> Self {
        Self {
            smoother: SmootherChoice::PointJacobi,
            smooth_before_coarse_solve: false,
            smooth_after_coarse_solve: false,
            use_static_condensation: false,
            max_iterations: 1000,
            tolerance: 1e-6,
            compute_condition_number_estimate: false,
            schwarz_overlap: 0,
        }
    }
}

/// Outcome of an iterative solve. The discriminant is the numeric status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged = 0,
    MaxIterationsExceeded = 1,
    SingularCoarseMatrix = 2,
    IndefiniteOperator = 3,
}

impl SolveStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_converged(self) -> bool {
        self == Self::Converged
    }
}

/// A mesh together with the interpretation of its global DOFs.
///
/// Levels only borrow: the driver keeps meshes and DOF assignments alive for as long as the
/// levels are used to build operators.
#[derive(Clone, Copy)]
pub struct GmgLevel<'a> {
    pub mesh: &'a Mesh,
    pub dofs: &'a dyn DofInterpreter,
}

impl<'a> GmgLevel<'a> {
    pub fn new(mesh: &'a Mesh, dofs: &'a dyn DofInterpreter) -> Self {
        Self { mesh, dofs }
    }
}

impl fmt::Debug for GmgLevel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmgLevel")
            .field("active_cells", &self.dofs.active_cells().len())
            .field("global_dof_count", &self.dofs.global_dof_count())
            .field("is_condensed", &self.dofs.is_condensed())
            .finish()
    }
}
