use super::{GmgLevel, GmgOperator, GmgOptions, SolveStatus};
use crate::error::{DimensionMismatchError, GmgError};
use log::{info, warn};
use minrule_sparse::cg::{ConjugateGradient, RelativeResidualCriterion, SolveErrorKind};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub iterations: usize,
    /// Estimated condition number of the preconditioned system, when requested in the options.
    pub condition_estimate: Option<f64>,
}

impl SolveOutcome {
    fn failed(status: SolveStatus) -> Self {
        Self {
            status,
            iterations: 0,
            condition_estimate: None,
        }
    }
}

/// Conjugate gradient preconditioned by a [`GmgOperator`].
///
/// The solver borrows the levels of the hierarchy. The operator is built on the first solve and
/// reused by later solves, which only replace its stiffness matrices.
#[derive(Debug)]
pub struct GmgSolver<'a> {
    levels: Vec<GmgLevel<'a>>,
    options: GmgOptions,
    operator: Option<GmgOperator>,
}

impl<'a> GmgSolver<'a> {
    /// Creates a solver for a hierarchy of levels, coarsest first.
    pub fn new(levels: Vec<GmgLevel<'a>>, options: GmgOptions) -> Result<Self, GmgError> {
        if levels.len() < 2 {
            return Err(GmgError::TooFewLevels(levels.len()));
        }
        for (index, level) in levels.iter().enumerate() {
            if level.dofs.is_condensed() != options.use_static_condensation {
                return Err(GmgError::CondensationMismatch { level: index });
            }
        }
        Ok(Self {
            levels,
            options,
            operator: None,
        })
    }

    pub fn options(&self) -> &GmgOptions {
        &self.options
    }

    /// Changes the options. The operator is rebuilt on the next solve.
    pub fn set_options(&mut self, options: GmgOptions) {
        self.options = options;
        self.operator = None;
    }

    /// The operator of the most recent solve.
    pub fn operator(&self) -> Option<&GmgOperator> {
        self.operator.as_ref()
    }

    pub fn operator_mut(&mut self) -> Option<&mut GmgOperator> {
        self.operator.as_mut()
    }

    /// Solves `a x = b`, starting from the current contents of `x`.
    ///
    /// Non-convergence is reported through the status of the outcome, as is a coarse matrix
    /// that cannot be factored. Inconsistent sizes and topologies are errors.
    pub fn solve(&mut self, a: &CsrMatrix<f64>, b: &DVector<f64>, x: &mut DVector<f64>) -> Result<SolveOutcome, GmgError> {
        let n = self.levels[self.levels.len() - 1].dofs.global_dof_count();
        DimensionMismatchError::check("right-hand side", n, b.len())?;
        DimensionMismatchError::check("initial guess", n, x.len())?;

        let prepared = match self.operator.take() {
            Some(mut operator) => operator.set_fine_stiffness_matrix(a.clone()).map(|()| operator),
            None => GmgOperator::new(&self.levels, a.clone(), self.options.clone()),
        };
        let operator = match prepared {
            Ok(operator) => self.operator.insert(operator),
            Err(GmgError::SingularCoarseMatrix) => {
                warn!("coarse stiffness matrix could not be factored");
                return Ok(SolveOutcome::failed(SolveStatus::SingularCoarseMatrix));
            }
            Err(err) => return Err(err),
        };
        solve_preconditioned(operator, b, x)
    }
}

/// Runs preconditioned CG on the fine stiffness matrix of the operator.
pub fn solve_preconditioned(operator: &GmgOperator, b: &DVector<f64>, x: &mut DVector<f64>) -> Result<SolveOutcome, GmgError> {
    let options = operator.options();
    DimensionMismatchError::check("right-hand side", operator.dim(), b.len())?;
    DimensionMismatchError::check("initial guess", operator.dim(), x.len())?;

    let result = ConjugateGradient::new()
        .with_operator(operator.fine_stiffness_matrix())
        .with_preconditioner(operator)
        .with_max_iter(options.max_iterations)
        .with_lanczos_recording(options.compute_condition_number_estimate)
        .with_stopping_criterion(RelativeResidualCriterion::new(options.tolerance))
        .solve_with_guess(b, &mut *x);

    let (status, output) = match result {
        Ok(output) => (SolveStatus::Converged, output),
        Err(err) => {
            let status = match err.kind {
                SolveErrorKind::MaxIterationsReached { .. } => SolveStatus::MaxIterationsExceeded,
                SolveErrorKind::IndefiniteOperator | SolveErrorKind::IndefinitePreconditioner => {
                    SolveStatus::IndefiniteOperator
                }
                other => return Err(GmgError::OperatorApplication(other.to_string())),
            };
            (status, err.output)
        }
    };
    let condition_estimate = if options.compute_condition_number_estimate {
        output.condition_number_estimate()
    } else {
        None
    };
    if status.is_converged() {
        info!("multigrid CG converged in {} iterations", output.num_iterations);
    } else {
        warn!(
            "multigrid CG stopped after {} iterations with status {:?}",
            output.num_iterations, status
        );
    }
    Ok(SolveOutcome {
        status,
        iterations: output.num_iterations,
        condition_estimate,
    })
}
