use super::{condensed_dirichlet_poisson_system, direct_solve, dirichlet_poisson_system, single_field_assignment};
use minrule::error::GmgError;
use minrule::mesh::procedural::create_unit_square_uniform_quad_mesh_2d;
use minrule::mesh::Mesh;
use minrule::multigrid::{solve_preconditioned, GmgLevel, GmgOperator, GmgOptions, GmgSolver, SmootherChoice, SolveStatus};
use nalgebra::DVector;
use util::assert_approx_matrix_eq;

/// A coarse 2x2 mesh of order 1 and a fine mesh where every cell is refined once and raised
/// to order 2.
fn hp_hierarchy() -> (Mesh, Mesh) {
    let coarse = create_unit_square_uniform_quad_mesh_2d(2, 1);
    let mut fine = coarse.clone();
    fine.h_refine(&[0, 1, 2, 3]).unwrap();
    let children = fine.active_cells();
    fine.p_refine(&children, 1).unwrap();
    (coarse, fine)
}

#[test]
fn gmg_cg_converges_to_the_direct_solution() {
    let (coarse_mesh, fine_mesh) = hp_hierarchy();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);
    let expected = direct_solve(&matrix, &rhs);

    for smoother in [
        SmootherChoice::None,
        SmootherChoice::PointJacobi,
        SmootherChoice::IfpackAdditiveSchwarz,
        SmootherChoice::NativeAdditiveSchwarz,
    ] {
        let options = GmgOptions {
            smoother,
            tolerance: 1e-12,
            compute_condition_number_estimate: true,
            ..GmgOptions::default()
        };
        let levels = vec![
            GmgLevel::new(&coarse_mesh, &coarse_dofs),
            GmgLevel::new(&fine_mesh, &fine_dofs),
        ];
        let mut solver = GmgSolver::new(levels, options).unwrap();
        let mut x = DVector::zeros(rhs.len());
        let outcome = solver.solve(&matrix, &rhs, &mut x).unwrap();

        assert_eq!(outcome.status, SolveStatus::Converged);
        assert_eq!(outcome.status.code(), 0);
        assert!(outcome.iterations > 0);
        let condition = outcome.condition_estimate.unwrap();
        assert!(condition >= 0.999, "condition estimate {}", condition);
        assert_approx_matrix_eq!(&x, &expected, abstol = 1e-9);
    }
}

#[test]
fn condition_estimate_is_only_computed_on_request() {
    let (coarse_mesh, fine_mesh) = hp_hierarchy();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);

    let levels = vec![
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];
    let mut solver = GmgSolver::new(levels, GmgOptions::default()).unwrap();
    let mut x = DVector::zeros(rhs.len());
    let outcome = solver.solve(&matrix, &rhs, &mut x).unwrap();
    assert!(outcome.status.is_converged());
    assert!(outcome.condition_estimate.is_none());
}

#[test]
fn repeated_solves_reuse_the_operator() {
    let (coarse_mesh, fine_mesh) = hp_hierarchy();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);

    let options = GmgOptions {
        tolerance: 1e-12,
        ..GmgOptions::default()
    };
    let levels = vec![
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];
    let mut solver = GmgSolver::new(levels, options).unwrap();
    assert!(solver.operator().is_none());

    let mut x = DVector::zeros(rhs.len());
    solver.solve(&matrix, &rhs, &mut x).unwrap();
    let prolongation = solver.operator().unwrap().prolongation_operator().clone();

    let scaled = &matrix * 2.0;
    let mut y = DVector::zeros(rhs.len());
    let outcome = solver.solve(&scaled, &rhs, &mut y).unwrap();
    assert!(outcome.status.is_converged());
    assert_eq!(solver.operator().unwrap().prolongation_operator(), &prolongation);
    assert_approx_matrix_eq!(&(&y * 2.0), &x, abstol = 1e-9);

    solver.set_options(GmgOptions::default());
    assert!(solver.operator().is_none());
}

#[test]
fn negative_definite_system_reports_singular_coarse_matrix() {
    let (coarse_mesh, fine_mesh) = hp_hierarchy();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);

    let levels = vec![
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];
    let mut solver = GmgSolver::new(levels, GmgOptions::default()).unwrap();
    let negated = &matrix * -1.0;
    let mut x = DVector::zeros(rhs.len());
    let outcome = solver.solve(&negated, &rhs, &mut x).unwrap();
    assert_eq!(outcome.status, SolveStatus::SingularCoarseMatrix);
    assert_eq!(outcome.status.code(), 2);
    assert_eq!(outcome.iterations, 0);
}

#[test]
fn iteration_limit_is_reported_as_status() {
    let (coarse_mesh, fine_mesh) = hp_hierarchy();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);

    let options = GmgOptions {
        max_iterations: 1,
        tolerance: 1e-14,
        ..GmgOptions::default()
    };
    let levels = vec![
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];
    let mut solver = GmgSolver::new(levels, options).unwrap();
    let mut x = DVector::zeros(rhs.len());
    let outcome = solver.solve(&matrix, &rhs, &mut x).unwrap();
    assert_eq!(outcome.status, SolveStatus::MaxIterationsExceeded);
    assert_eq!(outcome.status.code(), 1);
    assert_eq!(outcome.iterations, 1);
}

#[test]
fn preconditioned_solve_with_a_prebuilt_operator() {
    let coarse_mesh = create_unit_square_uniform_quad_mesh_2d(1, 1);
    let mut mid_mesh = coarse_mesh.clone();
    mid_mesh.h_refine(&[0]).unwrap();
    let mut fine_mesh = mid_mesh.clone();
    fine_mesh.h_refine(&[1, 2, 3, 4]).unwrap();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (mid_dofs, _) = single_field_assignment(&mid_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);

    let levels = [
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&mid_mesh, &mid_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];
    let options = GmgOptions {
        smoother: SmootherChoice::NativeAdditiveSchwarz,
        tolerance: 1e-12,
        ..GmgOptions::default()
    };
    let operator = GmgOperator::new(&levels, matrix.clone(), options).unwrap();
    let mut x = DVector::zeros(rhs.len());
    let outcome = solve_preconditioned(&operator, &rhs, &mut x).unwrap();
    assert!(outcome.status.is_converged());
    assert_approx_matrix_eq!(&x, &direct_solve(&matrix, &rhs), abstol = 1e-9);

    let result = solve_preconditioned(&operator, &DVector::zeros(3), &mut x);
    assert!(matches!(result, Err(GmgError::DimensionMismatch(_))));
}

#[test]
fn gmg_cg_with_static_condensation() {
    let (coarse_mesh, fine_mesh) = hp_hierarchy();
    let (coarse_base, coarse_u) = single_field_assignment(&coarse_mesh);
    let (fine_base, u) = single_field_assignment(&fine_mesh);
    let (coarse_condensed, _, _) = condensed_dirichlet_poisson_system(&coarse_mesh, &coarse_base, coarse_u);
    let (fine_condensed, matrix, rhs) = condensed_dirichlet_poisson_system(&fine_mesh, &fine_base, u);

    let options = GmgOptions {
        use_static_condensation: true,
        tolerance: 1e-12,
        ..GmgOptions::default()
    };
    let levels = vec![
        GmgLevel::new(&coarse_mesh, &coarse_condensed),
        GmgLevel::new(&fine_mesh, &fine_condensed),
    ];
    let mut solver = GmgSolver::new(levels, options).unwrap();
    let mut x = DVector::zeros(rhs.len());
    let outcome = solver.solve(&matrix, &rhs, &mut x).unwrap();
    assert!(outcome.status.is_converged());

    let expanded = fine_condensed.expand_global_solution(&x).unwrap();
    let (full_matrix, full_rhs) = dirichlet_poisson_system(&fine_mesh, &fine_base, u);
    assert_approx_matrix_eq!(&expanded, &direct_solve(&full_matrix, &full_rhs), abstol = 1e-9);
}

#[test]
fn solver_validates_levels_and_sizes() {
    let (coarse_mesh, fine_mesh) = hp_hierarchy();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);

    let result = GmgSolver::new(vec![GmgLevel::new(&fine_mesh, &fine_dofs)], GmgOptions::default());
    assert!(matches!(result, Err(GmgError::TooFewLevels(1))));

    let condensed_options = GmgOptions {
        use_static_condensation: true,
        ..GmgOptions::default()
    };
    let levels = vec![
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];
    let result = GmgSolver::new(levels.clone(), condensed_options);
    assert!(matches!(result, Err(GmgError::CondensationMismatch { level: 0 })));

    let mut solver = GmgSolver::new(levels, GmgOptions::default()).unwrap();
    let mut x = DVector::zeros(rhs.len() + 1);
    let result = solver.solve(&matrix, &rhs, &mut x);
    assert!(matches!(result, Err(GmgError::DimensionMismatch(_))));
}
