use super::{condensed_dirichlet_poisson_system, direct_solve, dirichlet_poisson_system, single_field_assignment};
use minrule::assembly::global::{
    apply_homogeneous_dirichlet_bc_csr, apply_homogeneous_dirichlet_bc_rhs, assemble_system,
};
use minrule::assembly::local::PoissonAssembler;
use minrule::dofs::{BlockPartitionPolicy, DofInterpreter, GlobalDofAssignment};
use minrule::error::{GmgError, MeshTopologyError};
use minrule::mesh::procedural::create_unit_square_uniform_quad_mesh_2d;
use minrule::mesh::Mesh;
use minrule::multigrid::{
    coarse_ancestor, prolongation_matrix, GmgLevel, GmgOperator, GmgOptions, Smoother, SmootherChoice,
};
use minrule::solution::Solution;
use minrule::space::{FunctionSpace, VarFactory};
use minrule_sparse::csr::{csr_diagonal, csr_mul_vector};
use nalgebra::{DMatrix, DVector, Point2};
use util::{assert_approx_matrix_eq, is_positive_definite, relative_asymmetry};

fn options_with(smoother: SmootherChoice) -> GmgOptions {
    GmgOptions {
        smoother,
        ..GmgOptions::default()
    }
}

fn all_smoothers() -> [SmootherChoice; 4] {
    [
        SmootherChoice::None,
        SmootherChoice::PointJacobi,
        SmootherChoice::IfpackAdditiveSchwarz,
        SmootherChoice::NativeAdditiveSchwarz,
    ]
}

fn assert_symmetric_positive_definite(operator: &GmgOperator) {
    let matrix = operator.matrix_representation().unwrap();
    assert!(relative_asymmetry(&matrix) < 1e-6, "asymmetry {}", relative_asymmetry(&matrix));
    assert!(is_positive_definite(&matrix));
}

/// Global coefficients of the interpolant of `f` for a single-field assignment.
fn interpolant(mesh: &Mesh, dofs: &GlobalDofAssignment, f: impl Fn(&Point2<f64>) -> f64) -> DVector<f64> {
    let mut solution = Solution::new(dofs);
    solution.project_onto_mesh(mesh, 0, f).unwrap();
    solution.into_coefficients()
}

#[test]
fn prolongation_between_identical_levels_is_the_identity() {
    for order in [1, 2] {
        let mesh = create_unit_square_uniform_quad_mesh_2d(1, order);
        let (dofs, _) = single_field_assignment(&mesh);
        let level = GmgLevel::new(&mesh, &dofs);
        let p = DMatrix::from(&prolongation_matrix(&level, &level).unwrap());
        let n = dofs.global_dof_count();
        assert_eq!(p, DMatrix::identity(n, n));
    }

    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 2);
    let (dofs, u) = single_field_assignment(&mesh);
    let (matrix, _) = dirichlet_poisson_system(&mesh, &dofs, u);
    let levels = [GmgLevel::new(&mesh, &dofs), GmgLevel::new(&mesh, &dofs)];
    let operator = GmgOperator::new(&levels, matrix.clone(), GmgOptions::default()).unwrap();
    let p = DMatrix::from(operator.prolongation_operator());
    assert_eq!(p, DMatrix::identity(25, 25));
    assert_approx_matrix_eq!(
        &DMatrix::from(operator.coarse_stiffness_matrix()),
        &DMatrix::from(&matrix),
        abstol = 1e-12
    );
    assert!(operator.coarse_operator().is_none());
}

#[test]
fn h_prolongation_reproduces_coarse_interpolants() {
    let coarse_mesh = create_unit_square_uniform_quad_mesh_2d(2, 2);
    let mut fine_mesh = coarse_mesh.clone();
    fine_mesh.h_refine(&[0, 3]).unwrap();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, _) = single_field_assignment(&fine_mesh);

    let p = prolongation_matrix(
        &GmgLevel::new(&coarse_mesh, &coarse_dofs),
        &GmgLevel::new(&fine_mesh, &fine_dofs),
    )
    .unwrap();
    assert_eq!(p.nrows(), fine_dofs.global_dof_count());
    assert_eq!(p.ncols(), coarse_dofs.global_dof_count());

    // Quadratics are in both spaces, so prolongation of the coarse interpolant is the fine one
    let f = |x: &Point2<f64>| 1.0 + x.x - 2.0 * x.y * x.y + x.x * x.y;
    let coarse = interpolant(&coarse_mesh, &coarse_dofs, f);
    let fine = interpolant(&fine_mesh, &fine_dofs, f);
    assert_approx_matrix_eq!(&csr_mul_vector(&p, &coarse), &fine, abstol = 1e-12);
}

#[test]
fn p_prolongation_reproduces_coarse_interpolants() {
    let coarse_mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    let mut fine_mesh = coarse_mesh.clone();
    fine_mesh.p_refine(&[0, 1, 2, 3], 2).unwrap();
    fine_mesh.h_refine(&[2]).unwrap();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, _) = single_field_assignment(&fine_mesh);

    let p = prolongation_matrix(
        &GmgLevel::new(&coarse_mesh, &coarse_dofs),
        &GmgLevel::new(&fine_mesh, &fine_dofs),
    )
    .unwrap();

    let f = |x: &Point2<f64>| 3.0 - x.x + 0.5 * x.y;
    let coarse = interpolant(&coarse_mesh, &coarse_dofs, f);
    let fine = interpolant(&fine_mesh, &fine_dofs, f);
    assert_approx_matrix_eq!(&csr_mul_vector(&p, &coarse), &fine, abstol = 1e-12);
}

#[test]
fn trace_prolongation_reproduces_coarse_interpolants_on_the_skeleton() {
    let coarse_mesh = create_unit_square_uniform_quad_mesh_2d(1, 2);
    let mut fine_mesh = coarse_mesh.clone();
    fine_mesh.p_refine(&[0], 1).unwrap();
    let trace_assignment = |mesh: &Mesh| {
        let mut vf = VarFactory::new();
        vf.trace_var("u_hat");
        GlobalDofAssignment::single_partition(mesh, vf).unwrap()
    };
    let coarse_dofs = trace_assignment(&coarse_mesh);
    let fine_dofs = trace_assignment(&fine_mesh);
    let p = prolongation_matrix(
        &GmgLevel::new(&coarse_mesh, &coarse_dofs),
        &GmgLevel::new(&fine_mesh, &fine_dofs),
    )
    .unwrap();

    let f = |x: &Point2<f64>| x.x * x.x + x.y;
    let coarse = interpolant(&coarse_mesh, &coarse_dofs, f);
    let fine = interpolant(&fine_mesh, &fine_dofs, f);
    assert_approx_matrix_eq!(&csr_mul_vector(&p, &coarse), &fine, abstol = 1e-12);
}

#[test]
fn coarse_ancestor_follows_refinement_history() {
    let coarse_mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    let mut fine_mesh = coarse_mesh.clone();
    fine_mesh.h_refine(&[0]).unwrap();
    fine_mesh.h_refine(&[5]).unwrap();

    assert_eq!(coarse_ancestor(&coarse_mesh, &fine_mesh, 3).unwrap(), (3, vec![]));
    assert_eq!(coarse_ancestor(&coarse_mesh, &fine_mesh, 6).unwrap(), (0, vec![2]));
    assert_eq!(coarse_ancestor(&coarse_mesh, &fine_mesh, 9).unwrap(), (0, vec![1, 1]));

    // An unrelated mesh with the same cell ids is not nested
    let other = create_unit_square_uniform_quad_mesh_2d(3, 1);
    assert!(matches!(
        coarse_ancestor(&coarse_mesh, &other, 1),
        Err(MeshTopologyError::NotNested { fine_cell: 1 })
    ));
}

#[test]
fn pre_smoothing_on_identical_levels_solves_exactly() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 2);
    let (dofs, u) = single_field_assignment(&mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&mesh, &dofs, u);
    let levels = [GmgLevel::new(&mesh, &dofs), GmgLevel::new(&mesh, &dofs)];

    let options = GmgOptions {
        smooth_before_coarse_solve: true,
        ..options_with(SmootherChoice::PointJacobi)
    };
    let operator = GmgOperator::new(&levels, matrix.clone(), options).unwrap();
    let y = operator.apply_inverse(&rhs).unwrap();
    assert_approx_matrix_eq!(&y, &direct_solve(&matrix, &rhs), abstol = 1e-10);
}

#[test]
fn apply_inverse_on_a_single_linear_cell_matches_the_direct_solve() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1, 1);
    let (dofs, u) = single_field_assignment(&mesh);
    let assembler = PoissonAssembler::new(u, |x: &Point2<f64>| 1.0 + x.y);
    let (mut matrix, mut rhs) = assemble_system(&mesh, &dofs, &assembler).unwrap();
    // Only the left side is clamped, so the two right vertices stay free
    let left = dofs.boundary_global_dofs(&mesh, u, |x| x.x < 1e-12).unwrap();
    assert_eq!(left.len(), 2);
    apply_homogeneous_dirichlet_bc_csr(&mut matrix, &left).unwrap();
    apply_homogeneous_dirichlet_bc_rhs(&mut rhs, &left);
    let x_direct = direct_solve(&matrix, &rhs);
    assert!(x_direct.norm() > 0.0);

    let levels = [GmgLevel::new(&mesh, &dofs), GmgLevel::new(&mesh, &dofs)];
    for smoother in all_smoothers() {
        let pre_smoothed = GmgOptions {
            smooth_before_coarse_solve: true,
            ..options_with(smoother)
        };
        let operator = GmgOperator::new(&levels, matrix.clone(), pre_smoothed).unwrap();
        assert_eq!(DMatrix::from(operator.prolongation_operator()), DMatrix::identity(4, 4));
        let y = operator.apply_inverse(&rhs).unwrap();
        assert_approx_matrix_eq!(&y, &x_direct, abstol = 1e-10);

        // The additive cycle adds the smoothed right-hand side to the exact coarse solve
        let operator = GmgOperator::new(&levels, matrix.clone(), options_with(smoother)).unwrap();
        let y = operator.apply_inverse(&rhs).unwrap();
        let smoothed = operator.smoother_as_matrix() * &rhs;
        assert_approx_matrix_eq!(&(&y - &smoothed), &x_direct, abstol = 1e-10);
    }
}

#[test]
fn additive_cycle_adds_smoother_to_coarse_solve() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    let (dofs, u) = single_field_assignment(&mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&mesh, &dofs, u);
    let levels = [GmgLevel::new(&mesh, &dofs), GmgLevel::new(&mesh, &dofs)];

    let mut operator = GmgOperator::new(&levels, matrix.clone(), options_with(SmootherChoice::PointJacobi)).unwrap();
    let diagonal = csr_diagonal(&matrix);
    operator.set_stiffness_diagonal(&diagonal).unwrap();
    let y = operator.apply_inverse(&rhs).unwrap();

    let x = direct_solve(&matrix, &rhs);
    let expected = &x + rhs.component_div(&diagonal);
    assert_approx_matrix_eq!(&y, &expected, abstol = 1e-10);
    assert_approx_matrix_eq!(
        &operator.smoother_as_matrix(),
        &DMatrix::from_diagonal(&diagonal.map(|d| 1.0 / d)),
        abstol = 1e-14
    );
}

#[test]
fn post_smoothing_corrects_the_additive_cycle() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    let (dofs, u) = single_field_assignment(&mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&mesh, &dofs, u);
    let levels = [GmgLevel::new(&mesh, &dofs), GmgLevel::new(&mesh, &dofs)];

    let mut operator = GmgOperator::new(&levels, matrix.clone(), options_with(SmootherChoice::PointJacobi)).unwrap();
    operator.set_smooth_after_coarse_solve(true);
    let y = operator.apply_inverse(&rhs).unwrap();

    let x = direct_solve(&matrix, &rhs);
    let d_inv_b = rhs.component_div(&csr_diagonal(&matrix));
    let a_d_inv_b = csr_mul_vector(&matrix, &d_inv_b);
    let expected = &x + &d_inv_b - a_d_inv_b.component_div(&csr_diagonal(&matrix));
    assert_approx_matrix_eq!(&y, &expected, abstol = 1e-10);
}

#[test]
fn identity_smoother_matrix() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1, 2);
    let (dofs, u) = single_field_assignment(&mesh);
    let (matrix, _) = dirichlet_poisson_system(&mesh, &dofs, u);
    let levels = [GmgLevel::new(&mesh, &dofs), GmgLevel::new(&mesh, &dofs)];
    let operator = GmgOperator::new(&levels, matrix, options_with(SmootherChoice::None)).unwrap();
    assert!(matches!(operator.smoother(), Smoother::Identity));
    assert_eq!(operator.smoother_as_matrix(), DMatrix::identity(9, 9));
}

#[test]
fn schwarz_blocks_follow_partitions_or_cells() {
    let coarse_mesh = create_unit_square_uniform_quad_mesh_2d(1, 1);
    let mut fine_mesh = coarse_mesh.clone();
    fine_mesh.h_refine(&[0]).unwrap();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let mut vf = VarFactory::new();
    let u = vf.field_var("u", FunctionSpace::HGrad).id();
    let fine_dofs = GlobalDofAssignment::new(&fine_mesh, vf, BlockPartitionPolicy::new(2)).unwrap();
    let (matrix, _) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);
    let levels = [
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];

    let operator = GmgOperator::new(&levels, matrix.clone(), options_with(SmootherChoice::IfpackAdditiveSchwarz)).unwrap();
    match operator.smoother() {
        Smoother::AdditiveSchwarz { blocks } => {
            assert_eq!(blocks.len(), 2);
            let counts: Vec<usize> = blocks.iter().map(|b| b.indices().len()).collect();
            assert_eq!(counts, fine_dofs.partition_dof_counts());
        }
        other => panic!("unexpected smoother {:?}", other),
    }

    let options = GmgOptions {
        schwarz_overlap: 1,
        ..options_with(SmootherChoice::NativeAdditiveSchwarz)
    };
    let operator = GmgOperator::new(&levels, matrix, options).unwrap();
    match operator.smoother() {
        Smoother::AdditiveSchwarz { blocks } => {
            assert_eq!(blocks.len(), 4);
            // With one layer of overlap, every block of the 2x2 mesh reaches all 9 DOFs
            assert!(blocks.iter().all(|b| b.indices().len() == 9));
        }
        other => panic!("unexpected smoother {:?}", other),
    }
}

#[test]
fn two_grid_h_operator_is_symmetric_positive_definite() {
    let coarse_mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    let mut fine_mesh = coarse_mesh.clone();
    fine_mesh.h_refine(&[0, 1, 2, 3]).unwrap();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let mut vf = VarFactory::new();
    let u = vf.field_var("u", FunctionSpace::HGrad).id();
    let fine_dofs = GlobalDofAssignment::new(&fine_mesh, vf, BlockPartitionPolicy::new(2)).unwrap();
    let (matrix, _) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);
    let levels = [
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];

    for smoother in all_smoothers() {
        let operator = GmgOperator::new(&levels, matrix.clone(), options_with(smoother)).unwrap();
        assert_symmetric_positive_definite(&operator);
    }
    let options = GmgOptions {
        schwarz_overlap: 1,
        ..options_with(SmootherChoice::NativeAdditiveSchwarz)
    };
    let operator = GmgOperator::new(&levels, matrix, options).unwrap();
    assert_symmetric_positive_definite(&operator);
}

#[test]
fn two_grid_p_operator_is_symmetric_positive_definite() {
    let coarse_mesh = create_unit_square_uniform_quad_mesh_2d(1, 1);
    let mut fine_mesh = coarse_mesh.clone();
    fine_mesh.p_refine(&[0], 2).unwrap();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, _) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);
    let levels = [
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];

    for smoother in all_smoothers() {
        let operator = GmgOperator::new(&levels, matrix.clone(), options_with(smoother)).unwrap();
        assert_eq!(operator.dim(), 16);
        assert_symmetric_positive_definite(&operator);
    }
}

#[test]
fn three_grid_operator_is_symmetric_positive_definite() {
    let coarsest_mesh = create_unit_square_uniform_quad_mesh_2d(1, 1);
    let mut coarse_mesh = coarsest_mesh.clone();
    coarse_mesh.h_refine(&[0]).unwrap();
    let mut fine_mesh = coarse_mesh.clone();
    fine_mesh.p_refine(&[1, 2, 3, 4], 1).unwrap();
    let (coarsest_dofs, _) = single_field_assignment(&coarsest_mesh);
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, _) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);
    let levels = [
        GmgLevel::new(&coarsest_mesh, &coarsest_dofs),
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];

    for smoother in all_smoothers() {
        let operator = GmgOperator::new(&levels, matrix.clone(), options_with(smoother)).unwrap();
        let nested = operator.coarse_operator().expect("three levels nest an operator");
        assert_eq!(nested.dim(), coarse_dofs.global_dof_count());
        assert!(nested.coarse_operator().is_none());
        assert_symmetric_positive_definite(&operator);
    }
}

#[test]
fn replacing_the_stiffness_matrix_keeps_the_prolongation() {
    let coarse_mesh = create_unit_square_uniform_quad_mesh_2d(1, 1);
    let mut fine_mesh = coarse_mesh.clone();
    fine_mesh.h_refine(&[0]).unwrap();
    let (coarse_dofs, _) = single_field_assignment(&coarse_mesh);
    let (fine_dofs, u) = single_field_assignment(&fine_mesh);
    let (matrix, rhs) = dirichlet_poisson_system(&fine_mesh, &fine_dofs, u);
    let levels = [
        GmgLevel::new(&coarse_mesh, &coarse_dofs),
        GmgLevel::new(&fine_mesh, &fine_dofs),
    ];

    let mut operator = GmgOperator::new(&levels, matrix.clone(), GmgOptions::default()).unwrap();
    let prolongation = operator.prolongation_operator().clone();
    let y = operator.apply_inverse(&rhs).unwrap();

    let scaled = &matrix * 2.0;
    operator.set_fine_stiffness_matrix(scaled).unwrap();
    assert_eq!(operator.prolongation_operator(), &prolongation);
    let y_scaled = operator.apply_inverse(&rhs).unwrap();
    assert_approx_matrix_eq!(&(&y_scaled * 2.0), &y, abstol = 1e-12);
}

#[test]
fn static_condensation_on_identical_levels() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 3);
    let (base, u) = single_field_assignment(&mesh);
    let (condensed, matrix, rhs) = condensed_dirichlet_poisson_system(&mesh, &base, u);
    let levels = [GmgLevel::new(&mesh, &condensed), GmgLevel::new(&mesh, &condensed)];

    let options = GmgOptions {
        use_static_condensation: true,
        smooth_before_coarse_solve: true,
        ..GmgOptions::default()
    };
    let operator = GmgOperator::new(&levels, matrix.clone(), options).unwrap();
    let n = condensed.global_dof_count();
    assert_approx_matrix_eq!(
        &DMatrix::from(operator.prolongation_operator()),
        &DMatrix::<f64>::identity(n, n),
        abstol = 1e-12
    );
    let y = operator.apply_inverse(&rhs).unwrap();
    assert_approx_matrix_eq!(&y, &direct_solve(&matrix, &rhs), abstol = 1e-10);
}

#[test]
fn static_condensation_setting_must_match_the_levels() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 2);
    let (dofs, u) = single_field_assignment(&mesh);
    let (matrix, _) = dirichlet_poisson_system(&mesh, &dofs, u);
    let levels = [GmgLevel::new(&mesh, &dofs), GmgLevel::new(&mesh, &dofs)];

    let options = GmgOptions {
        use_static_condensation: true,
        ..GmgOptions::default()
    };
    let result = GmgOperator::new(&levels, matrix, options);
    assert!(matches!(result, Err(GmgError::CondensationMismatch { level: 0 })));
}

#[test]
fn operator_needs_two_levels_of_matching_size() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    let (dofs, u) = single_field_assignment(&mesh);
    let (matrix, _) = dirichlet_poisson_system(&mesh, &dofs, u);

    let result = GmgOperator::new(&[GmgLevel::new(&mesh, &dofs)], matrix.clone(), GmgOptions::default());
    assert!(matches!(result, Err(GmgError::TooFewLevels(1))));

    let other_mesh = create_unit_square_uniform_quad_mesh_2d(2, 2);
    let (other_dofs, _) = single_field_assignment(&other_mesh);
    let levels = [GmgLevel::new(&mesh, &dofs), GmgLevel::new(&other_mesh, &other_dofs)];
    let result = GmgOperator::new(&levels, matrix, GmgOptions::default());
    assert!(matches!(result, Err(GmgError::DimensionMismatch(_))));

    let levels = [GmgLevel::new(&mesh, &dofs), GmgLevel::new(&mesh, &dofs)];
    let mut operator = GmgOperator::new(&levels, dirichlet_poisson_system(&mesh, &dofs, u).0, GmgOptions::default()).unwrap();
    assert!(operator
        .set_stiffness_diagonal(&DVector::zeros(3))
        .is_err());
    assert!(operator.apply_inverse(&DVector::zeros(4)).is_err());
}
