use super::{condensed_dirichlet_poisson_system, direct_solve, dirichlet_poisson_system, single_field_assignment};
use minrule::assembly::global::{assemble_matrix_from_local, compute_local_stiffness_matrices};
use minrule::assembly::local::PoissonAssembler;
use minrule::dofs::{CondensedDofInterpreter, DofInterpreter};
use minrule::error::DofError;
use minrule::mesh::procedural::create_unit_square_uniform_quad_mesh_2d;
use nalgebra::{DMatrix, Point2};
use std::collections::BTreeMap;
use util::assert_approx_matrix_eq;

#[test]
fn condensation_removes_cell_interior_dofs() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 3);
    let (base, u) = single_field_assignment(&mesh);
    assert_eq!(base.global_dof_count(), 49);

    let (condensed, matrix, _) = condensed_dirichlet_poisson_system(&mesh, &base, u);
    assert!(condensed.is_condensed());
    assert!(!base.is_condensed());
    assert_eq!(condensed.interior_dof_count(), 16);
    assert_eq!(condensed.global_dof_count(), 33);
    assert_eq!(matrix.nrows(), 33);
    assert_eq!(condensed.partition_map().partition_dof_counts(), vec![33]);

    for c in 0..condensed.global_dof_count() {
        assert_eq!(condensed.condensed_index(condensed.base_index(c)), Some(c));
    }
    for &cell in condensed.active_cells() {
        let interior = base.entity_dofs(2, cell, u).unwrap();
        for global in interior {
            assert_eq!(condensed.condensed_index(global), None);
        }
        let condensed_globals = condensed.cell_global_dofs(cell).unwrap();
        assert_eq!(condensed_globals.len(), 12);
    }
}

#[test]
fn condensed_matrix_is_the_schur_complement() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1, 2);
    let (base, u) = single_field_assignment(&mesh);
    let assembler = PoissonAssembler::new(u, |_: &Point2<f64>| 0.0);
    let stiffness = compute_local_stiffness_matrices(&mesh, &base, &assembler).unwrap();
    let condensed = CondensedDofInterpreter::new(&base, &stiffness).unwrap();

    let full = DMatrix::from(&assemble_matrix_from_local(&base, &stiffness).unwrap());
    let reduced = DMatrix::from(&assemble_matrix_from_local(&condensed, &stiffness).unwrap());

    let boundary: Vec<usize> = (0..condensed.global_dof_count())
        .map(|c| condensed.base_index(c))
        .collect();
    let interior = base.entity_dofs(2, 0, u).unwrap().start;
    let mut schur = full.select_rows(&boundary).select_columns(&boundary);
    let a_ii = full[(interior, interior)];
    for (i, &bi) in boundary.iter().enumerate() {
        for (j, &bj) in boundary.iter().enumerate() {
            schur[(i, j)] -= full[(bi, interior)] * full[(interior, bj)] / a_ii;
        }
    }
    assert_approx_matrix_eq!(&reduced, &schur, abstol = 1e-12);
}

#[test]
fn condensed_solve_matches_full_solve() {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d(2, 3);
    mesh.h_refine(&[0]).unwrap();
    mesh.p_refine(&[3], 1).unwrap();
    let (base, u) = single_field_assignment(&mesh);

    let (matrix, rhs) = dirichlet_poisson_system(&mesh, &base, u);
    let full_solution = direct_solve(&matrix, &rhs);

    let (condensed, condensed_matrix, condensed_rhs) = condensed_dirichlet_poisson_system(&mesh, &base, u);
    let condensed_solution = direct_solve(&condensed_matrix, &condensed_rhs);
    let expanded = condensed.expand_global_solution(&condensed_solution).unwrap();

    assert_approx_matrix_eq!(&expanded, &full_solution, abstol = 1e-10);
}

#[test]
fn condensation_requires_every_local_matrix() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 2);
    let (base, u) = single_field_assignment(&mesh);
    let assembler = PoissonAssembler::new(u, |_: &Point2<f64>| 0.0);
    let mut stiffness: BTreeMap<_, _> = compute_local_stiffness_matrices(&mesh, &base, &assembler).unwrap();
    stiffness.remove(&2);

    let result = CondensedDofInterpreter::new(&base, &stiffness);
    assert!(matches!(result, Err(DofError::MissingLocalMatrix(2))));
}
