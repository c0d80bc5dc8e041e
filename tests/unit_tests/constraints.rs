use super::single_field_assignment;
use minrule::assembly::global::{assemble_matrix_from_local, assemble_vector_from_local};
use minrule::dofs::{DofInterpreter, GlobalDofAssignment};
use minrule::mesh::procedural::{create_rectangular_uniform_quad_mesh_2d, create_unit_square_uniform_quad_mesh_2d};
use minrule::mesh::Mesh;
use minrule::proptest::hp_refined_mesh_strategy;
use minrule::solution::Solution;
use minrule::space::{Subcell, VarId};
use nalgebra::{DMatrix, DVector, Point2};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Two unit squares side by side, the left one of order 1 and the right one of order 2.
fn mixed_order_two_cell_mesh() -> Mesh {
    let mut mesh = create_rectangular_uniform_quad_mesh_2d(2.0, 1.0, 2, 1, &Point2::origin(), 1);
    mesh.set_h1_order(1, 2).unwrap();
    mesh
}

fn assert_linear_function_is_reproduced(mesh: &Mesh, dofs: &GlobalDofAssignment, var: VarId) {
    let f = |x: &Point2<f64>| 1.0 + 2.0 * x.x - 3.0 * x.y;
    let mut solution = Solution::new(dofs);
    solution.project_onto_mesh(mesh, var, f).unwrap();
    for &cell in dofs.active_cells() {
        let ordering = dofs.dof_ordering(cell).unwrap();
        let geometry = mesh.topology().cell_geometry(cell).unwrap();
        let local = solution.local_coefficients(cell).unwrap();
        for block in ordering.blocks_for_var(var) {
            for (i, node) in block.local_indices().zip(block.nodes()) {
                let x = geometry.map_reference_coords(&node.reference_point);
                assert!(
                    (local[i] - f(&x)).abs() < 1e-10,
                    "cell {}, local DOF {} at {}: expected {}, got {}",
                    cell,
                    i,
                    x,
                    f(&x),
                    local[i]
                );
            }
        }
    }
}

#[test]
fn mixed_order_neighbors_share_the_lower_order_edge() {
    let mesh = mixed_order_two_cell_mesh();
    let (dofs, u) = single_field_assignment(&mesh);

    // Cell 0 owns its four vertices. Cell 1 owns two vertices, its three unshared edges and
    // its interior. The shared edge has the order of cell 0 and thus no DOFs of its own.
    assert_eq!(dofs.global_dof_count(), 10);
    assert_eq!(dofs.cell_global_dofs(0).unwrap(), vec![0, 1, 2, 3]);
    assert_eq!(dofs.cell_global_dofs(1).unwrap(), vec![1, 2, 4, 5, 6, 7, 8, 9]);
    assert_eq!(dofs.entity_dofs(0, 2, u), Some(4..5));
    assert_eq!(dofs.entity_dofs(0, 5, u), Some(5..6));
    assert_eq!(dofs.entity_dofs(2, 1, u), Some(9..10));

    let constraints = dofs.cell_constraints(1).unwrap();
    // Side 3 (left) of cell 1 is side 1 (right) of cell 0
    assert_eq!(constraints.constraint(1, 3).cell_id, 0);
    assert_eq!(constraints.constraint(1, 3).side_ordinal, Some(1));
    assert_eq!(constraints.constraint(1, 1).cell_id, 1);
    assert_eq!(dofs.cell_constraints(0).unwrap().constraint(1, 1).cell_id, 0);
}

#[test]
fn mid_edge_node_of_higher_order_cell_interpolates_shared_vertices() {
    let mesh = mixed_order_two_cell_mesh();
    let (dofs, _) = single_field_assignment(&mesh);

    // Local DOF 3 of the second-order cell is the node at the midpoint of its left side
    let (operator, globals) = dofs.local_to_global_operator(1).unwrap();
    assert_eq!(globals, vec![1, 2, 4, 5, 6, 7, 8, 9]);
    let row: Vec<f64> = operator.row(3).iter().copied().collect();
    assert_eq!(row, vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    assert!(dofs
        .direct_local_dofs(1)
        .unwrap()
        .iter()
        .all(|&(local, _)| local != 3));

    let mut unit = DVector::zeros(9);
    unit[3] = 1.0;
    let (values, globals) = dofs.interpret_local_data(1, &unit, true).unwrap();
    assert_eq!(globals, vec![1, 2, 4, 5, 6, 7, 8, 9]);
    assert_eq!(values, DVector::from_vec(vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]));

    let (basis_values, basis_globals) = dofs
        .interpret_local_basis_data(1, 0, None, &unit)
        .unwrap();
    assert_eq!(basis_globals, globals);
    assert_eq!(basis_values, values);
}

#[test]
fn assembly_accumulates_constrained_contributions() {
    let mesh = mixed_order_two_cell_mesh();
    let (dofs, _) = single_field_assignment(&mesh);

    let mut vectors = BTreeMap::new();
    vectors.insert(0, DVector::from_element(4, 1.0));
    vectors.insert(1, DVector::from_element(9, 1.0));
    let rhs = assemble_vector_from_local(&dofs, &vectors).unwrap();
    // The shared vertices receive 1 from cell 0, 1 from their own node in cell 1 and one half
    // from the constrained mid-edge node of cell 1
    let expected = DVector::from_vec(vec![1.0, 2.5, 2.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    assert_eq!(rhs, expected);

    let mut matrices = BTreeMap::new();
    matrices.insert(0, DMatrix::from_element(4, 4, 1.0));
    matrices.insert(1, DMatrix::from_element(9, 9, 1.0));
    let matrix = assemble_matrix_from_local(&dofs, &matrices).unwrap();
    assert_eq!(matrix.nrows(), 10);
    // 4^2 + 8^2 entries minus the 2^2 entries coupling the shared vertices
    assert_eq!(matrix.nnz(), 76);
}

#[test]
fn hanging_vertices_share_one_constraint_matrix() {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    let (mut dofs, _) = single_field_assignment(&mesh);
    mesh.h_refine(&[0]).unwrap();
    dofs.did_h_refine(&mesh, &[0]).unwrap();

    // Both hanging vertices are interpolated with weights [0.5, 0.5]
    assert_eq!(dofs.distinct_constraint_matrices(), 1);
    let info = dofs.constraint_info(5).unwrap();
    assert!(info.contains("(constrained)"));
    let info = dofs.constraint_info(3).unwrap();
    assert!(!info.contains("(constrained)"));
}

#[test]
fn vertex_owner_is_the_lowest_order_cell() {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    for (cell, order) in [(0, 3), (1, 2), (2, 1), (3, 2)] {
        mesh.set_h1_order(cell, order).unwrap();
    }
    let (dofs, _) = single_field_assignment(&mesh);

    // Vertex 4 is the center of the mesh and local vertex 2 of cell 0
    let owner = *dofs.cell_constraints(0).unwrap().owner(0, 2);
    assert_eq!(owner.cell_id, 2);
    assert_eq!(owner.owning_subcell_entity_index, 4);

    // The edge between cells 0 and 1 takes the order of cell 1
    let constraints = dofs.cell_constraints(0).unwrap();
    assert_eq!(constraints.constraint(1, 1).cell_id, 1);
    assert_eq!(constraints.constraint(1, 1).side_ordinal, Some(3));
    assert_eq!(constraints.owner(1, 1).cell_id, 1);
}

#[test]
fn vertex_owner_is_the_lowest_cell_id_among_equals() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    let (dofs, _) = single_field_assignment(&mesh);
    for cell in 0..4 {
        let constraints = dofs.cell_constraints(cell).unwrap();
        let center = mesh.cell(cell).unwrap().local_vertex(4).unwrap();
        assert_eq!(constraints.owner(0, center).cell_id, 0);
        assert_eq!(constraints.constraint(2, 0).cell_id, cell);
        assert_eq!(constraints.constraint(2, 0).side_ordinal, None);
    }
}

#[test]
fn coarser_level_wins_over_lower_order() {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d(2, 2);
    mesh.h_refine(&[0]).unwrap();
    for child in 4..8 {
        mesh.set_h1_order(child, 1).unwrap();
    }
    let (dofs, u) = single_field_assignment(&mesh);

    // Side 1 of child 5 is the lower half of the right side of cell 0, which is still an active
    // side of cell 1
    let constraints = dofs.cell_constraints(5).unwrap();
    assert_eq!(constraints.constraint(1, 1).cell_id, 1);
    assert_eq!(constraints.constraint(1, 1).side_ordinal, Some(3));
    assert_eq!(constraints.constraint(1, 1).dimension, 1);
    // Side 3 of child 5 is shared with child 4 on the same level and order
    assert_eq!(constraints.constraint(1, 3).cell_id, 4);
    assert_eq!(constraints.constraint(1, 3).side_ordinal, Some(1));

    assert_linear_function_is_reproduced(&mesh, &dofs, u);
}

#[test]
fn multi_level_hanging_vertex_is_constrained_by_the_coarsest_active_edge() {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d(2, 1);
    mesh.h_refine(&[0]).unwrap();
    mesh.h_refine(&[5]).unwrap();
    let (dofs, u) = single_field_assignment(&mesh);

    // Local vertex 2 of cell 9 is the point (0.5, 0.125), a quarter of the way up the left side
    // of cell 1
    let geometry = mesh.topology().cell_geometry(9).unwrap();
    let vertex = geometry.vertices()[2];
    assert!((vertex - Point2::new(0.5, 0.125)).norm() < 1e-14);

    let constraints = dofs.cell_constraints(9).unwrap();
    assert_eq!(constraints.constraint(0, 2).cell_id, 1);
    assert_eq!(constraints.constraint(0, 2).side_ordinal, Some(3));
    assert_eq!(constraints.constraint(0, 2).dimension, 1);

    // With first-order cells, the vertex gets weights 3/4 and 1/4 from the ends of that side
    let ordering = dofs.dof_ordering(9).unwrap();
    let vertex_node = ordering.blocks()[0]
        .nodes()
        .iter()
        .position(|node| node.subcell == Subcell { dimension: 0, ordinal: 2 })
        .unwrap();
    let (operator, globals) = dofs.local_to_global_operator(9).unwrap();
    let bottom = dofs.entity_dofs(0, 1, u).unwrap().start;
    let top = dofs.entity_dofs(0, 4, u).unwrap().start;
    let weight = |global: usize| {
        let j = globals.iter().position(|&g| g == global).unwrap();
        operator[(vertex_node, j)]
    };
    assert!((weight(bottom) - 0.75).abs() < 1e-12);
    assert!((weight(top) - 0.25).abs() < 1e-12);

    assert_linear_function_is_reproduced(&mesh, &dofs, u);
}

proptest! {
    #[test]
    fn constrained_spaces_reproduce_linear_functions(mesh in hp_refined_mesh_strategy(6, 3)) {
        let (dofs, u) = single_field_assignment(&mesh);
        assert_linear_function_is_reproduced(&mesh, &dofs, u);
    }

    #[test]
    fn local_to_global_rows_match_scattered_unit_vectors(mesh in hp_refined_mesh_strategy(4, 3)) {
        let (dofs, _) = single_field_assignment(&mesh);
        for &cell in dofs.active_cells() {
            let (operator, globals) = dofs.local_to_global_operator(cell).unwrap();
            prop_assert_eq!(&globals, &dofs.cell_global_dofs(cell).unwrap());
            for local in 0 .. operator.nrows() {
                let mut unit = DVector::zeros(operator.nrows());
                unit[local] = 1.0;
                let (values, scattered_globals) = dofs.interpret_local_data(cell, &unit, true).unwrap();
                prop_assert_eq!(&scattered_globals, &globals);
                let row = operator.row(local).transpose();
                prop_assert!((values - row).abs().max() < 1e-14);
            }
        }
    }
}
