use crate::mesh::procedural::create_rectangular_uniform_quad_mesh_2d;
use crate::mesh::Mesh;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::Point2;
use std::cmp::max;

pub fn point2() -> impl Strategy<Value = Point2<f64>> {
    // Pick a reasonably small range to pick coordinates from,
    // otherwise we can easily get floating point numbers that are
    // so ridiculously large as to break anything we might want to do with them
    let range = -10.0..10.0;
    [range.clone(), range].prop_map(|[x, y]| Point2::new(x, y))
}

// Returns a strategy in which each value is a pair (cells_x, cells_y)
// such that cells_x * cells_y <= max_cells
fn rectangular_cell_distribution_strategy(max_cells: usize) -> impl Strategy<Value = (usize, usize)> {
    let max_cells = max(1, max_cells);
    (1..=max_cells).prop_flat_map(move |cells_x| (Just(cells_x), 1..=max(1, max_cells / cells_x)))
}

/// Uniform quadrilateral meshes of the unit square with at most `max_cells` cells and a uniform
/// order in `1..=max_order`.
pub fn rectangular_uniform_mesh_strategy(max_cells: usize, max_order: usize) -> impl Strategy<Value = Mesh> {
    (rectangular_cell_distribution_strategy(max_cells), 1..=max(1, max_order)).prop_map(
        |((cells_x, cells_y), order)| {
            create_rectangular_uniform_quad_mesh_2d(1.0, 1.0, cells_x, cells_y, &Point2::origin(), order)
        },
    )
}

/// Meshes with hanging vertices and mixed orders: a uniform mesh in which every cell gets a random
/// order increase, after which a random subset of the cells is refined once.
pub fn hp_refined_mesh_strategy(max_cells: usize, max_order: usize) -> impl Strategy<Value = Mesh> {
    rectangular_uniform_mesh_strategy(max_cells, 1)
        .prop_flat_map(move |mesh| {
            let n = mesh.active_cells().len();
            (Just(mesh), vec(0..max(1, max_order), n), vec(any::<bool>(), n))
        })
        .prop_map(|(mut mesh, order_increments, refine)| {
            let cells = mesh.active_cells();
            for (&cell, &delta_p) in cells.iter().zip(&order_increments) {
                if delta_p > 0 {
                    mesh.p_refine(&[cell], delta_p)
                        .expect("cells of a fresh mesh are active");
                }
            }
            let refined: Vec<_> = cells
                .iter()
                .zip(&refine)
                .filter(|(_, &flag)| flag)
                .map(|(&cell, _)| cell)
                .collect();
            mesh.h_refine(&refined)
                .expect("cells of a fresh mesh are active");
            mesh
        })
}

pub fn partition_count_strategy(max_partitions: usize) -> impl Strategy<Value = usize> {
    1..=max(1, max_partitions)
}
