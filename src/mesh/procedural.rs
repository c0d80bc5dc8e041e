//! Basic procedural mesh generation routines.
use crate::mesh::{Mesh, MeshTopology};
use nalgebra::Point2;

/// Uniform quadrilateral mesh of the unit square `[0, 1]^2`.
pub fn create_unit_square_uniform_quad_mesh_2d(cells_per_dim: usize, h1_order: usize) -> Mesh {
    create_rectangular_uniform_quad_mesh_2d(1.0, 1.0, cells_per_dim, cells_per_dim, &Point2::origin(), h1_order)
}

/// Uniform quadrilateral mesh of the rectangle `[x0, x0 + width] x [y0, y0 + height]`.
///
/// Cell `i + cells_x * j` is the `i`-th cell from the left in the `j`-th row from the bottom.
///
/// # Panics
///
/// Panics if `h1_order` is zero.
pub fn create_rectangular_uniform_quad_mesh_2d(
    width: f64,
    height: f64,
    cells_x: usize,
    cells_y: usize,
    bottom_left: &Point2<f64>,
    h1_order: usize,
) -> Mesh {
    assert!(h1_order > 0, "Polynomial order must be at least 1.");
    let to_global_vertex_index = |i, j| (cells_x + 1) * j + i;

    let mut vertices = Vec::new();
    for j in 0..=cells_y {
        for i in 0..=cells_x {
            let x = bottom_left.x + width * i as f64 / cells_x as f64;
            let y = bottom_left.y + height * j as f64 / cells_y as f64;
            vertices.push(Point2::new(x, y));
        }
    }

    let mut quads = Vec::new();
    for j in 0..cells_y {
        for i in 0..cells_x {
            quads.push([
                to_global_vertex_index(i, j),
                to_global_vertex_index(i + 1, j),
                to_global_vertex_index(i + 1, j + 1),
                to_global_vertex_index(i, j + 1),
            ]);
        }
    }

    let topology =
        MeshTopology::from_quads(vertices, &quads, h1_order).expect("Procedural quads reference valid vertices");
    Mesh::new(topology)
}

/// Uniform mesh of the interval `[0, length]`.
///
/// # Panics
///
/// Panics if `h1_order` is zero.
pub fn create_uniform_line_mesh_1d(length: f64, cells: usize, h1_order: usize) -> Mesh {
    assert!(h1_order > 0, "Polynomial order must be at least 1.");
    let points = (0..=cells).map(|i| length * i as f64 / cells as f64).collect();
    let lines: Vec<_> = (0..cells).map(|i| [i, i + 1]).collect();
    let topology = MeshTopology::from_lines(points, &lines, h1_order).expect("Procedural lines reference valid vertices");
    Mesh::new(topology)
}
