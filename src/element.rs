//! Reference cells and tensor-product Lagrange bases.
//!
//! Reference coordinates are always stored as [`Point2`]. Line cells use only the first
//! coordinate and keep the second at zero, so that both topologies share the same code paths.
use crate::error::MeshTopologyError;
use crate::quadrature::gauss_lobatto_legendre_points;
use nalgebra::{DMatrix, DVector, Point2, Vector2};
use serde::{Deserialize, Serialize};

const QUAD_SIDE_VERTICES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];
const LINE_SIDE_VERTICES: [[usize; 1]; 2] = [[0], [1]];
const QUAD_REFERENCE_VERTICES: [[f64; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
const QUAD_CHILD_OFFSETS: [[f64; 2]; 4] = [[-0.5, -0.5], [0.5, -0.5], [0.5, 0.5], [-0.5, 0.5]];
const LINE_CHILD_OFFSETS: [f64; 2] = [-0.5, 0.5];

/// Tolerance used to decide whether a reference point lies on a side of the reference cell.
const REFERENCE_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CellTopology {
    /// The reference interval `[-1, 1]` with vertices `-1` and `1`.
    Line,
    /// The reference square `[-1, 1]^2` with counter-clockwise vertices starting at `(-1, -1)`.
    Quadrilateral,
}

impl CellTopology {
    pub fn dimension(self) -> usize {
        match self {
            Self::Line => 1,
            Self::Quadrilateral => 2,
        }
    }

    pub fn vertex_count(self) -> usize {
        match self {
            Self::Line => 2,
            Self::Quadrilateral => 4,
        }
    }

    pub fn side_count(self) -> usize {
        match self {
            Self::Line => 2,
            Self::Quadrilateral => 4,
        }
    }

    /// Number of children created by regular refinement.
    pub fn child_count(self) -> usize {
        match self {
            Self::Line => 2,
            Self::Quadrilateral => 4,
        }
    }

    /// Number of subcells of the given dimension.
    pub fn subcell_count(self, dimension: usize) -> usize {
        match (self, dimension) {
            (Self::Line, 0) => 2,
            (Self::Line, 1) => 1,
            (Self::Quadrilateral, 0) => 4,
            (Self::Quadrilateral, 1) => 4,
            (Self::Quadrilateral, 2) => 1,
            _ => 0,
        }
    }

    /// Local vertex ordinals of a side, in the direction of the side parametrization.
    pub fn side_vertices(self, side: usize) -> &'static [usize] {
        match self {
            Self::Line => &LINE_SIDE_VERTICES[side],
            Self::Quadrilateral => &QUAD_SIDE_VERTICES[side],
        }
    }

    pub fn reference_vertex(self, vertex: usize) -> Point2<f64> {
        match self {
            Self::Line => Point2::new(if vertex == 0 { -1.0 } else { 1.0 }, 0.0),
            Self::Quadrilateral => {
                let [x, y] = QUAD_REFERENCE_VERTICES[vertex];
                Point2::new(x, y)
            }
        }
    }

    /// Maps reference coordinates of the given child into reference coordinates of its parent.
    pub fn child_to_parent(self, child: usize, xi: &Point2<f64>) -> Point2<f64> {
        match self {
            Self::Line => Point2::new(LINE_CHILD_OFFSETS[child] + 0.5 * xi.x, 0.0),
            Self::Quadrilateral => {
                let [ox, oy] = QUAD_CHILD_OFFSETS[child];
                Point2::new(ox + 0.5 * xi.x, oy + 0.5 * xi.y)
            }
        }
    }

    /// The reference point at side parameter `t` in `[-1, 1]`.
    pub fn side_point(self, side: usize, t: f64) -> Point2<f64> {
        match self {
            Self::Line => self.reference_vertex(side),
            Self::Quadrilateral => {
                let [a, b] = QUAD_SIDE_VERTICES[side];
                let (a, b) = (self.reference_vertex(a), self.reference_vertex(b));
                a + (b - a) * (0.5 * (t + 1.0))
            }
        }
    }

    /// The side parameter of a reference point lying on the given side.
    pub fn side_parameter(self, side: usize, xi: &Point2<f64>) -> f64 {
        match self {
            Self::Line => 0.0,
            Self::Quadrilateral => {
                let [a, b] = QUAD_SIDE_VERTICES[side];
                let (a, b) = (self.reference_vertex(a), self.reference_vertex(b));
                let direction: Vector2<f64> = b - a;
                2.0 * (xi - a).dot(&direction) / direction.norm_squared() - 1.0
            }
        }
    }

    /// Whether a reference point lies on the given side.
    pub fn is_on_side(self, side: usize, xi: &Point2<f64>) -> bool {
        match self {
            Self::Line => (xi.x - self.reference_vertex(side).x).abs() < REFERENCE_TOLERANCE,
            Self::Quadrilateral => match side {
                0 => (xi.y + 1.0).abs() < REFERENCE_TOLERANCE,
                1 => (xi.x - 1.0).abs() < REFERENCE_TOLERANCE,
                2 => (xi.y - 1.0).abs() < REFERENCE_TOLERANCE,
                _ => (xi.x + 1.0).abs() < REFERENCE_TOLERANCE,
            },
        }
    }
}

/// Interpolation nodes on `[-1, 1]` for a one-dimensional Lagrange basis of the given order.
///
/// Order zero uses the midpoint, higher orders use Gauss-Lobatto-Legendre points.
pub fn interpolation_nodes(order: usize) -> Vec<f64> {
    if order == 0 {
        vec![0.0]
    } else {
        gauss_lobatto_legendre_points(order)
    }
}

/// Values of all Lagrange polynomials for the given nodes at `x`.
pub fn lagrange_values(nodes: &[f64], x: f64) -> Vec<f64> {
    (0..nodes.len())
        .map(|i| {
            nodes
                .iter()
                .enumerate()
                .filter(|&(m, _)| m != i)
                .map(|(_, x_m)| (x - x_m) / (nodes[i] - x_m))
                .product::<f64>()
        })
        .collect()
}

/// Derivatives of all Lagrange polynomials for the given nodes at `x`.
pub fn lagrange_derivatives(nodes: &[f64], x: f64) -> Vec<f64> {
    let n = nodes.len();
    (0..n)
        .map(|i| {
            let mut sum = 0.0;
            for m in (0..n).filter(|&m| m != i) {
                let mut term = 1.0 / (nodes[i] - nodes[m]);
                for k in (0..n).filter(|&k| k != i && k != m) {
                    term *= (x - nodes[k]) / (nodes[i] - nodes[k]);
                }
                sum += term;
            }
            sum
        })
        .collect()
}

/// Nodal tensor-product Lagrange basis on a reference cell.
///
/// Basis function `n = i + (order + 1) * j` is the product of the `i`-th one-dimensional
/// Lagrange polynomial in the first coordinate and the `j`-th in the second, and is one at
/// node `(x_i, x_j)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangeBasis {
    topology: CellTopology,
    order: usize,
    nodes_1d: Vec<f64>,
}

impl LagrangeBasis {
    pub fn new(topology: CellTopology, order: usize) -> Self {
        Self {
            topology,
            order,
            nodes_1d: interpolation_nodes(order),
        }
    }

    pub fn topology(&self) -> CellTopology {
        self.topology
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn nodes_1d(&self) -> &[f64] {
        &self.nodes_1d
    }

    pub fn cardinality(&self) -> usize {
        self.nodes_1d.len().pow(self.topology.dimension() as u32)
    }

    /// Tensor indices `(i, j)` of a basis function. Line bases always have `j = 0`.
    pub fn tensor_indices(&self, n: usize) -> (usize, usize) {
        let m = self.nodes_1d.len();
        match self.topology {
            CellTopology::Line => (n, 0),
            CellTopology::Quadrilateral => (n % m, n / m),
        }
    }

    pub fn node_point(&self, n: usize) -> Point2<f64> {
        let (i, j) = self.tensor_indices(n);
        match self.topology {
            CellTopology::Line => Point2::new(self.nodes_1d[i], 0.0),
            CellTopology::Quadrilateral => Point2::new(self.nodes_1d[i], self.nodes_1d[j]),
        }
    }

    pub fn evaluate(&self, xi: &Point2<f64>) -> DVector<f64> {
        let lx = lagrange_values(&self.nodes_1d, xi.x);
        match self.topology {
            CellTopology::Line => DVector::from_vec(lx),
            CellTopology::Quadrilateral => {
                let ly = lagrange_values(&self.nodes_1d, xi.y);
                DVector::from_fn(self.cardinality(), |n, _| {
                    let (i, j) = self.tensor_indices(n);
                    lx[i] * ly[j]
                })
            }
        }
    }

    /// Reference gradients, one row per basis function.
    pub fn evaluate_gradients(&self, xi: &Point2<f64>) -> DMatrix<f64> {
        let dim = self.topology.dimension();
        let dlx = lagrange_derivatives(&self.nodes_1d, xi.x);
        match self.topology {
            CellTopology::Line => DMatrix::from_fn(self.cardinality(), dim, |n, _| dlx[n]),
            CellTopology::Quadrilateral => {
                let lx = lagrange_values(&self.nodes_1d, xi.x);
                let ly = lagrange_values(&self.nodes_1d, xi.y);
                let dly = lagrange_derivatives(&self.nodes_1d, xi.y);
                DMatrix::from_fn(self.cardinality(), dim, |n, d| {
                    let (i, j) = self.tensor_indices(n);
                    if d == 0 {
                        dlx[i] * ly[j]
                    } else {
                        lx[i] * dly[j]
                    }
                })
            }
        }
    }
}

/// Geometric map of a cell given by its physical vertex positions.
///
/// Quadrilaterals use the bilinear map, lines the affine map.
#[derive(Debug, Clone, PartialEq)]
pub struct CellGeometry {
    topology: CellTopology,
    vertices: Vec<Point2<f64>>,
}

impl CellGeometry {
    pub fn new(topology: CellTopology, vertices: Vec<Point2<f64>>) -> Result<Self, MeshTopologyError> {
        if vertices.len() != topology.vertex_count() {
            return Err(MeshTopologyError::VertexCount {
                expected: topology.vertex_count(),
                actual: vertices.len(),
            });
        }
        Ok(Self { topology, vertices })
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    fn vertex_weights(&self, xi: &Point2<f64>) -> Vec<f64> {
        (0..self.topology.vertex_count())
            .map(|v| {
                let r = self.topology.reference_vertex(v);
                match self.topology {
                    CellTopology::Line => 0.5 * (1.0 + r.x * xi.x),
                    CellTopology::Quadrilateral => 0.25 * (1.0 + r.x * xi.x) * (1.0 + r.y * xi.y),
                }
            })
            .collect()
    }

    pub fn map_reference_coords(&self, xi: &Point2<f64>) -> Point2<f64> {
        let weights = self.vertex_weights(xi);
        let coords = self
            .vertices
            .iter()
            .zip(weights)
            .fold(Vector2::zeros(), |acc, (v, w)| acc + v.coords * w);
        Point2::from(coords)
    }

    /// Jacobian `dx/dxi` of the reference map, of size `dim x dim`.
    pub fn reference_jacobian(&self, xi: &Point2<f64>) -> DMatrix<f64> {
        match self.topology {
            CellTopology::Line => {
                let length = (self.vertices[1] - self.vertices[0]).norm();
                DMatrix::from_element(1, 1, 0.5 * length)
            }
            CellTopology::Quadrilateral => {
                let mut jacobian = DMatrix::zeros(2, 2);
                for (v, x) in self.vertices.iter().enumerate() {
                    let r = self.topology.reference_vertex(v);
                    let dw_dxi = 0.25 * r.x * (1.0 + r.y * xi.y);
                    let dw_deta = 0.25 * r.y * (1.0 + r.x * xi.x);
                    for d in 0..2 {
                        jacobian[(d, 0)] += x[d] * dw_dxi;
                        jacobian[(d, 1)] += x[d] * dw_deta;
                    }
                }
                jacobian
            }
        }
    }
}
