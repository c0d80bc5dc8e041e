//! Gauss-Legendre quadrature and Gauss-Lobatto-Legendre nodes on the reference interval `[-1, 1]`.
use crate::element::CellTopology;
use nalgebra::Point2;

const NEWTON_TOLERANCE: f64 = 1e-15;
const NEWTON_MAX_ITERATIONS: usize = 100;

/// Evaluates the Legendre polynomials `P_n(x)` and `P_{n-1}(x)`.
fn legendre_pair(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut p_prev = 1.0;
    let mut p = x;
    for k in 1..n {
        let k = k as f64;
        let p_next = ((2.0 * k + 1.0) * x * p - k * p_prev) / (k + 1.0);
        p_prev = p;
        p = p_next;
    }
    (p, p_prev)
}

/// Gauss-Legendre points and weights with `n` points, sorted by increasing point coordinate.
///
/// Exact for polynomials of degree `2n - 1`.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(n > 0, "Gauss-Legendre quadrature requires at least one point.");
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 0..n {
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let (p, p_prev) = legendre_pair(n, x);
            let derivative = n as f64 * (x * p - p_prev) / (x * x - 1.0);
            let dx = p / derivative;
            x -= dx;
            if dx.abs() < NEWTON_TOLERANCE {
                break;
            }
        }
        let (p, p_prev) = legendre_pair(n, x);
        let derivative = n as f64 * (x * p - p_prev) / (x * x - 1.0);
        points.push(x);
        weights.push(2.0 / ((1.0 - x * x) * derivative * derivative));
    }
    points.reverse();
    weights.reverse();
    (points, weights)
}

/// The `order + 1` Gauss-Lobatto-Legendre points, sorted, with exact endpoints `-1` and `1`.
///
/// The points are symmetric about the origin to machine precision.
pub fn gauss_lobatto_legendre_points(order: usize) -> Vec<f64> {
    assert!(order > 0, "Gauss-Lobatto-Legendre points require order at least 1.");
    let n = order;
    let mut points: Vec<f64> = (0..=n)
        .map(|i| -(std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect();

    for x in points.iter_mut().take(n).skip(1) {
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let (p, p_prev) = legendre_pair(n, *x);
            let dx = (*x * p - p_prev) / ((n + 1) as f64 * p);
            *x -= dx;
            if dx.abs() < NEWTON_TOLERANCE {
                break;
            }
        }
    }

    let mirrored: Vec<f64> = points.iter().rev().map(|x| -x).collect();
    for (x, x_mirrored) in points.iter_mut().zip(mirrored) {
        *x = 0.5 * (*x + x_mirrored);
    }
    points[0] = -1.0;
    points[n] = 1.0;
    if n % 2 == 0 {
        points[n / 2] = 0.0;
    }
    points
}

/// A quadrature rule on a reference cell. Points of line rules have a zero second coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule {
    pub weights: Vec<f64>,
    pub points: Vec<Point2<f64>>,
}

impl QuadratureRule {
    /// Tensor-product Gauss rule with `n` points per direction.
    pub fn gauss(topology: CellTopology, n: usize) -> Self {
        let (points_1d, weights_1d) = gauss_legendre(n);
        match topology {
            CellTopology::Line => Self {
                weights: weights_1d,
                points: points_1d.iter().map(|&x| Point2::new(x, 0.0)).collect(),
            },
            CellTopology::Quadrilateral => {
                let mut weights = Vec::with_capacity(n * n);
                let mut points = Vec::with_capacity(n * n);
                for (y, w_y) in points_1d.iter().zip(&weights_1d) {
                    for (x, w_x) in points_1d.iter().zip(&weights_1d) {
                        weights.push(w_x * w_y);
                        points.push(Point2::new(*x, *y));
                    }
                }
                Self { weights, points }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
