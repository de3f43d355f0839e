//! Quadrature rules for the reference segment `[-1, 1]` and the reference triangle with corners
//! `(-1, -1)`, `(1, -1)` and `(-1, 1)`.
use nalgebra::Point2;
use std::f64::consts::PI;

/// Weights and points of a rule on the reference segment.
pub type QuadraturePair1d = (Vec<f64>, Vec<f64>);
/// Weights and points of a rule on the reference triangle.
pub type QuadraturePair2d = (Vec<f64>, Vec<Point2<f64>>);

/// Recurrence relation for Legendre polynomials.
///
/// The derivative formula is singular at |x| == 1, so it is only suitable for evaluation in the
/// open interval (-1, 1).
#[derive(Debug, Default)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // p_n(x)
    p1: f64,
    // p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        for m in 1..=n {
            let m = m as f64;
            let p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }
        Self { n, x, p1, p2 }
    }

    fn value(&self) -> f64 {
        self.p1
    }

    fn derivative(&self) -> f64 {
        let n = self.n as f64;
        n * (self.x * self.p1 - self.p2) / (self.x * self.x - 1.0)
    }
}

/// Gauss-Legendre rule with the given number of points on `[-1, 1]`.
///
/// Given `n` points, the rule integrates polynomials of degree up to `2n - 1` exactly.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> QuadraturePair1d {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let m = (n + 1) / 2;
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);

    // Newton iteration for the first m roots, starting from the usual asymptotic guess.
    // The remaining roots follow by symmetry.
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let recurrence = LegendreRecurrence::evaluate(n, x);
            let dx = -recurrence.value() / recurrence.derivative();
            x += dx;
            if dx.abs() <= 1e-15 {
                break;
            }
        }
        let dp = LegendreRecurrence::evaluate(n, x).derivative();
        points.push(x);
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }

    for i in m..n {
        let mirror_idx = n - i - 1;
        points.push(-points[mirror_idx]);
        weights.push(weights[mirror_idx]);
    }

    (weights, points)
}

/// Gauss rule on `[-1, 1]` that integrates polynomials of degree `order` exactly.
pub fn segment_quadrature(order: usize) -> QuadraturePair1d {
    gauss(order / 2 + 1)
}

/// Collapsed (Duffy) Gauss rule on the reference triangle, exact for polynomials of degree `order`.
///
/// The square `[-1, 1]^2` is mapped onto the triangle by collapsing its top edge onto the vertex
/// `(-1, 1)`. The Jacobian of the collapse is linear in the second coordinate, which is why that
/// direction needs one more degree of exactness.
pub fn tri_quadrature(order: usize) -> QuadraturePair2d {
    let (weights_a, points_a) = gauss(order / 2 + 1);
    let (weights_b, points_b) = gauss((order + 1) / 2 + 1);

    let mut weights = Vec::with_capacity(weights_a.len() * weights_b.len());
    let mut points = Vec::with_capacity(weights.capacity());
    for (w_b, &b) in weights_b.iter().zip(&points_b) {
        for (w_a, &a) in weights_a.iter().zip(&points_a) {
            let x = 0.5 * (1.0 + a) * (1.0 - b) - 1.0;
            weights.push(w_a * w_b * 0.5 * (1.0 - b));
            points.push(Point2::new(x, b));
        }
    }
    (weights, points)
}
