//! Linear Lagrange elements on triangles.
use itertools::Itertools;
use nalgebra::{distance, Matrix2, Matrix2x3, Point2, Vector2, Vector3};

/// A finite element representing linear basis functions on a triangle, in two dimensions.
///
/// The reference element is the triangle with corners (-1, -1), (1, -1), (-1, 1), which matches
/// the reference domain of the rules in [`quadrature`](crate::quadrature).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Tri3d2Element {
    vertices: [Point2<f64>; 3],
}

impl Tri3d2Element {
    pub fn from_vertices(vertices: [Point2<f64>; 3]) -> Self {
        Self { vertices }
    }

    pub fn reference() -> Self {
        Self::from_vertices([Point2::new(-1.0, -1.0), Point2::new(1.0, -1.0), Point2::new(-1.0, 1.0)])
    }

    pub fn vertices(&self) -> &[Point2<f64>; 3] {
        &self.vertices
    }

    #[rustfmt::skip]
    pub fn evaluate_basis(&self, xi: &Point2<f64>) -> Vector3<f64> {
        Vector3::new(
            -0.5 * xi.x - 0.5 * xi.y,
            0.5 * xi.x + 0.5,
            0.5 * xi.y + 0.5,
        )
    }

    /// Gradients of the basis functions with respect to reference coordinates, one per column.
    #[rustfmt::skip]
    pub fn reference_gradients(&self) -> Matrix2x3<f64> {
        Matrix2x3::from_columns(&[
            Vector2::new(-0.5, -0.5),
            Vector2::new(0.5, 0.0),
            Vector2::new(0.0, 0.5),
        ])
    }

    #[allow(non_snake_case)]
    pub fn reference_jacobian(&self) -> Matrix2<f64> {
        let X: Matrix2x3<f64> = Matrix2x3::from_fn(|i, j| self.vertices[j][i]);
        X * self.reference_gradients().transpose()
    }

    /// Physical gradients of the basis functions, one per column.
    ///
    /// Returns `None` for a degenerate triangle.
    pub fn gradients(&self) -> Option<Matrix2x3<f64>> {
        let j_inv_t = self.reference_jacobian().try_inverse()?.transpose();
        Some(j_inv_t * self.reference_gradients())
    }

    pub fn map_reference_coords(&self, xi: &Point2<f64>) -> Point2<f64> {
        let phi = self.evaluate_basis(xi);
        Point2::from(
            self.vertices[0].coords * phi[0] + self.vertices[1].coords * phi[1] + self.vertices[2].coords * phi[2],
        )
    }

    /// Inverse of [`map_reference_coords`](Self::map_reference_coords), exact since the map is affine.
    pub fn map_physical_coords(&self, x: &Point2<f64>) -> Option<Point2<f64>> {
        let j_inv = self.reference_jacobian().try_inverse()?;
        let reference_origin = Point2::new(-1.0, -1.0);
        Some(reference_origin + j_inv * (x - self.vertices[0]))
    }

    /// Barycentric coordinates of `x`, i.e. the basis functions evaluated at `x`.
    pub fn barycentric_coords(&self, x: &Point2<f64>) -> Option<Vector3<f64>> {
        self.map_physical_coords(x).map(|xi| self.evaluate_basis(&xi))
    }

    /// Whether `x` lies in the closed triangle, up to a tolerance on the barycentric coordinates.
    pub fn contains_point(&self, x: &Point2<f64>, tol: f64) -> bool {
        self.barycentric_coords(x)
            .map(|lambda| lambda.iter().all(|&l| l >= -tol))
            .unwrap_or(false)
    }

    /// Signed area, positive for counter-clockwise vertex order.
    pub fn signed_area(&self) -> f64 {
        let [a, b, c] = &self.vertices;
        0.5 * (b - a).perp(&(c - a))
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn centroid(&self) -> Point2<f64> {
        let [a, b, c] = &self.vertices;
        Point2::from((a.coords + b.coords + c.coords) / 3.0)
    }

    pub fn diameter(&self) -> f64 {
        self.vertices
            .iter()
            .tuple_combinations()
            .map(|(x, y)| distance(x, y))
            .fold(0.0, f64::max)
    }
}
