//! Continuous piecewise linear functions on triangle meshes.
use crate::mesh::TriangleMesh2d;
use crate::problem::ScalarFunction;
use nalgebra::{DVector, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// A named P1 function, stored as one value per mesh vertex.
///
/// The function does not own its mesh: the caller pairs it with the mesh it was created for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteFunction {
    name: String,
    dofs: DVector<f64>,
}

impl DiscreteFunction {
    pub fn new(name: impl Into<String>, dofs: DVector<f64>) -> Self {
        Self {
            name: name.into(),
            dofs,
        }
    }

    pub fn zeros(name: impl Into<String>, num_dofs: usize) -> Self {
        Self::new(name, DVector::zeros(num_dofs))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_dofs(&self) -> usize {
        self.dofs.len()
    }

    pub fn dofs(&self) -> &DVector<f64> {
        &self.dofs
    }

    pub fn dofs_mut(&mut self) -> &mut DVector<f64> {
        &mut self.dofs
    }

    /// Whether every degree of freedom is finite.
    pub fn dofs_valid(&self) -> bool {
        dofs_valid(&self.dofs)
    }

    /// The values at the three vertices of a cell.
    pub fn cell_values(&self, mesh: &TriangleMesh2d, cell_index: usize) -> Vector3<f64> {
        let conn = mesh.connectivity()[cell_index];
        Vector3::new(self.dofs[conn[0]], self.dofs[conn[1]], self.dofs[conn[2]])
    }

    /// Evaluates the function at a point of the given cell.
    ///
    /// Returns `None` if the cell is degenerate.
    pub fn evaluate_in_cell(&self, mesh: &TriangleMesh2d, cell_index: usize, x: &Point2<f64>) -> Option<f64> {
        let lambda = mesh.element(cell_index)?.barycentric_coords(x)?;
        Some(lambda.dot(&self.cell_values(mesh, cell_index)))
    }

    /// The (constant) gradient of the function on a cell.
    pub fn gradient_in_cell(&self, mesh: &TriangleMesh2d, cell_index: usize) -> Option<Vector2<f64>> {
        let gradients = mesh.element(cell_index)?.gradients()?;
        Some(gradients * self.cell_values(mesh, cell_index))
    }
}

pub fn dofs_valid(dofs: &DVector<f64>) -> bool {
    dofs.iter().all(|x| x.is_finite())
}

/// Nodal interpolation of a function onto the vertices of a mesh.
pub fn interpolate(mesh: &TriangleMesh2d, function: &dyn ScalarFunction) -> DVector<f64> {
    DVector::from_iterator(mesh.num_vertices(), mesh.vertices().iter().map(|x| function.evaluate(x)))
}

/// Prolongates a P1 function from a coarse mesh onto a fine mesh whose cells lie inside the coarse
/// cells given by `parents`.
///
/// Returns `None` if a parent cell is degenerate.
pub fn prolongate(
    coarse_mesh: &TriangleMesh2d,
    coarse_dofs: &DVector<f64>,
    fine_mesh: &TriangleMesh2d,
    parents: &[usize],
) -> Option<DVector<f64>> {
    assert_eq!(parents.len(), fine_mesh.num_cells(), "Need one parent per fine cell.");
    let mut fine_dofs = DVector::zeros(fine_mesh.num_vertices());
    let mut visited = vec![false; fine_mesh.num_vertices()];

    for (conn, &parent) in fine_mesh.connectivity().iter().zip(parents) {
        let coarse_element = coarse_mesh.element(parent)?;
        let [a, b, c] = coarse_mesh.connectivity()[parent];
        let coarse_values = Vector3::new(coarse_dofs[a], coarse_dofs[b], coarse_dofs[c]);
        for &v in conn {
            if !visited[v] {
                let lambda = coarse_element.barycentric_coords(&fine_mesh.vertices()[v])?;
                fine_dofs[v] = lambda.dot(&coarse_values);
                visited[v] = true;
            }
        }
    }
    Some(fine_dofs)
}
