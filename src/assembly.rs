//! Assembly of P1 finite element matrices and vectors.
//!
//! Element contributions are computed in parallel and then summed into the global structure on a
//! single thread, so that no synchronization is needed for entries shared between cells.
use crate::element::Tri3d2Element;
use crate::error::{MsFemError, Stage};
use crate::mesh::{BoundaryFace, TriangleMesh2d};
use crate::problem::{DiffusionOperator, ScalarFunction};
use crate::quadrature::{QuadraturePair1d, QuadraturePair2d};
use itertools::izip;
use nalgebra::{DVector, Matrix3, Point2, Vector2, Vector3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;

/// Element stiffness matrix of a linear diffusion operator,
/// $K_{ij} = \int_K A(x, \nabla \varphi_j) \cdot \nabla \varphi_i \, dx$.
pub fn element_stiffness_matrix(
    element: &Tri3d2Element,
    diffusion: &dyn DiffusionOperator,
    quadrature: &QuadraturePair2d,
) -> Option<Matrix3<f64>> {
    let gradients = element.gradients()?;
    let det_j = element.reference_jacobian().determinant().abs();
    let mut matrix = Matrix3::zeros();
    let (weights, points) = quadrature;
    for (w, xi) in izip!(weights, points) {
        let x = element.map_reference_coords(xi);
        for j in 0..3 {
            let flux = diffusion.diffusive_flux(&x, &gradients.column(j).into_owned());
            for i in 0..3 {
                matrix[(i, j)] += w * det_j * flux.dot(&gradients.column(i));
            }
        }
    }
    Some(matrix)
}

/// Element Jacobian of the (possibly nonlinear) diffusion operator at the local solution values
/// `u_local`, $J_{ij} = \int_K D_\xi A(x, \nabla u) \nabla \varphi_j \cdot \nabla \varphi_i \, dx$.
pub fn element_jacobian_matrix(
    element: &Tri3d2Element,
    diffusion: &dyn DiffusionOperator,
    u_local: &Vector3<f64>,
    quadrature: &QuadraturePair2d,
) -> Option<Matrix3<f64>> {
    let gradients = element.gradients()?;
    let det_j = element.reference_jacobian().determinant().abs();
    let grad_u = gradients * u_local;
    let mut matrix = Matrix3::zeros();
    let (weights, points) = quadrature;
    for (w, xi) in izip!(weights, points) {
        let x = element.map_reference_coords(xi);
        for j in 0..3 {
            let flux = diffusion.jacobian_diffusive_flux(&x, &grad_u, &gradients.column(j).into_owned());
            for i in 0..3 {
                matrix[(i, j)] += w * det_j * flux.dot(&gradients.column(i));
            }
        }
    }
    Some(matrix)
}

/// Element vector $\int_K A(x, \xi) \cdot \nabla \varphi_i \, dx$ for a constant gradient $\xi$.
pub fn element_flux_vector(
    element: &Tri3d2Element,
    diffusion: &dyn DiffusionOperator,
    gradient: &Vector2<f64>,
    quadrature: &QuadraturePair2d,
) -> Option<Vector3<f64>> {
    let gradients = element.gradients()?;
    let det_j = element.reference_jacobian().determinant().abs();
    let (weights, points) = quadrature;
    let mut vector = Vector3::zeros();
    for (w, xi) in izip!(weights, points) {
        let x = element.map_reference_coords(xi);
        let flux = diffusion.diffusive_flux(&x, gradient);
        vector += w * det_j * gradients.tr_mul(&flux);
    }
    Some(vector)
}

/// Element load vector $\int_K f \varphi_i \, dx$.
pub fn element_load_vector(element: &Tri3d2Element, source: &dyn ScalarFunction, quadrature: &QuadraturePair2d) -> Vector3<f64> {
    let det_j = element.reference_jacobian().determinant().abs();
    let (weights, points) = quadrature;
    let mut vector = Vector3::zeros();
    for (w, xi) in izip!(weights, points) {
        let x = element.map_reference_coords(xi);
        vector += w * det_j * source.evaluate(&x) * element.evaluate_basis(xi);
    }
    vector
}

/// Face load vector $\int_F g \varphi_i \, ds$ for the two endpoints of the segment `[a, b]`.
pub fn face_load_vector(
    a: &Point2<f64>,
    b: &Point2<f64>,
    data: &dyn ScalarFunction,
    quadrature: &QuadraturePair1d,
) -> Vector2<f64> {
    let half_length = 0.5 * (b - a).norm();
    let (weights, points) = quadrature;
    let mut vector = Vector2::zeros();
    for (w, &s) in izip!(weights, points) {
        let phi = Vector2::new(0.5 * (1.0 - s), 0.5 * (1.0 + s));
        let x = Point2::from(a.coords * phi[0] + b.coords * phi[1]);
        vector += w * half_length * data.evaluate(&x) * phi;
    }
    vector
}

fn degenerate_cell(stage: Stage, cell_index: usize) -> MsFemError {
    MsFemError::invalid_state(stage, format!("cell {} is degenerate", cell_index))
}

/// Assembles a global matrix from per-cell element matrices.
///
/// Element matrices are computed in parallel and summed serially.
pub fn assemble_matrix<F>(mesh: &TriangleMesh2d, stage: Stage, element_matrix: F) -> Result<CsrMatrix<f64>, MsFemError>
where
    F: Fn(usize, &Tri3d2Element) -> Option<Matrix3<f64>> + Sync,
{
    let element_matrices = (0..mesh.num_cells())
        .into_par_iter()
        .map(|cell_index| {
            mesh.element(cell_index)
                .and_then(|element| element_matrix(cell_index, &element))
                .ok_or_else(|| degenerate_cell(stage, cell_index))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let n = mesh.num_vertices();
    let mut coo = CooMatrix::new(n, n);
    for (conn, matrix) in izip!(mesh.connectivity(), &element_matrices) {
        for (i, &row) in conn.iter().enumerate() {
            for (j, &col) in conn.iter().enumerate() {
                coo.push(row, col, matrix[(i, j)]);
            }
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Assembles a global vector from per-cell element vectors.
pub fn assemble_vector<F>(mesh: &TriangleMesh2d, stage: Stage, element_vector: F) -> Result<DVector<f64>, MsFemError>
where
    F: Fn(usize, &Tri3d2Element) -> Option<Vector3<f64>> + Sync,
{
    let element_vectors = (0..mesh.num_cells())
        .into_par_iter()
        .map(|cell_index| {
            mesh.element(cell_index)
                .and_then(|element| element_vector(cell_index, &element))
                .ok_or_else(|| degenerate_cell(stage, cell_index))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut vector = DVector::zeros(mesh.num_vertices());
    for (conn, local) in izip!(mesh.connectivity(), &element_vectors) {
        for (i, &row) in conn.iter().enumerate() {
            vector[row] += local[i];
        }
    }
    Ok(vector)
}

pub fn assemble_stiffness_matrix(
    mesh: &TriangleMesh2d,
    diffusion: &dyn DiffusionOperator,
    quadrature: &QuadraturePair2d,
    stage: Stage,
) -> Result<CsrMatrix<f64>, MsFemError> {
    assemble_matrix(mesh, stage, |_, element| {
        element_stiffness_matrix(element, diffusion, quadrature)
    })
}

/// Assembles the Jacobian of $u \mapsto a(u; \cdot)$ at the nodal values `u`.
pub fn assemble_jacobian_matrix(
    mesh: &TriangleMesh2d,
    diffusion: &dyn DiffusionOperator,
    u: &DVector<f64>,
    quadrature: &QuadraturePair2d,
    stage: Stage,
) -> Result<CsrMatrix<f64>, MsFemError> {
    assemble_matrix(mesh, stage, |cell_index, element| {
        let [a, b, c] = mesh.connectivity()[cell_index];
        element_jacobian_matrix(element, diffusion, &Vector3::new(u[a], u[b], u[c]), quadrature)
    })
}

/// Assembles $a(u; \varphi_i) = \int A(x, \nabla u) \cdot \nabla \varphi_i \, dx$ for every basis function.
pub fn assemble_flux_vector(
    mesh: &TriangleMesh2d,
    diffusion: &dyn DiffusionOperator,
    u: &DVector<f64>,
    quadrature: &QuadraturePair2d,
    stage: Stage,
) -> Result<DVector<f64>, MsFemError> {
    let (weights, points) = quadrature;
    assemble_vector(mesh, stage, |cell_index, element| {
        let gradients = element.gradients()?;
        let det_j = element.reference_jacobian().determinant().abs();
        let [a, b, c] = mesh.connectivity()[cell_index];
        let grad_u = gradients * Vector3::new(u[a], u[b], u[c]);
        let mut vector = Vector3::zeros();
        for (w, xi) in izip!(weights, points) {
            let x = element.map_reference_coords(xi);
            vector += w * det_j * gradients.tr_mul(&diffusion.diffusive_flux(&x, &grad_u));
        }
        Some(vector)
    })
}

pub fn assemble_load_vector(
    mesh: &TriangleMesh2d,
    source: &dyn ScalarFunction,
    quadrature: &QuadraturePair2d,
    stage: Stage,
) -> Result<DVector<f64>, MsFemError> {
    assemble_vector(mesh, stage, |_, element| {
        Some(element_load_vector(element, source, quadrature))
    })
}

/// Assembles $\int_{\Gamma} g \varphi_i \, ds$ over the given boundary faces.
pub fn assemble_face_load_vector<'a>(
    mesh: &TriangleMesh2d,
    faces: impl IntoIterator<Item = &'a BoundaryFace>,
    data: &dyn ScalarFunction,
    quadrature: &QuadraturePair1d,
) -> DVector<f64> {
    let mut vector = DVector::zeros(mesh.num_vertices());
    for face in faces {
        let [a, b] = mesh.face_points(face);
        let local = face_load_vector(&a, &b, data, quadrature);
        vector[face.vertices[0]] += local[0];
        vector[face.vertices[1]] += local[1];
    }
    vector
}

/// Imposes prescribed values on the given degrees of freedom by symmetric elimination.
///
/// Constrained rows and columns are zeroed with a unit diagonal, the right-hand side of
/// constrained rows is set to the prescribed value and the eliminated column contributions are
/// moved to the right-hand side of the remaining rows. Every constrained row must store its
/// diagonal entry.
pub fn apply_dirichlet_elimination(matrix: &mut CsrMatrix<f64>, rhs: &mut DVector<f64>, constraints: &[(usize, f64)]) {
    assert_eq!(matrix.nrows(), rhs.len(), "Matrix and right-hand side dimensions must match.");
    let mut prescribed = vec![None; matrix.nrows()];
    for &(index, value) in constraints {
        prescribed[index] = Some(value);
    }

    for row_index in 0..matrix.nrows() {
        let mut row = matrix.row_mut(row_index);
        let (cols, values) = row.cols_and_values_mut();
        if let Some(value) = prescribed[row_index] {
            for (&col, a) in cols.iter().zip(values) {
                *a = if col == row_index { 1.0 } else { 0.0 };
            }
            rhs[row_index] = value;
        } else {
            for (&col, a) in cols.iter().zip(values) {
                if let Some(value) = prescribed[col] {
                    rhs[row_index] -= *a * value;
                    *a = 0.0;
                }
            }
        }
    }
}
