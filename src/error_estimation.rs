//! Functionality for error estimation.
use crate::element::Tri3d2Element;
use crate::mesh::TriangleMesh2d;
use crate::problem::ExactSolution;
use crate::proxy::LocalsolutionProxy;
use crate::quadrature::{tri_quadrature, QuadraturePair2d};
use crate::space::DiscreteFunction;
use eyre::eyre;
use itertools::izip;
use nalgebra::{Vector2, Vector3};

/// Quadrature order used for error integrals unless specified otherwise.
pub const DEFAULT_ERROR_QUADRATURE_ORDER: usize = 13;

/// Estimate the squared $L^2$ error $\norm{u_h - u}^2_{L^2}$ on the given element, for the P1 function
/// with nodal values `u_h_element`.
#[allow(non_snake_case)]
pub fn estimate_element_L2_error_squared(
    element: &Tri3d2Element,
    u: &dyn ExactSolution,
    u_h_element: &Vector3<f64>,
    quadrature: &QuadraturePair2d,
) -> f64 {
    let det_j = element.reference_jacobian().determinant().abs();
    let (weights, points) = quadrature;
    let mut result = 0.0;
    for (w, xi) in izip!(weights, points) {
        let x = element.map_reference_coords(xi);
        let u_h = element.evaluate_basis(xi).dot(u_h_element);
        let error = u_h - u.evaluate(&x);
        result += *w * error * error * det_j;
    }
    result
}

/// Estimate the squared $H^1$ *seminorm* error $\seminorm{u_h - u}^2_{H^1}$ on the given element, for a
/// function with the constant gradient `u_h_gradient` on the element.
#[allow(non_snake_case)]
pub fn estimate_element_H1_seminorm_error_squared(
    element: &Tri3d2Element,
    u: &dyn ExactSolution,
    u_h_gradient: &Vector2<f64>,
    quadrature: &QuadraturePair2d,
) -> f64 {
    let det_j = element.reference_jacobian().determinant().abs();
    let (weights, points) = quadrature;
    let mut result = 0.0;
    for (w, xi) in izip!(weights, points) {
        let x = element.map_reference_coords(xi);
        let error = u_h_gradient - u.gradient(&x);
        result += *w * error.norm_squared() * det_j;
    }
    result
}

/// Estimate the $L^2$ error $\norm{u_h - u}_{L^2}$ of a P1 function on a mesh.
#[allow(non_snake_case)]
pub fn estimate_L2_error(
    mesh: &TriangleMesh2d,
    u: &dyn ExactSolution,
    u_h: &DiscreteFunction,
    quadrature: &QuadraturePair2d,
) -> eyre::Result<f64> {
    check_num_dofs(mesh, u_h)?;
    let mut result = 0.0;
    for (cell_index, element) in mesh.element_iter().enumerate() {
        let u_h_element = u_h.cell_values(mesh, cell_index);
        result += estimate_element_L2_error_squared(&element, u, &u_h_element, quadrature);
    }
    Ok(result.sqrt())
}

/// Estimate the $H^1$ seminorm error $\seminorm{u_h - u}_{H^1}$ of a P1 function on a mesh.
#[allow(non_snake_case)]
pub fn estimate_H1_seminorm_error(
    mesh: &TriangleMesh2d,
    u: &dyn ExactSolution,
    u_h: &DiscreteFunction,
    quadrature: &QuadraturePair2d,
) -> eyre::Result<f64> {
    check_num_dofs(mesh, u_h)?;
    let mut result = 0.0;
    for (cell_index, element) in mesh.element_iter().enumerate() {
        let gradient = u_h
            .gradient_in_cell(mesh, cell_index)
            .ok_or_else(|| eyre!("cell {} is degenerate", cell_index))?;
        result += estimate_element_H1_seminorm_error_squared(&element, u, &gradient, quadrature);
    }
    Ok(result.sqrt())
}

/// $L^2$ and $H^1$ seminorm errors of a solution.
#[derive(Debug, Copy, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct ErrorNorms {
    pub L2: f64,
    pub H1_seminorm: f64,
}

/// Estimate the errors of the composed multiscale solution represented by `proxy`.
///
/// Every fine cell is evaluated through the local function of its coarse cell, so the proxy must
/// already contain the coarse part of the solution.
pub fn estimate_msfem_errors(
    proxy: &LocalsolutionProxy,
    fine_mesh: &TriangleMesh2d,
    u: &dyn ExactSolution,
    quadrature_order: usize,
) -> eyre::Result<ErrorNorms> {
    let quadrature = tri_quadrature(quadrature_order);
    let mut l2_squared = 0.0;
    let mut h1_squared = 0.0;
    for (cell_index, element) in fine_mesh.element_iter().enumerate() {
        let local = proxy.local_function(cell_index)?;
        let gradient = local
            .gradient()
            .ok_or_else(|| eyre!("local cell of fine cell {} is degenerate", cell_index))?;
        l2_squared += estimate_element_L2_error_squared(&element, u, &local.values(), &quadrature);
        h1_squared += estimate_element_H1_seminorm_error_squared(&element, u, &gradient, &quadrature);
    }
    Ok(ErrorNorms {
        L2: l2_squared.sqrt(),
        H1_seminorm: h1_squared.sqrt(),
    })
}

fn check_num_dofs(mesh: &TriangleMesh2d, u_h: &DiscreteFunction) -> eyre::Result<()> {
    if u_h.num_dofs() != mesh.num_vertices() {
        return Err(eyre!(
            "{} has {} degrees of freedom, but the mesh has {} vertices",
            u_h.name(),
            u_h.num_dofs(),
            mesh.num_vertices()
        ));
    }
    Ok(())
}
