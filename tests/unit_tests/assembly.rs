use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use msfem::assembly::{
    apply_dirichlet_elimination, assemble_face_load_vector, assemble_flux_vector, assemble_load_vector,
    assemble_stiffness_matrix, element_stiffness_matrix, face_load_vector,
};
use msfem::element::Tri3d2Element;
use msfem::mesh::procedural::create_unit_square_uniform_tri_mesh_2d;
use msfem::problem::{ConstantFunction, DiagonalDiffusion, FnFunction, IdentityDiffusion};
use msfem::quadrature::{segment_quadrature, tri_quadrature};
use msfem::space::interpolate;
use msfem::Stage;
use nalgebra::{DMatrix, DVector, Matrix3, Point2, Vector2};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

#[test]
fn element_stiffness_matrix_of_reference_triangle() {
    let element = Tri3d2Element::reference();
    let matrix = element_stiffness_matrix(&element, &IdentityDiffusion, &tri_quadrature(2)).unwrap();
    #[rustfmt::skip]
    let expected = Matrix3::new(
         1.0, -0.5, -0.5,
        -0.5,  0.5,  0.0,
        -0.5,  0.0,  0.5);
    assert_matrix_eq!(matrix, expected, comp = abs, tol = 1e-14);
}

#[test]
fn stiffness_matrix_is_symmetric_with_constants_in_kernel() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(3);
    let diffusion = DiagonalDiffusion::new(|x: &Point2<f64>| Vector2::new(1.0 + x.x, 2.0 + x.y * x.y));
    let matrix = assemble_stiffness_matrix(&mesh, &diffusion, &tri_quadrature(4), Stage::FineScale).unwrap();
    let dense = DMatrix::from(&matrix);

    assert_matrix_eq!(dense, dense.transpose(), comp = abs, tol = 1e-14);
    let ones = DVector::from_element(mesh.num_vertices(), 1.0);
    assert_matrix_eq!(&dense * ones, DVector::zeros(mesh.num_vertices()), comp = abs, tol = 1e-13);
}

#[test]
fn linear_functions_are_discrete_harmonic() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(4);
    let matrix = assemble_stiffness_matrix(&mesh, &IdentityDiffusion, &tri_quadrature(2), Stage::FineScale).unwrap();
    let u = interpolate(&mesh, &FnFunction(|x: &Point2<f64>| 2.0 * x.x - x.y + 0.5));
    let residual = &matrix * &u;

    let boundary = mesh.find_boundary_vertices();
    for v in (0..mesh.num_vertices()).filter(|v| boundary.binary_search(v).is_err()) {
        assert_scalar_eq!(residual[v], 0.0, comp = abs, tol = 1e-13);
    }
}

#[test]
fn flux_vector_of_linear_diffusion_equals_stiffness_product() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(3);
    let diffusion = DiagonalDiffusion::new(|x: &Point2<f64>| Vector2::new(1.0 + x.y, 3.0 - x.x));
    let quadrature = tri_quadrature(4);
    let u = interpolate(&mesh, &FnFunction(|x: &Point2<f64>| x.x * x.y + x.y));

    let matrix = assemble_stiffness_matrix(&mesh, &diffusion, &quadrature, Stage::FineScale).unwrap();
    let flux = assemble_flux_vector(&mesh, &diffusion, &u, &quadrature, Stage::FineScale).unwrap();
    assert_matrix_eq!(flux, &matrix * &u, comp = abs, tol = 1e-13);
}

#[test]
fn load_vector_sums_to_integral() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(3);
    let load = assemble_load_vector(&mesh, &ConstantFunction(1.0), &tri_quadrature(2), Stage::FineScale).unwrap();
    assert_scalar_eq!(load.sum(), 1.0, comp = abs, tol = 1e-14);

    let linear = FnFunction(|x: &Point2<f64>| x.x);
    let load = assemble_load_vector(&mesh, &linear, &tri_quadrature(2), Stage::FineScale).unwrap();
    assert_scalar_eq!(load.sum(), 0.5, comp = abs, tol = 1e-14);
}

#[test]
fn face_load_vector_splits_constant_data() {
    let a = Point2::new(0.0, 1.0);
    let b = Point2::new(3.0, 5.0);
    let vector = face_load_vector(&a, &b, &ConstantFunction(2.0), &segment_quadrature(2));
    assert_matrix_eq!(vector, Vector2::new(5.0, 5.0), comp = abs, tol = 1e-13);

    // Data that is 1 at a and 0 at b
    let hat = FnFunction(move |x: &Point2<f64>| 1.0 - (x - a).norm() / 5.0);
    let vector = face_load_vector(&a, &b, &hat, &segment_quadrature(2));
    assert_matrix_eq!(vector, Vector2::new(5.0 / 3.0, 5.0 / 6.0), comp = abs, tol = 1e-13);
}

#[test]
fn face_load_vector_over_boundary_sums_to_perimeter() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(3);
    let faces = mesh.find_boundary_faces();
    let vector = assemble_face_load_vector(&mesh, &faces, &ConstantFunction(1.0), &segment_quadrature(2));
    assert_scalar_eq!(vector.sum(), 4.0, comp = abs, tol = 1e-13);

    let interior = 5;
    assert_eq!(vector[interior], 0.0);
}

#[test]
fn dirichlet_elimination_is_symmetric() {
    // Dense 3x3 system, constrain the last degree of freedom to 2
    let mut coo = CooMatrix::new(3, 3);
    #[rustfmt::skip]
    let entries = [
        (0, 0, 4.0), (0, 1, -1.0), (0, 2, -1.0),
        (1, 0, -1.0), (1, 1, 4.0), (1, 2, -2.0),
        (2, 0, -1.0), (2, 1, -2.0), (2, 2, 4.0),
    ];
    for (i, j, v) in entries {
        coo.push(i, j, v);
    }
    let mut matrix = CsrMatrix::from(&coo);
    let mut rhs = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    apply_dirichlet_elimination(&mut matrix, &mut rhs, &[(2, 2.0)]);

    #[rustfmt::skip]
    let expected_matrix = DMatrix::from_row_slice(3, 3, &[
         4.0, -1.0, 0.0,
        -1.0,  4.0, 0.0,
         0.0,  0.0, 1.0]);
    assert_matrix_eq!(DMatrix::from(&matrix), expected_matrix);
    assert_matrix_eq!(rhs, DVector::from_column_slice(&[3.0, 6.0, 2.0]));
}
