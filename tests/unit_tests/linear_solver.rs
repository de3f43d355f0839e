use matrixcompare::assert_scalar_eq;
use msfem::assembly::{apply_dirichlet_elimination, assemble_load_vector, assemble_stiffness_matrix};
use msfem::config::{LinearSolverConfig, PreconditionerKind};
use msfem::linear_solver::{check_residual, solve_system};
use msfem::mesh::procedural::create_unit_square_uniform_tri_mesh_2d;
use msfem::problem::{ConstantFunction, IdentityDiffusion};
use msfem::quadrature::tri_quadrature;
use msfem::{MsFemError, Stage};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

fn poisson_system(cells_per_dim: usize) -> (CsrMatrix<f64>, DVector<f64>) {
    let mesh = create_unit_square_uniform_tri_mesh_2d(cells_per_dim);
    let quadrature = tri_quadrature(2);
    let mut matrix = assemble_stiffness_matrix(&mesh, &IdentityDiffusion, &quadrature, Stage::FineScale).unwrap();
    let mut rhs = assemble_load_vector(&mesh, &ConstantFunction(1.0), &quadrature, Stage::FineScale).unwrap();
    let constraints: Vec<_> = mesh
        .find_boundary_vertices()
        .into_iter()
        .map(|v| (v, 0.0))
        .collect();
    apply_dirichlet_elimination(&mut matrix, &mut rhs, &constraints);
    (matrix, rhs)
}

#[test]
fn solutions_pass_the_true_residual_check() {
    let (matrix, rhs) = poisson_system(6);
    for (symmetric, preconditioner) in [
        (true, PreconditionerKind::Jacobi),
        (false, PreconditionerKind::Jacobi),
        (true, PreconditionerKind::None),
    ] {
        let config = LinearSolverConfig {
            tolerance: 1e-10,
            preconditioner,
            ..LinearSolverConfig::default()
        };
        let mut x = DVector::zeros(0);
        solve_system(&matrix, &rhs, &mut x, symmetric, &config, Stage::FineScale).unwrap();
        let residual = check_residual(&matrix, &rhs, &x, config.tolerance, Stage::FineScale).unwrap();
        assert!(residual <= 1e-9, "residual {residual}");
    }
}

#[test]
fn inaccurate_solution_fails_the_true_residual_check() {
    let (matrix, rhs) = poisson_system(4);
    let config = LinearSolverConfig {
        tolerance: 1e-12,
        ..LinearSolverConfig::default()
    };
    let mut x = DVector::zeros(rhs.len());
    solve_system(&matrix, &rhs, &mut x, true, &config, Stage::CoarseSolve).unwrap();

    let exact = check_residual(&matrix, &rhs, &x, config.tolerance, Stage::CoarseSolve).unwrap();
    assert_scalar_eq!(exact, 0.0, comp = abs, tol = 1e-11);

    // Perturb a single interior value, as an updated residual that drifted away would
    let interior = (0..x.len()).find(|&i| x[i] != 0.0).unwrap();
    x[interior] += 1e-3;
    let error = check_residual(&matrix, &rhs, &x, config.tolerance, Stage::CoarseSolve).unwrap_err();
    assert!(matches!(
        error,
        MsFemError::Convergence {
            stage: Stage::CoarseSolve,
            ..
        }
    ));

    let short = DVector::zeros(3);
    assert!(matches!(
        check_residual(&matrix, &rhs, &short, config.tolerance, Stage::CoarseSolve),
        Err(MsFemError::Config(_))
    ));
}

#[test]
fn iteration_budget_exhaustion_is_a_convergence_error() {
    let (matrix, rhs) = poisson_system(8);
    let config = LinearSolverConfig {
        tolerance: 1e-12,
        max_iterations: 1,
        ..LinearSolverConfig::default()
    };
    let mut x = DVector::zeros(rhs.len());
    let error = solve_system(&matrix, &rhs, &mut x, true, &config, Stage::LocalCorrector).unwrap_err();
    assert_eq!(error.stage(), Some(Stage::LocalCorrector));
    assert!(matches!(error, MsFemError::Convergence { .. }));
}
