use crate::integration_tests::{precise_config, unit_square_specifier};
use matrixcompare::assert_scalar_eq;
use msfem::hmm::{HmmSolver, PeriodicCellMesh};
use msfem::mesh::procedural::create_unit_square_uniform_tri_mesh_2d;
use msfem::problem::{
    oscillating_problem, periodic_problem, unit_source_problem, DiagonalDiffusion, DiffusionOperator, FnFunction,
    IdentityDiffusion, ModelProblem, ModelProblemData,
};
use msfem::{FemSolver, MsFemConfig, MsFemError, Stage};
use nalgebra::{DVector, Matrix2, Point2, Vector2};
use std::f64::consts::PI;

fn linear_data() -> ModelProblemData {
    ModelProblemData {
        symmetric_diffusion: true,
        linear: true,
        linear_only: true,
        periodic: true,
    }
}

/// $-\nabla \cdot A \nabla u = f$ with homogeneous Dirichlet data, where $f$ belongs to the
/// solution $\sin(\pi x_0) \sin(\pi x_1)$ of the constant coefficient $\mathrm{diag}(\sqrt 3, 2)$.
fn laminate_source(x: &Point2<f64>) -> f64 {
    (3f64.sqrt() + 2.0) * PI * PI * (PI * x.x).sin() * (PI * x.y).sin()
}

/// The coefficient $2 + \sin(2 \pi x_0 / \varepsilon)$, homogenized to $\mathrm{diag}(\sqrt 3, 2)$.
fn laminate_problem(epsilon: f64) -> ModelProblem {
    let diffusion = DiagonalDiffusion::new(move |x: &Point2<f64>| {
        let a = 2.0 + (2.0 * PI * x.x / epsilon).sin();
        Vector2::new(a, a)
    });
    ModelProblem::new("laminate", linear_data(), diffusion).with_source(FnFunction(laminate_source))
}

fn homogenized_laminate_problem() -> ModelProblem {
    let diffusion = DiagonalDiffusion::new(|_: &Point2<f64>| Vector2::new(3f64.sqrt(), 2.0));
    ModelProblem::new("homogenized_laminate", linear_data(), diffusion).with_source(FnFunction(laminate_source))
}

fn hmm_config(epsilon: f64, cells_per_dim: usize, petrov_galerkin: bool) -> MsFemConfig {
    let mut config = precise_config();
    config.problem.epsilon = epsilon;
    config.hmm.cells_per_dim = cells_per_dim;
    config.hmm.petrov_galerkin = petrov_galerkin;
    config
}

fn assert_matrix_close(actual: &Matrix2<f64>, expected: &Matrix2<f64>, tol: f64) {
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert_scalar_eq!(*a, *e, comp = abs, tol = tol);
    }
}

#[test]
fn periodic_cell_mesh_identifies_opposite_vertices() {
    let cell = PeriodicCellMesh::new(4);
    assert_eq!(cell.num_dofs(), 16);
    assert_eq!(cell.mesh().num_vertices(), 25);

    let dofs = cell.vertex_dofs();
    for corner in [0, 4, 20, 24] {
        assert_eq!(dofs[corner], 0);
    }
    // Vertex (1, 4) lies on the top edge and is identified with (1, 0)
    assert_eq!(dofs[21], 1);
    assert_eq!(dofs[7], 6);
    assert_eq!(dofs[9], 4);

    let folded = cell.fold_vector(&DVector::repeat(25, 1.0));
    assert_scalar_eq!(folded.sum(), 25.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(folded[0], 4.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(folded[5], 1.0, comp = abs, tol = 1e-14);

    let periodic: DVector<f64> = DVector::from_fn(16, |i, _| i as f64);
    let unfolded = cell.unfold(&periodic);
    assert_eq!(unfolded.len(), 25);
    assert_scalar_eq!(unfolded[24], 0.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(unfolded[23], 3.0, comp = abs, tol = 1e-14);
}

#[test]
fn folded_laplacian_annihilates_constants() {
    let cell = PeriodicCellMesh::new(6);
    let quadrature = msfem::quadrature::tri_quadrature(2);
    let stiffness =
        msfem::assembly::assemble_stiffness_matrix(cell.mesh(), &IdentityDiffusion, &quadrature, Stage::CellProblem)
            .unwrap();
    let folded = cell.fold_matrix(&stiffness);
    assert_eq!(folded.nrows(), 36);
    let product = &folded * &DVector::repeat(36, 1.0);
    assert_scalar_eq!(product.amax(), 0.0, comp = abs, tol = 1e-12);
    // Folding merges boundary rows, so every periodic vertex sees the full interior stencil
    for row in folded.row_iter() {
        assert_eq!(row.col_indices().len(), 7);
    }
}

#[test]
fn identity_diffusion_reproduces_coarse_fem() {
    let problem = unit_source_problem();
    for petrov_galerkin in [false, true] {
        let config = hmm_config(0.1, 8, petrov_galerkin);
        let specifier = unit_square_specifier(&problem, 4, 0, 0);
        let hmm = HmmSolver::new(&problem, &config)
            .solve(specifier.coarse_mesh())
            .unwrap();

        assert_eq!(hmm.effective_tensors.len(), specifier.num_coarse_cells());
        for tensor in &hmm.effective_tensors {
            assert_matrix_close(tensor, &Matrix2::identity(), 1e-10);
        }

        let fem = FemSolver::new(&problem, &config).solve(&specifier).unwrap();
        let difference = (hmm.coarse_solution.dofs() - fem.dofs()).amax();
        assert_scalar_eq!(difference, 0.0, comp = abs, tol = 1e-9);
    }
}

#[test]
fn averages_are_restricted_to_the_estimated_period() {
    // A cell of twice the period only averages over its central quarter
    let problem = unit_source_problem();
    let mut config = hmm_config(0.1, 16, true);
    config.hmm.delta = Some(0.2);
    let coarse_mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let tensors = HmmSolver::new(&problem, &config)
        .effective_tensors(&coarse_mesh)
        .unwrap();
    for tensor in &tensors {
        assert_matrix_close(tensor, &Matrix2::identity(), 1e-10);
    }
}

#[test]
fn laminate_effective_coefficient_is_harmonic_and_arithmetic_mean() {
    let epsilon = 0.05;
    let problem = laminate_problem(epsilon);
    let expected = Matrix2::new(3f64.sqrt(), 0.0, 0.0, 2.0);
    for petrov_galerkin in [false, true] {
        let config = hmm_config(epsilon, 32, petrov_galerkin);
        let coarse_mesh = create_unit_square_uniform_tri_mesh_2d(2);
        let tensors = HmmSolver::new(&problem, &config)
            .effective_tensors(&coarse_mesh)
            .unwrap();
        for tensor in &tensors {
            assert_matrix_close(tensor, &expected, 2e-2);
        }
    }
}

#[test]
fn periodic_problem_homogenizes_to_a_multiple_of_the_identity() {
    let epsilon = 0.05;
    let problem = periodic_problem(epsilon);
    let config = hmm_config(epsilon, 32, true);
    let coarse_mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let tensors = HmmSolver::new(&problem, &config)
        .effective_tensors(&coarse_mesh)
        .unwrap();
    let scale = 1.0 / (8.0 * PI * PI);
    for tensor in &tensors {
        assert_matrix_close(&(tensor / scale), &Matrix2::identity(), 2e-2);
    }
}

#[test]
fn hmm_solution_is_close_to_the_homogenized_solution() {
    let epsilon = 0.05;
    let problem = laminate_problem(epsilon);
    let homogenized = homogenized_laminate_problem();
    let config = hmm_config(epsilon, 32, true);
    let specifier = unit_square_specifier(&homogenized, 8, 0, 0);

    let hmm = HmmSolver::new(&problem, &config)
        .solve(specifier.coarse_mesh())
        .unwrap();
    let fem = FemSolver::new(&homogenized, &config).solve(&specifier).unwrap();

    let difference = (hmm.coarse_solution.dofs() - fem.dofs()).amax();
    assert!(fem.dofs().amax() > 0.5);
    assert!(difference <= 1e-2 * fem.dofs().amax(), "difference {:e}", difference);
}

#[test]
fn hmm_rejects_nonlinear_problems_and_invalid_settings() {
    let coarse_mesh = create_unit_square_uniform_tri_mesh_2d(2);

    let nonlinear = oscillating_problem(0.05, false);
    let config = hmm_config(0.05, 8, true);
    let error = HmmSolver::new(&nonlinear, &config)
        .solve(&coarse_mesh)
        .unwrap_err();
    assert!(matches!(error, MsFemError::Config(_)));

    let problem = unit_source_problem();
    let mut config = hmm_config(0.05, 1, true);
    let error = HmmSolver::new(&problem, &config).solve(&coarse_mesh).unwrap_err();
    assert!(matches!(error, MsFemError::Config(_)));

    config.hmm.cells_per_dim = 8;
    config.hmm.epsilon_estimate = Some(0.0);
    let error = HmmSolver::new(&problem, &config).solve(&coarse_mesh).unwrap_err();
    assert!(matches!(error, MsFemError::Config(_)));
}

struct HalfInvalidDiffusion;

impl DiffusionOperator for HalfInvalidDiffusion {
    fn diffusive_flux(&self, x: &Point2<f64>, gradient: &Vector2<f64>) -> Vector2<f64> {
        if x.x > 0.5 {
            Vector2::repeat(f64::NAN)
        } else {
            *gradient
        }
    }

    fn jacobian_diffusive_flux(&self, x: &Point2<f64>, position_gradient: &Vector2<f64>, _: &Vector2<f64>) -> Vector2<f64> {
        self.diffusive_flux(x, position_gradient)
    }
}

#[test]
fn invalid_diffusion_fails_in_the_cell_problem_stage() {
    let problem = ModelProblem::new("half_invalid", linear_data(), HalfInvalidDiffusion);
    let config = hmm_config(0.05, 8, true);
    let coarse_mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let error = HmmSolver::new(&problem, &config)
        .solve(&coarse_mesh)
        .unwrap_err();
    assert!(matches!(
        error,
        MsFemError::InvalidState {
            stage: Stage::CellProblem,
            ..
        }
    ));
}
