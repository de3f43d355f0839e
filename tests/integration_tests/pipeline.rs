use crate::integration_tests::{precise_config, unit_square_specifier};
use matrixcompare::assert_scalar_eq;
use msfem::coarse_operator::CoarseScaleOperator;
use msfem::config::ProblemConfig;
use msfem::local_grid::LocalGridList;
use msfem::local_operator::NEUMANN_CORRECTOR;
use msfem::local_solution::LocalSolutionManager;
use msfem::problem::{
    easy_problem, mixed_boundary_problem, select_problem, unit_source_problem, BoundaryKind, ConstantFunction,
    DiagonalDiffusion, ModelProblem, ModelProblemData, ScalarFunction,
};
use msfem::proxy::LocalsolutionProxy;
use msfem::space::{interpolate, prolongate, DiscreteFunction};
use msfem::{run_msfem, FemSolver, MsFemConfig, MsFemError, MsFemSolver, Stage};
use nalgebra::{DMatrix, Point2, Vector2};

/// Solves the mixed Dirichlet/Neumann problem with exact solution $1 + x_0$ and checks that both
/// the coarse solution and the reconstruction reproduce it.
fn assert_msfem_exact_for_mixed_boundary_problem(petrov_galerkin: bool, layers: usize) {
    let problem = mixed_boundary_problem();
    let mut config = precise_config();
    config.msfem.petrov_galerkin = petrov_galerkin;
    let specifier = unit_square_specifier(&problem, 3, 2, layers);
    let grids = LocalGridList::new(&specifier);

    let solution = MsFemSolver::new(&problem, &config).solve(&grids).unwrap();
    let exact = problem.exact_solution().unwrap();

    let coarse_mesh = specifier.coarse_mesh();
    for (x, &u_h) in coarse_mesh.vertices().iter().zip(solution.coarse_solution.dofs().iter()) {
        assert_scalar_eq!(u_h, exact.evaluate(x), comp = abs, tol = 1e-8);
    }

    let fine_mesh = specifier.fine_mesh();
    for fine_cell in 0..fine_mesh.num_cells() {
        let local = solution.proxy.local_function(fine_cell).unwrap();
        assert_eq!(local.coarse_cell(), specifier.parents()[fine_cell]);
        let conn = fine_mesh.connectivity()[fine_cell];
        let values = local.values();
        for (k, &v) in conn.iter().enumerate() {
            assert_scalar_eq!(values[k], exact.evaluate(&fine_mesh.vertices()[v]), comp = abs, tol = 1e-8);
        }
        let gradient = local.gradient().unwrap();
        assert_scalar_eq!((gradient - Vector2::new(1.0, 0.0)).norm(), 0.0, comp = abs, tol = 1e-6);
    }
}

#[test]
fn petrov_galerkin_msfem_is_exact_for_linear_solution() {
    for layers in 0..=2 {
        assert_msfem_exact_for_mixed_boundary_problem(true, layers);
    }
}

#[test]
fn classical_msfem_is_exact_for_linear_solution_with_neumann_boundary() {
    for layers in 0..=2 {
        assert_msfem_exact_for_mixed_boundary_problem(false, layers);
    }
}

#[test]
fn neumann_problem_with_oscillating_coefficient_has_regular_coarse_system() {
    let data = ModelProblemData {
        symmetric_diffusion: true,
        linear: true,
        linear_only: true,
        periodic: false,
    };
    let diffusion = DiagonalDiffusion::new(|x: &Point2<f64>| {
        let a = 2.0 + (2.0 * std::f64::consts::PI * x.x / 0.1).sin();
        Vector2::new(a, a)
    });
    let problem = ModelProblem::new("oscillating_mixed", data, diffusion)
        .with_dirichlet_data(ConstantFunction(1.0))
        .with_neumann_data(ConstantFunction(1.0))
        .with_boundary_classifier(|x: &Point2<f64>| {
            if x.x < 1e-10 {
                BoundaryKind::Dirichlet
            } else {
                BoundaryKind::Neumann
            }
        });

    for petrov_galerkin in [false, true] {
        let mut config = precise_config();
        config.msfem.petrov_galerkin = petrov_galerkin;
        let specifier = unit_square_specifier(&problem, 3, 3, 1);
        let grids = LocalGridList::new(&specifier);
        let manager = LocalSolutionManager::new(&grids, &problem, &config);
        let operator = CoarseScaleOperator::new(&manager, &problem, &config).unwrap();

        // Every free coarse node couples to its own basis function
        let matrix = DMatrix::from(operator.system_matrix());
        let free: Vec<usize> = (0..matrix.nrows())
            .filter(|node| !operator.dirichlet_nodes().contains(node))
            .collect();
        assert_eq!(free.len(), 12);
        for &node in &free {
            assert!(matrix[(node, node)] > 0.0, "diagonal entry {} at node {}", matrix[(node, node)], node);
        }
        let reduced = matrix.select_rows(free.iter()).select_columns(free.iter());
        assert!(reduced.determinant().abs() > 1e-12);

        let solution = MsFemSolver::new(&problem, &config).solve(&grids).unwrap();
        let coarse_mesh = specifier.coarse_mesh();
        for (x, &u_h) in coarse_mesh.vertices().iter().zip(solution.coarse_solution.dofs().iter()) {
            assert!(u_h.is_finite());
            if x.x < 1e-10 {
                assert_scalar_eq!(u_h, 1.0, comp = abs, tol = 1e-12);
            } else {
                // Outflow through all Neumann faces raises the solution away from x = 0
                assert!(u_h > 1.0, "u_H = {} at {}", u_h, x);
            }
        }
    }
}

#[test]
fn classical_msfem_matches_coarse_fem_for_identity_diffusion() {
    let problem = unit_source_problem();
    let config = precise_config();

    let specifier = unit_square_specifier(&problem, 4, 2, 1);
    let grids = LocalGridList::new(&specifier);
    let solution = MsFemSolver::new(&problem, &config).solve(&grids).unwrap();

    // Single-scale FEM directly on the coarse mesh
    let coarse_specifier = unit_square_specifier(&problem, 4, 0, 0);
    let fem = FemSolver::new(&problem, &config).solve(&coarse_specifier).unwrap();

    assert_eq!(fem.num_dofs(), solution.coarse_solution.num_dofs());
    for (u_msfem, u_fem) in solution.coarse_solution.dofs().iter().zip(fem.dofs().iter()) {
        assert_scalar_eq!(u_msfem, u_fem, comp = abs, tol = 1e-9);
    }

    // Without micro structure the reconstruction is the prolongated coarse solution
    let prolongated = prolongate(
        specifier.coarse_mesh(),
        solution.coarse_solution.dofs(),
        specifier.fine_mesh(),
        specifier.parents(),
    )
    .unwrap();
    let fine_mesh = specifier.fine_mesh();
    for fine_cell in 0..fine_mesh.num_cells() {
        let values = solution.proxy.local_function(fine_cell).unwrap().values();
        for (k, &v) in fine_mesh.connectivity()[fine_cell].iter().enumerate() {
            assert_scalar_eq!(values[k], prolongated[v], comp = abs, tol = 1e-9);
        }
    }
}

#[test]
fn classical_coarse_matrix_is_symmetric() {
    let problem = easy_problem();
    let config = precise_config();
    let specifier = unit_square_specifier(&problem, 3, 2, 1);
    let grids = LocalGridList::new(&specifier);
    let manager = LocalSolutionManager::new(&grids, &problem, &config);
    let operator = CoarseScaleOperator::new(&manager, &problem, &config).unwrap();
    assert!(operator.is_symmetric());

    let matrix = DMatrix::from(operator.system_matrix());
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            let (a_ij, a_ji) = (matrix[(i, j)], matrix[(j, i)]);
            let scale = a_ij.abs().max(a_ji.abs()).max(1.0);
            assert!((a_ij - a_ji).abs() < 1e-10 * scale, "A[{i}][{j}] = {a_ij}, A[{j}][{i}] = {a_ji}");
        }
    }

    // Dirichlet rows are unit rows
    for &node in operator.dirichlet_nodes() {
        assert_eq!(matrix[(node, node)], 1.0);
        assert_eq!(operator.rhs()[node], 0.0);
    }
}

#[test]
fn petrov_galerkin_coarse_operator_is_not_treated_as_symmetric() {
    let problem = easy_problem();
    let mut config = precise_config();
    config.msfem.petrov_galerkin = true;
    let specifier = unit_square_specifier(&problem, 2, 1, 1);
    let grids = LocalGridList::new(&specifier);
    let manager = LocalSolutionManager::new(&grids, &problem, &config);
    let operator = CoarseScaleOperator::new(&manager, &problem, &config).unwrap();
    assert!(!operator.is_symmetric());
}

#[test]
fn zero_data_gives_zero_solution() {
    let data = ModelProblemData {
        symmetric_diffusion: true,
        linear: true,
        linear_only: true,
        periodic: false,
    };
    let diffusion = DiagonalDiffusion::new(|x: &Point2<f64>| Vector2::new(2.0 + x.x * x.x, 2.0 + x.y * x.y));
    let problem = ModelProblem::new("zero", data, diffusion);
    let config = precise_config();
    let specifier = unit_square_specifier(&problem, 3, 2, 1);
    let grids = LocalGridList::new(&specifier);

    let solution = MsFemSolver::new(&problem, &config).solve(&grids).unwrap();
    assert!(solution.coarse_solution.dofs().iter().all(|&u| u.abs() < 1e-14));
    for function in solution.proxy.local_functions() {
        assert!(function.dofs().iter().all(|&u| u.abs() < 1e-14));
    }
}

#[test]
fn nonlinear_request_fails_before_any_local_solve() {
    // Linear-only problems reject the request when they are selected
    let config = ProblemConfig {
        name: "easy".to_string(),
        linear: false,
        ..ProblemConfig::default()
    };
    assert!(matches!(select_problem(&config), Err(MsFemError::Config(_))));

    // The multiscale solver is only defined for linear problems
    let config = ProblemConfig {
        name: "oscillating".to_string(),
        linear: false,
        ..ProblemConfig::default()
    };
    let problem = select_problem(&config).unwrap();
    let msfem_config = MsFemConfig::default();
    let specifier = unit_square_specifier(&problem, 2, 1, 1);
    let grids = LocalGridList::new(&specifier);
    let result = MsFemSolver::new(&problem, &msfem_config).solve(&grids);
    let error = result.err().unwrap();
    assert!(matches!(error, MsFemError::Config(_)));
    assert_eq!(error.stage(), None);
    // Nothing was built or solved
    assert!((0..grids.len()).all(|coarse_cell| !grids.is_built(coarse_cell)));
}

#[test]
fn invalid_diffusion_fails_in_the_local_corrector_stage() {
    let data = ModelProblemData {
        symmetric_diffusion: true,
        linear: true,
        linear_only: true,
        periodic: false,
    };
    let diffusion = DiagonalDiffusion::new(|x: &Point2<f64>| {
        if x.x > 0.5 {
            Vector2::new(f64::NAN, 1.0)
        } else {
            Vector2::new(1.0, 1.0)
        }
    });
    let problem = ModelProblem::new("nan_diffusion", data, diffusion).with_source(ConstantFunction(1.0));
    let config = precise_config();
    let specifier = unit_square_specifier(&problem, 2, 1, 1);
    let grids = LocalGridList::new(&specifier);

    let error = MsFemSolver::new(&problem, &config).solve(&grids).err().unwrap();
    assert!(
        matches!(
            error,
            MsFemError::InvalidState {
                stage: Stage::LocalCorrector,
                ..
            }
        ),
        "unexpected error {error}"
    );
}

#[test]
fn exhausted_coarse_iteration_budget_fails_in_the_coarse_solve_stage() {
    // Identity diffusion has vanishing correctors, so the local solves converge without iterating
    let problem = unit_source_problem();
    let mut config = precise_config();
    config.solver.max_iterations = 1;
    let specifier = unit_square_specifier(&problem, 4, 1, 1);
    let grids = LocalGridList::new(&specifier);

    let error = MsFemSolver::new(&problem, &config).solve(&grids).err().unwrap();
    assert!(
        matches!(
            error,
            MsFemError::Convergence {
                stage: Stage::CoarseSolve,
                ..
            }
        ),
        "unexpected error {error}"
    );
}

#[test]
fn run_msfem_rejects_nonlinear_linear_only_problem() {
    let mut config = MsFemConfig::default();
    config.problem.linear = false;
    assert!(matches!(run_msfem(&config), Err(MsFemError::Config(_))));
}

#[test]
fn correctors_vanish_on_constrained_vertices() {
    let problem = mixed_boundary_problem();
    let config = precise_config();
    let specifier = unit_square_specifier(&problem, 3, 2, 1);
    let grids = LocalGridList::new(&specifier);
    let manager = LocalSolutionManager::new(&grids, &problem, &config);

    for coarse_cell in 0..grids.len() {
        let grid = grids.get_subgrid(coarse_cell).unwrap();
        let correctors = manager.load(coarse_cell).unwrap();
        assert_eq!(
            correctors.len(),
            manager.num_inner_correctors() + manager.num_boundary_correctors()
        );
        for corrector in correctors {
            assert_eq!(corrector.num_dofs(), grid.mesh().num_vertices());
            for v in grid.constrained_vertices() {
                assert_eq!(corrector.dofs()[v], 0.0);
            }
        }
        // The Neumann load lives on the constrained boundary vertices
        assert!(correctors[NEUMANN_CORRECTOR].dofs().iter().all(|&value| value == 0.0));
    }
}

#[test]
fn corrector_loading_is_idempotent() {
    let problem = easy_problem();
    let config = precise_config();
    let specifier = unit_square_specifier(&problem, 2, 2, 1);
    let grids = LocalGridList::new(&specifier);
    let manager = LocalSolutionManager::new(&grids, &problem, &config);

    let first: Vec<DiscreteFunction> = manager.load(3).unwrap().to_vec();
    manager.load_all().unwrap();
    let second = manager.load(3).unwrap();
    assert_eq!(first.as_slice(), second);
    assert_eq!(second[0].name(), "corrector_3_0");
    assert_eq!(second[3].name(), "neumann_corrector_3");
    assert_eq!(second[4].name(), "dirichlet_corrector_3");
    assert!(matches!(manager.load(8), Err(MsFemError::Config(_))));
}

#[test]
fn proxy_rejects_mismatched_functions() {
    let problem = easy_problem();
    let specifier = unit_square_specifier(&problem, 2, 1, 1);
    let grids = LocalGridList::new(&specifier);

    let too_few = vec![DiscreteFunction::zeros("f", 1)];
    assert!(matches!(
        LocalsolutionProxy::new(&grids, too_few),
        Err(MsFemError::Config(_))
    ));

    let wrong_size = (0..grids.len())
        .map(|coarse_cell| DiscreteFunction::zeros(format!("f_{}", coarse_cell), 3))
        .collect();
    assert!(matches!(
        LocalsolutionProxy::new(&grids, wrong_size),
        Err(MsFemError::Config(_))
    ));
}

#[test]
fn proxy_add_accumulates_prolongated_coarse_function() {
    let problem = easy_problem();
    let specifier = unit_square_specifier(&problem, 2, 2, 1);
    let grids = LocalGridList::new(&specifier);
    let functions = (0..grids.len())
        .map(|coarse_cell| {
            let num_vertices = grids.get_subgrid(coarse_cell).unwrap().mesh().num_vertices();
            DiscreteFunction::zeros(format!("f_{}", coarse_cell), num_vertices)
        })
        .collect();
    let mut proxy = LocalsolutionProxy::new(&grids, functions).unwrap();

    let linear = msfem::problem::FnFunction(|x: &Point2<f64>| 3.0 * x.x - 2.0 * x.y);
    let coarse_dofs = interpolate(specifier.coarse_mesh(), &linear);
    proxy.add(&coarse_dofs).unwrap();
    proxy.add(&coarse_dofs).unwrap();

    let fine_mesh = specifier.fine_mesh();
    for (fine_cell, element) in fine_mesh.element_iter().enumerate() {
        let local = proxy.local_function(fine_cell).unwrap();
        let x = element.centroid();
        assert_scalar_eq!(local.evaluate(&x).unwrap(), 2.0 * linear.evaluate(&x), comp = abs, tol = 1e-12);
    }

    let wrong_size = nalgebra::DVector::zeros(3);
    assert!(matches!(proxy.add(&wrong_size), Err(MsFemError::Config(_))));
}

#[test]
fn failed_proxy_add_leaves_every_local_function_unchanged() {
    let problem = easy_problem();
    let specifier = unit_square_specifier(&problem, 4, 1, 0);
    let grids = LocalGridList::new(&specifier);
    let functions: Vec<DiscreteFunction> = (0..grids.len())
        .map(|coarse_cell| {
            let num_vertices = grids.get_subgrid(coarse_cell).unwrap().mesh().num_vertices();
            DiscreteFunction::new(
                format!("f_{}", coarse_cell),
                nalgebra::DVector::from_element(num_vertices, coarse_cell as f64),
            )
        })
        .collect();
    let mut proxy = LocalsolutionProxy::new(&grids, functions.clone()).unwrap();

    // Only the two cells of the upper right square touch the corner node
    let coarse_mesh = specifier.coarse_mesh();
    let corner = coarse_mesh
        .vertices()
        .iter()
        .position(|x| x.x == 1.0 && x.y == 1.0)
        .unwrap();
    let mut coarse_dofs = nalgebra::DVector::from_element(coarse_mesh.num_vertices(), 1.0);
    coarse_dofs[corner] = f64::NAN;

    let error = proxy.add(&coarse_dofs).unwrap_err();
    assert_eq!(error.stage(), Some(Stage::Reconstruction));
    assert_eq!(proxy.local_functions(), functions.as_slice());

    coarse_dofs[corner] = 1.0;
    proxy.add(&coarse_dofs).unwrap();
    for (before, after) in functions.iter().zip(proxy.local_functions()) {
        assert!(values_differ_by_one(before, after));
    }
}

fn values_differ_by_one(before: &DiscreteFunction, after: &DiscreteFunction) -> bool {
    before
        .dofs()
        .iter()
        .zip(after.dofs().iter())
        .all(|(b, a)| (a - b - 1.0).abs() < 1e-14)
}

#[test]
fn run_msfem_reports_small_errors_for_easy_problem() {
    let mut config = MsFemConfig::default();
    config.grid.coarse_cells_per_dim = 4;
    config.grid.refinement_levels = 2;
    config.grid.layers = 1;
    config.solver.tolerance = 1e-10;

    let report = run_msfem(&config).unwrap();
    assert_eq!(report.problem, "easy");
    assert_eq!(report.coarse_solution.num_dofs(), 25);
    let errors = report.errors.unwrap();
    assert!(errors.L2 < 1e-2, "L2 error {}", errors.L2);
    assert!(errors.H1_seminorm < 0.1, "H1 seminorm error {}", errors.H1_seminorm);

    // The center of the square is a coarse node
    let exact = easy_problem().exact_solution().map(|u| u.evaluate(&Point2::new(0.5, 0.5))).unwrap();
    assert_scalar_eq!(report.coarse_solution.dofs()[12], exact, comp = abs, tol = 1e-2);
}
