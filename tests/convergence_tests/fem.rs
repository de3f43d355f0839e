use msfem::config::ProblemConfig;
use msfem::error_estimation::{estimate_H1_seminorm_error, estimate_L2_error, DEFAULT_ERROR_QUADRATURE_ORDER};
use msfem::grid_specifier::MacroMicroGridSpecifier;
use msfem::mesh::procedural::create_unit_square_uniform_tri_mesh_2d;
use msfem::problem::{easy_problem, select_problem};
use msfem::quadrature::tri_quadrature;
use msfem::{FemSolver, MsFemConfig};

#[test]
fn fem_converges_for_easy_problem() {
    let problem = easy_problem();
    let mut config = MsFemConfig::default();
    config.solver.tolerance = 1e-12;
    let exact = problem.exact_solution().unwrap();
    let quadrature = tri_quadrature(DEFAULT_ERROR_QUADRATURE_ORDER);

    let mut l2_errors = Vec::new();
    let mut h1_errors = Vec::new();
    for levels in 1..=3 {
        let coarse_mesh = create_unit_square_uniform_tri_mesh_2d(2);
        let specifier = MacroMicroGridSpecifier::new(coarse_mesh, levels, 0, &problem).unwrap();
        let solution = FemSolver::new(&problem, &config).solve(&specifier).unwrap();
        let mesh = specifier.fine_mesh();
        l2_errors.push(estimate_L2_error(mesh, exact, &solution, &quadrature).unwrap());
        h1_errors.push(estimate_H1_seminorm_error(mesh, exact, &solution, &quadrature).unwrap());
    }

    for k in 0..l2_errors.len() - 1 {
        let l2_rate = l2_errors[k] / l2_errors[k + 1];
        let h1_rate = h1_errors[k] / h1_errors[k + 1];
        assert!(l2_rate > 3.0, "L2 errors {:?}", l2_errors);
        assert!(h1_rate > 1.7, "H1 seminorm errors {:?}", h1_errors);
    }
}

#[test]
fn newton_solves_nonlinear_oscillating_problem() {
    let config = ProblemConfig {
        name: "oscillating".to_string(),
        epsilon: 0.1,
        linear: false,
    };
    let problem = select_problem(&config).unwrap();
    let mut msfem_config = MsFemConfig::default();
    msfem_config.solver.tolerance = 1e-12;

    let coarse_mesh = create_unit_square_uniform_tri_mesh_2d(4);
    let specifier = MacroMicroGridSpecifier::new(coarse_mesh, 2, 0, &problem).unwrap();
    let solution = FemSolver::new(&problem, &msfem_config).solve(&specifier).unwrap();

    assert!(solution.dofs_valid());
    let mesh = specifier.fine_mesh();
    for v in mesh.find_boundary_vertices() {
        assert!(solution.dofs()[v].abs() < 1e-10);
    }
    assert!(solution.dofs().max() > 0.0);
}
