//! Drivers for the multiscale pipeline and for the single-scale reference solution.
use crate::assembly::{
    apply_dirichlet_elimination, assemble_face_load_vector, assemble_flux_vector, assemble_jacobian_matrix,
    assemble_load_vector, assemble_stiffness_matrix,
};
use crate::coarse_operator::{corrector_combination, CoarseScaleOperator};
use crate::config::{LinearSolverConfig, MsFemConfig};
use crate::error::{MsFemError, Stage};
use crate::error_estimation::{estimate_msfem_errors, ErrorNorms, DEFAULT_ERROR_QUADRATURE_ORDER};
use crate::grid_specifier::MacroMicroGridSpecifier;
use crate::io::TriangleMeshDataSetBuilder;
use crate::linear_solver::solve_system;
use crate::local_grid::LocalGridList;
use crate::local_solution::LocalSolutionManager;
use crate::mesh::procedural::create_unit_square_uniform_tri_mesh_2d;
use crate::mesh::TriangleMesh2d;
use crate::problem::{select_problem, BoundaryKind, ModelProblem};
use crate::proxy::LocalsolutionProxy;
use crate::quadrature::{segment_quadrature, tri_quadrature, QuadraturePair2d};
use crate::space::DiscreteFunction;
use log::info;
use msfem_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use msfem_optimize::newton::{newton, NewtonError, NewtonSettings};
use nalgebra::DVector;
use std::error::Error;
use std::time::Instant;

/// The result of the multiscale pipeline.
pub struct MsFemSolution<'a> {
    /// The coarse solution $u_H = w + g_H$ on the coarse mesh.
    pub coarse_solution: DiscreteFunction,
    /// The composed solution, coarse part included, piecewise per coarse cell.
    pub proxy: LocalsolutionProxy<'a>,
}

/// Runs the multiscale pipeline: local corrector solves, coarse assembly, coarse solve and
/// reconstruction.
#[derive(Debug, Copy, Clone)]
pub struct MsFemSolver<'a> {
    problem: &'a ModelProblem,
    config: &'a MsFemConfig,
}

impl<'a> MsFemSolver<'a> {
    pub fn new(problem: &'a ModelProblem, config: &'a MsFemConfig) -> Self {
        Self { problem, config }
    }

    /// Solves the problem on the local grids of `grids`.
    ///
    /// Fails with a configuration error before any local solve if the problem is not linear.
    pub fn solve<'g>(&self, grids: &'g LocalGridList<'g>) -> Result<MsFemSolution<'g>, MsFemError> {
        if !self.problem.data().linear {
            return Err(MsFemError::config(format!(
                "the multiscale solver requires a linear problem, but {} was requested as nonlinear",
                self.problem.name()
            )));
        }
        self.problem.validate()?;
        self.config.validate()?;

        let specifier = grids.specifier();
        info!(
            "Solving {} with {} MsFEM on {} coarse cells",
            self.problem.name(),
            if self.config.msfem.petrov_galerkin {
                "Petrov-Galerkin"
            } else {
                "classical"
            },
            specifier.num_coarse_cells()
        );

        let manager = LocalSolutionManager::new(grids, self.problem, self.config);
        manager.load_all()?;

        let coarse_operator = CoarseScaleOperator::new(&manager, self.problem, self.config)?;
        let w = coarse_operator.solve_homogeneous()?;
        let coarse_dofs = &w + coarse_operator.dirichlet_extension();

        info!("Reconstructing the fine-scale solution");
        let start = Instant::now();
        let coarse_mesh = specifier.coarse_mesh();
        let local_functions = coarse_mesh
            .connectivity()
            .iter()
            .enumerate()
            .map(|(coarse_cell, conn)| {
                let correctors = manager.load(coarse_cell)?;
                Ok(corrector_combination(coarse_cell, conn, &w, correctors))
            })
            .collect::<Result<Vec<_>, MsFemError>>()?;
        let mut proxy = LocalsolutionProxy::new(grids, local_functions)?;
        proxy.add(&coarse_dofs)?;
        info!("Reconstruction took {:.3} s", start.elapsed().as_secs_f64());

        let coarse_solution = DiscreteFunction::new("coarse_solution", coarse_dofs);
        if !coarse_solution.dofs_valid() {
            return Err(MsFemError::invalid_state(
                Stage::Reconstruction,
                "coarse solution has invalid degrees of freedom",
            ));
        }

        Ok(MsFemSolution { coarse_solution, proxy })
    }
}

/// Solves the problem with P1 finite elements directly on the fine mesh.
#[derive(Debug, Copy, Clone)]
pub struct FemSolver<'a> {
    problem: &'a ModelProblem,
    config: &'a MsFemConfig,
}

impl<'a> FemSolver<'a> {
    pub fn new(problem: &'a ModelProblem, config: &'a MsFemConfig) -> Self {
        Self { problem, config }
    }

    /// Computes the fine-scale solution, with Newton's method if the problem is nonlinear.
    pub fn solve(&self, specifier: &MacroMicroGridSpecifier) -> Result<DiscreteFunction, MsFemError> {
        self.problem.validate()?;
        self.config.validate()?;

        let mesh = specifier.fine_mesh();
        let quadrature = tri_quadrature(self.config.msfem.quadrature_order);
        let load = self.assemble_load(specifier, &quadrature)?;
        let data = self.problem.dirichlet_data();
        let constraints: Vec<(usize, f64)> = specifier
            .fine_dirichlet_nodes()
            .into_iter()
            .map(|node| (node, data.evaluate(&mesh.vertices()[node])))
            .collect();

        info!(
            "Solving {} on the fine mesh with {} vertices",
            self.problem.name(),
            mesh.num_vertices()
        );
        let start = Instant::now();
        let dofs = if self.problem.data().linear {
            self.solve_linear(mesh, &quadrature, load, &constraints)?
        } else {
            self.solve_nonlinear(mesh, &quadrature, load, &constraints)?
        };
        info!("Fine-scale solve took {:.3} s", start.elapsed().as_secs_f64());

        Ok(DiscreteFunction::new("fem_solution", dofs))
    }

    /// Source and Neumann contributions to the right-hand side.
    fn assemble_load(
        &self,
        specifier: &MacroMicroGridSpecifier,
        quadrature: &QuadraturePair2d,
    ) -> Result<DVector<f64>, MsFemError> {
        let mesh = specifier.fine_mesh();
        let mut load = assemble_load_vector(mesh, self.problem.source(), quadrature, Stage::FineScale)?;
        load += assemble_face_load_vector(
            mesh,
            specifier.fine_faces_of_kind(BoundaryKind::Neumann),
            self.problem.neumann_data(),
            &segment_quadrature(self.config.msfem.quadrature_order),
        );
        Ok(load)
    }

    fn solve_linear(
        &self,
        mesh: &TriangleMesh2d,
        quadrature: &QuadraturePair2d,
        mut rhs: DVector<f64>,
        constraints: &[(usize, f64)],
    ) -> Result<DVector<f64>, MsFemError> {
        let mut matrix = assemble_stiffness_matrix(mesh, self.problem.diffusion(), quadrature, Stage::FineScale)?;
        apply_dirichlet_elimination(&mut matrix, &mut rhs, constraints);
        let mut solution = DVector::zeros(rhs.len());
        solve_system(
            &matrix,
            &rhs,
            &mut solution,
            self.problem.data().symmetric_diffusion,
            &self.config.solver,
            Stage::FineScale,
        )?;
        Ok(solution)
    }

    fn solve_nonlinear(
        &self,
        mesh: &TriangleMesh2d,
        quadrature: &QuadraturePair2d,
        load: DVector<f64>,
        constraints: &[(usize, f64)],
    ) -> Result<DVector<f64>, MsFemError> {
        let mut x = DVector::zeros(mesh.num_vertices());
        for &(node, value) in constraints {
            x[node] = value;
        }

        let residual = NonlinearResidual {
            mesh,
            problem: self.problem,
            quadrature,
            load,
            constraints,
            solver_config: &self.config.solver,
        };
        let settings = NewtonSettings {
            max_iterations: Some(self.config.newton.max_iterations),
            tolerance: self.config.newton.tolerance,
            residual_floor: self.config.newton.residual_floor,
        };
        let output = newton(residual, &mut x, settings).map_err(|err| match err {
            NewtonError::NonFinite { .. } => MsFemError::invalid_state(Stage::FineScale, err.to_string()),
            NewtonError::MaximumIterationsReached(_) | NewtonError::JacobianError(_) => {
                MsFemError::convergence(Stage::FineScale, err.to_string())
            }
        })?;
        info!(
            "Newton converged after {} iterations with residual norm {:e}",
            output.iterations, output.residual_norm
        );
        Ok(x)
    }
}

/// The residual $R(u) = a(u; \psi) - (f, \psi) - (g_N, \psi)_{\Gamma_N}$, with Dirichlet rows replaced
/// by $u_k - g_k$.
struct NonlinearResidual<'a> {
    mesh: &'a TriangleMesh2d,
    problem: &'a ModelProblem,
    quadrature: &'a QuadraturePair2d,
    load: DVector<f64>,
    constraints: &'a [(usize, f64)],
    solver_config: &'a LinearSolverConfig,
}

impl<'a> VectorFunction for NonlinearResidual<'a> {
    fn dimension(&self) -> usize {
        self.mesh.num_vertices()
    }

    fn eval_into(&mut self, f: &mut DVector<f64>, x: &DVector<f64>) {
        match assemble_flux_vector(
            self.mesh,
            self.problem.diffusion(),
            x,
            self.quadrature,
            Stage::FineScale,
        ) {
            Ok(flux) => {
                f.copy_from(&flux);
                *f -= &self.load;
                for &(node, value) in self.constraints {
                    f[node] = x[node] - value;
                }
            }
            // Newton reports the non-finite residual
            Err(_) => f.fill(f64::NAN),
        }
    }
}

impl<'a> DifferentiableVectorFunction for NonlinearResidual<'a> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVector<f64>,
        x: &DVector<f64>,
        rhs: &DVector<f64>,
    ) -> Result<(), Box<dyn Error>> {
        let mut jacobian = assemble_jacobian_matrix(
            self.mesh,
            self.problem.diffusion(),
            x,
            self.quadrature,
            Stage::FineScale,
        )?;
        let mut rhs = rhs.clone();
        let constraints: Vec<_> = self
            .constraints
            .iter()
            .map(|&(node, _)| (node, rhs[node]))
            .collect();
        apply_dirichlet_elimination(&mut jacobian, &mut rhs, &constraints);
        solve_system(
            &jacobian,
            &rhs,
            sol,
            self.problem.data().symmetric_diffusion,
            self.solver_config,
            Stage::FineScale,
        )?;
        Ok(())
    }
}

/// Summary of a complete multiscale run.
#[derive(Debug, Clone)]
pub struct MsFemReport {
    pub problem: String,
    pub coarse_solution: DiscreteFunction,
    /// Errors of the composed solution, if the problem has an exact solution.
    pub errors: Option<ErrorNorms>,
}

/// Builds the unit square grid hierarchy described by `config`, runs the multiscale pipeline and
/// writes the requested output.
pub fn run_msfem(config: &MsFemConfig) -> Result<MsFemReport, MsFemError> {
    config.validate()?;
    let problem = select_problem(&config.problem)?;

    let coarse_mesh = create_unit_square_uniform_tri_mesh_2d(config.grid.coarse_cells_per_dim);
    let specifier = MacroMicroGridSpecifier::new(
        coarse_mesh,
        config.grid.refinement_levels,
        config.grid.layers,
        &problem,
    )?;
    let grids = LocalGridList::new(&specifier);
    let solution = MsFemSolver::new(&problem, config).solve(&grids)?;

    let errors = problem
        .exact_solution()
        .map(|exact| {
            estimate_msfem_errors(
                &solution.proxy,
                specifier.fine_mesh(),
                exact,
                DEFAULT_ERROR_QUADRATURE_ORDER,
            )
        })
        .transpose()
        .map_err(|err| MsFemError::invalid_state(Stage::Reconstruction, format!("{:#}", err)))?;
    if let Some(errors) = &errors {
        info!(
            "Errors of the composed solution: L2 {:e}, H1 seminorm {:e}",
            errors.L2, errors.H1_seminorm
        );
    }

    if config.output.write_vtk {
        write_output(config, &specifier, &solution)
            .map_err(|err| MsFemError::Io(format!("{} output failed: {:#}", Stage::Output, err)))?;
    }

    Ok(MsFemReport {
        problem: problem.name().to_string(),
        coarse_solution: solution.coarse_solution,
        errors,
    })
}

fn write_output(
    config: &MsFemConfig,
    specifier: &MacroMicroGridSpecifier,
    solution: &MsFemSolution,
) -> eyre::Result<()> {
    let dir = &config.output.data_dir;
    let coarse_solution = &solution.coarse_solution;
    TriangleMeshDataSetBuilder::from_mesh(specifier.coarse_mesh())
        .with_title("coarse solution")
        .with_point_scalar_attribute(coarse_solution.name(), coarse_solution.dofs().as_slice())?
        .try_export(dir.join("coarse_solution.vtk"))?;
    solution.proxy.visualize_parts(dir, "msfem_solution")?;
    Ok(())
}
