//! Assembly and solution of the corrector problems on a local grid.
use crate::assembly::{
    apply_dirichlet_elimination, assemble_face_load_vector, assemble_stiffness_matrix, assemble_vector,
    element_flux_vector,
};
use crate::config::MsFemConfig;
use crate::error::{MsFemError, Stage};
use crate::grid_specifier::MacroMicroGridSpecifier;
use crate::linear_solver::solve_system;
use crate::local_grid::{LocalBoundaryKind, LocalGrid};
use crate::problem::ModelProblem;
use crate::quadrature::{segment_quadrature, tri_quadrature, QuadraturePair2d};
use crate::space::{dofs_valid, DiscreteFunction};
use nalgebra::{DVector, Matrix2x3, Vector2, Vector3};
use nalgebra_sparse::CsrMatrix;

/// Number of interior correctors per coarse cell, one per coarse basis function.
pub const NUM_INNER_CORRECTORS: usize = 3;
/// Number of boundary correctors per coarse cell (Neumann, then Dirichlet).
pub const NUM_BOUNDARY_CORRECTORS: usize = 2;

/// Index of the Neumann corrector in the list returned by [`LocalProblemOperator::solve_all`].
pub const NEUMANN_CORRECTOR: usize = NUM_INNER_CORRECTORS;
/// Index of the Dirichlet corrector in the list returned by [`LocalProblemOperator::solve_all`].
pub const DIRICHLET_CORRECTOR: usize = NUM_INNER_CORRECTORS + 1;

/// The corrector problems of one coarse cell $T$ on its local grid $U(T)$.
///
/// All correctors share the bilinear form $a(\varphi, \psi) = \int_{U(T)} A(x, \nabla \varphi) \cdot \nabla \psi$
/// and vanish on the whole boundary $\partial U(T)$. Their right-hand sides are, in order,
///
/// - $-\int_{U(T)} A(x, \nabla \Phi_i|_T) \cdot \nabla \psi$ for the three coarse basis functions $\Phi_i$ of $T$,
/// - $\int_{\Gamma_N \cap \partial U(T)} g_N \psi$,
/// - $-\int_{U(T)} A(x, \nabla g_H|_T) \cdot \nabla \psi$ for the coarse Dirichlet extension $g_H$.
///
/// The constant gradients on $T$ are extended to all of $U(T)$. The Neumann load only touches
/// boundary vertices, so for linear elements the Neumann corrector is zero and the Neumann data
/// reach the solution through the coarse right-hand side.
pub struct LocalProblemOperator<'a> {
    grid: &'a LocalGrid,
    problem: &'a ModelProblem,
    config: &'a MsFemConfig,
    coarse_gradients: Matrix2x3<f64>,
    dirichlet_gradient: Vector2<f64>,
    quadrature: QuadraturePair2d,
    system_matrix: CsrMatrix<f64>,
    constraints: Vec<(usize, f64)>,
}

impl<'a> LocalProblemOperator<'a> {
    pub fn new(
        specifier: &MacroMicroGridSpecifier,
        grid: &'a LocalGrid,
        problem: &'a ModelProblem,
        config: &'a MsFemConfig,
    ) -> Result<Self, MsFemError> {
        let coarse_cell = grid.coarse_cell();
        let coarse_mesh = specifier.coarse_mesh();
        let coarse_gradients = coarse_mesh
            .element(coarse_cell)
            .and_then(|element| element.gradients())
            .ok_or_else(|| {
                MsFemError::invalid_state(Stage::LocalCorrector, format!("coarse cell {} is degenerate", coarse_cell))
            })?;

        let extension = specifier.coarse_dirichlet_extension(problem);
        let [a, b, c] = coarse_mesh.connectivity()[coarse_cell];
        let dirichlet_gradient = coarse_gradients * Vector3::new(extension[a], extension[b], extension[c]);

        let quadrature = tri_quadrature(config.msfem.quadrature_order);
        let mut system_matrix =
            assemble_stiffness_matrix(grid.mesh(), problem.diffusion(), &quadrature, Stage::LocalCorrector)?;
        let constraints: Vec<_> = grid
            .constrained_vertices()
            .into_iter()
            .map(|v| (v, 0.0))
            .collect();
        let mut dummy_rhs = DVector::zeros(system_matrix.nrows());
        apply_dirichlet_elimination(&mut system_matrix, &mut dummy_rhs, &constraints);

        Ok(Self {
            grid,
            problem,
            config,
            coarse_gradients,
            dirichlet_gradient,
            quadrature,
            system_matrix,
            constraints,
        })
    }

    pub fn grid(&self) -> &LocalGrid {
        self.grid
    }

    /// The constrained local stiffness matrix.
    pub fn system_matrix(&self) -> &CsrMatrix<f64> {
        &self.system_matrix
    }

    fn assemble_flux_rhs(&self, gradient: &Vector2<f64>) -> Result<DVector<f64>, MsFemError> {
        let diffusion = self.problem.diffusion();
        let quadrature = &self.quadrature;
        let rhs = assemble_vector(self.grid.mesh(), Stage::LocalCorrector, |_, element| {
            element_flux_vector(element, diffusion, gradient, quadrature)
        })?;
        Ok(-rhs)
    }

    fn assemble_neumann_rhs(&self) -> DVector<f64> {
        assemble_face_load_vector(
            self.grid.mesh(),
            self.grid.faces_of_kind(LocalBoundaryKind::Neumann),
            self.problem.neumann_data(),
            &segment_quadrature(self.config.msfem.quadrature_order),
        )
    }

    /// Assembles the right-hand sides of all correctors: the inner correctors, then the Neumann and
    /// the Dirichlet corrector.
    pub fn assemble_all_local_rhs(&self) -> Result<Vec<DVector<f64>>, MsFemError> {
        let mut rhs_list = Vec::with_capacity(NUM_INNER_CORRECTORS + NUM_BOUNDARY_CORRECTORS);
        for i in 0..NUM_INNER_CORRECTORS {
            rhs_list.push(self.assemble_flux_rhs(&self.coarse_gradients.column(i).into_owned())?);
        }
        rhs_list.push(self.assemble_neumann_rhs());
        rhs_list.push(self.assemble_flux_rhs(&self.dirichlet_gradient)?);

        for rhs in &mut rhs_list {
            for &(v, value) in &self.constraints {
                rhs[v] = value;
            }
        }
        Ok(rhs_list)
    }

    /// Solves the constrained local system for the given right-hand side.
    pub fn apply_inverse(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, MsFemError> {
        let mut solution = DVector::zeros(rhs.len());
        solve_system(
            &self.system_matrix,
            rhs,
            &mut solution,
            self.problem.data().symmetric_diffusion,
            &self.config.solver,
            Stage::LocalCorrector,
        )?;
        // Unit rows are only resolved up to the solver tolerance
        for &(v, value) in &self.constraints {
            solution[v] = value;
        }
        if !dofs_valid(&solution) {
            return Err(MsFemError::invalid_state(
                Stage::LocalCorrector,
                format!("corrector of coarse cell {} is invalid", self.grid.coarse_cell()),
            ));
        }
        Ok(solution)
    }

    /// Computes all correctors of the coarse cell, in the order of
    /// [`assemble_all_local_rhs`](Self::assemble_all_local_rhs).
    pub fn solve_all(&self) -> Result<Vec<DiscreteFunction>, MsFemError> {
        let coarse_cell = self.grid.coarse_cell();
        self.assemble_all_local_rhs()?
            .iter()
            .enumerate()
            .map(|(index, rhs)| {
                let solution = self.apply_inverse(rhs)?;
                Ok(DiscreteFunction::new(corrector_name(coarse_cell, index), solution))
            })
            .collect()
    }
}

/// Name of the corrector with the given index, as used for persistence and visualization.
pub fn corrector_name(coarse_cell: usize, index: usize) -> String {
    match index {
        NEUMANN_CORRECTOR => format!("neumann_corrector_{}", coarse_cell),
        DIRICHLET_CORRECTOR => format!("dirichlet_corrector_{}", coarse_cell),
        i => format!("corrector_{}_{}", coarse_cell, i),
    }
}
