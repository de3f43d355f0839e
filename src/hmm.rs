//! The heterogeneous multiscale method (HMM) for linear problems.
//!
//! The coarse P1 stiffness matrix is sampled from periodic cell problems. On every coarse cell $T$
//! with barycenter $x_T$, the correctors $w_k$ of the unit gradients $e_k$ solve
//! $$
//!   \int_Y A(x_T + \delta y) (e_k + \nabla w_k) \cdot \nabla \varphi \, dy = 0
//! $$
//! for all periodic $\varphi$ on the unit cell $Y = [-1/2, 1/2]^2$. Averaging the corrected fluxes over
//! $Y$ gives an effective coefficient matrix $\bar A_T$, and the coarse system is the P1 system of
//! the piecewise constant coefficient $\bar A_T$.
use crate::assembly::{
    apply_dirichlet_elimination, assemble_face_load_vector, assemble_load_vector, assemble_matrix,
    assemble_stiffness_matrix, assemble_vector, element_flux_vector,
};
use crate::config::{LinearSolverConfig, MsFemConfig};
use crate::error::{MsFemError, Stage};
use crate::linear_solver::solve_system;
use crate::mesh::procedural::create_rectangular_uniform_tri_mesh_2d;
use crate::mesh::{BoundaryFace, TriangleMesh2d};
use crate::problem::{BoundaryKind, DiffusionOperator, ModelProblem};
use crate::quadrature::{segment_quadrature, tri_quadrature, QuadraturePair2d};
use crate::space::DiscreteFunction;
use itertools::izip;
use log::{debug, info};
use nalgebra::{center, DVector, Matrix2, Point2, Vector2, Vector3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::time::Instant;

/// A uniform triangle mesh of the unit cell $Y = [-1/2, 1/2]^2$ whose opposite boundary vertices
/// are identified.
///
/// Vertex `(i, j)` of the lattice carries the periodic degree of freedom
/// `(j mod n) * n + (i mod n)` for `n` squares per dimension.
#[derive(Debug, Clone)]
pub struct PeriodicCellMesh {
    mesh: TriangleMesh2d,
    vertex_dofs: Vec<usize>,
    num_dofs: usize,
}

impl PeriodicCellMesh {
    /// # Panics
    ///
    /// Panics if `cells_per_dim` is zero.
    pub fn new(cells_per_dim: usize) -> Self {
        assert!(cells_per_dim > 0, "The cell mesh needs at least one square per dimension.");
        let n = cells_per_dim;
        let mesh = create_rectangular_uniform_tri_mesh_2d(&Point2::new(-0.5, -0.5), &Vector2::new(1.0, 1.0), n, n);
        let vertex_dofs = (0..=n)
            .flat_map(|j| (0..=n).map(move |i| (j % n) * n + i % n))
            .collect();
        Self {
            mesh,
            vertex_dofs,
            num_dofs: n * n,
        }
    }

    pub fn mesh(&self) -> &TriangleMesh2d {
        &self.mesh
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// The periodic degree of freedom of every mesh vertex.
    pub fn vertex_dofs(&self) -> &[usize] {
        &self.vertex_dofs
    }

    /// Sums the rows and columns of a matrix on the mesh vertices into the periodic degrees of
    /// freedom.
    pub fn fold_matrix(&self, matrix: &CsrMatrix<f64>) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.num_dofs, self.num_dofs);
        for (i, j, &value) in matrix.triplet_iter() {
            coo.push(self.vertex_dofs[i], self.vertex_dofs[j], value);
        }
        CsrMatrix::from(&coo)
    }

    pub fn fold_vector(&self, vector: &DVector<f64>) -> DVector<f64> {
        let mut folded = DVector::zeros(self.num_dofs);
        for (&dof, value) in izip!(&self.vertex_dofs, vector.iter()) {
            folded[dof] += value;
        }
        folded
    }

    /// Values at the mesh vertices of a periodic function.
    pub fn unfold(&self, dofs: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.vertex_dofs.len(), self.vertex_dofs.iter().map(|&dof| dofs[dof]))
    }
}

/// $y \mapsto A(x_T + \delta y, \cdot)$ on the unit cell.
struct CellDiffusion<'a> {
    diffusion: &'a dyn DiffusionOperator,
    center: Point2<f64>,
    delta: f64,
}

impl<'a> CellDiffusion<'a> {
    fn macro_point(&self, y: &Point2<f64>) -> Point2<f64> {
        self.center + self.delta * y.coords
    }
}

impl<'a> DiffusionOperator for CellDiffusion<'a> {
    fn diffusive_flux(&self, y: &Point2<f64>, gradient: &Vector2<f64>) -> Vector2<f64> {
        self.diffusion.diffusive_flux(&self.macro_point(y), gradient)
    }

    fn jacobian_diffusive_flux(
        &self,
        y: &Point2<f64>,
        position_gradient: &Vector2<f64>,
        direction_gradient: &Vector2<f64>,
    ) -> Vector2<f64> {
        self.diffusion
            .jacobian_diffusive_flux(&self.macro_point(y), position_gradient, direction_gradient)
    }
}

fn unit_gradient(k: usize) -> Vector2<f64> {
    Matrix2::identity().column(k).into_owned()
}

/// The cell problems around one macroscopic point $x_T$.
pub struct CellProblem<'a> {
    cell: &'a PeriodicCellMesh,
    diffusion: CellDiffusion<'a>,
    quadrature: &'a QuadraturePair2d,
    /// Points of $Y$ with a coordinate beyond this bound are left out of the averages.
    cutoff: f64,
    scale: f64,
    symmetric: bool,
    solver_config: &'a LinearSolverConfig,
}

impl<'a> CellProblem<'a> {
    pub fn new(
        cell: &'a PeriodicCellMesh,
        problem: &'a ModelProblem,
        config: &'a MsFemConfig,
        quadrature: &'a QuadraturePair2d,
        center: Point2<f64>,
    ) -> Self {
        let delta = config.hmm.delta(config.problem.epsilon);
        let epsilon = config.hmm.epsilon_estimate(config.problem.epsilon);
        Self {
            cell,
            diffusion: CellDiffusion {
                diffusion: problem.diffusion(),
                center,
                delta,
            },
            quadrature,
            cutoff: 0.5 * epsilon / delta,
            scale: (delta / epsilon).powi(2),
            symmetric: problem.data().symmetric_diffusion,
            solver_config: &config.solver,
        }
    }

    /// Computes the correctors of the two unit gradients, as values at the cell mesh vertices.
    ///
    /// Periodic correctors are only determined up to a constant. They are fixed to vanish at the
    /// first degree of freedom.
    pub fn solve_correctors(&self) -> Result<[DVector<f64>; 2], MsFemError> {
        let mesh = self.cell.mesh();
        let stiffness = assemble_stiffness_matrix(mesh, &self.diffusion, self.quadrature, Stage::CellProblem)?;
        let mut matrix = self.cell.fold_matrix(&stiffness);
        let constraints = [(0, 0.0)];
        let mut dummy_rhs = DVector::zeros(matrix.nrows());
        apply_dirichlet_elimination(&mut matrix, &mut dummy_rhs, &constraints);

        let mut correctors = [DVector::zeros(0), DVector::zeros(0)];
        for (k, corrector) in correctors.iter_mut().enumerate() {
            let direction = unit_gradient(k);
            let flux = assemble_vector(mesh, Stage::CellProblem, |_, element| {
                element_flux_vector(element, &self.diffusion, &direction, self.quadrature)
            })?;
            let mut rhs = -self.cell.fold_vector(&flux);
            rhs[0] = 0.0;

            let mut solution = DVector::zeros(rhs.len());
            solve_system(
                &matrix,
                &rhs,
                &mut solution,
                self.symmetric,
                self.solver_config,
                Stage::CellProblem,
            )?;
            solution[0] = 0.0;
            *corrector = self.cell.unfold(&solution);
        }
        Ok(correctors)
    }

    /// The effective coefficient matrix of the cell.
    ///
    /// Column $k$ averages the corrected flux $A(x_T + \delta y)(e_k + \nabla w_k)$, tested with
    /// $e_l + \nabla w_l$ (classical) or $e_l$ (Petrov-Galerkin) in row $l$.
    pub fn effective_tensor(
        &self,
        correctors: &[DVector<f64>; 2],
        petrov_galerkin: bool,
    ) -> Result<Matrix2<f64>, MsFemError> {
        let mesh = self.cell.mesh();
        let (weights, points) = self.quadrature;
        let mut tensor = Matrix2::zeros();
        for (cell_index, (element, conn)) in mesh.element_iter().zip(mesh.connectivity()).enumerate() {
            let gradients = element.gradients().ok_or_else(|| {
                MsFemError::invalid_state(Stage::CellProblem, format!("cell {} is degenerate", cell_index))
            })?;
            let det_j = element.reference_jacobian().determinant().abs();
            let [a, b, c] = *conn;
            let corrector_gradients = [
                gradients * Vector3::new(correctors[0][a], correctors[0][b], correctors[0][c]),
                gradients * Vector3::new(correctors[1][a], correctors[1][b], correctors[1][c]),
            ];

            for (w, xi) in izip!(weights, points) {
                let y = element.map_reference_coords(xi);
                if y.x.abs() > self.cutoff || y.y.abs() > self.cutoff {
                    continue;
                }
                for k in 0..2 {
                    let flux = self
                        .diffusion
                        .diffusive_flux(&y, &(unit_gradient(k) + corrector_gradients[k]));
                    for l in 0..2 {
                        let test = if petrov_galerkin {
                            unit_gradient(l)
                        } else {
                            unit_gradient(l) + corrector_gradients[l]
                        };
                        tensor[(l, k)] += w * det_j * flux.dot(&test);
                    }
                }
            }
        }
        Ok(self.scale * tensor)
    }
}

/// The result of an HMM solve.
#[derive(Debug, Clone)]
pub struct HmmSolution {
    pub coarse_solution: DiscreteFunction,
    /// The effective coefficient matrix of every coarse cell.
    pub effective_tensors: Vec<Matrix2<f64>>,
}

/// Solves linear problems with the heterogeneous multiscale method on a coarse mesh.
#[derive(Debug, Copy, Clone)]
pub struct HmmSolver<'a> {
    problem: &'a ModelProblem,
    config: &'a MsFemConfig,
}

impl<'a> HmmSolver<'a> {
    pub fn new(problem: &'a ModelProblem, config: &'a MsFemConfig) -> Self {
        Self { problem, config }
    }

    /// Solves the cell problems of every coarse cell in parallel and returns the effective
    /// coefficient matrices.
    pub fn effective_tensors(&self, coarse_mesh: &TriangleMesh2d) -> Result<Vec<Matrix2<f64>>, MsFemError> {
        let settings = &self.config.hmm;
        let cell = PeriodicCellMesh::new(settings.cells_per_dim);
        let quadrature = tri_quadrature(settings.quadrature_order);

        (0..coarse_mesh.num_cells())
            .into_par_iter()
            .map(|coarse_cell| {
                let element = coarse_mesh.element(coarse_cell).ok_or_else(|| {
                    MsFemError::config(format!("coarse cell {} not found", coarse_cell))
                })?;
                let cell_problem =
                    CellProblem::new(&cell, self.problem, self.config, &quadrature, element.centroid());
                let correctors = cell_problem.solve_correctors()?;
                let tensor = cell_problem.effective_tensor(&correctors, settings.petrov_galerkin)?;
                if !tensor.iter().all(|a| a.is_finite()) {
                    return Err(MsFemError::invalid_state(
                        Stage::CellProblem,
                        format!("effective coefficient of coarse cell {} is invalid", coarse_cell),
                    ));
                }
                Ok(tensor)
            })
            .collect()
    }

    pub fn solve(&self, coarse_mesh: &TriangleMesh2d) -> Result<HmmSolution, MsFemError> {
        self.problem.validate()?;
        self.config.validate()?;
        if !self.problem.data().linear {
            return Err(MsFemError::config(format!(
                "the heterogeneous multiscale method needs a linear problem, but {} is nonlinear",
                self.problem.name()
            )));
        }
        let petrov_galerkin = self.config.hmm.petrov_galerkin;

        info!(
            "Solving {} cell problems on {} degrees of freedom each ({})",
            2 * coarse_mesh.num_cells(),
            self.config.hmm.cells_per_dim.pow(2),
            if petrov_galerkin { "Petrov-Galerkin" } else { "classical" }
        );
        let start = Instant::now();
        let effective_tensors = self.effective_tensors(coarse_mesh)?;
        info!("Cell problems done in {:.3} s", start.elapsed().as_secs_f64());

        let mut matrix = assemble_matrix(coarse_mesh, Stage::CoarseAssembly, |cell_index, element| {
            let gradients = element.gradients()?;
            Some(element.area() * gradients.transpose() * effective_tensors[cell_index] * gradients)
        })?;

        let quadrature = tri_quadrature(self.config.msfem.quadrature_order);
        let mut rhs = assemble_load_vector(coarse_mesh, self.problem.source(), &quadrature, Stage::CoarseAssembly)?;
        let boundary_faces = self.classify_boundary(coarse_mesh);
        rhs += assemble_face_load_vector(
            coarse_mesh,
            boundary_faces
                .iter()
                .filter(|(_, kind)| *kind == BoundaryKind::Neumann)
                .map(|(face, _)| face),
            self.problem.neumann_data(),
            &segment_quadrature(self.config.msfem.quadrature_order),
        );

        let mut dirichlet_nodes: Vec<usize> = boundary_faces
            .iter()
            .filter(|(_, kind)| *kind == BoundaryKind::Dirichlet)
            .flat_map(|(face, _)| face.vertices)
            .collect();
        dirichlet_nodes.sort_unstable();
        dirichlet_nodes.dedup();
        let data = self.problem.dirichlet_data();
        let constraints: Vec<_> = dirichlet_nodes
            .into_iter()
            .map(|node| (node, data.evaluate(&coarse_mesh.vertices()[node])))
            .collect();
        apply_dirichlet_elimination(&mut matrix, &mut rhs, &constraints);

        let mut solution = DVector::zeros(rhs.len());
        let output = solve_system(
            &matrix,
            &rhs,
            &mut solution,
            self.problem.data().symmetric_diffusion && !petrov_galerkin,
            &self.config.solver,
            Stage::CoarseSolve,
        )?;
        debug!("HMM coarse solve took {} iterations", output.num_iterations);

        Ok(HmmSolution {
            coarse_solution: DiscreteFunction::new("hmm_solution", solution),
            effective_tensors,
        })
    }

    fn classify_boundary(&self, mesh: &TriangleMesh2d) -> Vec<(BoundaryFace, BoundaryKind)> {
        mesh.find_boundary_faces()
            .into_iter()
            .map(|face| {
                let [a, b] = mesh.face_points(&face);
                let kind = self.problem.boundary_kind(&center(&a, &b));
                (face, kind)
            })
            .collect()
    }
}
