//! The coarse-scale system of the multiscale method.
use crate::assembly::apply_dirichlet_elimination;
use crate::config::{LinearSolverConfig, MsFemConfig};
use crate::element::Tri3d2Element;
use crate::error::{MsFemError, Stage};
use crate::linear_solver::solve_system;
use crate::local_grid::{LocalBoundaryKind, LocalGrid};
use crate::local_operator::{DIRICHLET_CORRECTOR, NEUMANN_CORRECTOR, NUM_INNER_CORRECTORS};
use crate::local_solution::{check_corrector, LocalSolutionManager};
use crate::problem::ModelProblem;
use crate::quadrature::{segment_quadrature, tri_quadrature, QuadraturePair1d, QuadraturePair2d};
use crate::space::{dofs_valid, DiscreteFunction};
use itertools::izip;
use log::info;
use nalgebra::{DVector, Matrix2x3, Matrix3, Point2, Vector2, Vector3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::time::Instant;

/// Data of one coarse cell that every quadrature point needs.
struct CellContext<'a> {
    grid: &'a LocalGrid,
    correctors: &'a [DiscreteFunction],
    coarse_element: Tri3d2Element,
    coarse_gradients: Matrix2x3<f64>,
    dirichlet_gradient: Vector2<f64>,
    petrov_galerkin: bool,
}

impl<'a> CellContext<'a> {
    /// Values of a corrector at the three vertices of a local cell.
    fn corrector_values(&self, local_cell: usize, corrector: usize) -> Vector3<f64> {
        self.correctors[corrector].cell_values(self.grid.mesh(), local_cell)
    }

    /// Values of the test functions $\tau_j$ at a point of a local cell whose (fine) basis
    /// functions take the values `phi` there.
    fn test_values(&self, local_cell: usize, x: &Point2<f64>, phi: &Vector3<f64>) -> Option<Vector3<f64>> {
        let mut values = self.coarse_element.barycentric_coords(x)?;
        if !self.petrov_galerkin {
            for j in 0..NUM_INNER_CORRECTORS {
                values[j] += phi.dot(&self.corrector_values(local_cell, j));
            }
        }
        Some(values)
    }
}

/// Assembles and solves the coarse system of the multiscale method.
///
/// Writing $\Phi_i$ for the coarse basis, $Q_i$ for the inner correctors of a coarse cell $T$ and
/// $Q_N$, $Q_D$ for its boundary correctors, the system reads
/// $$
///   \sum_i w_i \sum_T \int_T A(x, \nabla (\Phi_i + Q_i)) \cdot \nabla \tau_j
///     = \sum_T \Big[ (f, \tau_j)_T + (g_N, \tau_j)_{\Gamma_N \cap \partial T}
///       - \int_T A(x, \nabla (g_H + Q_D + Q_N)) \cdot \nabla \tau_j \Big],
/// $$
/// with the test functions $\tau_j = \Phi_j + Q_j$ (classical) or $\tau_j = \Phi_j$ (Petrov-Galerkin).
/// Row $j$ of the matrix belongs to the test function $\tau_j$. Rows of coarse Dirichlet nodes are
/// eliminated, so the solution $w$ vanishes there, and the coarse solution is $u_H = w + g_H$.
///
/// The integrals over $T$ run over the fine cells of $T$ in its local grid, with a high order rule
/// to resolve the fine-scale oscillations of $A$.
#[derive(Debug, Clone)]
pub struct CoarseScaleOperator {
    system_matrix: CsrMatrix<f64>,
    rhs: DVector<f64>,
    dirichlet_extension: DVector<f64>,
    dirichlet_nodes: Vec<usize>,
    symmetric: bool,
    solver_config: LinearSolverConfig,
}

impl CoarseScaleOperator {
    /// Assembles the coarse system, computing the correctors of every coarse cell through `manager`
    /// unless they are available already.
    pub fn new(
        manager: &LocalSolutionManager,
        problem: &ModelProblem,
        config: &MsFemConfig,
    ) -> Result<Self, MsFemError> {
        let grids = manager.grids();
        let specifier = grids.specifier();
        let coarse_mesh = specifier.coarse_mesh();
        let petrov_galerkin = config.msfem.petrov_galerkin;
        let quadrature = tri_quadrature(config.msfem.quadrature_order);
        let face_quadrature = segment_quadrature(config.msfem.quadrature_order);
        let dirichlet_extension = specifier.coarse_dirichlet_extension(problem);

        info!(
            "Assembling coarse system with {} coarse cells ({})",
            coarse_mesh.num_cells(),
            if petrov_galerkin { "Petrov-Galerkin" } else { "classical" }
        );
        let start = Instant::now();

        let contributions = (0..coarse_mesh.num_cells())
            .into_par_iter()
            .map(|coarse_cell| {
                let grid = grids.get_subgrid(coarse_cell)?;
                let correctors = manager.load(coarse_cell)?;
                for corrector in correctors {
                    check_corrector(corrector, Stage::CoarseAssembly)?;
                }

                let coarse_element = coarse_mesh.element(coarse_cell).ok_or_else(|| {
                    MsFemError::config(format!("coarse cell {} not found", coarse_cell))
                })?;
                let coarse_gradients = coarse_element.gradients().ok_or_else(|| {
                    MsFemError::invalid_state(Stage::CoarseAssembly, format!("coarse cell {} is degenerate", coarse_cell))
                })?;
                let [a, b, c] = coarse_mesh.connectivity()[coarse_cell];
                let g_h = Vector3::new(dirichlet_extension[a], dirichlet_extension[b], dirichlet_extension[c]);

                let context = CellContext {
                    grid,
                    correctors,
                    coarse_element,
                    coarse_gradients,
                    dirichlet_gradient: coarse_gradients * g_h,
                    petrov_galerkin,
                };
                assemble_cell(&context, problem, &quadrature, &face_quadrature)
            })
            .collect::<Result<Vec<_>, MsFemError>>()?;

        let n = coarse_mesh.num_vertices();
        let mut coo = CooMatrix::new(n, n);
        let mut rhs = DVector::zeros(n);
        for (conn, (matrix, vector)) in izip!(coarse_mesh.connectivity(), &contributions) {
            for (i, &row) in conn.iter().enumerate() {
                rhs[row] += vector[i];
                for (j, &col) in conn.iter().enumerate() {
                    coo.push(row, col, matrix[(i, j)]);
                }
            }
        }
        let mut system_matrix = CsrMatrix::from(&coo);

        let dirichlet_nodes = specifier.coarse_dirichlet_nodes();
        let constraints: Vec<_> = dirichlet_nodes.iter().map(|&node| (node, 0.0)).collect();
        apply_dirichlet_elimination(&mut system_matrix, &mut rhs, &constraints);

        if !dofs_valid(&rhs) {
            return Err(MsFemError::invalid_state(
                Stage::CoarseAssembly,
                "coarse right-hand side has invalid degrees of freedom",
            ));
        }
        info!(
            "Coarse system of size {} assembled in {:.3} s",
            n,
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            system_matrix,
            rhs,
            dirichlet_extension,
            dirichlet_nodes,
            symmetric: problem.data().symmetric_diffusion && !petrov_galerkin,
            solver_config: config.solver.clone(),
        })
    }

    pub fn system_matrix(&self) -> &CsrMatrix<f64> {
        &self.system_matrix
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Nodal values of the coarse Dirichlet extension $g_H$.
    pub fn dirichlet_extension(&self) -> &DVector<f64> {
        &self.dirichlet_extension
    }

    pub fn dirichlet_nodes(&self) -> &[usize] {
        &self.dirichlet_nodes
    }

    /// Whether the assembled matrix is symmetric by construction.
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Solves the coarse system for the given right-hand side.
    ///
    /// Both the right-hand side and the solution are checked for finite entries.
    pub fn apply_inverse(&self, rhs: &DVector<f64>, solution: &mut DVector<f64>) -> Result<(), MsFemError> {
        if rhs.len() != self.rhs.len() || solution.len() != self.rhs.len() {
            return Err(MsFemError::config(format!(
                "coarse system has {} unknowns, got right-hand side of size {} and solution of size {}",
                self.rhs.len(),
                rhs.len(),
                solution.len()
            )));
        }
        let start = Instant::now();
        let output = solve_system(
            &self.system_matrix,
            rhs,
            solution,
            self.symmetric,
            &self.solver_config,
            Stage::CoarseSolve,
        )?;
        info!(
            "Coarse solve took {:.3} s ({} iterations)",
            start.elapsed().as_secs_f64(),
            output.num_iterations
        );
        Ok(())
    }

    /// Solves the assembled system and returns the homogeneous part $w$ of the coarse solution.
    pub fn solve_homogeneous(&self) -> Result<DVector<f64>, MsFemError> {
        let mut w = DVector::zeros(self.rhs.len());
        self.apply_inverse(&self.rhs, &mut w)?;
        // The solver only resolves the constrained rows up to its tolerance
        for &node in &self.dirichlet_nodes {
            w[node] = 0.0;
        }
        Ok(w)
    }
}

fn assemble_cell(
    context: &CellContext,
    problem: &ModelProblem,
    quadrature: &QuadraturePair2d,
    face_quadrature: &QuadraturePair1d,
) -> Result<(Matrix3<f64>, Vector3<f64>), MsFemError> {
    let grid = context.grid;
    let mesh = grid.mesh();
    let diffusion = problem.diffusion();
    let source = problem.source();
    let degenerate = |local_cell: usize| {
        MsFemError::invalid_state(
            Stage::CoarseAssembly,
            format!(
                "local cell {} of coarse cell {} is degenerate",
                local_cell,
                grid.coarse_cell()
            ),
        )
    };

    let mut matrix = Matrix3::zeros();
    let mut vector = Vector3::zeros();

    for local_cell in grid.core_cells() {
        let element = mesh.element(local_cell).ok_or_else(|| degenerate(local_cell))?;
        let gradients = element.gradients().ok_or_else(|| degenerate(local_cell))?;
        let det_j = element.reference_jacobian().determinant().abs();

        let corrector_gradient = |k: usize| gradients * context.corrector_values(local_cell, k);
        let mut reconstructed = context.coarse_gradients;
        for i in 0..NUM_INNER_CORRECTORS {
            let mut column = reconstructed.column_mut(i);
            column += corrector_gradient(i);
        }
        let test_gradients = if context.petrov_galerkin {
            context.coarse_gradients
        } else {
            reconstructed
        };
        let boundary_gradient =
            context.dirichlet_gradient + corrector_gradient(DIRICHLET_CORRECTOR) + corrector_gradient(NEUMANN_CORRECTOR);

        let (weights, points) = quadrature;
        for (w, xi) in izip!(weights, points) {
            let x = element.map_reference_coords(xi);
            let weight = w * det_j;
            for i in 0..NUM_INNER_CORRECTORS {
                let flux = diffusion.diffusive_flux(&x, &reconstructed.column(i).into_owned());
                for j in 0..NUM_INNER_CORRECTORS {
                    matrix[(j, i)] += weight * flux.dot(&test_gradients.column(j));
                }
            }

            let tau = context
                .test_values(local_cell, &x, &element.evaluate_basis(xi))
                .ok_or_else(|| degenerate(local_cell))?;
            let boundary_flux = diffusion.diffusive_flux(&x, &boundary_gradient);
            vector += weight * (source.evaluate(&x) * tau - test_gradients.tr_mul(&boundary_flux));
        }
    }

    // Neumann faces of the domain boundary that belong to the coarse cell
    let neumann_data = problem.neumann_data();
    let (weights, points) = face_quadrature;
    for face in grid
        .faces_of_kind(LocalBoundaryKind::Neumann)
        .filter(|face| grid.covers(face.cell))
    {
        let [a, b] = mesh.face_points(face);
        let half_length = 0.5 * (b - a).norm();
        let local_cell = face.cell;
        let conn = mesh.connectivity()[local_cell];
        for (w, &s) in izip!(weights, points) {
            let t = 0.5 * (1.0 + s);
            let x = Point2::from(a.coords * (1.0 - t) + b.coords * t);
            // Fine basis values along the face
            let mut phi = Vector3::zeros();
            for (k, &v) in conn.iter().enumerate() {
                if v == face.vertices[0] {
                    phi[k] = 1.0 - t;
                } else if v == face.vertices[1] {
                    phi[k] = t;
                }
            }
            let tau = context
                .test_values(local_cell, &x, &phi)
                .ok_or_else(|| degenerate(local_cell))?;
            vector += w * half_length * neumann_data.evaluate(&x) * tau;
        }
    }

    Ok((matrix, vector))
}

/// Combines the coarse solution with the correctors of a coarse cell,
/// $\sum_j w_j Q_j + Q_D + Q_N$ for the homogeneous part $w$ of the coarse solution.
pub fn corrector_combination(
    coarse_cell: usize,
    coarse_connectivity: &[usize; 3],
    w: &DVector<f64>,
    correctors: &[DiscreteFunction],
) -> DiscreteFunction {
    let mut combination = correctors[DIRICHLET_CORRECTOR].dofs() + correctors[NEUMANN_CORRECTOR].dofs();
    for (j, &node) in coarse_connectivity.iter().enumerate() {
        combination.axpy(w[node], correctors[j].dofs(), 1.0);
    }
    DiscreteFunction::new(format!("msfem_solution_{}", coarse_cell), combination)
}
