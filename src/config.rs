//! Run configuration, threaded explicitly through the solvers.
//!
//! Every section has defaults, so a configuration file only needs to list the values it overrides:
//!
//! ```json
//! { "grid": { "coarse_cells_per_dim": 8, "layers": 2 }, "problem": { "name": "periodic" } }
//! ```
use crate::error::MsFemError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of coarse squares per unit length. Each square is split into two triangles.
    pub coarse_cells_per_dim: usize,
    /// Number of uniform refinements separating the coarse grid from the fine grid.
    pub refinement_levels: usize,
    /// Enrichment layers used for every coarse cell unless tuned per cell.
    pub layers: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            coarse_cells_per_dim: 4,
            refinement_levels: 3,
            layers: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemConfig {
    pub name: String,
    pub epsilon: f64,
    pub linear: bool,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            name: "easy".to_string(),
            epsilon: 0.05,
            linear: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsFemSettings {
    /// Test with the plain coarse basis instead of the reconstructed one.
    pub petrov_galerkin: bool,
    /// Polynomial order of the quadrature used on fine cells during coarse assembly.
    pub quadrature_order: usize,
}

impl Default for MsFemSettings {
    fn default() -> Self {
        Self {
            petrov_galerkin: false,
            quadrature_order: 8,
        }
    }
}

/// Settings of the heterogeneous multiscale method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmmSettings {
    /// Resolution of the periodic cell mesh, in squares per unit length of the cell.
    pub cells_per_dim: usize,
    /// Edge length of the sampled cell $x_T + \delta Y$. Defaults to `problem.epsilon`.
    pub delta: Option<f64>,
    /// Estimated period of the coefficient. Only the part of the cell within this period enters
    /// the averages. Defaults to `problem.epsilon`.
    pub epsilon_estimate: Option<f64>,
    /// Test with the plain gradients of the coarse basis instead of the reconstructed ones.
    pub petrov_galerkin: bool,
    /// Polynomial order of the quadrature used on cell mesh triangles.
    pub quadrature_order: usize,
}

impl Default for HmmSettings {
    fn default() -> Self {
        Self {
            cells_per_dim: 16,
            delta: None,
            epsilon_estimate: None,
            petrov_galerkin: true,
            quadrature_order: 4,
        }
    }
}

impl HmmSettings {
    pub fn delta(&self, epsilon: f64) -> f64 {
        self.delta.unwrap_or(epsilon)
    }

    pub fn epsilon_estimate(&self, epsilon: f64) -> f64 {
        self.epsilon_estimate.unwrap_or(epsilon)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionerKind {
    None,
    Jacobi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverConfig {
    /// Used both as absolute and as relative residual tolerance.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub preconditioner: PreconditionerKind,
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 20000,
            preconditioner: PreconditionerKind::Jacobi,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub residual_floor: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 10,
            residual_floor: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
    pub persist_correctors: bool,
    pub write_vtk: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            persist_correctors: false,
            write_vtk: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MsFemConfig {
    pub grid: GridConfig,
    pub problem: ProblemConfig,
    pub msfem: MsFemSettings,
    pub hmm: HmmSettings,
    pub solver: LinearSolverConfig,
    pub newton: NewtonConfig,
    pub output: OutputConfig,
}

impl MsFemConfig {
    pub fn from_json_str(json: &str) -> Result<Self, MsFemError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| MsFemError::config(format!("malformed configuration: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MsFemError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|err| MsFemError::Io(format!("failed to read configuration {}: {}", path.display(), err)))?;
        Self::from_json_str(&json)
    }

    /// Checks the values that would otherwise only fail deep inside the pipeline.
    pub fn validate(&self) -> Result<(), MsFemError> {
        if self.grid.coarse_cells_per_dim == 0 {
            return Err(MsFemError::config("grid.coarse_cells_per_dim must be positive"));
        }
        if !(self.problem.epsilon > 0.0) {
            return Err(MsFemError::config("problem.epsilon must be positive"));
        }
        if !(self.solver.tolerance > 0.0) {
            return Err(MsFemError::config("solver.tolerance must be positive"));
        }
        if self.solver.max_iterations == 0 {
            return Err(MsFemError::config("solver.max_iterations must be positive"));
        }
        if !(self.newton.tolerance > 0.0) {
            return Err(MsFemError::config("newton.tolerance must be positive"));
        }
        if self.hmm.cells_per_dim < 2 {
            return Err(MsFemError::config("hmm.cells_per_dim must be at least 2"));
        }
        if self.hmm.delta.map_or(false, |delta| !(delta > 0.0)) {
            return Err(MsFemError::config("hmm.delta must be positive"));
        }
        if self.hmm.epsilon_estimate.map_or(false, |epsilon| !(epsilon > 0.0)) {
            return Err(MsFemError::config("hmm.epsilon_estimate must be positive"));
        }
        Ok(())
    }
}
