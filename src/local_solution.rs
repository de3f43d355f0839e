//! Write-once cache of the correctors of every coarse cell.
use crate::config::MsFemConfig;
use crate::error::{MsFemError, Stage};
use crate::io::{DiscreteFunctionReader, DiscreteFunctionWriter};
use crate::local_grid::LocalGridList;
use crate::local_operator::{LocalProblemOperator, NUM_BOUNDARY_CORRECTORS, NUM_INNER_CORRECTORS};
use crate::problem::ModelProblem;
use crate::space::DiscreteFunction;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// The parameters the correctors of a coarse cell were computed with, stored with persisted
/// correctors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectorMetadata {
    pub problem: String,
    pub epsilon: f64,
    pub coarse_cell: usize,
    pub num_coarse_cells: usize,
    pub level_difference: usize,
    pub layers: usize,
    pub quadrature_order: usize,
    pub num_local_vertices: usize,
}

impl CorrectorMetadata {
    /// Whether correctors computed with `other` can stand in for correctors computed with `self`.
    ///
    /// Epsilon is compared up to rounding, since it passes through a decimal representation.
    pub fn is_compatible(&self, other: &Self) -> bool {
        let epsilon_scale = self.epsilon.abs().max(other.epsilon.abs());
        self.problem == other.problem
            && (self.epsilon - other.epsilon).abs() <= 1e-12 * epsilon_scale
            && self.coarse_cell == other.coarse_cell
            && self.num_coarse_cells == other.num_coarse_cells
            && self.level_difference == other.level_difference
            && self.layers == other.layers
            && self.quadrature_order == other.quadrature_order
            && self.num_local_vertices == other.num_local_vertices
    }
}

/// Computes, persists and hands out the correctors of each coarse cell.
///
/// The correctors of a cell are computed at most once per manager. With
/// `output.persist_correctors` set, they are read back from the data directory when a matching
/// dataset exists there, and written to it otherwise.
pub struct LocalSolutionManager<'a> {
    grids: &'a LocalGridList<'a>,
    problem: &'a ModelProblem,
    config: &'a MsFemConfig,
    correctors: Vec<OnceCell<Vec<DiscreteFunction>>>,
}

impl<'a> LocalSolutionManager<'a> {
    pub fn new(grids: &'a LocalGridList<'a>, problem: &'a ModelProblem, config: &'a MsFemConfig) -> Self {
        Self {
            grids,
            problem,
            config,
            correctors: (0..grids.len()).map(|_| OnceCell::new()).collect(),
        }
    }

    pub fn grids(&self) -> &'a LocalGridList<'a> {
        self.grids
    }

    /// Number of correctors that only enter the right-hand side of the coarse system.
    pub fn num_boundary_correctors(&self) -> usize {
        NUM_BOUNDARY_CORRECTORS
    }

    /// Number of correctors per coarse basis function of a cell.
    pub fn num_inner_correctors(&self) -> usize {
        NUM_INNER_CORRECTORS
    }

    /// Dataset directory of the correctors of a coarse cell.
    pub fn dataset_dir(&self, coarse_cell: usize) -> PathBuf {
        self.config
            .output
            .data_dir
            .join(format!("correctors_{}", coarse_cell))
    }

    /// Returns the correctors of a coarse cell: the inner correctors followed by the Neumann and the
    /// Dirichlet corrector.
    pub fn load(&self, coarse_cell: usize) -> Result<&[DiscreteFunction], MsFemError> {
        let cell = self.correctors.get(coarse_cell).ok_or_else(|| {
            MsFemError::config(format!("coarse cell {} not found", coarse_cell))
        })?;
        cell.get_or_try_init(|| self.compute_or_read(coarse_cell))
            .map(Vec::as_slice)
    }

    /// Loads the correctors of all coarse cells in parallel.
    pub fn load_all(&self) -> Result<(), MsFemError> {
        info!("Computing correctors for {} coarse cells", self.correctors.len());
        let start = Instant::now();
        (0..self.correctors.len())
            .into_par_iter()
            .try_for_each(|coarse_cell| self.load(coarse_cell).map(|_| ()))?;
        info!("Correctors done in {:.3} s", start.elapsed().as_secs_f64());
        Ok(())
    }

    /// The metadata that persisted correctors of a coarse cell must carry to be reused.
    pub fn metadata(&self, coarse_cell: usize) -> Result<CorrectorMetadata, MsFemError> {
        let grid = self.grids.get_subgrid(coarse_cell)?;
        let specifier = self.grids.specifier();
        Ok(CorrectorMetadata {
            problem: self.problem.name().to_string(),
            epsilon: self.config.problem.epsilon,
            coarse_cell,
            num_coarse_cells: specifier.num_coarse_cells(),
            level_difference: specifier.level_difference(),
            layers: grid.layers(),
            quadrature_order: self.config.msfem.quadrature_order,
            num_local_vertices: grid.mesh().num_vertices(),
        })
    }

    fn compute_or_read(&self, coarse_cell: usize) -> Result<Vec<DiscreteFunction>, MsFemError> {
        let grid = self.grids.get_subgrid(coarse_cell)?;

        let metadata = if self.config.output.persist_correctors {
            Some(self.metadata(coarse_cell)?)
        } else {
            None
        };

        if let Some(metadata) = &metadata {
            let dir = self.dataset_dir(coarse_cell);
            match self.read_persisted(metadata) {
                Ok(Some(correctors)) => {
                    debug!("Read correctors of coarse cell {} from {}", coarse_cell, dir.display());
                    return Ok(correctors);
                }
                Ok(None) => {}
                Err(err) => warn!(
                    "Failed to read persisted correctors from {}, recomputing: {:#}",
                    dir.display(),
                    err
                ),
            }
        }

        let operator = LocalProblemOperator::new(self.grids.specifier(), grid, self.problem, self.config)?;
        let correctors = operator.solve_all()?;
        debug!(
            "Solved {} corrector problems of size {} for coarse cell {}",
            correctors.len(),
            grid.mesh().num_vertices(),
            coarse_cell
        );

        if let Some(metadata) = &metadata {
            self.persist(metadata, &correctors)
                .map_err(|err| MsFemError::Io(format!("{:#}", err)))?;
        }
        Ok(correctors)
    }

    /// Reads persisted correctors, or returns `None` if there are none or they were computed with
    /// different parameters.
    fn read_persisted(&self, metadata: &CorrectorMetadata) -> eyre::Result<Option<Vec<DiscreteFunction>>> {
        let dir = self.dataset_dir(metadata.coarse_cell);
        if !dir.is_dir() {
            return Ok(None);
        }
        let reader = DiscreteFunctionReader::open(&dir)?;
        match reader.read_metadata::<CorrectorMetadata>()? {
            Some(persisted) if persisted.is_compatible(metadata) => {}
            Some(persisted) => {
                warn!(
                    "Persisted correctors in {} were computed for {:?}, expected {:?}, recomputing",
                    dir.display(),
                    persisted,
                    metadata
                );
                return Ok(None);
            }
            None => {
                warn!("Persisted correctors in {} carry no metadata, recomputing", dir.display());
                return Ok(None);
            }
        }

        let correctors = reader.read_all()?;
        let consistent = correctors.len() == NUM_INNER_CORRECTORS + NUM_BOUNDARY_CORRECTORS
            && correctors
                .iter()
                .all(|c| c.num_dofs() == metadata.num_local_vertices && c.dofs_valid());
        if !consistent {
            warn!(
                "Persisted correctors in {} do not match the local grid of coarse cell {}, recomputing",
                dir.display(),
                metadata.coarse_cell
            );
            return Ok(None);
        }
        Ok(Some(correctors))
    }

    fn persist(&self, metadata: &CorrectorMetadata, correctors: &[DiscreteFunction]) -> eyre::Result<()> {
        let mut writer = DiscreteFunctionWriter::create(self.dataset_dir(metadata.coarse_cell))?;
        for corrector in correctors {
            writer.append(corrector)?;
        }
        // Written last, so that incomplete datasets are never reused
        writer.write_metadata(metadata)?;
        Ok(())
    }
}

/// Checks that a corrector is finite, naming the stage that consumed it.
pub(crate) fn check_corrector(corrector: &DiscreteFunction, stage: Stage) -> Result<(), MsFemError> {
    if corrector.dofs_valid() {
        Ok(())
    } else {
        Err(MsFemError::invalid_state(
            stage,
            format!("{} has invalid degrees of freedom", corrector.name()),
        ))
    }
}
