//! The fine-scale part of the multiscale solution, stored piecewise per coarse cell.
use crate::error::{MsFemError, Stage};
use crate::io::TriangleMeshDataSetBuilder;
use crate::local_grid::{LocalGrid, LocalGridList};
use crate::local_grid_search::LocalGridSearch;
use crate::space::{dofs_valid, prolongate, DiscreteFunction};
use log::info;
use nalgebra::{DVector, Point2, Vector2, Vector3};
use rayon::prelude::*;
use std::path::Path;

/// A global fine-scale function represented by one function per coarse cell $T$, each living on the
/// local grid $U(T)$ and valid on the fine cells of $T$.
///
/// No function on the whole fine mesh is ever assembled. Evaluation on a fine cell delegates to
/// the local function of the coarse cell containing it.
pub struct LocalsolutionProxy<'a> {
    grids: &'a LocalGridList<'a>,
    search: LocalGridSearch<'a>,
    local_functions: Vec<DiscreteFunction>,
}

/// The restriction of a [`LocalsolutionProxy`] to one fine cell.
#[derive(Debug, Copy, Clone)]
pub struct LocalFunctionView<'p> {
    grid: &'p LocalGrid,
    function: &'p DiscreteFunction,
    local_cell: usize,
}

impl<'p> LocalFunctionView<'p> {
    pub fn coarse_cell(&self) -> usize {
        self.grid.coarse_cell()
    }

    /// Index of the cell in the local grid of its coarse cell.
    pub fn local_cell(&self) -> usize {
        self.local_cell
    }

    /// Values at the vertices of the cell.
    pub fn values(&self) -> Vector3<f64> {
        self.function.cell_values(self.grid.mesh(), self.local_cell)
    }

    pub fn evaluate(&self, x: &Point2<f64>) -> Option<f64> {
        self.function.evaluate_in_cell(self.grid.mesh(), self.local_cell, x)
    }

    pub fn gradient(&self) -> Option<Vector2<f64>> {
        self.function.gradient_in_cell(self.grid.mesh(), self.local_cell)
    }
}

impl<'a> LocalsolutionProxy<'a> {
    /// Creates a proxy from one function per coarse cell, indexed by coarse cell.
    pub fn new(grids: &'a LocalGridList<'a>, local_functions: Vec<DiscreteFunction>) -> Result<Self, MsFemError> {
        if local_functions.len() != grids.len() {
            return Err(MsFemError::config(format!(
                "proxy needs one local function per coarse cell, got {} functions for {} cells",
                local_functions.len(),
                grids.len()
            )));
        }
        for (coarse_cell, function) in local_functions.iter().enumerate() {
            let num_vertices = grids.get_subgrid(coarse_cell)?.mesh().num_vertices();
            if function.num_dofs() != num_vertices {
                return Err(MsFemError::config(format!(
                    "local function {} has {} degrees of freedom, but the local grid of coarse cell {} has {} vertices",
                    function.name(),
                    function.num_dofs(),
                    coarse_cell,
                    num_vertices
                )));
            }
        }

        Ok(Self {
            grids,
            search: LocalGridSearch::new(grids.specifier().coarse_mesh()),
            local_functions,
        })
    }

    pub fn local_functions(&self) -> &[DiscreteFunction] {
        &self.local_functions
    }

    /// Returns the local function of the coarse cell that contains the given fine cell.
    pub fn local_function(&self, fine_cell: usize) -> Result<LocalFunctionView<'_>, MsFemError> {
        let specifier = self.grids.specifier();
        let element = specifier.fine_mesh().element(fine_cell).ok_or_else(|| {
            MsFemError::invalid_state(Stage::Reconstruction, format!("fine cell {} not found", fine_cell))
        })?;
        let [a, b, c] = *element.vertices();
        let coarse_cell = self.search.search(&[a, b, c, element.centroid()])?;

        let grid = self.grids.get_subgrid(coarse_cell)?;
        let local_cell = grid.local_cell(fine_cell).ok_or_else(|| {
            MsFemError::invalid_state(
                Stage::Reconstruction,
                format!("fine cell {} is not part of the local grid of coarse cell {}", fine_cell, coarse_cell),
            )
        })?;

        Ok(LocalFunctionView {
            grid,
            function: &self.local_functions[coarse_cell],
            local_cell,
        })
    }

    /// Adds a coarse function to every local function, prolongated onto the local grid.
    ///
    /// All sums are computed and checked before any local function is replaced, so the proxy is
    /// left untouched on failure.
    pub fn add(&mut self, coarse_dofs: &DVector<f64>) -> Result<(), MsFemError> {
        let coarse_mesh = self.grids.specifier().coarse_mesh();
        if coarse_dofs.len() != coarse_mesh.num_vertices() {
            return Err(MsFemError::config(format!(
                "coarse function has {} degrees of freedom, expected {}",
                coarse_dofs.len(),
                coarse_mesh.num_vertices()
            )));
        }

        let grids = self.grids;
        let sums = self
            .local_functions
            .par_iter()
            .enumerate()
            .map(|(coarse_cell, function)| {
                let grid = grids.get_subgrid(coarse_cell)?;
                let prolongated =
                    prolongate(coarse_mesh, coarse_dofs, grid.mesh(), grid.parents()).ok_or_else(|| {
                        MsFemError::invalid_state(
                            Stage::Reconstruction,
                            format!("prolongation onto the local grid of coarse cell {} failed", coarse_cell),
                        )
                    })?;
                let sum = function.dofs() + prolongated;
                if !dofs_valid(&sum) {
                    return Err(MsFemError::invalid_state(
                        Stage::Reconstruction,
                        format!("{} has invalid degrees of freedom", function.name()),
                    ));
                }
                Ok(sum)
            })
            .collect::<Result<Vec<_>, MsFemError>>()?;

        for (function, sum) in self.local_functions.iter_mut().zip(sums) {
            *function.dofs_mut() = sum;
        }
        Ok(())
    }

    /// Writes the part of every local function that lies in its coarse cell to
    /// `<dir>/<prefix>_<coarse cell>.vtk`.
    pub fn visualize_parts(&self, dir: impl AsRef<Path>, prefix: &str) -> eyre::Result<()> {
        let dir = dir.as_ref();
        for (coarse_cell, function) in self.local_functions.iter().enumerate() {
            let grid = self.grids.get_subgrid(coarse_cell)?;
            let core_cells: Vec<usize> = grid.core_cells().collect();
            let (core_mesh, vertex_map) = grid.mesh().keep_cells(&core_cells);
            let values: Vec<f64> = vertex_map.iter().map(|&v| function.dofs()[v]).collect();
            TriangleMeshDataSetBuilder::from_mesh(&core_mesh)
                .with_title(function.name())
                .with_point_scalar_attribute(function.name(), &values)?
                .try_export(dir.join(format!("{}_{}.vtk", prefix, coarse_cell)))?;
        }
        info!("Wrote {} solution parts to {}", self.local_functions.len(), dir.display());
        Ok(())
    }
}
