//! Two-scale multiscale finite element method (MsFEM) for elliptic problems with oscillating
//! coefficients.
//!
//! The coarse (macro) mesh carries the degrees of freedom of the solution. For every coarse cell,
//! corrector problems are solved on a fine-scale local grid around the cell, and the correctors
//! enter both the coarse system and the reconstruction of the fine-scale solution.
pub mod assembly;
pub mod coarse_operator;
pub mod config;
pub mod element;
pub mod error;
pub mod error_estimation;
pub mod grid_specifier;
pub mod hmm;
pub mod io;
pub mod linear_solver;
pub mod local_grid;
pub mod local_grid_search;
pub mod local_operator;
pub mod local_solution;
pub mod mesh;
pub mod problem;
pub mod proxy;
pub mod quadrature;
pub mod solver;
pub mod space;

pub mod sparse {
    pub use msfem_sparse::*;
}

pub mod optimize {
    pub use msfem_optimize::*;
}

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
pub extern crate vtkio;

pub use config::MsFemConfig;
pub use error::{MsFemError, Stage};
pub use hmm::{HmmSolution, HmmSolver};
pub use solver::{run_msfem, FemSolver, MsFemReport, MsFemSolution, MsFemSolver};
