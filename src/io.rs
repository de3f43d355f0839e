//! Persistence of discrete functions and visualization output.
pub mod discrete_function;
pub mod vtk;

pub use discrete_function::{DiscreteFunctionReader, DiscreteFunctionWriter};
pub use vtk::TriangleMeshDataSetBuilder;
