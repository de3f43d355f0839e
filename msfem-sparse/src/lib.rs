//! Iterative solvers for the sparse systems arising in the multiscale pipeline.
//!
//! The solvers are written against the [`LinearOperator`] abstraction, so that both system
//! matrices and preconditioners can be plugged in without the solvers knowing their
//! representation.
use core::fmt;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

/// Preconditioned BiCGStab for non-symmetric systems.
pub mod bicgstab;
/// Preconditioned conjugate gradient for symmetric positive definite systems.
pub mod cg;
/// Diagonal scaling preconditioner.
pub mod jacobi;

pub use bicgstab::{BiCgStab, BiCgStabWorkspace};
pub use cg::{CgWorkspace, ConjugateGradient};
pub use jacobi::JacobiPreconditioner;

pub trait LinearOperator {
    /// Computes `y = A x`.
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), Box<dyn Error>>;
}

impl<'a, A> LinearOperator for &'a A
where
    A: ?Sized + LinearOperator,
{
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator>::apply(self, y, x)
    }
}

impl LinearOperator for CsrMatrix<f64> {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), Box<dyn Error>> {
        if self.ncols() != x.len() || self.nrows() != y.len() {
            return Err(Box::from(format!(
                "Dimension mismatch: {}x{} matrix applied to vector of length {} with output length {}",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len()
            )));
        }
        for (i, row) in self.row_iter().enumerate() {
            y[i] = row
                .col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, &a_ij)| a_ij * x[j])
                .sum();
        }
        Ok(())
    }
}

pub struct IdentityOperator;

impl LinearOperator for IdentityOperator {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), Box<dyn Error>> {
        y.copy_from(x);
        Ok(())
    }
}

pub trait StoppingCriterion {
    fn has_converged(&self, b_norm: f64, iteration: usize, approx_residual: &DVector<f64>) -> Result<bool, SolveErrorKind>;
}

/// Combined residual tolerance `||r|| <= max(abs_tol, rel_tol * ||b||)`.
///
/// As for any Krylov method, the residual is the recursively updated one, which may drift from the
/// true residual `b - Ax` for badly conditioned systems.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResidualCriterion {
    absolute: f64,
    relative: f64,
}

impl ResidualCriterion {
    pub fn new(absolute: f64, relative: f64) -> Self {
        Self { absolute, relative }
    }

    pub fn relative(tol: f64) -> Self {
        Self::new(0.0, tol)
    }
}

impl Default for ResidualCriterion {
    fn default() -> Self {
        Self::new(1e-8, 1e-8)
    }
}

impl StoppingCriterion for ResidualCriterion {
    fn has_converged(&self, b_norm: f64, _iteration: usize, approx_residual: &DVector<f64>) -> Result<bool, SolveErrorKind> {
        let r_norm = approx_residual.norm();
        if !r_norm.is_finite() {
            return Err(SolveErrorKind::NonFiniteResidual);
        }
        Ok(r_norm <= self.absolute || r_norm <= self.relative * b_norm)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    IndefiniteOperator,
    IndefinitePreconditioner,
    /// A scalar recurrence coefficient of BiCGStab vanished.
    Breakdown,
    NonFiniteResidual,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite."),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner."),
            Self::Breakdown => write!(f, "Solver broke down (vanishing recurrence coefficient)."),
            Self::NonFiniteResidual => write!(f, "Residual is no longer finite."),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached.", max_iter)
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolverOutput {
    /// Number of updates made to the (initial) solution vector.
    pub num_iterations: usize,
}

#[derive(Debug)]
pub struct SolveError {
    pub output: SolverOutput,
    pub kind: SolveErrorKind,
}

impl SolveError {
    fn new(output: SolverOutput, kind: SolveErrorKind) -> Self {
        Self { output, kind }
    }
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Solve failed after {} iterations. Error: {}", self.output.num_iterations, self.kind)
    }
}

impl std::error::Error for SolveError {}

/// Owns a value or borrows it mutably, so that solvers can either allocate their own workspace
/// or reuse one across solves.
#[derive(Debug)]
enum OwnedOrMutRef<'a, T> {
    Owned(T),
    MutRef(&'a mut T),
}

impl<'a, T> std::ops::Deref for OwnedOrMutRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

impl<'a, T> std::ops::DerefMut for OwnedOrMutRef<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}
