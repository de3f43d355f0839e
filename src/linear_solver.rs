//! Selection and invocation of the iterative solvers for assembled systems.
use crate::config::{LinearSolverConfig, PreconditionerKind};
use crate::error::{MsFemError, Stage};
use crate::space::dofs_valid;
use log::debug;
use msfem_sparse::{
    BiCgStab, IdentityOperator, JacobiPreconditioner, LinearOperator, ResidualCriterion, SolveError, SolverOutput,
    ConjugateGradient,
};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Solves `matrix * x = rhs`, starting from the current contents of `x`.
///
/// Conjugate gradients are used for symmetric systems and BiCGStab otherwise. The right-hand side
/// is checked for finite entries before the solve and the solution after it; failures are
/// attributed to `stage`.
pub fn solve_system(
    matrix: &CsrMatrix<f64>,
    rhs: &DVector<f64>,
    x: &mut DVector<f64>,
    symmetric: bool,
    config: &LinearSolverConfig,
    stage: Stage,
) -> Result<SolverOutput, MsFemError> {
    if !dofs_valid(rhs) {
        return Err(MsFemError::invalid_state(stage, "right-hand side has invalid degrees of freedom"));
    }
    if x.len() != rhs.len() {
        *x = DVector::zeros(rhs.len());
    }

    let criterion = ResidualCriterion::new(config.tolerance, config.tolerance);
    let result = match config.preconditioner {
        PreconditionerKind::Jacobi => {
            let preconditioner = JacobiPreconditioner::from_csr(matrix);
            run_solver(matrix, &preconditioner, criterion, rhs, x, symmetric, config.max_iterations)
        }
        PreconditionerKind::None => run_solver(
            matrix,
            &IdentityOperator,
            criterion,
            rhs,
            x,
            symmetric,
            config.max_iterations,
        ),
    };

    let output = result.map_err(|err| MsFemError::convergence(stage, err.to_string()))?;
    debug!(
        "{} solve of size {} finished after {} iterations",
        if symmetric { "CG" } else { "BiCGStab" },
        rhs.len(),
        output.num_iterations
    );

    if !dofs_valid(x) {
        return Err(MsFemError::invalid_state(stage, "solution has invalid degrees of freedom"));
    }
    check_residual(matrix, rhs, x, config.tolerance, stage)?;
    Ok(output)
}

/// Checks that `x` solves `matrix * x = rhs` up to `tolerance`, relative to the norm of `rhs`
/// where that is larger than one, and returns the norm of the true residual.
///
/// The iterative solvers only track an updated residual, which can drift away from the true one.
/// A rounding allowance proportional to $\epsilon (\|A\|_\infty \|x\| + \|b\|)$ is added to the bound.
pub fn check_residual(
    matrix: &CsrMatrix<f64>,
    rhs: &DVector<f64>,
    x: &DVector<f64>,
    tolerance: f64,
    stage: Stage,
) -> Result<f64, MsFemError> {
    if matrix.nrows() != rhs.len() || matrix.ncols() != x.len() {
        return Err(MsFemError::config(format!(
            "system of size {}x{} does not match vectors of lengths {} and {}",
            matrix.nrows(),
            matrix.ncols(),
            rhs.len(),
            x.len()
        )));
    }

    let residual = rhs - matrix * x;
    let residual_norm = residual.norm();
    let rhs_norm = rhs.norm();
    let row_sum_norm = matrix
        .row_iter()
        .map(|row| row.values().iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let rounding = 16.0 * (rhs.len() as f64).sqrt() * f64::EPSILON * (row_sum_norm * x.norm() + rhs_norm);
    let bound = tolerance * rhs_norm.max(1.0) + rounding;

    if residual_norm > bound || !residual_norm.is_finite() {
        return Err(MsFemError::convergence(
            stage,
            format!("true residual {:e} exceeds the bound {:e}", residual_norm, bound),
        ));
    }
    Ok(residual_norm)
}

fn run_solver(
    matrix: &CsrMatrix<f64>,
    preconditioner: &dyn LinearOperator,
    criterion: ResidualCriterion,
    rhs: &DVector<f64>,
    x: &mut DVector<f64>,
    symmetric: bool,
    max_iter: usize,
) -> Result<SolverOutput, SolveError> {
    if symmetric {
        ConjugateGradient::new()
            .with_operator(matrix)
            .with_preconditioner(preconditioner)
            .with_stopping_criterion(criterion)
            .with_max_iter(max_iter)
            .solve_with_guess(rhs, x)
    } else {
        BiCgStab::new()
            .with_operator(matrix)
            .with_preconditioner(preconditioner)
            .with_stopping_criterion(criterion)
            .with_max_iter(max_iter)
            .solve_with_guess(rhs, x)
    }
}
