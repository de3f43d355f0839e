use crate::calculus::DifferentiableVectorFunction;
use log::debug;
use nalgebra::DVector;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings {
    pub max_iterations: Option<usize>,
    /// The iteration has converged once `|dx| <= tolerance * |x|`.
    pub tolerance: f64,
    /// An iterate with `|F(x)| < residual_floor` is accepted without taking another step.
    pub residual_floor: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_iterations: Some(10),
            tolerance: 1e-6,
            residual_floor: 1e-10,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonOutput {
    pub iterations: usize,
    pub residual_norm: f64,
}

#[derive(Debug)]
pub enum NewtonError {
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached(usize),
    /// The procedure failed because solving the Jacobian system failed.
    JacobianError(Box<dyn Error>),
    /// The residual or the step is no longer finite.
    NonFinite { iteration: usize },
}

impl Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            &NewtonError::MaximumIterationsReached(maxit) => {
                write!(f, "Failed to converge within maximum number of iterations ({}).", maxit)
            }
            &NewtonError::JacobianError(ref err) => {
                write!(f, "Failed to solve Jacobian system. Error: {}", err)
            }
            &NewtonError::NonFinite { iteration } => {
                write!(f, "Newton iterate became non-finite in iteration {}.", iteration)
            }
        }
    }
}

impl Error for NewtonError {}

/// Attempts to solve the non-linear equation F(u) = 0, starting from the current value of `x`.
///
/// Each iteration takes the full step `dx = -J(x)^{-1} F(x)`. The iteration terminates successfully
/// when the step is small relative to the iterate, or when the residual has dropped below the
/// absolute floor.
pub fn newton<F>(mut function: F, x: &mut DVector<f64>, settings: NewtonSettings) -> Result<NewtonOutput, NewtonError>
where
    F: DifferentiableVectorFunction,
{
    let n = x.len();
    let mut f = DVector::zeros(n);
    let mut minus_dx = DVector::zeros(n);

    let mut iter = 0;
    loop {
        function.eval_into(&mut f, x);
        let residual_norm = f.norm();
        debug!("Newton iteration {}: residual norm {:e}", iter, residual_norm);

        if !residual_norm.is_finite() {
            return Err(NewtonError::NonFinite { iteration: iter });
        }
        if residual_norm < settings.residual_floor {
            return Ok(NewtonOutput { iterations: iter, residual_norm });
        }
        if settings
            .max_iterations
            .map(|max_iter| iter == max_iter)
            .unwrap_or(false)
        {
            return Err(NewtonError::MaximumIterationsReached(iter));
        }

        // Solve the system J dx = -f   <=>   J (-dx) = f
        function
            .solve_jacobian_system(&mut minus_dx, x, &f)
            .map_err(NewtonError::JacobianError)?;

        *x -= &minus_dx;
        iter += 1;

        let step_norm = minus_dx.norm();
        if !step_norm.is_finite() {
            return Err(NewtonError::NonFinite { iteration: iter });
        }
        let x_norm = x.norm();
        debug!("Newton iteration {}: step norm {:e}, iterate norm {:e}", iter, step_norm, x_norm);
        if step_norm <= settings.tolerance * x_norm {
            function.eval_into(&mut f, x);
            return Ok(NewtonOutput {
                iterations: iter,
                residual_norm: f.norm(),
            });
        }
    }
}
