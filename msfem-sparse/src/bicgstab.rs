use crate::{
    IdentityOperator, LinearOperator, OwnedOrMutRef, ResidualCriterion, SolveError, SolveErrorKind, SolverOutput,
    StoppingCriterion,
};
use log::trace;
use nalgebra::DVector;

/// Recurrence coefficients below this magnitude are treated as a breakdown.
const BREAKDOWN_THRESHOLD: f64 = 1e-300;

#[derive(Debug, Clone)]
pub struct BiCgStabWorkspace {
    r: DVector<f64>,
    r_hat: DVector<f64>,
    p: DVector<f64>,
    v: DVector<f64>,
    y: DVector<f64>,
    s: DVector<f64>,
    z: DVector<f64>,
    t: DVector<f64>,
}

struct Buffers<'a> {
    r: &'a mut DVector<f64>,
    r_hat: &'a mut DVector<f64>,
    p: &'a mut DVector<f64>,
    v: &'a mut DVector<f64>,
    y: &'a mut DVector<f64>,
    s: &'a mut DVector<f64>,
    z: &'a mut DVector<f64>,
    t: &'a mut DVector<f64>,
}

impl Default for BiCgStabWorkspace {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            r_hat: DVector::zeros(0),
            p: DVector::zeros(0),
            v: DVector::zeros(0),
            y: DVector::zeros(0),
            s: DVector::zeros(0),
            z: DVector::zeros(0),
            t: DVector::zeros(0),
        }
    }
}

impl BiCgStabWorkspace {
    fn prepare_buffers(&mut self, dim: usize) -> Buffers {
        for buffer in [
            &mut self.r,
            &mut self.r_hat,
            &mut self.p,
            &mut self.v,
            &mut self.y,
            &mut self.s,
            &mut self.z,
            &mut self.t,
        ] {
            buffer.resize_vertically_mut(dim, 0.0);
            buffer.fill(0.0);
        }
        Buffers {
            r: &mut self.r,
            r_hat: &mut self.r_hat,
            p: &mut self.p,
            v: &mut self.v,
            y: &mut self.y,
            s: &mut self.s,
            z: &mut self.z,
            t: &mut self.t,
        }
    }
}

/// Right-preconditioned BiCGStab (van der Vorst), configured like
/// [`ConjugateGradient`](crate::cg::ConjugateGradient).
#[derive(Debug)]
pub struct BiCgStab<'a, A, P, Criterion> {
    workspace: OwnedOrMutRef<'a, BiCgStabWorkspace>,
    operator: A,
    preconditioner: P,
    stopping_criterion: Criterion,
    max_iter: Option<usize>,
}

impl<'a> BiCgStab<'a, (), IdentityOperator, ResidualCriterion> {
    pub fn new() -> Self {
        Self {
            workspace: OwnedOrMutRef::Owned(BiCgStabWorkspace::default()),
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: ResidualCriterion::default(),
            max_iter: None,
        }
    }

    pub fn with_workspace(workspace: &'a mut BiCgStabWorkspace) -> Self {
        Self {
            workspace: OwnedOrMutRef::MutRef(workspace),
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: ResidualCriterion::default(),
            max_iter: None,
        }
    }
}

impl<'a, P, Criterion> BiCgStab<'a, (), P, Criterion> {
    pub fn with_operator<A>(self, operator: A) -> BiCgStab<'a, A, P, Criterion> {
        BiCgStab {
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

impl<'a, A, P, Criterion> BiCgStab<'a, A, P, Criterion> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> BiCgStab<'a, A, P2, Criterion> {
        BiCgStab {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_stopping_criterion<C2>(self, stopping_criterion: C2) -> BiCgStab<'a, A, P, C2> {
        BiCgStab {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner: self.preconditioner,
            stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<'a, A, P, Criterion> BiCgStab<'a, A, P, Criterion>
where
    A: LinearOperator,
    P: LinearOperator,
    Criterion: StoppingCriterion,
{
    /// Solves `Ax = b`, starting from the current contents of `x`.
    pub fn solve_with_guess(&mut self, b: &DVector<f64>, x: &mut DVector<f64>) -> Result<SolverOutput, SolveError> {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len());

        let mut output = SolverOutput::default();
        let Buffers {
            r,
            r_hat,
            p,
            v,
            y,
            s,
            z,
            t,
        } = self.workspace.prepare_buffers(x.len());

        let b_norm = b.norm();
        if b_norm == 0.0 {
            x.fill(0.0);
            return Ok(output);
        }

        // r = b - Ax
        if let Err(err) = self.operator.apply(r, x) {
            return Err(SolveError::new(output, OperatorError(err)));
        }
        r.axpy(1.0, b, -1.0);
        r_hat.copy_from(r);

        let (mut rho, mut alpha, mut omega) = (1.0, 1.0, 1.0);

        loop {
            let has_converged = self
                .stopping_criterion
                .has_converged(b_norm, output.num_iterations, r)
                .map_err(|kind| SolveError::new(output, kind))?;

            if has_converged {
                break;
            } else if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(SolveError::new(output, MaxIterationsReached { max_iter }));
                }
            }

            let rho_next = r_hat.dot(r);
            if rho_next.abs() < BREAKDOWN_THRESHOLD {
                return Err(SolveError::new(output, Breakdown));
            }
            let beta = (rho_next / rho) * (alpha / omega);
            rho = rho_next;

            // p <- r + beta * (p - omega * v)
            p.axpy(-omega, v, 1.0);
            p.axpy(1.0, r, beta);

            // v = A M p
            if let Err(err) = self.preconditioner.apply(y, p) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            if let Err(err) = self.operator.apply(v, y) {
                return Err(SolveError::new(output, OperatorError(err)));
            }

            let r_hat_v = r_hat.dot(v);
            if r_hat_v.abs() < BREAKDOWN_THRESHOLD {
                return Err(SolveError::new(output, Breakdown));
            }
            alpha = rho / r_hat_v;

            // s = r - alpha * v
            s.copy_from(r);
            s.axpy(-alpha, v, 1.0);

            let half_step_converged = self
                .stopping_criterion
                .has_converged(b_norm, output.num_iterations, s)
                .map_err(|kind| SolveError::new(output, kind))?;
            if half_step_converged {
                x.axpy(alpha, y, 1.0);
                r.copy_from(s);
                output.num_iterations += 1;
                break;
            }

            // t = A M s
            if let Err(err) = self.preconditioner.apply(z, s) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            if let Err(err) = self.operator.apply(t, z) {
                return Err(SolveError::new(output, OperatorError(err)));
            }

            let t_t = t.norm_squared();
            if t_t < BREAKDOWN_THRESHOLD {
                return Err(SolveError::new(output, Breakdown));
            }
            omega = t.dot(s) / t_t;

            x.axpy(alpha, y, 1.0);
            x.axpy(omega, z, 1.0);

            // r = s - omega * t
            r.copy_from(s);
            r.axpy(-omega, t, 1.0);

            output.num_iterations += 1;
            trace!("BiCGStab iteration {}: residual {:e}", output.num_iterations, r.norm());

            if omega.abs() < BREAKDOWN_THRESHOLD {
                return Err(SolveError::new(output, Breakdown));
            }
        }

        Ok(output)
    }
}
