use crate::problem::{ConstantFunction, DiffusionOperator, FnFunction, ModelProblem, ModelProblemData};
use nalgebra::{Point2, Vector2};
use std::f64::consts::PI;

/// A scalar, non-periodic oscillating coefficient in a monotone flux, in a linear and a nonlinear
/// variant.
///
/// The nonlinear flux is $c(x) (\xi_k + \xi_k^3 / 3)$ componentwise.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OscillatingDiffusion {
    pub epsilon: f64,
    pub linear: bool,
}

impl OscillatingDiffusion {
    pub fn coefficient(&self, x: &Point2<f64>) -> f64 {
        let mut c = 1.0
            + 0.9 * (2.0 * PI * (2.0 * x.x).abs().sqrt() / self.epsilon).sin()
                * (2.0 * PI * (1.5 * x.y).powi(2) / self.epsilon).sin();
        if x.y > 0.3 && x.y < 0.6 {
            c *= -3.0 * x.y + 1.9;
        }
        if x.y >= 0.6 {
            c *= 0.1;
        }
        c
    }
}

impl DiffusionOperator for OscillatingDiffusion {
    fn diffusive_flux(&self, x: &Point2<f64>, gradient: &Vector2<f64>) -> Vector2<f64> {
        let c = self.coefficient(x);
        if self.linear {
            c * gradient
        } else {
            gradient.map(|g| c * (g + g.powi(3) / 3.0))
        }
    }

    fn jacobian_diffusive_flux(
        &self,
        x: &Point2<f64>,
        position_gradient: &Vector2<f64>,
        direction_gradient: &Vector2<f64>,
    ) -> Vector2<f64> {
        let c = self.coefficient(x);
        if self.linear {
            c * direction_gradient
        } else {
            direction_gradient.zip_map(position_gradient, |d, p| c * d * (1.0 + p * p))
        }
    }
}

/// Oscillating coefficient on the unit square with homogeneous Dirichlet data.
///
/// The source is $1$ in the linear variant and drops to $0.1$ below $x_1 = 0.1$ in the nonlinear one.
pub fn oscillating_problem(epsilon: f64, linear: bool) -> ModelProblem {
    let data = ModelProblemData {
        symmetric_diffusion: true,
        linear,
        linear_only: false,
        periodic: false,
    };
    let problem = ModelProblem::new("oscillating", data, OscillatingDiffusion { epsilon, linear });
    if linear {
        problem.with_source(ConstantFunction(1.0))
    } else {
        problem.with_source(FnFunction(|x: &Point2<f64>| if x.y >= 0.1 { 1.0 } else { 0.1 }))
    }
}
