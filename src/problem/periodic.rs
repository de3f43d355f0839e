use crate::problem::{DiagonalDiffusion, FnExactSolution, FnFunction, ModelProblem, ModelProblemData};
use nalgebra::{Point2, Vector2};
use std::f64::consts::PI;

/// An $\varepsilon$-periodic problem with a known exact solution.
///
/// The coefficient only oscillates in $x_0$:
/// $$
///   A^\varepsilon(x) = \frac{1}{8 \pi^2} \mathrm{diag}\left(\frac{2}{2 + \cos(2 \pi x_0 / \varepsilon)},
///     1 + \frac{1}{2} \cos(2 \pi x_0 / \varepsilon) \right),
/// $$
/// and the exact solution is
/// $u(x) = \sin(2 \pi x_0) \sin(2 \pi x_1) + \frac{\varepsilon}{2} \cos(2 \pi x_0) \sin(2 \pi x_1) \sin(2 \pi x_0 / \varepsilon)$.
pub fn periodic_problem(epsilon: f64) -> ModelProblem {
    let data = ModelProblemData {
        symmetric_diffusion: true,
        linear: true,
        linear_only: true,
        periodic: true,
    };
    let diffusion = DiagonalDiffusion::new(move |x: &Point2<f64>| coefficients(x, epsilon));

    ModelProblem::new("periodic", data, diffusion)
        .with_source(FnFunction(move |x: &Point2<f64>| source(x, epsilon)))
        .with_exact_solution(FnExactSolution {
            value: move |x: &Point2<f64>| exact_value(x, epsilon),
            gradient: move |x: &Point2<f64>| exact_gradient(x, epsilon),
        })
}

fn coefficients(x: &Point2<f64>, epsilon: f64) -> Vector2<f64> {
    let c = (2.0 * PI * x.x / epsilon).cos();
    let scale = 1.0 / (8.0 * PI * PI);
    Vector2::new(2.0 * scale / (2.0 + c), scale * (1.0 + 0.5 * c))
}

fn exact_value(x: &Point2<f64>, epsilon: f64) -> f64 {
    let (s0, c0) = (2.0 * PI * x.x).sin_cos();
    let s1 = (2.0 * PI * x.y).sin();
    let s_eps = (2.0 * PI * x.x / epsilon).sin();
    s0 * s1 + 0.5 * epsilon * c0 * s1 * s_eps
}

fn exact_gradient(x: &Point2<f64>, epsilon: f64) -> Vector2<f64> {
    let (s0, c0) = (2.0 * PI * x.x).sin_cos();
    let (s1, c1) = (2.0 * PI * x.y).sin_cos();
    let (s_eps, c_eps) = (2.0 * PI * x.x / epsilon).sin_cos();

    let d0 = 2.0 * PI * c0 * s1 - epsilon * PI * s0 * s1 * s_eps + PI * c0 * s1 * c_eps;
    let d1 = 2.0 * PI * s0 * c1 + epsilon * PI * c0 * c1 * s_eps;
    Vector2::new(d0, d1)
}

fn source(x: &Point2<f64>, epsilon: f64) -> f64 {
    let (s0, c0) = (2.0 * PI * x.x).sin_cos();
    let s1 = (2.0 * PI * x.y).sin();
    let (s_eps, c_eps) = (2.0 * PI * x.x / epsilon).sin_cos();
    let pi2 = PI * PI;

    let a = coefficients(x, epsilon);
    // d/dx0 of the first coefficient
    let da0 = (2.0 + c_eps).powi(-2) * (1.0 / (2.0 * PI)) * (1.0 / epsilon) * s_eps;

    let d00_u = -4.0 * pi2 * s0 * s1 - 2.0 * pi2 * (epsilon + 1.0 / epsilon) * c0 * s1 * s_eps - 4.0 * pi2 * s0 * s1 * c_eps;
    let d11_u = -4.0 * pi2 * s0 * s1 - 2.0 * pi2 * epsilon * c0 * s1 * s_eps;

    -da0 * exact_gradient(x, epsilon).x - a.x * d00_u - a.y * d11_u
}
