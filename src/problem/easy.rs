use crate::problem::{DiagonalDiffusion, FnExactSolution, FnFunction, ModelProblem, ModelProblemData};
use nalgebra::{Point2, Vector2};

/// A smooth problem without micro structure.
///
/// $A(x, \xi) = \mathrm{diag}(2 + x_0^2, 2 + x_1^2) \, \xi$ with the exact solution
/// $u(x) = x_0 (1 - x_0) x_1 (1 - x_1)$ and homogeneous Dirichlet data.
pub fn easy_problem() -> ModelProblem {
    let data = ModelProblemData {
        symmetric_diffusion: true,
        linear: true,
        linear_only: true,
        periodic: false,
    };
    let diffusion = DiagonalDiffusion::new(|x: &Point2<f64>| Vector2::new(2.0 + x.x * x.x, 2.0 + x.y * x.y));

    ModelProblem::new("easy", data, diffusion)
        .with_source(FnFunction(easy_source))
        .with_exact_solution(FnExactSolution {
            value: |x: &Point2<f64>| x.x * (1.0 - x.x) * x.y * (1.0 - x.y),
            gradient: |x: &Point2<f64>| {
                Vector2::new(
                    (1.0 - 2.0 * x.x) * x.y * (1.0 - x.y),
                    x.x * (1.0 - x.x) * (1.0 - 2.0 * x.y),
                )
            },
        })
}

fn easy_source(x: &Point2<f64>) -> f64 {
    let (x0, x1) = (x.x, x.y);
    let a0 = 2.0 + x0 * x0;
    let a1 = 2.0 + x1 * x1;
    let da0 = 2.0 * x0;
    let da1 = 2.0 * x1;

    -da0 * (1.0 - x1) * x1 * (1.0 - 2.0 * x0) + 2.0 * a0 * (1.0 - x1) * x1 - da1 * (1.0 - x0) * x0 * (1.0 - 2.0 * x1)
        + 2.0 * a1 * (1.0 - x0) * x0
}
