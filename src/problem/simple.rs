use crate::problem::{
    BoundaryKind, ConstantFunction, FnExactSolution, FnFunction, IdentityDiffusion, ModelProblem, ModelProblemData,
};
use nalgebra::{Point2, Vector2};

const BOUNDARY_TOLERANCE: f64 = 1e-12;

fn identity_data() -> ModelProblemData {
    ModelProblemData {
        symmetric_diffusion: true,
        linear: true,
        linear_only: true,
        periodic: false,
    }
}

/// $-\Delta u = 1$ with homogeneous Dirichlet data.
pub fn unit_source_problem() -> ModelProblem {
    ModelProblem::new("unit_source", identity_data(), IdentityDiffusion).with_source(ConstantFunction(1.0))
}

/// $-\Delta u = 0$ with $u = 1$ on $x_0 = 0$, unit outflow on $x_0 = 1$ and no flux elsewhere.
///
/// The exact solution is $u(x) = 1 + x_0$.
pub fn mixed_boundary_problem() -> ModelProblem {
    ModelProblem::new("mixed_boundary", identity_data(), IdentityDiffusion)
        .with_dirichlet_data(ConstantFunction(1.0))
        .with_neumann_data(FnFunction(|x: &Point2<f64>| {
            if x.x > 1.0 - BOUNDARY_TOLERANCE {
                1.0
            } else {
                0.0
            }
        }))
        .with_boundary_classifier(|x: &Point2<f64>| {
            if x.x < BOUNDARY_TOLERANCE {
                BoundaryKind::Dirichlet
            } else {
                BoundaryKind::Neumann
            }
        })
        .with_exact_solution(FnExactSolution {
            value: |x: &Point2<f64>| 1.0 + x.x,
            gradient: |_: &Point2<f64>| Vector2::new(1.0, 0.0),
        })
}
