//! Model problems: the diffusion operator, source and boundary data of
//! $-\nabla \cdot A^\varepsilon(x, \nabla u) = f$ on the unit square.
//!
//! Problems are pure data behind trait objects. A [`ModelProblem`] bundles them together with the
//! metadata the solvers need to pick a linear solver and to reject invalid configurations.
use crate::config::ProblemConfig;
use crate::error::MsFemError;
use nalgebra::{Point2, Vector2};
use std::fmt;

mod easy;
mod oscillating;
mod periodic;
mod simple;

pub use easy::*;
pub use oscillating::*;
pub use periodic::*;
pub use simple::*;

/// Names accepted by [`select_problem`].
pub const PROBLEM_NAMES: [&str; 5] = ["easy", "periodic", "oscillating", "unit_source", "mixed_boundary"];

/// A scalar function $f: \mathbb{R}^2 \rightarrow \mathbb{R}$.
pub trait ScalarFunction: Send + Sync {
    fn evaluate(&self, x: &Point2<f64>) -> f64;
}

/// A scalar function with a known gradient, used as a reference solution.
pub trait ExactSolution: ScalarFunction {
    fn gradient(&self, x: &Point2<f64>) -> Vector2<f64>;
}

/// A (possibly nonlinear) diffusion operator $A(x, \xi)$.
pub trait DiffusionOperator: Send + Sync {
    /// The flux $A(x, \xi)$ for the gradient $\xi$.
    fn diffusive_flux(&self, x: &Point2<f64>, gradient: &Vector2<f64>) -> Vector2<f64>;

    /// The derivative of the flux at `position_gradient`, applied to `direction_gradient`:
    /// $D_\xi A(x, \xi_0) \, \eta$.
    fn jacobian_diffusive_flux(
        &self,
        x: &Point2<f64>,
        position_gradient: &Vector2<f64>,
        direction_gradient: &Vector2<f64>,
    ) -> Vector2<f64>;
}

impl<'a, F: ScalarFunction + ?Sized> ScalarFunction for &'a F {
    fn evaluate(&self, x: &Point2<f64>) -> f64 {
        F::evaluate(self, x)
    }
}

impl<'a, D: DiffusionOperator + ?Sized> DiffusionOperator for &'a D {
    fn diffusive_flux(&self, x: &Point2<f64>, gradient: &Vector2<f64>) -> Vector2<f64> {
        D::diffusive_flux(self, x, gradient)
    }

    fn jacobian_diffusive_flux(
        &self,
        x: &Point2<f64>,
        position_gradient: &Vector2<f64>,
        direction_gradient: &Vector2<f64>,
    ) -> Vector2<f64> {
        D::jacobian_diffusive_flux(self, x, position_gradient, direction_gradient)
    }
}

/// Wraps a closure as a [`ScalarFunction`].
#[derive(Clone)]
pub struct FnFunction<F>(pub F);

impl<F> ScalarFunction for FnFunction<F>
where
    F: Fn(&Point2<f64>) -> f64 + Send + Sync,
{
    fn evaluate(&self, x: &Point2<f64>) -> f64 {
        (self.0)(x)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ConstantFunction(pub f64);

impl ScalarFunction for ConstantFunction {
    fn evaluate(&self, _x: &Point2<f64>) -> f64 {
        self.0
    }
}

/// An [`ExactSolution`] given by two closures for the value and the gradient.
#[derive(Clone)]
pub struct FnExactSolution<F, G> {
    pub value: F,
    pub gradient: G,
}

impl<F, G> ScalarFunction for FnExactSolution<F, G>
where
    F: Fn(&Point2<f64>) -> f64 + Send + Sync,
    G: Fn(&Point2<f64>) -> Vector2<f64> + Send + Sync,
{
    fn evaluate(&self, x: &Point2<f64>) -> f64 {
        (self.value)(x)
    }
}

impl<F, G> ExactSolution for FnExactSolution<F, G>
where
    F: Fn(&Point2<f64>) -> f64 + Send + Sync,
    G: Fn(&Point2<f64>) -> Vector2<f64> + Send + Sync,
{
    fn gradient(&self, x: &Point2<f64>) -> Vector2<f64> {
        (self.gradient)(x)
    }
}

/// $A(x, \xi) = \xi$.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct IdentityDiffusion;

impl DiffusionOperator for IdentityDiffusion {
    fn diffusive_flux(&self, _x: &Point2<f64>, gradient: &Vector2<f64>) -> Vector2<f64> {
        *gradient
    }

    fn jacobian_diffusive_flux(&self, _x: &Point2<f64>, _: &Vector2<f64>, direction_gradient: &Vector2<f64>) -> Vector2<f64> {
        *direction_gradient
    }
}

/// A linear diffusion operator with a diagonal coefficient matrix, $A(x, \xi) = \mathrm{diag}(c(x)) \, \xi$.
#[derive(Clone)]
pub struct DiagonalDiffusion<C> {
    coefficients: C,
}

impl<C> DiagonalDiffusion<C>
where
    C: Fn(&Point2<f64>) -> Vector2<f64> + Send + Sync,
{
    pub fn new(coefficients: C) -> Self {
        Self { coefficients }
    }
}

impl<C> DiffusionOperator for DiagonalDiffusion<C>
where
    C: Fn(&Point2<f64>) -> Vector2<f64> + Send + Sync,
{
    fn diffusive_flux(&self, x: &Point2<f64>, gradient: &Vector2<f64>) -> Vector2<f64> {
        (self.coefficients)(x).component_mul(gradient)
    }

    fn jacobian_diffusive_flux(&self, x: &Point2<f64>, _: &Vector2<f64>, direction_gradient: &Vector2<f64>) -> Vector2<f64> {
        (self.coefficients)(x).component_mul(direction_gradient)
    }
}

/// Classification of points on the domain boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    Dirichlet,
    Neumann,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModelProblemData {
    /// Whether $A(x, \cdot)$ is symmetric, which permits conjugate gradients.
    pub symmetric_diffusion: bool,
    /// Whether the problem is solved as a linear problem.
    pub linear: bool,
    /// Whether the problem only exists in a linear variant.
    pub linear_only: bool,
    /// Whether the coefficient is periodic in the micro scale.
    pub periodic: bool,
}

type BoundaryClassifier = Box<dyn Fn(&Point2<f64>) -> BoundaryKind + Send + Sync>;

/// The complete data of an elliptic model problem.
pub struct ModelProblem {
    name: String,
    data: ModelProblemData,
    diffusion: Box<dyn DiffusionOperator>,
    source: Box<dyn ScalarFunction>,
    dirichlet_data: Box<dyn ScalarFunction>,
    neumann_data: Box<dyn ScalarFunction>,
    boundary: BoundaryClassifier,
    exact_solution: Option<Box<dyn ExactSolution>>,
}

impl fmt::Debug for ModelProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelProblem")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("has_exact_solution", &self.exact_solution.is_some())
            .finish()
    }
}

impl ModelProblem {
    /// A problem with zero source and boundary data and a pure Dirichlet boundary.
    pub fn new(name: impl Into<String>, data: ModelProblemData, diffusion: impl DiffusionOperator + 'static) -> Self {
        Self {
            name: name.into(),
            data,
            diffusion: Box::new(diffusion),
            source: Box::new(ConstantFunction(0.0)),
            dirichlet_data: Box::new(ConstantFunction(0.0)),
            neumann_data: Box::new(ConstantFunction(0.0)),
            boundary: Box::new(|_| BoundaryKind::Dirichlet),
            exact_solution: None,
        }
    }

    pub fn with_source(self, source: impl ScalarFunction + 'static) -> Self {
        Self {
            source: Box::new(source),
            ..self
        }
    }

    pub fn with_dirichlet_data(self, dirichlet_data: impl ScalarFunction + 'static) -> Self {
        Self {
            dirichlet_data: Box::new(dirichlet_data),
            ..self
        }
    }

    pub fn with_neumann_data(self, neumann_data: impl ScalarFunction + 'static) -> Self {
        Self {
            neumann_data: Box::new(neumann_data),
            ..self
        }
    }

    pub fn with_boundary_classifier(
        self,
        classifier: impl Fn(&Point2<f64>) -> BoundaryKind + Send + Sync + 'static,
    ) -> Self {
        Self {
            boundary: Box::new(classifier),
            ..self
        }
    }

    pub fn with_exact_solution(self, exact_solution: impl ExactSolution + 'static) -> Self {
        Self {
            exact_solution: Some(Box::new(exact_solution)),
            ..self
        }
    }

    /// Drops the exact solution, e.g. after replacing the data it was derived from.
    pub fn without_exact_solution(self) -> Self {
        Self {
            exact_solution: None,
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ModelProblemData {
        &self.data
    }

    pub fn diffusion(&self) -> &dyn DiffusionOperator {
        self.diffusion.as_ref()
    }

    pub fn source(&self) -> &dyn ScalarFunction {
        self.source.as_ref()
    }

    pub fn dirichlet_data(&self) -> &dyn ScalarFunction {
        self.dirichlet_data.as_ref()
    }

    pub fn neumann_data(&self) -> &dyn ScalarFunction {
        self.neumann_data.as_ref()
    }

    /// Classifies a point on the domain boundary, typically a face midpoint.
    pub fn boundary_kind(&self, x: &Point2<f64>) -> BoundaryKind {
        (self.boundary)(x)
    }

    pub fn exact_solution(&self) -> Option<&dyn ExactSolution> {
        self.exact_solution.as_deref()
    }

    /// Checks that the problem can be solved in the requested (non)linear mode.
    pub fn validate(&self) -> Result<(), MsFemError> {
        if !self.data.linear && self.data.linear_only {
            return Err(MsFemError::config(format!(
                "problem {} is entirely linear, but problem.linear was false",
                self.name
            )));
        }
        Ok(())
    }
}

/// Constructs the named model problem and validates it against the configuration.
pub fn select_problem(config: &ProblemConfig) -> Result<ModelProblem, MsFemError> {
    let epsilon = config.epsilon;
    let mut problem = match config.name.as_str() {
        "easy" => easy_problem(),
        "periodic" => periodic_problem(epsilon),
        "oscillating" => oscillating_problem(epsilon, config.linear),
        "unit_source" => unit_source_problem(),
        "mixed_boundary" => mixed_boundary_problem(),
        other => {
            return Err(MsFemError::config(format!(
                "unknown problem {:?}, expected one of {:?}",
                other, PROBLEM_NAMES
            )))
        }
    };
    problem.data.linear = config.linear;
    problem.validate()?;
    Ok(problem)
}
