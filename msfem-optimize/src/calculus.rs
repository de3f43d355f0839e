use nalgebra::{DMatrix, DVector};
use std::error::Error;

pub trait VectorFunction {
    fn dimension(&self) -> usize;
    fn eval_into(&mut self, f: &mut DVector<f64>, x: &DVector<f64>);
}

impl<X> VectorFunction for &mut X
where
    X: VectorFunction,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_into(&mut self, f: &mut DVector<f64>, x: &DVector<f64>) {
        X::eval_into(self, f, x)
    }
}

pub trait DifferentiableVectorFunction: VectorFunction {
    /// Solves `J(x) sol = rhs` for the Jacobian `J` of the function at `x`.
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVector<f64>,
        x: &DVector<f64>,
        rhs: &DVector<f64>,
    ) -> Result<(), Box<dyn Error>>;
}

impl<X> DifferentiableVectorFunction for &mut X
where
    X: DifferentiableVectorFunction,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVector<f64>,
        x: &DVector<f64>,
        rhs: &DVector<f64>,
    ) -> Result<(), Box<dyn Error>> {
        X::solve_jacobian_system(self, sol, x, rhs)
    }
}

/// Approximates the Jacobian of `f` at `x` with central differences of step `h`.
pub fn approximate_jacobian(mut f: impl VectorFunction, x: &DVector<f64>, h: f64) -> DMatrix<f64> {
    let out_dim = f.dimension();
    let in_dim = x.len();

    let mut result = DMatrix::zeros(out_dim, in_dim);

    let mut x = x.clone();
    let mut f_plus = DVector::zeros(out_dim);
    let mut f_minus = DVector::zeros(out_dim);

    for j in 0..in_dim {
        let x_j = x[j];

        x[j] = x_j + h;
        f.eval_into(&mut f_plus, &x);
        x[j] = x_j - h;
        f.eval_into(&mut f_minus, &x);
        x[j] = x_j;

        let mut column = result.column_mut(j);
        column.copy_from(&f_plus);
        column -= &f_minus;
        column /= 2.0 * h;
    }

    result
}
