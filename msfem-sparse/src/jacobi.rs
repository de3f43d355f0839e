use crate::LinearOperator;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

/// Scales each component by the inverse of the corresponding diagonal entry.
///
/// Rows with a (numerically) vanishing diagonal are left unscaled.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobiPreconditioner {
    inv_diag: DVector<f64>,
}

impl JacobiPreconditioner {
    pub fn from_csr(matrix: &CsrMatrix<f64>) -> Self {
        let diagonal = DVector::from_iterator(
            matrix.nrows(),
            matrix.row_iter().enumerate().map(|(i, row)| {
                row.col_indices()
                    .iter()
                    .zip(row.values())
                    .filter(|(j, _)| **j == i)
                    .map(|(_, &a_ii)| a_ii)
                    .sum::<f64>()
            }),
        );
        Self::from_diagonal(&diagonal)
    }

    pub fn from_diagonal(diagonal: &DVector<f64>) -> Self {
        let inv_diag = diagonal.map(|d| if d.abs() > 1e-300 { d.recip() } else { 1.0 });
        Self { inv_diag }
    }

    pub fn inverse_diagonal(&self) -> &DVector<f64> {
        &self.inv_diag
    }
}

impl LinearOperator for JacobiPreconditioner {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), Box<dyn Error>> {
        if x.len() != self.inv_diag.len() || y.len() != self.inv_diag.len() {
            return Err(Box::from("Jacobi preconditioner applied to vector of wrong length"));
        }
        y.copy_from(x);
        y.component_mul_assign(&self.inv_diag);
        Ok(())
    }
}
