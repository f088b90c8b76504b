//! Quadratic attractor wells.

use crate::error::{FieldError, Result};
use crate::traits::{EvalResult, Field, Potential};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Row-major weight matrix and bias, the serializable form of a well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightForm {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// `V(x) = -1/2 x^T W_sym x - b^T x` with `W_sym = (W + W^T) / 2`.
///
/// Only the symmetric part of `W` contributes to a quadratic form, so the
/// well stores `W_sym` and its field `W_sym x + b` is the exact negative
/// gradient of the potential for any input `W`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticWell {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl QuadraticWell {
    pub fn new(weights: DMatrix<f64>, bias: DVector<f64>) -> Result<Self> {
        let (rows, cols) = weights.shape();
        if rows != cols {
            return Err(FieldError::NonSquareMatrix { rows, cols });
        }
        if bias.len() != rows {
            return Err(FieldError::dimension("well bias", rows, bias.len()));
        }
        if weights.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(FieldError::invalid("well", "weights and bias must be finite"));
        }
        let symmetric = (&weights + weights.transpose()) * 0.5;
        Ok(Self {
            weights: symmetric,
            bias,
        })
    }

    pub fn from_form(form: &WeightForm) -> Result<Self> {
        let rows = form.weights.len();
        let cols = form.weights.first().map_or(0, Vec::len);
        if let Some(row) = form.weights.iter().find(|row| row.len() != cols) {
            return Err(FieldError::NonSquareMatrix {
                rows,
                cols: row.len(),
            });
        }
        let weights = DMatrix::from_fn(rows, cols, |i, j| form.weights[i][j]);
        Self::new(weights, DVector::from_column_slice(&form.bias))
    }

    pub fn dimension(&self) -> usize {
        self.bias.len()
    }

    /// The symmetrized weight matrix actually used by the well.
    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    pub fn bias(&self) -> &DVector<f64> {
        &self.bias
    }

    fn position(&self, x: &[f64]) -> Result<DVector<f64>> {
        if x.len() != self.dimension() {
            return Err(FieldError::dimension("well position", self.dimension(), x.len()));
        }
        Ok(DVector::from_column_slice(x))
    }

    pub fn potential_at(&self, x: &[f64]) -> Result<f64> {
        let x = self.position(x)?;
        Ok(-0.5 * x.dot(&(&self.weights * &x)) - self.bias.dot(&x))
    }

    pub fn field_at(&self, x: &[f64], out: &mut [f64]) -> Result<()> {
        let x = self.position(x)?;
        if out.len() != x.len() {
            return Err(FieldError::dimension("field output", x.len(), out.len()));
        }
        let field = &self.weights * &x + &self.bias;
        out.copy_from_slice(field.as_slice());
        Ok(())
    }
}

impl Potential for QuadraticWell {
    fn potential(&self, x: &[f64]) -> EvalResult<f64> {
        Ok(self.potential_at(x)?)
    }
}

impl Field for QuadraticWell {
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()> {
        Ok(self.field_at(x, out)?)
    }
}
