//! Finite-difference helpers shared by the integrator and the grid analyzer.

use crate::error::{FieldError, Result};
use crate::traits::{Field, Potential};
use nalgebra::DMatrix;

/// Central-difference estimate of the field `-∇V(x)`, written into `out`.
///
/// Component i is `-(V(x + eps e_i) - V(x - eps e_i)) / (2 eps)`, which costs
/// `2 * x.len()` potential evaluations.
pub fn central_difference_field(
    potential: &dyn Potential,
    x: &[f64],
    epsilon: f64,
    out: &mut [f64],
) -> Result<()> {
    if out.len() != x.len() {
        return Err(FieldError::dimension("field output", x.len(), out.len()));
    }
    let mut shifted = x.to_vec();
    for i in 0..x.len() {
        shifted[i] = x[i] + epsilon;
        let forward = potential
            .potential(&shifted)
            .map_err(FieldError::evaluation("potential"))?;
        shifted[i] = x[i] - epsilon;
        let backward = potential
            .potential(&shifted)
            .map_err(FieldError::evaluation("potential"))?;
        shifted[i] = x[i];
        out[i] = -(forward - backward) / (2.0 * epsilon);
    }
    Ok(())
}

/// Evaluates the field at `x`: the analytic `field` when supplied, otherwise
/// the central-difference estimate from `potential`.
pub fn evaluate_field(
    potential: &dyn Potential,
    field: Option<&dyn Field>,
    x: &[f64],
    epsilon: f64,
    out: &mut [f64],
) -> Result<()> {
    match field {
        Some(field) => field
            .field(x, out)
            .map_err(FieldError::evaluation("field")),
        None => central_difference_field(potential, x, epsilon, out),
    }
}

/// Map axis a derivative is taken along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAxis {
    /// Axis 0 (matrix rows), sampled along x.
    X,
    /// Axis 1 (matrix columns), sampled along y.
    Y,
}

/// Derivative of a sampled map along one axis with spacing `h`.
///
/// Interior samples use `(f[k+1] - f[k-1]) / (2h)`; the two edge samples use
/// the one-sided differences `(f[1] - f[0]) / h` and `(f[n-1] - f[n-2]) / h`.
/// An axis with a single sample has zero derivative.
pub fn axis_derivative(f: &DMatrix<f64>, axis: GridAxis, h: f64) -> DMatrix<f64> {
    let (rows, cols) = f.shape();
    let n = match axis {
        GridAxis::X => rows,
        GridAxis::Y => cols,
    };
    let at = |k: usize, other: usize| match axis {
        GridAxis::X => f[(k, other)],
        GridAxis::Y => f[(other, k)],
    };

    DMatrix::from_fn(rows, cols, |i, j| {
        let (k, other) = match axis {
            GridAxis::X => (i, j),
            GridAxis::Y => (j, i),
        };
        if n < 2 {
            0.0
        } else if k == 0 {
            (at(1, other) - at(0, other)) / h
        } else if k == n - 1 {
            (at(n - 1, other) - at(n - 2, other)) / h
        } else {
            (at(k + 1, other) - at(k - 1, other)) / (2.0 * h)
        }
    })
}
