//! Least-squares fitting through the normal equations
//!
//! The system `(XᵀX + λI) β = Xᵀy` is solved by Gaussian elimination with
//! partial pivoting. `λ` is a jitter proportional to the mean diagonal of `XᵀX`
//! (never below `1e-12`), small enough to leave well-posed fits unchanged and
//! large enough that collinear or all-zero designs resolve to a finite solution
//! with zero weight on the directions the data does not determine.

use crate::{MathError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

const RELATIVE_JITTER: f64 = 1e-10;
const MIN_JITTER: f64 = 1e-12;

/// Coefficients of an ordinary least-squares fit with an intercept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsFit {
    /// One coefficient per feature column
    pub coefficients: Array1<f64>,
    /// Constant term
    pub intercept: f64,
}

impl OlsFit {
    /// Predict the response for a single feature row
    pub fn predict_row(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.coefficients.len() {
            return Err(MathError::InvalidInput(format!(
                "Expected {} features, got {}",
                self.coefficients.len(),
                row.len()
            )));
        }

        let dot: f64 = self
            .coefficients
            .iter()
            .zip(row.iter())
            .map(|(c, x)| c * x)
            .sum();
        Ok(self.intercept + dot)
    }
}

/// Solve `min ‖Xβ − y‖²` without an intercept
pub fn solve_least_squares(x: &Array2<f64>, y: &Array1<f64>) -> Result<Array1<f64>> {
    let (rows, cols) = x.dim();
    if rows != y.len() {
        return Err(MathError::InvalidInput(format!(
            "Design has {} rows but response has {} values",
            rows,
            y.len()
        )));
    }
    if rows == 0 {
        return Err(MathError::InsufficientData(
            "Least squares needs at least one observation".to_string(),
        ));
    }
    if cols == 0 {
        return Ok(Array1::zeros(0));
    }

    let xt = x.t();
    let mut gram = xt.dot(x);
    let rhs = xt.dot(y);

    let mean_diag = gram.diag().sum() / cols as f64;
    let jitter = (mean_diag * RELATIVE_JITTER).max(MIN_JITTER);
    for i in 0..cols {
        gram[[i, i]] += jitter;
    }

    let beta = gaussian_elimination(gram, rhs)?;
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(MathError::CalculationError(
            "Least-squares solution is not finite".to_string(),
        ));
    }
    Ok(beta)
}

/// Ordinary least squares with an intercept
///
/// Columns and response are centred first, so the intercept is
/// `mean(y) − mean(X)·β` and is never shrunk by the jitter.
pub fn solve_ols_with_intercept(x: &Array2<f64>, y: &Array1<f64>) -> Result<OlsFit> {
    let rows = x.nrows();
    if rows == 0 || rows != y.len() {
        return Err(MathError::InvalidInput(format!(
            "Design has {} rows but response has {} values",
            rows,
            y.len()
        )));
    }

    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| MathError::InsufficientData("Empty design matrix".to_string()))?;
    let y_mean = y.sum() / rows as f64;

    let x_centred = x - &x_mean;
    let y_centred = y - y_mean;

    let coefficients = solve_least_squares(&x_centred, &y_centred)?;
    let intercept = y_mean - x_mean.dot(&coefficients);

    Ok(OlsFit {
        coefficients,
        intercept,
    })
}

fn gaussian_elimination(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();

    for k in 0..n {
        let pivot_row = (k..n)
            .max_by(|&i, &j| a[[i, k]].abs().total_cmp(&a[[j, k]].abs()))
            .unwrap_or(k);

        if a[[pivot_row, k]].abs() < f64::MIN_POSITIVE {
            return Err(MathError::CalculationError(
                "Normal equations are singular".to_string(),
            ));
        }

        if pivot_row != k {
            for j in 0..n {
                a.swap([k, j], [pivot_row, j]);
            }
            b.swap(k, pivot_row);
        }

        for i in (k + 1)..n {
            let factor = a[[i, k]] / a[[k, k]];
            if factor == 0.0 {
                continue;
            }
            for j in k..n {
                a[[i, j]] -= factor * a[[k, j]];
            }
            b[i] -= factor * b[k];
        }
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[[i, j]] * x[j];
        }
        x[i] = sum / a[[i, i]];
    }

    Ok(x)
}
