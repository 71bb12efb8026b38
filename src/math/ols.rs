//! Ordinary least squares.
//!
//! Every regression in this crate is small (a handful of columns, a few hundred
//! rows), fitted thousands of times per run:
//!
//! - the analysis model on each completed dataset
//! - the conditional models inside chained-equation imputation
//! - the truth vector on a finite or reference population
//!
//! Implementation choices:
//! - Coefficients come from an SVD solve, which copes with tall design matrices
//!   and near-collinear columns. (Nalgebra's `QR::solve` is intended for square
//!   systems and will panic for non-square matrices.)
//! - The coefficient covariance uses `(XᵀX)⁻¹` from a Cholesky factorisation;
//!   a failed factorisation means the design is rank deficient.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// An OLS fit with its classical variance-covariance estimate.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: DVector<f64>,
    /// `σ̂² = RSS / (n - p)`.
    pub residual_variance: f64,
    /// `σ̂² (XᵀX)⁻¹`.
    pub covariance: DMatrix<f64>,
    pub rss: f64,
    pub df_resid: usize,
}

impl OlsFit {
    /// Squared standard errors, one per coefficient.
    pub fn variances(&self) -> Vec<f64> {
        self.covariance.diagonal().iter().copied().collect()
    }
}

/// Fit `y = Xβ + ε` and estimate `Var(β̂)`.
///
/// Returns `None` when there are no residual degrees of freedom or `XᵀX` is singular.
pub fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<OlsFit> {
    let (n, p) = x.shape();
    if n <= p || y.len() != n {
        return None;
    }

    let xtx_inv = inverse_normal_matrix(x, 0.0)?;
    let coefficients = solve_least_squares(x, y)?;
    let residuals = y - x * &coefficients;
    let rss = residuals.norm_squared();
    let df_resid = n - p;
    let residual_variance = rss / df_resid as f64;
    let covariance = xtx_inv * residual_variance;

    if !covariance.iter().all(|v| v.is_finite()) {
        return None;
    }

    Some(OlsFit {
        coefficients,
        residual_variance,
        covariance,
        rss,
        df_resid,
    })
}

/// Compute `(XᵀX + ridge·diag(XᵀX))⁻¹`.
///
/// A zero ridge gives the plain inverse. Returns `None` if the matrix is not
/// positive definite.
pub fn inverse_normal_matrix(x: &DMatrix<f64>, ridge: f64) -> Option<DMatrix<f64>> {
    let mut xtx = x.tr_mul(x);
    if ridge > 0.0 {
        for j in 0..xtx.ncols() {
            xtx[(j, j)] += ridge * xtx[(j, j)].max(f64::MIN_POSITIVE);
        }
    }
    let inv = xtx.cholesky()?.inverse();
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn ols_matches_textbook_standard_errors() {
        // y = 1 + 2x with residuals (+1, -1, -1, +1).
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [2.0, 2.0, 4.0, 8.0];
        let x = DMatrix::from_fn(4, 2, |i, j| if j == 0 { 1.0 } else { xs[i] });
        let y = DVector::from_row_slice(&ys);

        let fit = ols(&x, &y).unwrap();
        assert!((fit.coefficients[0] - 1.0).abs() < 1e-10);
        assert!((fit.coefficients[1] - 2.0).abs() < 1e-10);
        assert_eq!(fit.df_resid, 2);
        assert!((fit.rss - 4.0).abs() < 1e-10);
        assert!((fit.residual_variance - 2.0).abs() < 1e-10);

        // (XᵀX)⁻¹ = [[0.7, -0.3], [-0.3, 0.2]] for x = 0..3.
        let v = fit.variances();
        assert!((v[0] - 1.4).abs() < 1e-10, "intercept variance {}", v[0]);
        assert!((v[1] - 0.4).abs() < 1e-10, "slope variance {}", v[1]);
    }

    #[test]
    fn ols_rejects_saturated_and_singular_designs() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(ols(&x, &y).is_none());

        // Duplicate column.
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert!(ols(&x, &y).is_none());
    }
}
