//! Multivariate normal sampling.
//!
//! A draw is `μ + L z` with `z ~ N(0, I)` and `L Lᵀ = Σ`. `L` is the Cholesky
//! factor when `Σ` is positive definite; singular but positive semi-definite
//! matrices fall back to the eigen factor `V diag(√λ)`.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::SimError;

/// Relative tolerance for symmetry and negative eigenvalues.
const PSD_TOL: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct MvnFactor {
    mean: DVector<f64>,
    factor: DMatrix<f64>,
}

impl MvnFactor {
    pub fn new(mean: &[f64], covariance: &[Vec<f64>]) -> Result<Self, SimError> {
        let k = mean.len();
        if k == 0 {
            return Err(SimError::invalid("mean vector is empty"));
        }
        if covariance.len() != k || covariance.iter().any(|r| r.len() != k) {
            return Err(SimError::invalid(format!("covariance must be {k}x{k}")));
        }
        if mean.iter().chain(covariance.iter().flatten()).any(|v| !v.is_finite()) {
            return Err(SimError::invalid("mean and covariance must be finite"));
        }

        let sigma = DMatrix::from_fn(k, k, |i, j| covariance[i][j]);
        let scale = sigma.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        for i in 0..k {
            for j in (i + 1)..k {
                if (sigma[(i, j)] - sigma[(j, i)]).abs() > PSD_TOL * scale {
                    return Err(SimError::invalid("covariance matrix is not symmetric"));
                }
            }
        }

        let factor = match sigma.clone().cholesky() {
            Some(chol) => chol.l(),
            None => psd_factor(sigma, scale)?,
        };

        Ok(Self {
            mean: DVector::from_column_slice(mean),
            factor,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        let z = DVector::from_fn(self.dim(), |_, _| rng.sample::<f64, _>(StandardNormal));
        &self.mean + &self.factor * z
    }
}

fn psd_factor(sigma: DMatrix<f64>, scale: f64) -> Result<DMatrix<f64>, SimError> {
    let eigen = SymmetricEigen::new(sigma);
    let min = eigen.eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
    if min < -PSD_TOL * scale {
        return Err(SimError::invalid(format!(
            "covariance matrix is not positive semi-definite (min eigenvalue {min:.3e})"
        )));
    }
    let roots = eigen.eigenvalues.map(|l| l.max(0.0).sqrt());
    Ok(eigen.eigenvectors * DMatrix::from_diagonal(&roots))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn rejects_indefinite_covariance() {
        let err = MvnFactor::new(&[0.0, 0.0], &[vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter(_)));
    }

    #[test]
    fn rejects_asymmetric_covariance() {
        assert!(MvnFactor::new(&[0.0, 0.0], &[vec![1.0, 0.5], vec![0.1, 1.0]]).is_err());
    }

    #[test]
    fn accepts_singular_psd_covariance() {
        // Perfectly correlated predictors: draws satisfy x1 == x2.
        let mvn = MvnFactor::new(&[1.0, 1.0], &[vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let d = mvn.sample(&mut rng);
            assert!((d[0] - d[1]).abs() < 1e-9, "draw {d:?}");
        }
    }

    #[test]
    fn sample_moments_are_close() {
        let mvn = MvnFactor::new(&[8.0, 3.0], &[vec![1.0, 0.5], vec![0.5, 1.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let draws: Vec<DVector<f64>> = (0..n).map(|_| mvn.sample(&mut rng)).collect();

        let m0 = draws.iter().map(|d| d[0]).sum::<f64>() / n as f64;
        let m1 = draws.iter().map(|d| d[1]).sum::<f64>() / n as f64;
        let cov = draws.iter().map(|d| (d[0] - m0) * (d[1] - m1)).sum::<f64>() / (n - 1) as f64;

        assert!((m0 - 8.0).abs() < 0.05, "mean x = {m0}");
        assert!((m1 - 3.0).abs() < 0.05, "mean z = {m1}");
        assert!((cov - 0.5).abs() < 0.05, "cov = {cov}");
    }
}
