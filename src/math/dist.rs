//! Student-t quantiles and tail probabilities via `statrs`.
//!
//! Pooled degrees of freedom can be huge or infinite (little or no
//! between-imputation variance). Past `NORMAL_DF` the standard normal is used
//! directly: `statrs`' t inverse CDF loses accuracy around 1e6 df and stops
//! converging from about 1e8.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::error::SimError;

/// Above this many degrees of freedom the t and normal quantiles agree to ~2e-5.
const NORMAL_DF: f64 = 1e5;

enum RefDist {
    T(StudentsT),
    Normal(Normal),
}

impl RefDist {
    fn new(df: f64) -> Result<Self, SimError> {
        if df.is_nan() || df <= 0.0 {
            return Err(SimError::invalid(format!("degrees of freedom must be > 0, got {df}")));
        }
        if df > NORMAL_DF {
            let n = Normal::new(0.0, 1.0).map_err(|e| SimError::invalid(format!("normal distribution: {e}")))?;
            return Ok(Self::Normal(n));
        }
        let t = StudentsT::new(0.0, 1.0, df).map_err(|e| SimError::invalid(format!("t distribution: {e}")))?;
        Ok(Self::T(t))
    }

    fn inverse_cdf(&self, p: f64) -> f64 {
        match self {
            Self::T(d) => d.inverse_cdf(p),
            Self::Normal(d) => d.inverse_cdf(p),
        }
    }

    fn sf(&self, x: f64) -> f64 {
        match self {
            Self::T(d) => d.sf(x),
            Self::Normal(d) => d.sf(x),
        }
    }
}

/// Quantile `t_{p, df}`.
pub fn t_quantile(p: f64, df: f64) -> Result<f64, SimError> {
    if !(p > 0.0 && p < 1.0) {
        return Err(SimError::invalid(format!("quantile probability must be in (0, 1), got {p}")));
    }
    Ok(RefDist::new(df)?.inverse_cdf(p))
}

/// Two-sided p-value `P(|T| >= |statistic|)` for `T ~ t(df)`.
pub fn t_two_sided_p(statistic: f64, df: f64) -> Result<f64, SimError> {
    if statistic.is_nan() {
        return Ok(f64::NAN);
    }
    if statistic.is_infinite() {
        return Ok(0.0);
    }
    let p = 2.0 * RefDist::new(df)?.sf(statistic.abs());
    Ok(p.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantiles_match_tables() {
        let cases = [(1.0, 12.706), (4.0, 2.776), (10.0, 2.228), (30.0, 2.042)];
        for (df, expected) in cases {
            let q = t_quantile(0.975, df).unwrap();
            assert!((q - expected).abs() < 1e-3, "t(0.975, {df}) = {q}, expected {expected}");
        }
    }

    #[test]
    fn infinite_df_uses_normal() {
        let q = t_quantile(0.975, f64::INFINITY).unwrap();
        assert!((q - 1.959964).abs() < 1e-5, "z = {q}");
        let p = t_two_sided_p(1.959964, f64::INFINITY).unwrap();
        assert!((p - 0.05).abs() < 1e-5, "p = {p}");
    }

    #[test]
    fn large_finite_df_matches_normal() {
        let z = 1.959963985;
        for df in [1e6, 1e7, 1e8, 1e9] {
            let q = t_quantile(0.975, df).unwrap();
            assert!((q - z).abs() < 1e-4, "t(0.975, {df}) = {q}");
            let p = t_two_sided_p(z, df).unwrap();
            assert!((p - 0.05).abs() < 1e-4, "p(z, {df}) = {p}");
        }
        let q = t_quantile(0.975, 9e4).unwrap();
        assert!((q - z).abs() < 1e-4, "t(0.975, 9e4) = {q}");
    }

    #[test]
    fn two_sided_p_values() {
        let p = t_two_sided_p(2.776445, 4.0).unwrap();
        assert!((p - 0.05).abs() < 1e-4, "p = {p}");
        assert!((t_two_sided_p(0.0, 4.0).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(t_two_sided_p(f64::INFINITY, 4.0).unwrap(), 0.0);
        assert!(t_two_sided_p(f64::NAN, 4.0).unwrap().is_nan());
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(t_quantile(0.975, 0.0).is_err());
        assert!(t_quantile(1.0, 4.0).is_err());
        assert!(t_two_sided_p(1.0, f64::NAN).is_err());
    }
}
