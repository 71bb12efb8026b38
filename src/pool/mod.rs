//! Multiple-imputation pooling (Rubin's rules).
//!
//! Given `m` estimate sets (one per implicate), each term is combined as:
//!
//! ```text
//! Q̄ = mean(Q_i)                       pooled estimate
//! Ū = mean(U_i)                       within-imputation variance
//! B = Σ (Q_i - Q̄)² / (m - 1)         between-imputation variance
//! T = Ū + (1 + 1/m) B                total variance
//! ```
//!
//! Degrees of freedom use the fraction of missing information
//! `λ = (1 + 1/m) B / T`:
//!
//! ```text
//! ν = (m - 1) / λ²  =  (m - 1) (1 + 1/r)²,   r = (1 + 1/m) B / Ū
//! ```
//!
//! which is infinite when `B = 0`. Optionally the Barnard–Rubin small-sample
//! adjustment combines this with the observed-data df derived from the
//! complete-data df.
//!
//! `PoolMode::ZeroSamplingVariance` is the finite-population case: the estimand
//! is a fixed property of a fully observed finite set, so `Ū` is zero by
//! definition. Then `T = (1 + 1/m) B`, `r` is infinite, `λ = 1` and `ν = m - 1`
//! exactly. This is a separate formula path: `r` is never computed by dividing
//! by `Ū`.

use crate::domain::{EstimateSet, PoolMode, PooledResult, PooledTerm};
use crate::error::SimError;
use crate::math::{t_quantile, t_two_sided_p};

/// Options that refine the pooling formulas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolOptions {
    /// Confidence level of the pooled interval.
    pub level: f64,
    /// Complete-data degrees of freedom for the Barnard–Rubin adjustment
    /// (standard mode only).
    pub complete_df: Option<f64>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            level: 0.95,
            complete_df: None,
        }
    }
}

/// Pool with default options (95% intervals, no small-sample adjustment).
pub fn pool(sets: &[EstimateSet], mode: PoolMode) -> Result<PooledResult, SimError> {
    pool_with_options(sets, mode, &PoolOptions::default())
}

pub fn pool_with_options(
    sets: &[EstimateSet],
    mode: PoolMode,
    options: &PoolOptions,
) -> Result<PooledResult, SimError> {
    let m = sets.len();
    if m < 2 {
        return Err(SimError::InsufficientImplicates { m });
    }
    if !(options.level > 0.0 && options.level < 1.0) {
        return Err(SimError::invalid(format!("confidence level must be in (0, 1), got {}", options.level)));
    }
    if let Some(df) = options.complete_df {
        if !(df.is_finite() && df > 0.0) {
            return Err(SimError::invalid(format!("complete-data df must be > 0, got {df}")));
        }
    }
    check_aligned(sets)?;

    let quantile_p = 1.0 - (1.0 - options.level) / 2.0;
    let mut terms = Vec::with_capacity(sets[0].terms.len());
    for (k, first) in sets[0].terms.iter().enumerate() {
        let estimates: Vec<f64> = sets.iter().map(|s| s.terms[k].estimate).collect();
        let variances: Vec<f64> = sets.iter().map(|s| s.terms[k].variance).collect();
        let components = combine(&estimates, &variances, mode, options.complete_df);
        terms.push(finish_term(&first.term, components, quantile_p)?);
    }

    Ok(PooledResult {
        mode,
        implicates: m,
        terms,
    })
}

/// Variance components and df of one term, before interval construction.
#[derive(Debug, Clone, Copy)]
struct Components {
    qbar: f64,
    ubar: f64,
    b: f64,
    t: f64,
    df: f64,
    riv: f64,
    lambda: f64,
}

fn combine(estimates: &[f64], variances: &[f64], mode: PoolMode, complete_df: Option<f64>) -> Components {
    let m = estimates.len() as f64;
    let qbar = estimates.iter().sum::<f64>() / m;
    let b = estimates.iter().map(|q| (q - qbar).powi(2)).sum::<f64>() / (m - 1.0);
    let inflated_b = (1.0 + 1.0 / m) * b;

    match mode {
        PoolMode::Standard => {
            let ubar = variances.iter().sum::<f64>() / m;
            let t = ubar + inflated_b;
            let (riv, lambda) = if inflated_b == 0.0 {
                (0.0, 0.0)
            } else if ubar == 0.0 {
                (f64::INFINITY, 1.0)
            } else {
                (inflated_b / ubar, inflated_b / t)
            };
            let df_old = if lambda == 0.0 {
                f64::INFINITY
            } else {
                (m - 1.0) / (lambda * lambda)
            };
            let df = match complete_df {
                Some(dfcom) => barnard_rubin(df_old, dfcom, lambda),
                None => df_old,
            };
            Components {
                qbar,
                ubar,
                b,
                t,
                df,
                riv,
                lambda,
            }
        }
        PoolMode::ZeroSamplingVariance => Components {
            qbar,
            ubar: 0.0,
            b,
            t: inflated_b,
            df: m - 1.0,
            riv: f64::INFINITY,
            lambda: 1.0,
        },
    }
}

/// Barnard & Rubin (1999) df: `ν_old ν_obs / (ν_old + ν_obs)` with
/// `ν_obs = (ν_com + 1) / (ν_com + 3) · ν_com · (1 - λ)`.
fn barnard_rubin(df_old: f64, dfcom: f64, lambda: f64) -> f64 {
    let df_obs = (dfcom + 1.0) / (dfcom + 3.0) * dfcom * (1.0 - lambda);
    if df_obs <= 0.0 {
        return df_old;
    }
    if df_old.is_infinite() {
        return df_obs;
    }
    df_old * df_obs / (df_old + df_obs)
}

fn finish_term(term: &str, c: Components, quantile_p: f64) -> Result<PooledTerm, SimError> {
    let std_error = c.t.sqrt();
    let statistic = c.qbar / std_error;
    let p_value = t_two_sided_p(statistic, c.df)?;
    let half_width = t_quantile(quantile_p, c.df)? * std_error;

    Ok(PooledTerm {
        term: term.to_string(),
        estimate: c.qbar,
        within_variance: c.ubar,
        between_variance: c.b,
        total_variance: c.t,
        df: c.df,
        riv: c.riv,
        lambda: c.lambda,
        std_error,
        statistic,
        p_value,
        lower: c.qbar - half_width,
        upper: c.qbar + half_width,
    })
}

/// Every estimate set must list the same terms in the same order, with finite
/// estimates and finite non-negative variances.
fn check_aligned(sets: &[EstimateSet]) -> Result<(), SimError> {
    let reference = &sets[0];
    if reference.terms.is_empty() {
        return Err(SimError::integrity("estimate set has no terms"));
    }
    for (i, set) in sets.iter().enumerate() {
        if set.terms.len() != reference.terms.len()
            || set.terms.iter().zip(&reference.terms).any(|(a, b)| a.term != b.term)
        {
            return Err(SimError::integrity(format!(
                "implicate {i} has terms [{}], expected [{}]",
                set.term_names().collect::<Vec<_>>().join(", "),
                reference.term_names().collect::<Vec<_>>().join(", ")
            )));
        }
        for t in &set.terms {
            if !t.estimate.is_finite() || !t.variance.is_finite() || t.variance < 0.0 {
                return Err(SimError::integrity(format!(
                    "implicate {i} term '{}' has invalid estimate {} / variance {}",
                    t.term, t.estimate, t.variance
                )));
            }
        }
    }
    Ok(())
}
