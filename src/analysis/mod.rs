//! The analysis model: OLS of the outcome on the formula's predictors.
//!
//! Applied once per completed dataset; the result feeds the pooler.

use nalgebra::{DMatrix, DVector};

use crate::domain::{Dataset, EstimateSet, Formula, TermEstimate, TruthVector};
use crate::error::SimError;
use crate::math::ols;

/// Fit the formula to a complete dataset.
///
/// Fails with `DataIntegrity` if a field the formula uses has absent values, and
/// with `InvalidParameter` if the design is rank deficient or has too few rows.
pub fn fit(data: &Dataset, formula: &Formula) -> Result<EstimateSet, SimError> {
    let outcome_col = data.require_field(&formula.outcome)?;
    let predictor_cols = formula
        .predictors
        .iter()
        .map(|p| data.require_field(p))
        .collect::<Result<Vec<_>, _>>()?;

    let n = data.n_rows();
    let p = formula.n_terms();
    if n <= p {
        return Err(SimError::invalid(format!(
            "cannot fit {p} terms to {n} rows (no residual degrees of freedom)"
        )));
    }

    let mut x = DMatrix::<f64>::zeros(n, p);
    let mut y = DVector::<f64>::zeros(n);
    for (i, row) in data.rows().iter().enumerate() {
        x[(i, 0)] = 1.0;
        for (j, &col) in predictor_cols.iter().enumerate() {
            x[(i, j + 1)] = row[col].ok_or_else(|| missing_value(data, i, col))?;
        }
        y[i] = row[outcome_col].ok_or_else(|| missing_value(data, i, outcome_col))?;
    }

    let fit = ols(&x, &y).ok_or_else(|| {
        SimError::invalid(format!("design matrix for '{formula}' is rank deficient"))
    })?;
    let variances = fit.variances();

    let terms = formula
        .terms()
        .into_iter()
        .zip(fit.coefficients.iter().zip(variances))
        .map(|(term, (&estimate, variance))| TermEstimate {
            term,
            estimate,
            variance,
        })
        .collect();

    Ok(EstimateSet { terms })
}

/// Empirical truth: the coefficients of the formula fitted to a complete
/// (finite or reference) population.
pub fn empirical_truth(population: &Dataset, formula: &Formula) -> Result<TruthVector, SimError> {
    let est = fit(population, formula)?;
    Ok(est.terms.into_iter().map(|t| (t.term, t.estimate)).collect())
}

fn missing_value(data: &Dataset, row: usize, col: usize) -> SimError {
    SimError::integrity(format!(
        "analysis requires complete data but field '{}' is absent in row {row}",
        data.fields()[col]
    ))
}
