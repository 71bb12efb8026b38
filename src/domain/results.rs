//! Per-stage result records: estimates, pooled results, truth and scores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Dataset, Design, Mechanism, PoolMode};
use crate::error::SimError;

/// An incomplete dataset together with its `m` completed copies.
#[derive(Debug, Clone)]
pub struct ImputationResult {
    original: Dataset,
    implicates: Vec<Dataset>,
}

impl ImputationResult {
    /// Bundle imputer output, checking that every implicate is complete and
    /// shares schema and row count with the original.
    pub fn new(original: Dataset, implicates: Vec<Dataset>, expected_m: usize) -> Result<Self, SimError> {
        if implicates.len() != expected_m {
            return Err(SimError::integrity(format!(
                "expected {expected_m} implicates, imputer returned {}",
                implicates.len()
            )));
        }
        for (i, imp) in implicates.iter().enumerate() {
            if !imp.same_shape(&original) {
                return Err(SimError::integrity(format!(
                    "implicate {i} has {} rows / fields [{}], original has {} rows / fields [{}]",
                    imp.n_rows(),
                    imp.fields().join(", "),
                    original.n_rows(),
                    original.fields().join(", ")
                )));
            }
            if !imp.is_complete() {
                return Err(SimError::integrity(format!(
                    "implicate {i} still has {} absent values",
                    imp.missing_count()
                )));
            }
        }
        Ok(Self { original, implicates })
    }

    pub fn original(&self) -> &Dataset {
        &self.original
    }

    pub fn implicates(&self) -> &[Dataset] {
        &self.implicates
    }

    pub fn m(&self) -> usize {
        self.implicates.len()
    }
}

/// One coefficient estimate from one completed dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermEstimate {
    pub term: String,
    pub estimate: f64,
    /// Estimated sampling variance (squared standard error).
    pub variance: f64,
}

/// All term estimates from fitting the analysis model to one completed dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateSet {
    pub terms: Vec<TermEstimate>,
}

impl EstimateSet {
    pub fn get(&self, term: &str) -> Option<&TermEstimate> {
        self.terms.iter().find(|t| t.term == term)
    }

    pub fn term_names(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|t| t.term.as_str())
    }
}

/// Pooled inference for one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledTerm {
    pub term: String,
    /// Q̄: mean of the implicate estimates.
    pub estimate: f64,
    /// Ū: mean within-imputation variance (0 in zero-sampling-variance mode).
    pub within_variance: f64,
    /// B: between-imputation variance.
    pub between_variance: f64,
    /// T: total variance.
    pub total_variance: f64,
    /// ν: degrees of freedom (may be infinite when B = 0).
    pub df: f64,
    /// r: relative increase in variance due to nonresponse (may be infinite).
    pub riv: f64,
    /// λ: proportion of total variance attributable to missingness.
    pub lambda: f64,
    pub std_error: f64,
    pub statistic: f64,
    pub p_value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl PooledTerm {
    pub fn ci_width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn covers(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Output of one pooling call: exactly one record per term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledResult {
    pub mode: PoolMode,
    pub implicates: usize,
    pub terms: Vec<PooledTerm>,
}

impl PooledResult {
    pub fn get(&self, term: &str) -> Option<&PooledTerm> {
        self.terms.iter().find(|t| t.term == term)
    }
}

/// Known true coefficient per term for the active scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TruthVector(BTreeMap<String, f64>);

impl TruthVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, term: &str) -> Option<f64> {
        self.0.get(term).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for TruthVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Score of one pooled term against its true value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermScore {
    pub term: String,
    pub estimate: f64,
    pub truth: f64,
    pub bias: f64,
    pub lower: f64,
    pub upper: f64,
    pub width: f64,
    pub covered: bool,
    pub df: f64,
}

/// One scored replicate for one (design, mechanism) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationRecord {
    pub design: Design,
    pub mechanism: Mechanism,
    pub replicate: usize,
    pub pooled: PooledResult,
    pub scores: Vec<TermScore>,
}

impl ReplicationRecord {
    /// Score a pooled result. Every pooled term must have a true value.
    pub fn score(
        design: Design,
        mechanism: Mechanism,
        replicate: usize,
        pooled: PooledResult,
        truth: &TruthVector,
    ) -> Result<Self, SimError> {
        let mut scores = Vec::with_capacity(pooled.terms.len());
        for t in &pooled.terms {
            let Some(true_value) = truth.get(&t.term) else {
                return Err(SimError::integrity(format!("no true value for term '{}'", t.term)));
            };
            scores.push(TermScore {
                term: t.term.clone(),
                estimate: t.estimate,
                truth: true_value,
                bias: t.estimate - true_value,
                lower: t.lower,
                upper: t.upper,
                width: t.ci_width(),
                covered: t.covers(true_value),
                df: t.df,
            });
        }
        Ok(Self {
            design,
            mechanism,
            replicate,
            pooled,
            scores,
        })
    }
}
