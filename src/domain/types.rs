//! Run configuration and the enums it is built from.
//!
//! These types are serializable so a run's configuration can be written next to
//! its summary and compared later.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::Formula;
use crate::error::SimError;

/// How each replicate obtains its complete dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Design {
    /// Fresh random draw from the parametric model every replicate.
    #[value(name = "model")]
    ModelBased,
    /// Sample without replacement from a fixed reference population.
    #[value(name = "design")]
    DesignBased,
    /// Reuse one fixed finite dataset; it is its own population.
    #[value(name = "finite")]
    FinitePopulation,
}

impl Design {
    pub const ALL: [Design; 3] = [Design::ModelBased, Design::DesignBased, Design::FinitePopulation];

    pub fn display_name(self) -> &'static str {
        match self {
            Design::ModelBased => "model-based",
            Design::DesignBased => "design-based",
            Design::FinitePopulation => "finite-population",
        }
    }

    /// Pooling rule used for this design.
    ///
    /// A finite population has no sampling variance: only the missing-data
    /// variance remains.
    pub fn pool_mode(self) -> PoolMode {
        match self {
            Design::ModelBased | Design::DesignBased => PoolMode::Standard,
            Design::FinitePopulation => PoolMode::ZeroSamplingVariance,
        }
    }

    pub(crate) fn stream_tag(self) -> u64 {
        match self {
            Design::ModelBased => 1,
            Design::DesignBased => 2,
            Design::FinitePopulation => 3,
        }
    }
}

/// Missingness mechanism used by the amputer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Mechanism {
    /// Missing completely at random.
    Mcar,
    /// Missing at random; deletion concentrated where observed covariates are high.
    MarRight,
}

impl Mechanism {
    pub fn display_name(self) -> &'static str {
        match self {
            Mechanism::Mcar => "MCAR",
            Mechanism::MarRight => "MAR-right",
        }
    }

    pub(crate) fn stream_tag(self) -> u64 {
        match self {
            Mechanism::Mcar => 1,
            Mechanism::MarRight => 2,
        }
    }
}

/// Variance combination rule for pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolMode {
    /// Rubin's rules: `T = Ū + B + B/m`.
    Standard,
    /// Finite truth: `T = B + B/m`, `ν = m - 1`.
    ZeroSamplingVariance,
}

/// Imputation model used by the default imputer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImputationMethod {
    /// Bayesian normal linear regression on all other fields.
    Norm,
    /// Random draw from the observed values of the field.
    Sample,
}

/// Immutable description of how to make a dataset incomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingnessSpec {
    proportion: f64,
    mechanism: Mechanism,
    fields: Vec<String>,
}

impl MissingnessSpec {
    pub fn new(proportion: f64, mechanism: Mechanism, fields: Vec<String>) -> Result<Self, SimError> {
        if !(proportion.is_finite() && proportion > 0.0 && proportion < 1.0) {
            return Err(SimError::invalid(format!(
                "missingness proportion must be in (0, 1), got {proportion}"
            )));
        }
        if fields.is_empty() {
            return Err(SimError::invalid("missingness needs at least one affected field"));
        }
        Ok(Self {
            proportion,
            mechanism,
            fields,
        })
    }

    pub fn proportion(&self) -> f64 {
        self.proportion
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Parameters of the data-generating model.
///
/// Predictors are multivariate normal; the outcome is
/// `intercept + Σ coefficients[j] * predictor[j] + N(0, noise_variance)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorParams {
    pub predictor_names: Vec<String>,
    pub outcome_name: String,
    pub mean: Vec<f64>,
    /// Row-major covariance of the predictors.
    pub covariance: Vec<Vec<f64>>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub noise_variance: f64,
}

impl GeneratorParams {
    /// Field order of generated datasets: predictors, then the outcome.
    pub fn fields(&self) -> Vec<String> {
        self.predictor_names
            .iter()
            .cloned()
            .chain(std::iter::once(self.outcome_name.clone()))
            .collect()
    }

    pub fn dim(&self) -> usize {
        self.predictor_names.len()
    }
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            predictor_names: vec!["x".to_string(), "z".to_string()],
            outcome_name: "y".to_string(),
            mean: vec![8.0, 3.0],
            covariance: vec![vec![1.0, 0.5], vec![0.5, 1.0]],
            intercept: 0.0,
            coefficients: vec![6.0, 3.0],
            noise_variance: 1.0,
        }
    }
}

/// A full run's configuration as understood by the simulation driver.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub designs: Vec<Design>,
    pub mechanisms: Vec<Mechanism>,
    /// Replicates R per design.
    pub replicates: usize,
    /// Implicates m per imputation.
    pub implicates: usize,
    /// Chained-equation sweeps per implicate.
    pub max_iterations: usize,
    pub method: ImputationMethod,
    pub proportion: f64,
    /// Fields the amputer may delete. Empty means every field.
    pub affected_fields: Vec<String>,
    /// Rows per replicate dataset (and size of the fixed finite dataset).
    pub sample_size: usize,
    /// Rows in the design-based reference population.
    pub population_size: usize,
    pub seed: u64,
    pub formula: Formula,
    pub generator: GeneratorParams,
    /// Complete-data degrees of freedom for the Barnard–Rubin adjustment.
    pub complete_df: Option<f64>,
    /// Abort once collaborator failures exceed this share of R.
    pub max_failure_rate: f64,
    /// Worker threads (None = rayon default).
    pub threads: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            designs: vec![Design::FinitePopulation],
            mechanisms: vec![Mechanism::Mcar, Mechanism::MarRight],
            replicates: 1000,
            implicates: 5,
            max_iterations: 5,
            method: ImputationMethod::Norm,
            proportion: 0.5,
            affected_fields: Vec::new(),
            sample_size: 200,
            population_size: 100_000,
            seed: 123,
            formula: Formula::new("y", vec!["x".to_string(), "z".to_string()]),
            generator: GeneratorParams::default(),
            complete_df: None,
            max_failure_rate: 0.5,
            threads: None,
        }
    }
}

impl SimConfig {
    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.designs.is_empty() {
            return Err(SimError::invalid("at least one design is required"));
        }
        if self.mechanisms.is_empty() {
            return Err(SimError::invalid("at least one missingness mechanism is required"));
        }
        if self.replicates == 0 {
            return Err(SimError::invalid("replicate count must be >= 1"));
        }
        if self.implicates < 2 {
            return Err(SimError::InsufficientImplicates { m: self.implicates });
        }
        if self.max_iterations == 0 {
            return Err(SimError::invalid("max iterations must be >= 1"));
        }
        if !(self.proportion.is_finite() && self.proportion > 0.0 && self.proportion < 1.0) {
            return Err(SimError::invalid(format!(
                "amputation proportion must be in (0, 1), got {}",
                self.proportion
            )));
        }
        if !(self.max_failure_rate.is_finite() && (0.0..=1.0).contains(&self.max_failure_rate)) {
            return Err(SimError::invalid("max failure rate must be in [0, 1]"));
        }
        if let Some(df) = self.complete_df {
            if !(df.is_finite() && df > 0.0) {
                return Err(SimError::invalid(format!("complete-data df must be > 0, got {df}")));
            }
        }
        if self.threads == Some(0) {
            return Err(SimError::invalid("thread count must be >= 1"));
        }

        let g = &self.generator;
        let k = g.dim();
        if k == 0 {
            return Err(SimError::invalid("generator needs at least one predictor"));
        }
        if g.mean.len() != k || g.coefficients.len() != k {
            return Err(SimError::invalid(format!(
                "generator has {k} predictors but {} means and {} coefficients",
                g.mean.len(),
                g.coefficients.len()
            )));
        }
        if g.covariance.len() != k || g.covariance.iter().any(|row| row.len() != k) {
            return Err(SimError::invalid(format!("covariance must be {k}x{k}")));
        }

        let fields = g.fields();
        self.formula.check_fields(&fields)?;
        for name in &self.affected_fields {
            if !fields.contains(name) {
                return Err(SimError::invalid(format!("affected field '{name}' is not in the schema")));
            }
        }

        // OLS needs more rows than coefficients to estimate a residual variance.
        if self.sample_size <= self.formula.n_terms() {
            return Err(SimError::invalid(format!(
                "sample size {} is too small for {} regression terms",
                self.sample_size,
                self.formula.n_terms()
            )));
        }
        if self.designs.contains(&Design::DesignBased) && self.population_size < self.sample_size {
            return Err(SimError::InsufficientPopulation {
                requested: self.sample_size,
                available: self.population_size,
            });
        }

        Ok(())
    }

    /// Fields the amputer works on (all generated fields when unset).
    pub fn missingness_fields(&self) -> Vec<String> {
        if self.affected_fields.is_empty() {
            self.generator.fields()
        } else {
            self.affected_fields.clone()
        }
    }

    pub fn missingness_spec(&self, mechanism: Mechanism) -> Result<MissingnessSpec, SimError> {
        MissingnessSpec::new(self.proportion, mechanism, self.missingness_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_single_implicate() {
        let config = SimConfig {
            implicates: 1,
            ..SimConfig::default()
        };
        assert_eq!(config.validate(), Err(SimError::InsufficientImplicates { m: 1 }));
    }

    #[test]
    fn validate_rejects_small_population() {
        let config = SimConfig {
            designs: vec![Design::DesignBased],
            population_size: 50,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InsufficientPopulation { requested: 200, available: 50 })
        ));
    }

    #[test]
    fn validate_rejects_unknown_fields() {
        let config = SimConfig {
            affected_fields: vec!["w".to_string()],
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missingness_spec_checks_proportion() {
        assert!(MissingnessSpec::new(0.0, Mechanism::Mcar, vec!["x".into()]).is_err());
        assert!(MissingnessSpec::new(1.0, Mechanism::Mcar, vec!["x".into()]).is_err());
        assert!(MissingnessSpec::new(0.5, Mechanism::Mcar, vec![]).is_err());
        let spec = MissingnessSpec::new(0.5, Mechanism::MarRight, vec!["x".into()]).unwrap();
        assert_eq!(spec.mechanism(), Mechanism::MarRight);
    }

    #[test]
    fn finite_design_pools_without_sampling_variance() {
        assert_eq!(Design::FinitePopulation.pool_mode(), PoolMode::ZeroSamplingVariance);
        assert_eq!(Design::ModelBased.pool_mode(), PoolMode::Standard);
        assert_eq!(Design::DesignBased.pool_mode(), PoolMode::Standard);
    }
}
