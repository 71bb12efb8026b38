//! The Monte Carlo driver.
//!
//! For each configured design the driver walks
//!
//! ```text
//! Init -> GeneratingTruth -> Replicating -> Aggregating -> (next design) -> Done
//!                                 |
//!                                 +-> Aborted (collaborator failures over threshold)
//! ```
//!
//! Replicates run on the rayon pool. Each (design, replicate, mechanism, stage)
//! draws from its own stream derived from the root seed, so results do not
//! depend on scheduling. Workers only return values; the summary is folded on
//! the calling thread in replicate order.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::ampute::{Amputer, PatternAmputer};
use crate::analysis;
use crate::data::{build_population, generate, model_truth, sample_without_replacement};
use crate::domain::{Dataset, Design, ImputationResult, Mechanism, ReplicationRecord, SimConfig, TruthVector};
use crate::error::{SimError, Stage};
use crate::impute::{ChainedImputer, Imputer};
use crate::pool::{PoolOptions, pool_with_options};
use crate::rng::{derive_seed, stage, stream};
use crate::sim::SimulationSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverState {
    Init,
    GeneratingTruth,
    Replicating,
    Aggregating,
    Done,
    Aborted,
}

/// A replicate that did not produce a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateFailure {
    pub design: Design,
    pub mechanism: Mechanism,
    pub replicate: usize,
    pub error: SimError,
}

/// Where a design's replicate datasets come from.
enum Source {
    /// Fresh draw from the generator each replicate.
    Model,
    /// Sample without replacement from a reference population.
    Population(Dataset),
    /// The same finite dataset every replicate.
    Fixed(Dataset),
}

struct Scenario {
    design: Design,
    source: Source,
    truth: TruthVector,
}

enum MechanismOutcome {
    Scored(ReplicationRecord),
    Failed(SimError),
    Cancelled,
}

struct ReplicateOutcome {
    replicate: usize,
    per_mechanism: Vec<(Mechanism, MechanismOutcome)>,
}

pub struct SimulationDriver<A, I> {
    config: SimConfig,
    amputer: A,
    imputer: I,
    state: DriverState,
    summary: SimulationSummary,
    records: Vec<ReplicationRecord>,
    failures: Vec<ReplicateFailure>,
}

impl SimulationDriver<PatternAmputer, ChainedImputer> {
    /// Driver wired to the built-in amputer and chained imputer.
    pub fn with_defaults(config: SimConfig) -> Result<Self, SimError> {
        let imputer = ChainedImputer::new(config.method, config.max_iterations);
        Self::new(config, PatternAmputer, imputer)
    }
}

impl<A: Amputer, I: Imputer> SimulationDriver<A, I> {
    pub fn new(config: SimConfig, amputer: A, imputer: I) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            config,
            amputer,
            imputer,
            state: DriverState::Init,
            summary: SimulationSummary::new(),
            records: Vec::new(),
            failures: Vec::new(),
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Aggregated results so far (partial after an abort).
    pub fn summary(&self) -> &SimulationSummary {
        &self.summary
    }

    /// Scored replicates in (design, replicate, mechanism) order.
    pub fn records(&self) -> &[ReplicationRecord] {
        &self.records
    }

    pub fn failures(&self) -> &[ReplicateFailure] {
        &self.failures
    }

    /// Run every configured design to completion.
    ///
    /// On abort the error that tripped the threshold is returned and the state
    /// is `Aborted`; everything aggregated up to that point stays available.
    pub fn run(&mut self) -> Result<&SimulationSummary, SimError> {
        if self.state != DriverState::Init {
            return Err(SimError::invalid(format!(
                "driver already ran (state {:?})",
                self.state
            )));
        }

        let result = match self.config.threads {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| SimError::invalid(format!("cannot build thread pool: {e}")))?;
                pool.install(|| self.run_designs())
            }
            None => self.run_designs(),
        };

        match result {
            Ok(()) => {
                self.transition(DriverState::Done);
                Ok(&self.summary)
            }
            Err(err) => {
                self.transition(DriverState::Aborted);
                tracing::error!(error = %err, "simulation aborted");
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: DriverState) {
        tracing::info!(from = ?self.state, to = ?next, "driver state");
        self.state = next;
    }

    fn run_designs(&mut self) -> Result<(), SimError> {
        let designs = self.config.designs.clone();
        for design in designs {
            self.transition(DriverState::GeneratingTruth);
            let scenario = self.prepare(design)?;
            self.summary.set_truth(design, scenario.truth.clone());
            for &mechanism in &self.config.mechanisms {
                self.summary.register(design, mechanism);
            }

            self.transition(DriverState::Replicating);
            let (outcomes, tripped) = self.replicate_all(&scenario);

            self.transition(DriverState::Aggregating);
            self.aggregate(design, outcomes);

            if tripped {
                let cause = self
                    .failures
                    .iter()
                    .find(|f| f.design == design && f.error.is_collaborator_failure())
                    .map(|f| f.error.clone())
                    .unwrap_or_else(|| SimError::collaborator(Stage::Imputation, "failure threshold exceeded"));
                return Err(cause);
            }
        }
        Ok(())
    }

    /// Build the design's data source and its true coefficients.
    fn prepare(&self, design: Design) -> Result<Scenario, SimError> {
        let cfg = &self.config;
        let tag = design.stream_tag();
        let (source, truth) = match design {
            Design::ModelBased => (Source::Model, self.model_truth()?),
            Design::DesignBased => {
                let seed = derive_seed(cfg.seed, &[tag, stage::POPULATION]);
                let population = build_population(&cfg.generator, cfg.population_size, cfg.sample_size, seed)?;
                let truth = analysis::empirical_truth(&population, &cfg.formula)?;
                (Source::Population(population), truth)
            }
            Design::FinitePopulation => {
                let seed = derive_seed(cfg.seed, &[tag, stage::GENERATE]);
                let data = generate(cfg.sample_size, &cfg.generator, seed)?;
                let truth = analysis::empirical_truth(&data, &cfg.formula)?;
                (Source::Fixed(data), truth)
            }
        };

        tracing::info!(
            design = design.display_name(),
            terms = truth.len(),
            "generated truth"
        );
        Ok(Scenario { design, source, truth })
    }

    /// The generating coefficients are only the estimand when the formula
    /// regresses the outcome on exactly the generator's predictors.
    fn model_truth(&self) -> Result<TruthVector, SimError> {
        let g = &self.config.generator;
        let f = &self.config.formula;
        let mut formula_preds = f.predictors.clone();
        let mut generator_preds = g.predictor_names.clone();
        formula_preds.sort();
        generator_preds.sort();
        if f.outcome != g.outcome_name || formula_preds != generator_preds {
            return Err(SimError::invalid(format!(
                "model-based truth needs the formula to match the generator ({} ~ {})",
                g.outcome_name,
                g.predictor_names.join(" + ")
            )));
        }
        Ok(model_truth(g))
    }

    fn replicate_all(&self, scenario: &Scenario) -> (Vec<ReplicateOutcome>, bool) {
        let cfg = &self.config;
        let attempts = cfg.replicates * cfg.mechanisms.len();
        let limit = (cfg.max_failure_rate * attempts as f64).floor() as usize;
        let stop = AtomicBool::new(false);
        let failures = AtomicUsize::new(0);

        let outcomes: Vec<ReplicateOutcome> = (0..cfg.replicates)
            .into_par_iter()
            .map(|rep| {
                if stop.load(Ordering::Relaxed) {
                    return ReplicateOutcome {
                        replicate: rep,
                        per_mechanism: cfg
                            .mechanisms
                            .iter()
                            .map(|&m| (m, MechanismOutcome::Cancelled))
                            .collect(),
                    };
                }

                let outcome = self.run_replicate(scenario, rep);
                let failed = outcome
                    .per_mechanism
                    .iter()
                    .filter(|(_, o)| matches!(o, MechanismOutcome::Failed(e) if e.is_collaborator_failure()))
                    .count();
                if failed > 0 {
                    let total = failures.fetch_add(failed, Ordering::SeqCst) + failed;
                    if total > limit {
                        stop.store(true, Ordering::SeqCst);
                    }
                }
                outcome
            })
            .collect();

        (outcomes, stop.load(Ordering::SeqCst))
    }

    fn run_replicate(&self, scenario: &Scenario, rep: usize) -> ReplicateOutcome {
        let per_mechanism = match self.replicate_data(scenario, rep) {
            Ok(data) => self
                .config
                .mechanisms
                .iter()
                .map(|&mechanism| {
                    let outcome = match self.run_mechanism(scenario, &data, rep, mechanism) {
                        Ok(rec) => MechanismOutcome::Scored(rec),
                        Err(err) => MechanismOutcome::Failed(err),
                    };
                    (mechanism, outcome)
                })
                .collect(),
            Err(err) => self
                .config
                .mechanisms
                .iter()
                .map(|&m| (m, MechanismOutcome::Failed(err.clone())))
                .collect(),
        };
        tracing::debug!(design = scenario.design.display_name(), replicate = rep, "replicate finished");
        ReplicateOutcome {
            replicate: rep,
            per_mechanism,
        }
    }

    fn replicate_data<'a>(&self, scenario: &'a Scenario, rep: usize) -> Result<Cow<'a, Dataset>, SimError> {
        let cfg = &self.config;
        let tag = scenario.design.stream_tag();
        match &scenario.source {
            Source::Model => {
                let seed = derive_seed(cfg.seed, &[tag, rep as u64, stage::GENERATE]);
                generate(cfg.sample_size, &cfg.generator, seed).map(Cow::Owned)
            }
            Source::Population(population) => {
                let mut rng = stream(cfg.seed, &[tag, rep as u64, stage::SAMPLE]);
                sample_without_replacement(population, cfg.sample_size, &mut rng).map(Cow::Owned)
            }
            Source::Fixed(data) => Ok(Cow::Borrowed(data)),
        }
    }

    /// Ampute, impute, analyse, pool and score one replicate for one mechanism.
    fn run_mechanism(
        &self,
        scenario: &Scenario,
        data: &Dataset,
        rep: usize,
        mechanism: Mechanism,
    ) -> Result<ReplicationRecord, SimError> {
        let cfg = &self.config;
        let path = [scenario.design.stream_tag(), rep as u64, mechanism.stream_tag()];
        let spec = cfg.missingness_spec(mechanism)?;

        let mut rng = stream(cfg.seed, &[path[0], path[1], path[2], stage::AMPUTE]);
        let incomplete = self
            .amputer
            .amputate(data, &spec, &mut rng)
            .map_err(|e| as_collaborator(Stage::Amputation, e))?;

        let mut rng = stream(cfg.seed, &[path[0], path[1], path[2], stage::IMPUTE]);
        let implicates = self
            .imputer
            .impute(&incomplete, cfg.implicates, &mut rng)
            .map_err(|e| as_collaborator(Stage::Imputation, e))?;
        let imputed = ImputationResult::new(incomplete, implicates, cfg.implicates)?;
        tracing::trace!(
            replicate = rep,
            mechanism = mechanism.display_name(),
            implicates = imputed.m(),
            incomplete_rows = imputed.original().incomplete_rows(),
            "imputed"
        );

        let estimates = imputed
            .implicates()
            .iter()
            .map(|d| analysis::fit(d, &cfg.formula))
            .collect::<Result<Vec<_>, _>>()?;

        let options = PoolOptions {
            complete_df: cfg.complete_df,
            ..PoolOptions::default()
        };
        let pooled = pool_with_options(&estimates, scenario.design.pool_mode(), &options)?;
        ReplicationRecord::score(scenario.design, mechanism, rep, pooled, &scenario.truth)
    }

    fn aggregate(&mut self, design: Design, outcomes: Vec<ReplicateOutcome>) {
        let mut cancelled = 0usize;
        for outcome in outcomes {
            for (mechanism, result) in outcome.per_mechanism {
                match result {
                    MechanismOutcome::Scored(rec) => {
                        self.summary.record(&rec);
                        self.records.push(rec);
                    }
                    MechanismOutcome::Failed(error) => {
                        tracing::warn!(
                            design = design.display_name(),
                            mechanism = mechanism.display_name(),
                            replicate = outcome.replicate,
                            kind = error.kind_label(),
                            error = %error,
                            "replicate failed"
                        );
                        self.summary.record_failure(design, mechanism);
                        self.failures.push(ReplicateFailure {
                            design,
                            mechanism,
                            replicate: outcome.replicate,
                            error,
                        });
                    }
                    MechanismOutcome::Cancelled => {
                        self.summary.record_cancelled(design, mechanism);
                        cancelled += 1;
                    }
                }
            }
        }

        for row in self.summary.scenarios().iter().filter(|s| s.design == design) {
            tracing::info!(
                design = design.display_name(),
                mechanism = row.mechanism.display_name(),
                succeeded = row.succeeded,
                failed = row.failed,
                cancelled = row.cancelled,
                "scenario complete"
            );
        }
        if cancelled > 0 {
            tracing::warn!(design = design.display_name(), cancelled, "replicates cancelled after abort");
        }
    }
}

/// Collaborator errors are reported as such, keeping the original message.
fn as_collaborator(stage: Stage, err: SimError) -> SimError {
    if err.is_collaborator_failure() {
        err
    } else {
        SimError::collaborator(stage, err.to_string())
    }
}
