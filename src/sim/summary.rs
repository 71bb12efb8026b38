//! Streaming aggregation of replication records.
//!
//! The summary keeps running sums per (design, mechanism, term) so individual
//! records do not need to be retained. It is only ever mutated by the driver
//! thread, in replicate order, which keeps floating-point sums identical
//! across runs with the same seed.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Design, Mechanism, ReplicationRecord, TruthVector};

#[derive(Debug, Clone, PartialEq)]
struct TermAccumulator {
    term: String,
    truth: f64,
    n: usize,
    sum_estimate: f64,
    sum_bias: f64,
    sum_sq_bias: f64,
    covered: usize,
    sum_width: f64,
}

impl TermAccumulator {
    fn new(term: &str, truth: f64) -> Self {
        Self {
            term: term.to_string(),
            truth,
            n: 0,
            sum_estimate: 0.0,
            sum_bias: 0.0,
            sum_sq_bias: 0.0,
            covered: 0,
            sum_width: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ScenarioCounts {
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

/// Whether a (design, mechanism) scenario produced any usable replicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Ok,
    Failed,
}

/// One row of the summary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub design: Design,
    pub mechanism: Mechanism,
    pub term: String,
    pub true_value: f64,
    pub mean_estimate: f64,
    pub mean_bias: f64,
    pub rmse: f64,
    pub coverage: f64,
    pub mean_width: f64,
    pub replicates: usize,
}

/// Replicate bookkeeping for one (design, mechanism) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioRow {
    pub design: Design,
    pub mechanism: Mechanism,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub status: ScenarioStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationSummary {
    cells: BTreeMap<(Design, Mechanism, usize), TermAccumulator>,
    scenarios: BTreeMap<(Design, Mechanism), ScenarioCounts>,
    truths: BTreeMap<Design, TruthVector>,
}

impl SimulationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_truth(&mut self, design: Design, truth: TruthVector) {
        self.truths.insert(design, truth);
    }

    pub fn truth(&self, design: Design) -> Option<&TruthVector> {
        self.truths.get(&design)
    }

    /// Register a scenario so it is reported even if nothing ever succeeds.
    pub fn register(&mut self, design: Design, mechanism: Mechanism) {
        self.scenarios.entry((design, mechanism)).or_default();
    }

    pub fn record(&mut self, rec: &ReplicationRecord) {
        self.scenarios
            .entry((rec.design, rec.mechanism))
            .or_default()
            .succeeded += 1;

        for (idx, s) in rec.scores.iter().enumerate() {
            let acc = self
                .cells
                .entry((rec.design, rec.mechanism, idx))
                .or_insert_with(|| TermAccumulator::new(&s.term, s.truth));
            acc.n += 1;
            acc.sum_estimate += s.estimate;
            acc.sum_bias += s.bias;
            acc.sum_sq_bias += s.bias * s.bias;
            acc.sum_width += s.width;
            if s.covered {
                acc.covered += 1;
            }
        }
    }

    pub fn record_failure(&mut self, design: Design, mechanism: Mechanism) {
        self.scenarios.entry((design, mechanism)).or_default().failed += 1;
    }

    pub fn record_cancelled(&mut self, design: Design, mechanism: Mechanism) {
        self.scenarios.entry((design, mechanism)).or_default().cancelled += 1;
    }

    /// The summary table, ordered by design, mechanism, then formula term order.
    pub fn rows(&self) -> Vec<SummaryRow> {
        self.cells
            .iter()
            .map(|(&(design, mechanism, _), acc)| {
                let n = acc.n as f64;
                SummaryRow {
                    design,
                    mechanism,
                    term: acc.term.clone(),
                    true_value: acc.truth,
                    mean_estimate: acc.sum_estimate / n,
                    mean_bias: acc.sum_bias / n,
                    rmse: (acc.sum_sq_bias / n).sqrt(),
                    coverage: acc.covered as f64 / n,
                    mean_width: acc.sum_width / n,
                    replicates: acc.n,
                }
            })
            .collect()
    }

    pub fn scenarios(&self) -> Vec<ScenarioRow> {
        self.scenarios
            .iter()
            .map(|(&(design, mechanism), c)| ScenarioRow {
                design,
                mechanism,
                succeeded: c.succeeded,
                failed: c.failed,
                cancelled: c.cancelled,
                status: if c.succeeded == 0 {
                    ScenarioStatus::Failed
                } else {
                    ScenarioStatus::Ok
                },
            })
            .collect()
    }

    pub fn row(&self, design: Design, mechanism: Mechanism, term: &str) -> Option<SummaryRow> {
        self.rows()
            .into_iter()
            .find(|r| r.design == design && r.mechanism == mechanism && r.term == term)
    }

    pub fn scenario(&self, design: Design, mechanism: Mechanism) -> Option<ScenarioRow> {
        self.scenarios()
            .into_iter()
            .find(|s| s.design == design && s.mechanism == mechanism)
    }

    /// Scenarios that produced no successful replicate.
    pub fn failed_scenarios(&self) -> Vec<ScenarioRow> {
        self.scenarios()
            .into_iter()
            .filter(|s| s.status == ScenarioStatus::Failed)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
