//! Export run results to CSV and JSON.
//!
//! The CSV files are meant to be easy to consume in spreadsheets or downstream
//! scripts; the JSON document captures the whole run (config included) so it
//! can be reproduced.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::pipeline::RunOutput;
use crate::domain::{Design, Mechanism, ReplicationRecord, SimConfig};
use crate::error::AppError;
use crate::sim::{DriverState, ScenarioRow, SimulationSummary, SummaryRow};

/// Write the summary table to a CSV file.
pub fn write_summary_csv(path: &Path, summary: &SimulationSummary) -> Result<(), AppError> {
    let mut file = create(path, "summary CSV")?;

    writeln!(
        file,
        "design,mechanism,term,true_value,mean_estimate,mean_bias,rmse,coverage,mean_width,replicates"
    )
    .map_err(|e| write_error("summary CSV header", e))?;

    for r in summary.rows() {
        writeln!(
            file,
            "{},{},{},{:.10},{:.10},{:.10},{:.10},{:.6},{:.10},{}",
            r.design.display_name(),
            r.mechanism.display_name(),
            r.term,
            r.true_value,
            r.mean_estimate,
            r.mean_bias,
            r.rmse,
            r.coverage,
            r.mean_width,
            r.replicates
        )
        .map_err(|e| write_error("summary CSV row", e))?;
    }

    file.flush().map_err(|e| write_error("summary CSV", e))
}

/// Write one row per (replicate, mechanism, term).
pub fn write_records_csv(path: &Path, records: &[ReplicationRecord]) -> Result<(), AppError> {
    let mut file = create(path, "records CSV")?;

    writeln!(
        file,
        "design,mechanism,replicate,term,estimate,truth,bias,lower,upper,covered,df"
    )
    .map_err(|e| write_error("records CSV header", e))?;

    for rec in records {
        for s in &rec.scores {
            writeln!(
                file,
                "{},{},{},{},{:.10},{:.10},{:.10},{:.10},{:.10},{},{}",
                rec.design.display_name(),
                rec.mechanism.display_name(),
                rec.replicate,
                s.term,
                s.estimate,
                s.truth,
                s.bias,
                s.lower,
                s.upper,
                s.covered,
                s.df
            )
            .map_err(|e| write_error("records CSV row", e))?;
        }
    }

    file.flush().map_err(|e| write_error("records CSV", e))
}

#[derive(Debug, Serialize)]
struct FailureEntry {
    design: Design,
    mechanism: Mechanism,
    replicate: usize,
    kind: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct RunDocument<'a> {
    tool: &'static str,
    version: &'static str,
    generated_at: DateTime<Utc>,
    state: DriverState,
    abort: Option<String>,
    config: &'a SimConfig,
    summary: Vec<SummaryRow>,
    scenarios: Vec<ScenarioRow>,
    failures: Vec<FailureEntry>,
}

/// Write config, summary, scenario statuses and failures to a JSON file.
pub fn write_run_json(path: &Path, config: &SimConfig, run: &RunOutput) -> Result<(), AppError> {
    let mut file = create(path, "run JSON")?;

    let doc = RunDocument {
        tool: "misim",
        version: env!("CARGO_PKG_VERSION"),
        generated_at: Utc::now(),
        state: run.state,
        abort: run.abort.as_ref().map(|e| e.to_string()),
        config,
        summary: run.summary.rows(),
        scenarios: run.summary.scenarios(),
        failures: run
            .failures
            .iter()
            .map(|f| FailureEntry {
                design: f.design,
                mechanism: f.mechanism,
                replicate: f.replicate,
                kind: f.error.kind_label(),
                message: f.error.to_string(),
            })
            .collect(),
    };

    serde_json::to_writer_pretty(&mut file, &doc)
        .map_err(|e| AppError::new(5, format!("Failed to write run JSON: {e}")))?;
    file.flush().map_err(|e| write_error("run JSON", e))
}

fn create(path: &Path, what: &str) -> Result<BufWriter<File>, AppError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| AppError::new(5, format!("Failed to create {what} '{}': {e}", path.display())))
}

fn write_error(what: &str, e: std::io::Error) -> AppError {
    AppError::new(5, format!("Failed to write {what}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PoolMode, PooledResult, TermScore};
    use crate::error::{SimError, Stage};
    use crate::sim::ReplicateFailure;

    fn record(replicate: usize) -> ReplicationRecord {
        ReplicationRecord {
            design: Design::FinitePopulation,
            mechanism: Mechanism::Mcar,
            replicate,
            pooled: PooledResult {
                mode: PoolMode::ZeroSamplingVariance,
                implicates: 5,
                terms: Vec::new(),
            },
            scores: vec![
                TermScore {
                    term: "intercept".to_string(),
                    estimate: 0.1,
                    truth: 0.0,
                    bias: 0.1,
                    lower: -0.5,
                    upper: 0.7,
                    width: 1.2,
                    covered: true,
                    df: 4.0,
                },
                TermScore {
                    term: "x".to_string(),
                    estimate: 6.5,
                    truth: 6.0,
                    bias: 0.5,
                    lower: 6.2,
                    upper: 6.8,
                    width: 0.6,
                    covered: false,
                    df: 4.0,
                },
            ],
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("misim-{}-{name}", std::process::id()))
    }

    #[test]
    fn summary_and_records_csv() {
        let mut summary = SimulationSummary::new();
        let records = vec![record(0), record(1)];
        for r in &records {
            summary.record(r);
        }

        let path = temp_path("summary.csv");
        write_summary_csv(&path, &summary).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("design,mechanism,term"));
        assert!(lines[2].starts_with("finite-population,MCAR,x,6.0000000000,6.5000000000"));
        assert!(lines[2].ends_with(",2"));
        std::fs::remove_file(&path).ok();

        let path = temp_path("records.csv");
        write_records_csv(&path, &records).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().nth(4).unwrap().contains(",1,x,"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn run_json_round_trips_as_json() {
        let mut summary = SimulationSummary::new();
        summary.record(&record(0));
        summary.record_failure(Design::FinitePopulation, Mechanism::Mcar);
        let run = RunOutput {
            state: DriverState::Aborted,
            summary,
            records: vec![record(0)],
            failures: vec![ReplicateFailure {
                design: Design::FinitePopulation,
                mechanism: Mechanism::Mcar,
                replicate: 1,
                error: SimError::collaborator(Stage::Imputation, "boom"),
            }],
            abort: Some(SimError::collaborator(Stage::Imputation, "boom")),
        };

        let path = temp_path("run.json");
        write_run_json(&path, &SimConfig::default(), &run).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(value["tool"], "misim");
        assert_eq!(value["state"], "aborted");
        assert_eq!(value["config"]["replicates"], 1000);
        assert_eq!(value["summary"].as_array().unwrap().len(), 2);
        assert_eq!(value["scenarios"][0]["failed"], 1);
        assert_eq!(value["failures"][0]["kind"], "collaborator_failure");
        assert_eq!(value["abort"], "imputation failed: boom");
    }

    #[test]
    fn run_json_reports_failed_final_write() {
        // Writes to /dev/full fail with ENOSPC; the document fits in the
        // write buffer, so only the final flush sees the error.
        let path = Path::new("/dev/full");
        if !path.exists() {
            return;
        }
        let run = RunOutput {
            state: DriverState::Done,
            summary: SimulationSummary::new(),
            records: Vec::new(),
            failures: Vec::new(),
            abort: None,
        };
        let err = write_run_json(path, &SimConfig::default(), &run).unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let path = Path::new("/nonexistent-dir/summary.csv");
        let err = write_summary_csv(path, &SimulationSummary::new()).unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }
}
