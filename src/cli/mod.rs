//! Command-line parsing for the multiple-imputation simulator.
//!
//! Argument parsing and command dispatch stay separate from the simulation code;
//! `app::sim_config_from_args` is the only place flags become a `SimConfig`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{Design, Formula, ImputationMethod, Mechanism};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "misim", version, about = "Monte Carlo evaluation of multiple imputation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the replicate loop and print the bias / coverage / width summary.
    Run(RunArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Simulation design (repeatable).
    #[arg(short = 'd', long = "design", value_enum, default_values_t = [Design::FinitePopulation])]
    pub designs: Vec<Design>,

    /// Missingness mechanism (repeatable).
    #[arg(short = 'M', long = "mechanism", value_enum, default_values_t = [Mechanism::Mcar, Mechanism::MarRight])]
    pub mechanisms: Vec<Mechanism>,

    /// Replicates per design.
    #[arg(short = 'R', long, default_value_t = 1000)]
    pub replicates: usize,

    /// Implicates per imputation.
    #[arg(short = 'm', long, default_value_t = 5)]
    pub implicates: usize,

    /// Chained-equation sweeps per implicate.
    #[arg(long, default_value_t = 5)]
    pub max_iterations: usize,

    /// Imputation method.
    #[arg(long, value_enum, default_value_t = ImputationMethod::Norm)]
    pub method: ImputationMethod,

    /// Share of rows made incomplete.
    #[arg(short = 'p', long, default_value_t = 0.5)]
    pub proportion: f64,

    /// Restrict amputation to these fields (repeatable; default: all).
    #[arg(long = "ampute-field")]
    pub affected_fields: Vec<String>,

    /// Rows per replicate dataset.
    #[arg(short = 'n', long, default_value_t = 200)]
    pub sample_size: usize,

    /// Rows in the design-based reference population.
    #[arg(long, default_value_t = 100_000)]
    pub population_size: usize,

    /// Root random seed.
    #[arg(long, default_value_t = 123)]
    pub seed: u64,

    /// Analysis model, e.g. "y ~ x + z".
    #[arg(long, default_value = "y ~ x + z")]
    pub formula: Formula,

    /// Complete-data df for the Barnard-Rubin small-sample adjustment.
    #[arg(long)]
    pub complete_df: Option<f64>,

    /// Abort once this share of replicate attempts fail in the amputer or imputer.
    #[arg(long, default_value_t = 0.5)]
    pub max_failure_rate: f64,

    /// Worker threads (default: one per core).
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Export the summary table to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export config, summary and scenario statuses to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,

    /// Export every scored replicate to CSV.
    #[arg(long)]
    pub records: Option<PathBuf>,

    /// Debug-level logging (overridden by MISIM_LOG).
    #[arg(short = 'v', long)]
    pub verbose: bool,
}
