//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - runs the simulation
//! - prints the summary
//! - writes optional exports

use clap::Parser;

use crate::cli::{Command, RunArgs};
use crate::domain::SimConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `misim` binary.
pub fn run() -> Result<(), AppError> {
    // `misim` and `misim -R 100` behave like `misim run ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Run(args) => handle_run(args),
    }
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    crate::logging::init_logging(args.verbose);

    let config = sim_config_from_args(&args);
    let run = pipeline::run_simulation(&config)?;

    println!("{}", crate::report::format_run_header(&config));
    println!("{}", crate::report::format_summary(&run.summary));
    println!("{}", crate::report::format_scenarios(&run.summary));

    // Exports are written even after an abort so partial results survive.
    if let Some(path) = &args.export {
        crate::io::write_summary_csv(path, &run.summary)?;
    }
    if let Some(path) = &args.export_json {
        crate::io::write_run_json(path, &config, &run)?;
    }
    if let Some(path) = &args.records {
        crate::io::write_records_csv(path, &run.records)?;
    }

    if let Some(err) = run.abort {
        return Err(err.into());
    }

    let failed = run.summary.failed_scenarios();
    if !failed.is_empty() {
        let names: Vec<String> = failed
            .iter()
            .map(|s| format!("{}/{}", s.design.display_name(), s.mechanism.display_name()))
            .collect();
        return Err(AppError::new(
            4,
            format!("no successful replicates for: {}", names.join(", ")),
        ));
    }

    Ok(())
}

pub fn sim_config_from_args(args: &RunArgs) -> SimConfig {
    SimConfig {
        designs: dedup(&args.designs),
        mechanisms: dedup(&args.mechanisms),
        replicates: args.replicates,
        implicates: args.implicates,
        max_iterations: args.max_iterations,
        method: args.method,
        proportion: args.proportion,
        affected_fields: args.affected_fields.clone(),
        sample_size: args.sample_size,
        population_size: args.population_size,
        seed: args.seed,
        formula: args.formula.clone(),
        complete_df: args.complete_df,
        max_failure_rate: args.max_failure_rate,
        threads: args.threads,
        ..SimConfig::default()
    }
}

/// Keep the first occurrence of each repeated flag value.
fn dedup<T: Copy + PartialEq>(values: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for &v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

/// Rewrite argv so `misim` defaults to `misim run`.
///
/// Rules:
/// - `misim`                      -> `misim run`
/// - `misim -R 100 ...`           -> `misim run -R 100 ...`
/// - `misim --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("run".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version || arg1 == "run" {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "run".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Design, Mechanism};

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rewrite_defaults_to_run() {
        assert_eq!(rewrite_args(args(&["misim"])), args(&["misim", "run"]));
        assert_eq!(
            rewrite_args(args(&["misim", "-R", "10"])),
            args(&["misim", "run", "-R", "10"])
        );
        assert_eq!(rewrite_args(args(&["misim", "--help"])), args(&["misim", "--help"]));
        assert_eq!(rewrite_args(args(&["misim", "run", "-v"])), args(&["misim", "run", "-v"]));
    }

    #[test]
    fn flags_become_a_valid_config() {
        let cli = crate::cli::Cli::parse_from(rewrite_args(args(&[
            "misim",
            "--design",
            "finite",
            "--design",
            "finite",
            "--mechanism",
            "mcar",
            "-R",
            "50",
            "--complete-df",
            "197",
        ])));
        let Command::Run(run_args) = cli.command;
        let config = sim_config_from_args(&run_args);

        assert_eq!(config.designs, vec![Design::FinitePopulation]);
        assert_eq!(config.mechanisms, vec![Mechanism::Mcar]);
        assert_eq!(config.replicates, 50);
        assert_eq!(config.complete_df, Some(197.0));
        assert!(config.validate().is_ok());
    }
}
