//! Formatted terminal output.
//!
//! Formatting lives in one place so the simulation code stays free of
//! presentation concerns and output changes are localized.

use crate::domain::SimConfig;
use crate::sim::{ScenarioStatus, SimulationSummary, SummaryRow};

/// Run parameters, printed above the summary table.
pub fn format_run_header(config: &SimConfig) -> String {
    let mut out = String::new();

    out.push_str("=== misim - Multiple Imputation Monte Carlo ===\n");
    out.push_str(&format!("Formula: {}\n", config.formula));
    out.push_str(&format!(
        "Designs: {}\n",
        config
            .designs
            .iter()
            .map(|d| d.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    out.push_str(&format!(
        "Replicates: R={} | implicates m={} | iterations={} | method={:?}\n",
        config.replicates, config.implicates, config.max_iterations, config.method
    ));
    out.push_str(&format!(
        "Sample: n={} | population N={} | missing p={:.2} | seed={}",
        config.sample_size, config.population_size, config.proportion, config.seed
    ));
    if let Some(df) = config.complete_df {
        out.push_str(&format!(" | complete df={df}"));
    }
    out.push('\n');

    out
}

/// The (design, mechanism, term) summary table.
pub fn format_summary(summary: &SimulationSummary) -> String {
    if summary.is_empty() {
        return "No successful replicates.\n".to_string();
    }
    let rows = summary.rows();

    let mut out = String::new();
    out.push_str(
        format!(
            "{:<18} {:<10} {:<12} {:>10} {:>10} {:>10} {:>9} {:>9} {:>9} {:>6}",
            "design", "mechanism", "term", "true", "mean est", "bias", "rmse", "coverage", "width", "R"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<18} {:-<10} {:-<12} {:-<10} {:-<10} {:-<10} {:-<9} {:-<9} {:-<9} {:-<6}",
            "", "", "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in &rows {
        out.push_str(&format_row(r));
        out.push('\n');
    }

    out
}

fn format_row(r: &SummaryRow) -> String {
    format!(
        "{:<18} {:<10} {:<12} {:>10.4} {:>10.4} {:>10.4} {:>9.4} {:>9.3} {:>9.4} {:>6}",
        r.design.display_name(),
        r.mechanism.display_name(),
        truncate(&r.term, 12),
        r.true_value,
        r.mean_estimate,
        r.mean_bias,
        r.rmse,
        r.coverage,
        r.mean_width,
        r.replicates
    )
}

/// Successful / failed / cancelled replicate counts per scenario.
pub fn format_scenarios(summary: &SimulationSummary) -> String {
    let mut out = String::new();
    out.push_str("Replicates:\n");
    for s in summary.scenarios() {
        let flag = match s.status {
            ScenarioStatus::Ok => "",
            ScenarioStatus::Failed => "  FAILED",
        };
        out.push_str(&format!(
            "- {}/{}: {} ok, {} failed, {} cancelled{flag}\n",
            s.design.display_name(),
            s.mechanism.display_name(),
            s.succeeded,
            s.failed,
            s.cancelled
        ));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
