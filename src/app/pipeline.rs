//! The simulation pipeline behind `misim run`.
//!
//! Builds the driver with the default collaborators, runs it and hands back
//! everything the report and export stages need, including partial results
//! when the run aborts.

use crate::domain::{ReplicationRecord, SimConfig};
use crate::error::{AppError, SimError};
use crate::sim::{DriverState, ReplicateFailure, SimulationDriver, SimulationSummary};

/// All outputs of a single `misim run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub state: DriverState,
    pub summary: SimulationSummary,
    pub records: Vec<ReplicationRecord>,
    pub failures: Vec<ReplicateFailure>,
    /// Set when the driver ended in `Aborted`.
    pub abort: Option<SimError>,
}

/// Run the configured simulation with the built-in amputer and imputer.
///
/// Configuration errors are returned immediately; an abort during the run is
/// reported through `RunOutput::abort` so partial results can still be shown.
pub fn run_simulation(config: &SimConfig) -> Result<RunOutput, AppError> {
    let mut driver = SimulationDriver::with_defaults(config.clone())?;

    tracing::info!(
        designs = config.designs.len(),
        mechanisms = config.mechanisms.len(),
        replicates = config.replicates,
        implicates = config.implicates,
        seed = config.seed,
        "starting simulation"
    );
    let abort = driver.run().err();

    Ok(RunOutput {
        state: driver.state(),
        summary: driver.summary().clone(),
        records: driver.records().to_vec(),
        failures: driver.failures().to_vec(),
        abort,
    })
}
