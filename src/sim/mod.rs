//! Monte Carlo evaluation of multiple imputation.
//!
//! `SimulationDriver` runs replicate loops per design and mechanism;
//! `SimulationSummary` holds the aggregated bias, coverage and interval width.

pub mod driver;
pub mod summary;

pub use driver::*;
pub use summary::*;
