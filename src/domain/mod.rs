//! Domain types used throughout the simulation.
//!
//! This module defines:
//!
//! - datasets with absent-value cells and the analysis formula (`Dataset`, `Formula`)
//! - configuration enums and the run configuration (`Design`, `Mechanism`, `SimConfig`, ...)
//! - per-stage result records (`EstimateSet`, `PooledResult`, `ReplicationRecord`, ...)

pub mod dataset;
pub mod results;
pub mod types;

pub use dataset::*;
pub use results::*;
pub use types::*;
