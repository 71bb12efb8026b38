//! `mi-sim` library crate.
//!
//! The binary (`misim`) is a thin wrapper around this library so that:
//!
//! - the simulation engine is testable without spawning processes
//! - custom amputers and imputers can be plugged into `sim::SimulationDriver`
//! - code stays easy to navigate as the project grows

pub mod ampute;
pub mod analysis;
pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod impute;
pub mod io;
pub mod logging;
pub mod math;
pub mod pool;
pub mod report;
pub mod rng;
pub mod sim;
