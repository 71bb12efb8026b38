//! Data sources for the simulation: parametric generation and finite populations.

pub mod generate;
pub mod population;

pub use generate::*;
pub use population::*;
