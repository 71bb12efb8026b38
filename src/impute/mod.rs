//! Multiple imputation.
//!
//! The `Imputer` trait is the collaborator contract the driver depends on: take
//! an incomplete dataset and return `m` completed copies with the same schema
//! and row count. `ChainedImputer` is the default implementation (fully
//! conditional specification, one independent chain per implicate).

pub mod chained;

pub use chained::*;

use crate::domain::Dataset;
use crate::error::SimError;
use crate::rng::SimRng;

pub trait Imputer: Send + Sync {
    /// Produce `m` completed copies of `incomplete`.
    fn impute(&self, incomplete: &Dataset, m: usize, rng: &mut SimRng) -> Result<Vec<Dataset>, SimError>;
}
