//! Mathematical utilities: least squares, multivariate normal draws, t quantiles.

pub mod dist;
pub mod mvn;
pub mod ols;

pub use dist::*;
pub use mvn::*;
pub use ols::*;
