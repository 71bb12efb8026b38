//! Error types.
//!
//! - `SimError` is the library-level taxonomy returned by every simulation stage.
//! - `AppError` is what the binary reports: a message plus a process exit code.

use thiserror::Error;

/// Failures raised by the simulation engine and its collaborators.
///
/// None of these are retried: they signal a configuration or contract
/// violation, not a transient condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Bad distribution, pooling or run parameters.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A sample request exceeded the size of the population it draws from.
    #[error("insufficient population: requested {requested} rows but only {available} available")]
    InsufficientPopulation { requested: usize, available: usize },

    /// Pooling needs at least two implicates to estimate between-imputation variance.
    #[error("insufficient implicates: pooling requires m >= 2, got m = {m}")]
    InsufficientImplicates { m: usize },

    /// Schema or row-count mismatch, or missing values where completeness is required.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// The amputer or imputer failed.
    #[error("{stage} failed: {message}")]
    CollaboratorFailure { stage: Stage, message: String },
}

impl SimError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }

    pub fn collaborator(stage: Stage, message: impl Into<String>) -> Self {
        Self::CollaboratorFailure {
            stage,
            message: message.into(),
        }
    }

    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, Self::CollaboratorFailure { .. })
    }

    /// Short machine-friendly label for exports and logs.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::InsufficientPopulation { .. } => "insufficient_population",
            Self::InsufficientImplicates { .. } => "insufficient_implicates",
            Self::DataIntegrity(_) => "data_integrity",
            Self::CollaboratorFailure { .. } => "collaborator_failure",
        }
    }
}

/// Which collaborator raised a `CollaboratorFailure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Amputation,
    Imputation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Amputation => write!(f, "amputation"),
            Stage::Imputation => write!(f, "imputation"),
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<SimError> for AppError {
    fn from(err: SimError) -> Self {
        let exit_code = match &err {
            SimError::InvalidParameter(_) | SimError::InsufficientImplicates { .. } => 2,
            SimError::InsufficientPopulation { .. } | SimError::DataIntegrity(_) => 3,
            SimError::CollaboratorFailure { .. } => 4,
        };
        Self::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_errors_map_to_exit_codes() {
        let e: AppError = SimError::invalid("bad").into();
        assert_eq!(e.exit_code(), 2);

        let e: AppError = SimError::InsufficientPopulation {
            requested: 10,
            available: 5,
        }
        .into();
        assert_eq!(e.exit_code(), 3);
        assert!(e.to_string().contains("requested 10"));

        let e: AppError = SimError::collaborator(Stage::Imputation, "boom").into();
        assert_eq!(e.exit_code(), 4);
        assert_eq!(e.to_string(), "imputation failed: boom");
    }
}
