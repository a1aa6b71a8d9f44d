//! Error types for the planner core.

use crate::planner::ContainerAttempt;

/// Errors loading or validating a compatibility matrix.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("failed to read matrix file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML matrix: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON matrix: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid matrix: {0}")]
    Invalid(String),
}

/// Errors a planning run can end with.
///
/// Only [`PlanError::Rejected`] is expected in normal operation; the batch
/// driver logs it and moves on to the next file.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// No candidate container produced an acceptable plan.
    #[error("no container accepted {file}: {}", describe_attempts(attempts))]
    Rejected {
        file: String,
        attempts: Vec<ContainerAttempt>,
    },

    /// Shared planning data was modified while planning. This is a bug.
    #[error("shared planning state violated: {0}")]
    SharedStateViolation(String),

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

fn describe_attempts(attempts: &[ContainerAttempt]) -> String {
    if attempts.is_empty() {
        return "no candidate containers".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
