use thiserror::Error;

/// Failures surfaced by session operations. Only `Validation` aborts an
/// import; the others are reported and the session carries on. Per-entry
/// archive problems are `archive::ExtractionError` and never reach here.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("{0}")]
    Validation(String),
    #[error("ledger inconsistency: {0}")]
    LedgerInconsistency(String),
    #[error("change {0} is informational and cannot be reverted")]
    NotRevertible(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    ExternalService(#[from] crate::commentary::CommentaryError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl GradingError {
    pub fn code(&self) -> &'static str {
        match self {
            GradingError::Validation(_) => "validation_failed",
            GradingError::LedgerInconsistency(_) => "ledger_inconsistency",
            GradingError::NotRevertible(_) => "not_revertible",
            GradingError::NotFound(_) => "not_found",
            GradingError::ExternalService(_) => "external_service",
            GradingError::Io(_) => "io_failed",
        }
    }
}

pub type GradingResult<T> = Result<T, GradingError>;
