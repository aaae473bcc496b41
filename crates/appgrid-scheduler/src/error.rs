//! Scheduler error types.

use thiserror::Error;

/// Errors returned by a scheduler client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("not found on scheduler: {0}")]
    NotFound(String),

    #[error("scheduler rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("timed out waiting for deployment: {0}")]
    Timeout(String),

    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
}

impl SchedulerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
