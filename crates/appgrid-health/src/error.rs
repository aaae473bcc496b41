use thiserror::Error;

use appgrid_scheduler::SchedulerError;
use appgrid_state::StateError;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("enrichment aggregator failed: {0}")]
    Aggregator(String),
}

pub type HealthResult<T> = Result<T, HealthError>;
