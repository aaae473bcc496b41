use thiserror::Error;

use appgrid_scheduler::SchedulerError;
use appgrid_state::StateError;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("invalid {field}: {value:?} is not an instance count")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid scale step {0:?}")]
    InvalidStep(String),

    #[error("policy sets neither an instance maximum nor a minimum")]
    Unbounded,

    #[error("no repair policy for {0}")]
    NoPolicy(String),

    #[error("application {0} is not deployed")]
    NotDeployed(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    State(#[from] StateError),
}

pub type RepairResult<T> = Result<T, RepairError>;
