//! Manager errors and their caller-facing categories.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use appgrid_core::{PathError, TreeError};
use appgrid_health::HealthError;
use appgrid_scheduler::SchedulerError;
use appgrid_state::{Appset, Document, StateError};

/// Coarse error class reported to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Conflict,
    NotFound,
    Upstream,
    Storage,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Upstream => "upstream",
            Self::Storage => "storage",
            Self::Internal => "internal",
        })
    }
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("appset {0} already exists")]
    AppsetExists(String),

    #[error("service port {port} of {app} is already claimed by {owner}")]
    PortConflict { port: u16, app: String, owner: String },

    #[error("appset {0} was modified concurrently, retry")]
    Concurrent(String),

    #[error("cannot {op} {id} while it is {status}")]
    NotAllowed {
        op: &'static str,
        id: String,
        status: String,
    },

    #[error("appset not found: {0}")]
    AppsetNotFound(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    State(StateError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ManagerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::Path(_) => ErrorCategory::Validation,
            Self::Tree(TreeError::Path(_)) => ErrorCategory::Validation,
            Self::Tree(TreeError::NotFound(_)) => ErrorCategory::NotFound,
            Self::Tree(TreeError::AlreadyExists(_) | TreeError::OutsideGroup { .. }) => {
                ErrorCategory::Conflict
            }
            Self::AppsetExists(_)
            | Self::PortConflict { .. }
            | Self::Concurrent(_)
            | Self::NotAllowed { .. } => ErrorCategory::Conflict,
            Self::AppsetNotFound(_) => ErrorCategory::NotFound,
            Self::Scheduler(_) => ErrorCategory::Upstream,
            Self::State(_) => ErrorCategory::Storage,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<StateError> for ManagerError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::VersionConflict { key, .. } => Self::Concurrent(key),
            StateError::AlreadyExists { collection, key } if collection == Appset::COLLECTION => {
                Self::AppsetExists(key)
            }
            StateError::NotFound { collection, key } if collection == Appset::COLLECTION => {
                Self::AppsetNotFound(key)
            }
            other => Self::State(other),
        }
    }
}

impl From<HealthError> for ManagerError {
    fn from(e: HealthError) -> Self {
        match e {
            HealthError::Scheduler(e) => e.into(),
            HealthError::State(e) => e.into(),
            HealthError::Aggregator(msg) => Self::Internal(msg),
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(
            ManagerError::from(PathError::InvalidName("Bad".into())).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            ManagerError::from(TreeError::NotFound("/shop/x".into())).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            ManagerError::from(TreeError::OutsideGroup {
                id: "/blog/x".into(),
                group: "/shop".into()
            })
            .category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            ManagerError::from(SchedulerError::Unavailable("down".into())).category(),
            ErrorCategory::Upstream
        );
        assert_eq!(
            ManagerError::from(StateError::Write("disk".into())).category(),
            ErrorCategory::Storage
        );
    }

    #[test]
    fn version_conflicts_surface_as_concurrent() {
        let err = ManagerError::from(StateError::VersionConflict {
            key: "shop".into(),
            expected: 1,
            found: 2,
        });
        assert!(matches!(err, ManagerError::Concurrent(ref k) if k == "shop"));
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn only_appset_lookups_map_to_appset_errors() {
        let err = ManagerError::from(StateError::NotFound {
            collection: "appsets",
            key: "shop".into(),
        });
        assert!(matches!(err, ManagerError::AppsetNotFound(ref k) if k == "shop"));

        let err = ManagerError::from(StateError::AlreadyExists {
            collection: "repair_records",
            key: "r-1".into(),
        });
        assert!(matches!(err, ManagerError::State(StateError::AlreadyExists { .. })));
        assert_eq!(err.category(), ErrorCategory::Storage);

        let err = ManagerError::from(StateError::NotFound {
            collection: "repair_policies",
            key: "/shop/web".into(),
        });
        assert!(matches!(err, ManagerError::State(_)));
    }

    #[test]
    fn health_errors_unwrap_to_their_source() {
        let err = ManagerError::from(HealthError::Scheduler(SchedulerError::Timeout("d".into())));
        assert_eq!(err.category(), ErrorCategory::Upstream);
    }
}
