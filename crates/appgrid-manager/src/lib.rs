//! appgrid-manager: appset lifecycle for appgrid.
//!
//! [`AppsetManager`] is the service every caller goes through. It owns no
//! global state: the store, the scheduler client and the collaborators it
//! needs are handed to it once at startup.
//!
//! # Write discipline
//!
//! ```text
//! read Appset (version v)
//!   → validate / canonicalize / conflict-check in memory
//!   → scheduler write (if the appset is deployed)
//!   → replace_appset (fails if someone else wrote v+1 meanwhile)
//!   → repair policy refresh (failures logged, never fatal)
//! ```
//!
//! When the scheduler rejects a write nothing is persisted; when the
//! store write fails after the scheduler accepted, the scheduler write is
//! undone where an inverse exists.

pub mod conflict;
pub mod error;
pub mod service;

pub use conflict::{ConflictDetector, PortClaim, find_conflict};
pub use error::{ErrorCategory, ManagerError, ManagerResult};
pub use service::{AppsetManager, CreateAppset, UpdateAppset};
