//! appgrid-health: observed state for appgrid.
//!
//! Merges the desired group tree with what the scheduler reports into a
//! finite status per application and per appset, builds the component
//! views callers read, and runs the periodic sweep that fails entities
//! stuck in a transitional state.
//!
//! # Architecture
//!
//! ```text
//! StatusReconciler
//!   ├── classify(SchedulerApp?, queue) → ComponentStatus
//!   └── StatusFold over applications() → AppsetStatus
//!
//! Component (view)
//!   ├── Capabilities from ComponentStatus
//!   └── TaskView[] ← enrich_tasks() fan-out over ContainerNameResolver
//!
//! Sweeper (background loop)
//!   ├── DEPLOYING/WAITING appsets older than stale_after → FAILED
//!   └── REPAIRING records older than stale_after → REPAIR_ACTION_FAILURE
//! ```

pub mod component;
pub mod enrich;
pub mod error;
pub mod status;
pub mod sweeper;

pub use component::{Capabilities, Component, TaskView};
pub use enrich::{ContainerNameResolver, Enrichment, SlaveTaskResolver, enrich_tasks};
pub use error::{HealthError, HealthResult};
pub use status::{StatusFold, StatusReconciler, classify};
pub use sweeper::{SweepReport, Sweeper};
