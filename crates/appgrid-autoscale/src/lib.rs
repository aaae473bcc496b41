//! appgrid-autoscale: alert-driven repair for appgrid.
//!
//! Derives a [`RepairPolicy`](appgrid_state::RepairPolicy) for every
//! application that opts in through its environment, and turns resource
//! alerts into bounded scale operations against the scheduler.
//!
//! # Repair Algorithm
//!
//! ```text
//! step     = SCALESTEP of the first action of the policy matching the alert
//! proposed = max(current_instances + step, 0)
//!
//! if max set and proposed > max:
//!     current != max → ScaleTo(max), partial
//!     current == max → DoNothingMax
//! if min set and proposed < min:
//!     current != min → ScaleTo(min), partial
//!     current == min → DoNothingMin
//! else ScaleTo(proposed)
//! ```
//!
//! A successful scale reports PARTIALSUCCESS when clamped, otherwise
//! SUCCESS_OUT (grew) or SUCCESS_IN. Every attempt is recorded as a
//! `RepairRecord` and its result code is sent back to the alert source.

pub mod clamp;
pub mod error;
pub mod notifier;
pub mod orchestrator;
pub mod policy;

pub use clamp::{ScaleCheck, Verdict, check_scale_number};
pub use error::{RepairError, RepairResult};
pub use notifier::{AlertNotifier, LogNotifier};
pub use orchestrator::{Alert, RepairOrchestrator, RepairOutcome};
pub use policy::{
    HIGH_CPU_ALERT, HIGH_MEMORY_ALERT, LOW_CPU_ALERT, LOW_MEMORY_ALERT, PolicyManager, analyze_alert,
    derive_policy, repair_template_id,
};
