//! appgrid-scheduler: the boundary between appgrid and the container
//! scheduler.
//!
//! The scheduler owns the live group/app tree: it deploys groups,
//! scales applications, queues launches it cannot place yet, and tracks
//! each rollout as a deployment that callers can block on.
//!
//! # Architecture
//!
//! ```text
//! SchedulerClient (trait, boxed Send futures)
//!   ├── groups: has / create / update / delete
//!   ├── apps: get / create / update / delete / scale
//!   ├── queue() → launches waiting for offers
//!   ├── wait_on_deployment(id, timeout)
//!   └── kill_task(task_id, {scale, force})
//!
//! InMemoryScheduler
//!   └── simulated scheduler used by the daemon's standalone mode and tests
//! ```

pub mod client;
pub mod error;
pub mod memory;

pub use client::{BoxFuture, DeploymentId, KillOptions, QueueEntry, SchedulerApp, SchedulerClient, Task};
pub use error::{SchedulerError, SchedulerResult};
pub use memory::{Faults, InMemoryScheduler};
