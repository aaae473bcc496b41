//! Scheduler client contract and the observed-state types it returns.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use appgrid_core::{Application, Group};

use crate::error::SchedulerResult;

/// Boxed future alias used by the client trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque id of a scheduler rollout.
pub type DeploymentId = String;

/// Scheduler-observed state of one application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerApp {
    pub id: String,
    /// Desired instance count as the scheduler currently sees it.
    pub instances: u32,
    pub tasks_running: u32,
    pub tasks_staged: u32,
    pub tasks_healthy: u32,
    pub tasks_unhealthy: u32,
    /// Ids of deployments still rolling this app out.
    #[serde(default)]
    pub deployments: Vec<DeploymentId>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// One running or staged instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// `<appset>[_<group>]_<app>.<uuid>`
    pub id: String,
    pub app_id: String,
    pub host: String,
    pub slave_id: String,
    pub state: String,
    #[serde(default)]
    pub started_at: Option<u64>,
}

/// A launch the scheduler has accepted but not yet placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub app_id: String,
    /// Whether the launch has waited longer than its backoff allows.
    pub overdue: bool,
}

/// Flags for [`SchedulerClient::kill_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KillOptions {
    /// Also decrement the app's desired instance count.
    pub scale: bool,
    /// Override a locked app (one with a deployment in progress).
    pub force: bool,
}

/// Operations appgrid needs from the scheduler.
///
/// Writes return the id of the deployment they started; callers decide
/// whether to block on it with [`SchedulerClient::wait_on_deployment`].
pub trait SchedulerClient: Send + Sync {
    fn has_group<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SchedulerResult<bool>>;

    fn create_group<'a>(&'a self, group: &'a Group) -> BoxFuture<'a, SchedulerResult<DeploymentId>>;

    fn update_group<'a>(&'a self, group: &'a Group) -> BoxFuture<'a, SchedulerResult<DeploymentId>>;

    fn delete_group<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SchedulerResult<DeploymentId>>;

    /// Observed state of an application, `None` if the scheduler has never heard of it.
    fn application<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SchedulerResult<Option<SchedulerApp>>>;

    fn create_application<'a>(
        &'a self,
        app: &'a Application,
    ) -> BoxFuture<'a, SchedulerResult<DeploymentId>>;

    fn update_application<'a>(
        &'a self,
        app: &'a Application,
    ) -> BoxFuture<'a, SchedulerResult<DeploymentId>>;

    fn delete_application<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SchedulerResult<DeploymentId>>;

    fn scale_application<'a>(
        &'a self,
        id: &'a str,
        instances: u32,
    ) -> BoxFuture<'a, SchedulerResult<DeploymentId>>;

    /// Launches waiting for resources.
    fn queue(&self) -> BoxFuture<'_, SchedulerResult<Vec<QueueEntry>>>;

    /// Block until the deployment completes, fails, or `timeout` elapses.
    fn wait_on_deployment<'a>(
        &'a self,
        id: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, SchedulerResult<()>>;

    fn kill_task<'a>(&'a self, task_id: &'a str, options: KillOptions) -> BoxFuture<'a, SchedulerResult<()>>;
}
