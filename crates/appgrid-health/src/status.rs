//! Status reconciliation.
//!
//! A component's status is classified from the scheduler's view of the
//! application and the launch queue. An appset's status folds its
//! components with a fixed precedence:
//!
//! ```text
//! FAILED > INCOMPLETE (a suspended component) > WAITING > DEPLOYING
//!        > uniform IDLE / RUNNING (INCOMPLETE if they disagree)
//! ```
//!
//! The result depends only on which statuses occur, never on the order
//! the applications are visited in.

use std::sync::Arc;

use tracing::{debug, warn};

use appgrid_core::Group;
use appgrid_scheduler::{QueueEntry, SchedulerApp, SchedulerClient};
use appgrid_state::{AppsetStatus, ComponentStatus};

use crate::error::HealthResult;

/// Classify one application from its observed state.
///
/// `observed` is `None` when the scheduler has never heard of the app.
pub fn classify(observed: Option<&SchedulerApp>, queue: &[QueueEntry]) -> ComponentStatus {
    let Some(app) = observed else {
        return ComponentStatus::Idle;
    };
    if let Some(entry) = queue.iter().find(|q| q.app_id == app.id) {
        // A queued launch that is not overdue is sitting in retry backoff.
        return if entry.overdue {
            ComponentStatus::Waiting
        } else {
            ComponentStatus::Failed
        };
    }
    if !app.deployments.is_empty() || app.tasks_staged > 0 {
        return ComponentStatus::Deploying;
    }
    if app.tasks_running == 0 && app.instances == 0 {
        return ComponentStatus::Suspended;
    }
    if app.tasks_running >= app.instances {
        return ComponentStatus::Running;
    }
    ComponentStatus::Unknown
}

/// Accumulates component statuses into an appset status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFold {
    failed: bool,
    suspended: bool,
    waiting: bool,
    deploying: bool,
    uniform: Option<ComponentStatus>,
    mixed: bool,
    unknown: usize,
}

impl StatusFold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, status: ComponentStatus) {
        match status {
            ComponentStatus::Failed => self.failed = true,
            ComponentStatus::Suspended => self.suspended = true,
            ComponentStatus::Waiting => self.waiting = true,
            ComponentStatus::Deploying => self.deploying = true,
            ComponentStatus::Idle | ComponentStatus::Running => match self.uniform {
                None => self.uniform = Some(status),
                Some(seen) if seen != status => self.mixed = true,
                Some(_) => {}
            },
            ComponentStatus::Unknown => self.unknown += 1,
        }
    }

    pub fn finish(&self) -> AppsetStatus {
        if self.failed {
            return AppsetStatus::Failed;
        }
        if self.suspended {
            return AppsetStatus::Incomplete;
        }
        if self.waiting {
            return AppsetStatus::Waiting;
        }
        if self.deploying {
            return AppsetStatus::Deploying;
        }
        if self.mixed {
            return AppsetStatus::Incomplete;
        }
        match self.uniform {
            Some(ComponentStatus::Running) => AppsetStatus::Running,
            Some(_) => AppsetStatus::Idle,
            None if self.unknown > 0 => AppsetStatus::Unknown,
            None => AppsetStatus::Idle,
        }
    }
}

impl FromIterator<ComponentStatus> for StatusFold {
    fn from_iter<I: IntoIterator<Item = ComponentStatus>>(iter: I) -> Self {
        let mut fold = Self::new();
        for status in iter {
            fold.push(status);
        }
        fold
    }
}

/// Queries the scheduler to compute live statuses.
#[derive(Clone)]
pub struct StatusReconciler {
    scheduler: Arc<dyn SchedulerClient>,
}

impl StatusReconciler {
    pub fn new(scheduler: Arc<dyn SchedulerClient>) -> Self {
        Self { scheduler }
    }

    /// Status of one application plus the scheduler's view of it.
    pub async fn observe(
        &self,
        app_id: &str,
    ) -> HealthResult<(ComponentStatus, Option<SchedulerApp>)> {
        let observed = self.scheduler.application(app_id).await?;
        let queue = match observed {
            Some(_) => self.scheduler.queue().await?,
            None => Vec::new(),
        };
        let status = classify(observed.as_ref(), &queue);
        if status == ComponentStatus::Unknown {
            warn!(app = %app_id, "component status unknown");
        }
        Ok((status, observed))
    }

    pub async fn component_status(&self, app_id: &str) -> HealthResult<ComponentStatus> {
        Ok(self.observe(app_id).await?.0)
    }

    /// Aggregate status of the tree rooted at `group`.
    ///
    /// An empty tree or one the scheduler has no group for is IDLE without
    /// querying any application.
    pub async fn appset_status(&self, group: &Group) -> HealthResult<AppsetStatus> {
        if group.is_empty() || !self.scheduler.has_group(&group.id).await? {
            return Ok(AppsetStatus::Idle);
        }
        let queue = self.scheduler.queue().await?;
        let mut fold = StatusFold::new();
        for app in group.applications() {
            let observed = self.scheduler.application(&app.id).await?;
            let status = classify(observed.as_ref(), &queue);
            if status == ComponentStatus::Unknown {
                warn!(app = %app.id, "component status unknown, ignored in aggregate");
            }
            fold.push(status);
        }
        let status = fold.finish();
        debug!(group = %group.id, %status, "appset status reconciled");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appgrid_core::Application;
    use appgrid_scheduler::InMemoryScheduler;
    use std::time::Duration;

    use ComponentStatus::*;

    fn observed(instances: u32, running: u32) -> SchedulerApp {
        SchedulerApp {
            id: "/shop/web".to_string(),
            instances,
            tasks_running: running,
            ..SchedulerApp::default()
        }
    }

    fn fold(statuses: &[ComponentStatus]) -> AppsetStatus {
        statuses.iter().copied().collect::<StatusFold>().finish()
    }

    #[test]
    fn classify_unknown_app_is_idle() {
        assert_eq!(classify(None, &[]), Idle);
    }

    #[test]
    fn classify_queue_entries() {
        let app = observed(2, 0);
        let overdue = [QueueEntry { app_id: app.id.clone(), overdue: true }];
        let backoff = [QueueEntry { app_id: app.id.clone(), overdue: false }];
        let other = [QueueEntry { app_id: "/blog/api".to_string(), overdue: true }];
        assert_eq!(classify(Some(&app), &overdue), Waiting);
        assert_eq!(classify(Some(&app), &backoff), Failed);
        assert_eq!(classify(Some(&app), &other), Unknown);
    }

    #[test]
    fn classify_deploying_suspended_running() {
        let mut app = observed(2, 1);
        app.deployments.push("dep-1".to_string());
        assert_eq!(classify(Some(&app), &[]), Deploying);

        let mut staged = observed(2, 2);
        staged.tasks_staged = 1;
        assert_eq!(classify(Some(&staged), &[]), Deploying);

        assert_eq!(classify(Some(&observed(0, 0)), &[]), Suspended);
        assert_eq!(classify(Some(&observed(2, 2)), &[]), Running);
        assert_eq!(classify(Some(&observed(2, 3)), &[]), Running);
        assert_eq!(classify(Some(&observed(3, 1)), &[]), Unknown);
    }

    #[test]
    fn failed_wins_in_either_order() {
        assert_eq!(fold(&[Running, Failed]), AppsetStatus::Failed);
        assert_eq!(fold(&[Failed, Running]), AppsetStatus::Failed);
    }

    #[test]
    fn failed_beats_suspended_regardless_of_order() {
        assert_eq!(fold(&[Suspended, Failed]), AppsetStatus::Failed);
        assert_eq!(fold(&[Failed, Suspended]), AppsetStatus::Failed);
    }

    #[test]
    fn suspended_makes_incomplete_over_transitional() {
        assert_eq!(fold(&[Suspended, Deploying]), AppsetStatus::Incomplete);
        assert_eq!(fold(&[Waiting, Suspended]), AppsetStatus::Incomplete);
    }

    #[test]
    fn waiting_beats_deploying() {
        assert_eq!(fold(&[Deploying, Waiting]), AppsetStatus::Waiting);
        assert_eq!(fold(&[Waiting, Deploying]), AppsetStatus::Waiting);
        assert_eq!(fold(&[Running, Deploying]), AppsetStatus::Deploying);
    }

    #[test]
    fn uniform_and_mixed_idle_running() {
        assert_eq!(fold(&[Running, Running]), AppsetStatus::Running);
        assert_eq!(fold(&[Idle, Idle]), AppsetStatus::Idle);
        assert_eq!(fold(&[Running, Idle]), AppsetStatus::Incomplete);
        assert_eq!(fold(&[Idle, Running, Deploying]), AppsetStatus::Deploying);
    }

    #[test]
    fn unknown_components_are_ignored() {
        assert_eq!(fold(&[Unknown, Running]), AppsetStatus::Running);
        assert_eq!(fold(&[Unknown, Unknown]), AppsetStatus::Unknown);
        assert_eq!(fold(&[]), AppsetStatus::Idle);
    }

    fn shop() -> Group {
        let mut group = Group::new("/shop");
        group.apps.push(Application::new("/shop/web", 2));
        group.apps.push(Application::new("/shop/api", 1));
        group
    }

    #[tokio::test]
    async fn appset_status_follows_scheduler() {
        let scheduler = InMemoryScheduler::new();
        let reconciler = StatusReconciler::new(Arc::new(scheduler.clone()));
        let group = shop();

        assert_eq!(reconciler.appset_status(&group).await.unwrap(), AppsetStatus::Idle);

        let dep = scheduler.create_group(&group).await.unwrap();
        assert_eq!(
            reconciler.appset_status(&group).await.unwrap(),
            AppsetStatus::Deploying
        );

        scheduler
            .wait_on_deployment(&dep, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            reconciler.appset_status(&group).await.unwrap(),
            AppsetStatus::Running
        );

        scheduler.push_queue("/shop/api", true).await;
        assert_eq!(
            reconciler.appset_status(&group).await.unwrap(),
            AppsetStatus::Waiting
        );
        assert_eq!(reconciler.component_status("/shop/api").await.unwrap(), Waiting);
        assert_eq!(reconciler.component_status("/shop/web").await.unwrap(), Running);
    }

    #[tokio::test]
    async fn empty_tree_is_idle_even_with_scheduler_group() {
        let scheduler = InMemoryScheduler::new();
        let empty = Group::new("/empty");
        scheduler.create_group(&empty).await.unwrap();
        let reconciler = StatusReconciler::new(Arc::new(scheduler));
        assert_eq!(reconciler.appset_status(&empty).await.unwrap(), AppsetStatus::Idle);
    }

    #[tokio::test]
    async fn suspended_component_makes_appset_incomplete() {
        let scheduler = InMemoryScheduler::new();
        let group = shop();
        scheduler.create_group(&group).await.unwrap();
        scheduler.complete_deployments().await;
        scheduler.scale_application("/shop/api", 0).await.unwrap();
        scheduler.complete_deployments().await;

        let reconciler = StatusReconciler::new(Arc::new(scheduler));
        assert_eq!(reconciler.component_status("/shop/api").await.unwrap(), Suspended);
        assert_eq!(
            reconciler.appset_status(&group).await.unwrap(),
            AppsetStatus::Incomplete
        );
    }
}
