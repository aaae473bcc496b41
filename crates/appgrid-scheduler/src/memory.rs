//! In-memory scheduler.
//!
//! Keeps a flat map of applications plus the set of known group ids and
//! simulates rollouts: every write starts a deployment that stays pending
//! (the app reports it under `deployments`) until someone waits on it, at
//! which point each affected app's tasks converge to its desired count.
//!
//! [`Faults`] lets tests make writes fail, deployments fail, or waits hang
//! until their timeout.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use appgrid_core::path;
use appgrid_core::{Application, Group};

use crate::client::*;
use crate::error::{SchedulerError, SchedulerResult};

const SIMULATED_AGENTS: u32 = 3;

/// Failure injection switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Faults {
    /// Every write call fails with `Rejected`.
    pub reject_writes: bool,
    /// Waiting on any deployment reports `DeploymentFailed`.
    pub fail_deployments: bool,
    /// Waiting on any deployment sleeps for the full timeout, then times out.
    pub hang_deployments: bool,
}

struct SimApp {
    spec: Application,
    tasks: Vec<Task>,
    staged: u32,
}

#[derive(Default)]
struct Inner {
    groups: BTreeSet<String>,
    apps: BTreeMap<String, SimApp>,
    /// deployment id → ids of the apps it rolls out.
    deployments: BTreeMap<DeploymentId, Vec<String>>,
    queue: Vec<QueueEntry>,
    faults: Faults,
    launched: u32,
}

/// A scheduler that lives entirely in process memory.
#[derive(Clone, Default)]
pub struct InMemoryScheduler {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active failure switches.
    pub async fn set_faults(&self, faults: Faults) {
        self.inner.write().await.faults = faults;
    }

    /// Put a launch for `app_id` into the queue.
    pub async fn push_queue(&self, app_id: &str, overdue: bool) {
        self.inner.write().await.queue.push(QueueEntry {
            app_id: app_id.to_string(),
            overdue,
        });
    }

    pub async fn clear_queue(&self) {
        self.inner.write().await.queue.clear();
    }

    /// Force the observed task counts of an app.
    pub async fn set_tasks(&self, app_id: &str, running: u32, staged: u32) -> SchedulerResult<()> {
        let mut inner = self.inner.write().await;
        let launched = inner.launched;
        let app = inner
            .apps
            .get_mut(app_id)
            .ok_or_else(|| SchedulerError::NotFound(app_id.to_string()))?;
        resize_tasks(app, running, launched);
        app.staged = staged;
        inner.launched += running;
        Ok(())
    }

    /// Finish every pending deployment successfully.
    pub async fn complete_deployments(&self) {
        let mut inner = self.inner.write().await;
        let ids: Vec<DeploymentId> = inner.deployments.keys().cloned().collect();
        for id in ids {
            inner.complete(&id);
        }
    }

    /// Number of deployments still pending.
    pub async fn pending_deployments(&self) -> usize {
        self.inner.read().await.deployments.len()
    }
}

impl Inner {
    fn check_writable(&self, what: &str) -> SchedulerResult<()> {
        if self.faults.reject_writes {
            warn!(%what, "simulated scheduler rejecting write");
            return Err(SchedulerError::Rejected {
                status: 422,
                message: format!("{what} rejected"),
            });
        }
        Ok(())
    }

    fn start_deployment(&mut self, apps: Vec<String>) -> DeploymentId {
        let id = uuid::Uuid::now_v7().to_string();
        debug!(deployment = %id, apps = apps.len(), "deployment started");
        self.deployments.insert(id.clone(), apps);
        id
    }

    fn register_group(&mut self, group: &Group) -> Vec<String> {
        let mut app_ids = Vec::new();
        self.groups.insert(group.id.clone());
        for app in &group.apps {
            self.upsert_app(app);
            app_ids.push(app.id.clone());
        }
        for child in &group.groups {
            app_ids.extend(self.register_group(child));
        }
        app_ids
    }

    fn register_ancestors(&mut self, app_id: &str) {
        let mut parent = path::parent(app_id);
        while parent.len() > 1 {
            self.groups.insert(parent.clone());
            parent = path::parent(&parent);
        }
    }

    fn upsert_app(&mut self, app: &Application) {
        match self.apps.get_mut(&app.id) {
            Some(existing) => existing.spec = app.clone(),
            None => {
                self.apps.insert(
                    app.id.clone(),
                    SimApp {
                        spec: app.clone(),
                        tasks: Vec::new(),
                        staged: 0,
                    },
                );
            }
        }
    }

    fn remove_under(&mut self, prefix: &str) {
        self.groups
            .retain(|g| g != prefix && !path::is_descendant(g, prefix));
        self.apps.retain(|id, _| !path::is_descendant(id, prefix));
        self.queue.retain(|q| !path::is_descendant(&q.app_id, prefix));
    }

    fn complete(&mut self, deployment_id: &str) {
        let Some(app_ids) = self.deployments.remove(deployment_id) else {
            return;
        };
        for app_id in app_ids {
            let launched = self.launched;
            if let Some(app) = self.apps.get_mut(&app_id) {
                let target = app.spec.instances;
                resize_tasks(app, target, launched);
                app.staged = 0;
                self.launched += target;
            }
        }
        debug!(deployment = %deployment_id, "deployment completed");
    }

    fn observe(&self, id: &str) -> Option<SchedulerApp> {
        let app = self.apps.get(id)?;
        let deployments = self
            .deployments
            .iter()
            .filter(|(_, apps)| apps.iter().any(|a| a == id))
            .map(|(dep, _)| dep.clone())
            .collect();
        let running = app.tasks.len() as u32;
        Some(SchedulerApp {
            id: id.to_string(),
            instances: app.spec.instances,
            tasks_running: running,
            tasks_staged: app.staged,
            tasks_healthy: running,
            tasks_unhealthy: 0,
            deployments,
            tasks: app.tasks.clone(),
        })
    }

    fn is_locked(&self, app_id: &str) -> bool {
        self.deployments
            .values()
            .any(|apps| apps.iter().any(|a| a == app_id))
    }
}

fn resize_tasks(app: &mut SimApp, target: u32, launched: u32) {
    let target = target as usize;
    if app.tasks.len() > target {
        app.tasks.truncate(target);
        return;
    }
    let encoded = app.spec.id.trim_start_matches('/').replace('/', "_");
    let mut n = launched;
    while app.tasks.len() < target {
        let agent = n % SIMULATED_AGENTS;
        app.tasks.push(Task {
            id: format!("{encoded}.{}", uuid::Uuid::now_v7()),
            app_id: app.spec.id.clone(),
            host: format!("agent-{agent}.sim"),
            slave_id: format!("sim-S{agent}"),
            state: "TASK_RUNNING".to_string(),
            started_at: Some(epoch_secs()),
        });
        n += 1;
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl SchedulerClient for InMemoryScheduler {
    fn has_group<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SchedulerResult<bool>> {
        Box::pin(async move { Ok(self.inner.read().await.groups.contains(id)) })
    }

    fn create_group<'a>(&'a self, group: &'a Group) -> BoxFuture<'a, SchedulerResult<DeploymentId>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.check_writable("create group")?;
            if inner.groups.contains(&group.id) {
                return Err(SchedulerError::Rejected {
                    status: 409,
                    message: format!("group {} already exists", group.id),
                });
            }
            let app_ids = inner.register_group(group);
            info!(group = %group.id, apps = app_ids.len(), "group created");
            Ok(inner.start_deployment(app_ids))
        })
    }

    fn update_group<'a>(&'a self, group: &'a Group) -> BoxFuture<'a, SchedulerResult<DeploymentId>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.check_writable("update group")?;
            if !inner.groups.contains(&group.id) {
                return Err(SchedulerError::NotFound(group.id.clone()));
            }
            let keep: BTreeSet<String> = group.applications().iter().map(|a| a.id.clone()).collect();
            inner
                .apps
                .retain(|id, _| !path::is_descendant(id, &group.id) || keep.contains(id));
            let app_ids = inner.register_group(group);
            info!(group = %group.id, apps = app_ids.len(), "group updated");
            Ok(inner.start_deployment(app_ids))
        })
    }

    fn delete_group<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SchedulerResult<DeploymentId>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.check_writable("delete group")?;
            if !inner.groups.contains(id) {
                return Err(SchedulerError::NotFound(id.to_string()));
            }
            inner.remove_under(id);
            info!(group = %id, "group deleted");
            Ok(inner.start_deployment(Vec::new()))
        })
    }

    fn application<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SchedulerResult<Option<SchedulerApp>>> {
        Box::pin(async move { Ok(self.inner.read().await.observe(id)) })
    }

    fn create_application<'a>(
        &'a self,
        app: &'a Application,
    ) -> BoxFuture<'a, SchedulerResult<DeploymentId>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.check_writable("create application")?;
            if inner.apps.contains_key(&app.id) {
                return Err(SchedulerError::Rejected {
                    status: 409,
                    message: format!("application {} already exists", app.id),
                });
            }
            inner.register_ancestors(&app.id);
            inner.upsert_app(app);
            info!(app = %app.id, instances = app.instances, "application created");
            Ok(inner.start_deployment(vec![app.id.clone()]))
        })
    }

    fn update_application<'a>(
        &'a self,
        app: &'a Application,
    ) -> BoxFuture<'a, SchedulerResult<DeploymentId>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.check_writable("update application")?;
            if !inner.apps.contains_key(&app.id) {
                return Err(SchedulerError::NotFound(app.id.clone()));
            }
            inner.upsert_app(app);
            info!(app = %app.id, "application updated");
            Ok(inner.start_deployment(vec![app.id.clone()]))
        })
    }

    fn delete_application<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SchedulerResult<DeploymentId>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.check_writable("delete application")?;
            if inner.apps.remove(id).is_none() {
                return Err(SchedulerError::NotFound(id.to_string()));
            }
            inner.queue.retain(|q| q.app_id != id);
            info!(app = %id, "application deleted");
            Ok(inner.start_deployment(Vec::new()))
        })
    }

    fn scale_application<'a>(
        &'a self,
        id: &'a str,
        instances: u32,
    ) -> BoxFuture<'a, SchedulerResult<DeploymentId>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.check_writable("scale application")?;
            let app = inner
                .apps
                .get_mut(id)
                .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
            let from = app.spec.instances;
            app.spec.instances = instances;
            info!(app = %id, from, to = instances, "application scaled");
            Ok(inner.start_deployment(vec![id.to_string()]))
        })
    }

    fn queue(&self) -> BoxFuture<'_, SchedulerResult<Vec<QueueEntry>>> {
        Box::pin(async move { Ok(self.inner.read().await.queue.clone()) })
    }

    fn wait_on_deployment<'a>(
        &'a self,
        id: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, SchedulerResult<()>> {
        Box::pin(async move {
            let faults = {
                let inner = self.inner.read().await;
                if !inner.deployments.contains_key(id) {
                    return Ok(());
                }
                inner.faults
            };
            if faults.hang_deployments {
                tokio::time::sleep(timeout).await;
                return Err(SchedulerError::Timeout(id.to_string()));
            }
            let mut inner = self.inner.write().await;
            if faults.fail_deployments {
                inner.deployments.remove(id);
                return Err(SchedulerError::DeploymentFailed(id.to_string()));
            }
            inner.complete(id);
            Ok(())
        })
    }

    fn kill_task<'a>(&'a self, task_id: &'a str, options: KillOptions) -> BoxFuture<'a, SchedulerResult<()>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.check_writable("kill task")?;
            let app_id = inner
                .apps
                .iter()
                .find(|(_, app)| app.tasks.iter().any(|t| t.id == task_id))
                .map(|(id, _)| id.clone())
                .ok_or_else(|| SchedulerError::NotFound(task_id.to_string()))?;
            if inner.is_locked(&app_id) && !options.force {
                return Err(SchedulerError::Rejected {
                    status: 409,
                    message: format!("application {app_id} is locked by a deployment"),
                });
            }
            if let Some(app) = inner.apps.get_mut(&app_id) {
                app.tasks.retain(|t| t.id != task_id);
                if options.scale {
                    app.spec.instances = app.spec.instances.saturating_sub(1);
                }
            }
            info!(task = %task_id, app = %app_id, scale = options.scale, "task killed");
            Ok(())
        })
    }
}
