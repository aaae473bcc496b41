//! AppsetManager: appset and component operations.
//!
//! Every mutation reads the whole appset, changes it in memory, writes the
//! scheduler if the appset is deployed, and replaces the stored document
//! with a version check. Status is never trusted from the store on read:
//! it is recomputed from the scheduler each time.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use appgrid_autoscale::PolicyManager;
use appgrid_core::path;
use appgrid_health::{
    Capabilities, Component, ContainerNameResolver, SlaveTaskResolver, StatusReconciler,
    enrich_tasks,
};
use appgrid_scheduler::{KillOptions, SchedulerApp, SchedulerClient, SchedulerError};
use appgrid_state::*;

use crate::conflict::ConflictDetector;
use crate::error::{ManagerError, ManagerResult};

const DEFAULT_DEPLOYMENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Input for [`AppsetManager::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateAppset {
    pub name: String,
    pub description: String,
    pub template_id: String,
    /// A whole tree supplied up front. Without one the appset starts empty
    /// and is built component by component.
    pub group: Option<Group>,
}

/// Input for [`AppsetManager::update`]. `None` fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct UpdateAppset {
    pub description: Option<String>,
    pub template_id: Option<String>,
    pub group: Option<Group>,
}

pub struct AppsetManager {
    state: StateStore,
    scheduler: Arc<dyn SchedulerClient>,
    reconciler: StatusReconciler,
    policies: PolicyManager,
    conflicts: ConflictDetector,
    resolver: Arc<dyn ContainerNameResolver>,
    deployment_timeout: Duration,
}

impl AppsetManager {
    pub fn new(state: StateStore, scheduler: Arc<dyn SchedulerClient>) -> Self {
        Self {
            reconciler: StatusReconciler::new(scheduler.clone()),
            policies: PolicyManager::new(state.clone()),
            conflicts: ConflictDetector::new(state.clone()),
            resolver: Arc::new(SlaveTaskResolver),
            deployment_timeout: DEFAULT_DEPLOYMENT_TIMEOUT,
            state,
            scheduler,
        }
    }

    /// Set the resolver used to annotate task views.
    pub fn with_resolver(mut self, resolver: Arc<dyn ContainerNameResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set how long blocking operations wait for a deployment.
    pub fn with_deployment_timeout(mut self, timeout: Duration) -> Self {
        self.deployment_timeout = timeout;
        self
    }

    // ── Appsets ────────────────────────────────────────────────────

    /// Validate, conflict-check, canonicalize and persist a new appset.
    pub async fn create(&self, request: CreateAppset) -> ManagerResult<Appset> {
        let name = request.name;
        path::validate_appset_name(&name)?;
        if self.state.get_appset(&name)?.is_some() {
            return Err(ManagerError::AppsetExists(name));
        }
        let created_by_json = request.group.is_some();
        let group = root_tree(&name, request.group.unwrap_or_default())?;
        self.conflicts.check_tree(&name, &group)?;

        let mut appset = Appset::new(name, group);
        appset.description = request.description;
        appset.template_id = request.template_id;
        appset.created_by_json = created_by_json;
        self.state.insert(&appset)?;
        info!(appset = %appset.name, apps = appset.group.app_count(), created_by_json, "appset created");

        self.refresh_policies(&appset);
        Ok(appset)
    }

    /// Load an appset with its status recomputed from the scheduler.
    pub async fn get(&self, name: &str) -> ManagerResult<Appset> {
        let mut appset = self.load(name)?;
        self.refresh_status(&mut appset).await?;
        Ok(appset)
    }

    /// A page of appsets in name order, each with a fresh status.
    pub async fn list(&self, page: Page) -> ManagerResult<(usize, Vec<Appset>)> {
        let (total, mut appsets) =
            self.state
                .query_all::<Appset>(&Selector::All, page, Some(&Sort::asc("name")))?;
        for appset in &mut appsets {
            self.refresh_status(appset).await?;
        }
        Ok((total, appsets))
    }

    /// Create the appset's group on the scheduler. Does not wait for the
    /// rollout; the status reads DEPLOYING until it finishes.
    pub async fn start(&self, name: &str) -> ManagerResult<Appset> {
        let mut appset = self.load(name)?;
        if appset.group.is_empty() {
            return Err(ManagerError::Validation(format!(
                "appset {name} has no components"
            )));
        }
        if self.scheduler.has_group(&appset.group.id).await? {
            let status = self.reconciler.appset_status(&appset.group).await?;
            return Err(ManagerError::NotAllowed {
                op: "start",
                id: name.to_string(),
                status: status.to_string(),
            });
        }
        let deployment = self.scheduler.create_group(&appset.group).await?;
        appset.status = AppsetStatus::Deploying;
        if let Err(e) = self.state.replace_appset(&mut appset) {
            self.undo_create_group(&appset.group.id).await;
            return Err(e.into());
        }
        info!(appset = %name, %deployment, "appset started");
        Ok(appset)
    }

    /// Tear down the appset's scheduler group. The document is kept.
    pub async fn stop(&self, name: &str) -> ManagerResult<Appset> {
        let mut appset = self.load(name)?;
        if !self.scheduler.has_group(&appset.group.id).await? {
            return Err(ManagerError::NotAllowed {
                op: "stop",
                id: name.to_string(),
                status: AppsetStatus::Idle.to_string(),
            });
        }
        let deployment = self.scheduler.delete_group(&appset.group.id).await?;
        self.wait(&deployment, "stop").await?;
        appset.status = AppsetStatus::Idle;
        self.state.replace_appset(&mut appset)?;
        info!(appset = %name, "appset stopped");
        Ok(appset)
    }

    /// Change metadata and/or replace the whole tree.
    pub async fn update(&self, name: &str, request: UpdateAppset) -> ManagerResult<Appset> {
        let mut appset = self.load(name)?;
        if let Some(description) = request.description {
            appset.description = description;
        }
        if let Some(template_id) = request.template_id {
            appset.template_id = template_id;
        }
        let mut redeployed = None;
        if let Some(group) = request.group {
            let group = root_tree(name, group)?;
            self.conflicts.check_tree(name, &group)?;
            if self.scheduler.has_group(&group.id).await? {
                let deployment = self.scheduler.update_group(&group).await?;
                redeployed = Some(appset.group.clone());
                self.wait(&deployment, "update").await?;
                appset.status = AppsetStatus::Deploying;
            }
            appset.group = group;
            appset.created_by_json = true;
        }
        if let Err(e) = self.state.replace_appset(&mut appset) {
            if let Some(previous) = &redeployed {
                self.undo(self.scheduler.update_group(previous).await, &previous.id);
            }
            return Err(e.into());
        }
        info!(appset = %name, version = appset.version, "appset updated");

        self.refresh_policies(&appset);
        self.refresh_status(&mut appset).await?;
        Ok(appset)
    }

    /// Remove the scheduler group, then the repair policies, then the document.
    pub async fn delete(&self, name: &str) -> ManagerResult<()> {
        let appset = self.load(name)?;
        if self.scheduler.has_group(&appset.group.id).await? {
            let deployment = self.scheduler.delete_group(&appset.group.id).await?;
            self.wait(&deployment, "delete").await?;
        }
        if let Err(e) = self.policies.remove_appset(name) {
            warn!(appset = %name, error = %e, "failed to remove repair policies");
        }
        self.state.delete_appset(name)?;
        info!(appset = %name, "appset deleted");
        Ok(())
    }

    // ── Components ─────────────────────────────────────────────────

    /// Add an application to an appset. If the appset is deployed the
    /// application is created on the scheduler as well.
    pub async fn add_component(&self, name: &str, app: Application) -> ManagerResult<Component> {
        let mut appset = self.load(name)?;
        let id = appset.group.insert(app)?;
        appset.group.canonicalize("")?;
        let app = appset.group.find_app(&id)?.clone();
        self.conflicts.check_app(name, &appset.group, &app)?;

        let deployed = self.scheduler.has_group(&appset.group.id).await?;
        if deployed {
            self.scheduler.create_application(&app).await?;
        }
        if let Err(e) = self.state.replace_appset(&mut appset) {
            if deployed {
                self.undo(self.scheduler.delete_application(&app.id).await, &app.id);
            }
            return Err(e.into());
        }
        info!(appset = %name, app = %app.id, deployed, "component added");

        self.refresh_policy(&appset, &app);
        self.component(name, &app).await
    }

    /// One component with its live status and annotated tasks.
    pub async fn get_component(&self, name: &str, app_id: &str) -> ManagerResult<Component> {
        let appset = self.load(name)?;
        let app = appset.group.find_app(&component_id(&appset, app_id))?;
        let (status, observed) = self.reconciler.observe(&app.id).await?;
        let tasks = observed.as_ref().map(|o| o.tasks.as_slice()).unwrap_or_default();
        let enrichment = enrich_tasks(self.resolver.clone(), tasks).await?;
        Ok(Component::new(name, app, status, observed.as_ref()).with_tasks(tasks, &enrichment))
    }

    /// Every component in desired-state order, without task views.
    pub async fn list_components(&self, name: &str) -> ManagerResult<Vec<Component>> {
        let appset = self.load(name)?;
        let mut components = Vec::with_capacity(appset.group.app_count());
        for app in appset.group.applications() {
            components.push(self.component(name, app).await?);
        }
        Ok(components)
    }

    /// Replace a component's definition. A running component is updated on
    /// the scheduler; a deployment-wait timeout is logged, not returned.
    pub async fn update_component(&self, name: &str, mut app: Application) -> ManagerResult<Component> {
        let mut appset = self.load(name)?;
        app.id = component_id(&appset, &app.id);
        let (status, observed) = self
            .require(&app.id, "update", |c| c.can_update)
            .await?;
        let owner = path::parent(&app.id);
        app.dependencies = app
            .dependencies
            .iter()
            .map(|dep| path::to_absolute(dep, &owner))
            .collect();
        let previous = appset.group.update_app(app.clone())?;
        self.conflicts.check_app(name, &appset.group, &app)?;

        if observed.is_some() {
            let deployment = self.scheduler.update_application(&app).await?;
            self.wait(&deployment, "update").await?;
        }
        if let Err(e) = self.state.replace_appset(&mut appset) {
            if observed.is_some() {
                self.undo(self.scheduler.update_application(&previous).await, &app.id);
            }
            return Err(e.into());
        }
        info!(appset = %name, app = %app.id, %status, "component updated");

        self.refresh_policy(&appset, &app);
        self.component(name, &app).await
    }

    /// Remove a component from the scheduler (if present) and the tree.
    pub async fn delete_component(&self, name: &str, app_id: &str) -> ManagerResult<()> {
        let mut appset = self.load(name)?;
        let id = component_id(&appset, app_id);
        let (_, observed) = self.require(&id, "delete", |c| c.can_delete).await?;
        let removed = appset.group.delete_app(&id)?;

        if observed.is_some() {
            let deployment = self.scheduler.delete_application(&id).await?;
            self.wait(&deployment, "delete").await?;
        }
        if let Err(e) = self.state.replace_appset(&mut appset) {
            if observed.is_some() {
                self.undo(self.scheduler.create_application(&removed).await, &id);
            }
            return Err(e.into());
        }
        if let Err(e) = self.policies.remove_app(&id) {
            warn!(appset = %name, app = %id, error = %e, "failed to remove repair policy");
        }
        info!(appset = %name, app = %id, "component deleted");
        Ok(())
    }

    /// Launch an idle component, or bring a suspended one back to its
    /// desired instance count.
    pub async fn start_component(&self, name: &str, app_id: &str) -> ManagerResult<Component> {
        let appset = self.load(name)?;
        let app = appset.group.find_app(&component_id(&appset, app_id))?.clone();
        let (status, _) = self.require(&app.id, "start", |c| c.can_start).await?;

        let deployment = if status == ComponentStatus::Suspended {
            self.scheduler
                .scale_application(&app.id, app.instances.max(1))
                .await?
        } else {
            self.scheduler.create_application(&app).await?
        };
        info!(appset = %name, app = %app.id, %deployment, "component started");
        self.component(name, &app).await
    }

    /// Scale a component to zero on the scheduler. Its desired count in the
    /// document is kept so a later start restores it.
    pub async fn stop_component(&self, name: &str, app_id: &str) -> ManagerResult<Component> {
        let appset = self.load(name)?;
        let app = appset.group.find_app(&component_id(&appset, app_id))?.clone();
        self.require(&app.id, "stop", |c| c.can_stop).await?;

        let deployment = self.scheduler.scale_application(&app.id, 0).await?;
        self.wait(&deployment, "stop").await?;
        info!(appset = %name, app = %app.id, "component stopped");
        self.component(name, &app).await
    }

    /// Change a component's instance count on the scheduler and in the
    /// document. A rejected scheduler write leaves the document untouched.
    pub async fn scale_component(
        &self,
        name: &str,
        app_id: &str,
        instances: u32,
    ) -> ManagerResult<Component> {
        let mut appset = self.load(name)?;
        let id = component_id(&appset, app_id);
        self.require(&id, "scale", |c| c.can_scale).await?;

        let app = appset.group.find_app_mut(&id)?;
        let previous = app.instances;
        app.instances = instances;
        let app = app.clone();

        let deployment = match self.scheduler.scale_application(&id, instances).await {
            Ok(deployment) => deployment,
            Err(e) => {
                warn!(appset = %name, app = %id, from = previous, to = instances, error = %e, "scale rejected, keeping previous count");
                return Err(e.into());
            }
        };
        if let Err(e) = self.state.replace_appset(&mut appset) {
            self.undo(self.scheduler.scale_application(&id, previous).await, &id);
            return Err(e.into());
        }
        info!(appset = %name, app = %id, from = previous, to = instances, %deployment, "component scaled");
        self.wait(&deployment, "scale").await?;
        self.component(name, &app).await
    }

    /// Kill one task of an appset. With `scale` the desired count drops by
    /// one in the document as well.
    pub async fn kill_task(
        &self,
        name: &str,
        task_id: &str,
        scale: bool,
        force: bool,
    ) -> ManagerResult<()> {
        let mut appset = self.load(name)?;
        let app_id = path::app_id_from_task_id(task_id)?;
        if path::root_group_name(&app_id)? != name {
            return Err(ManagerError::Validation(format!(
                "task {task_id} does not belong to appset {name}"
            )));
        }
        let app = appset.group.find_app_mut(&app_id)?;
        self.scheduler
            .kill_task(task_id, KillOptions { scale, force })
            .await?;
        info!(appset = %name, task = %task_id, scale, force, "task killed");
        if scale {
            app.instances = app.instances.saturating_sub(1);
            self.state.replace_appset(&mut appset)?;
        }
        Ok(())
    }

    // ── Internals ──────────────────────────────────────────────────

    fn load(&self, name: &str) -> ManagerResult<Appset> {
        self.state
            .get_appset(name)?
            .ok_or_else(|| ManagerError::AppsetNotFound(name.to_string()))
    }

    /// Recompute the status and store it when it changed. Losing the race
    /// to another writer is fine: the status is derived state.
    async fn refresh_status(&self, appset: &mut Appset) -> ManagerResult<()> {
        let status = self.reconciler.appset_status(&appset.group).await?;
        if status == appset.status {
            return Ok(());
        }
        let previous = appset.status;
        appset.status = status;
        match self.state.replace_appset(appset) {
            Ok(()) => debug!(appset = %appset.name, from = %previous, to = %status, "appset status changed"),
            Err(StateError::VersionConflict { .. }) => {
                debug!(appset = %appset.name, "status write lost to a concurrent update")
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn component(&self, name: &str, app: &Application) -> ManagerResult<Component> {
        let (status, observed) = self.reconciler.observe(&app.id).await?;
        Ok(Component::new(name, app, status, observed.as_ref()))
    }

    /// Fetch the live status and fail unless `allowed` accepts it.
    async fn require(
        &self,
        app_id: &str,
        op: &'static str,
        allowed: impl Fn(&Capabilities) -> bool,
    ) -> ManagerResult<(ComponentStatus, Option<SchedulerApp>)> {
        let (status, observed) = self.reconciler.observe(app_id).await?;
        if !allowed(&Capabilities::for_status(status)) {
            return Err(ManagerError::NotAllowed {
                op,
                id: app_id.to_string(),
                status: status.to_string(),
            });
        }
        Ok((status, observed))
    }

    async fn wait(&self, deployment: &str, op: &str) -> ManagerResult<()> {
        match self
            .scheduler
            .wait_on_deployment(deployment, self.deployment_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_timeout() => {
                warn!(%deployment, %op, timeout_secs = self.deployment_timeout.as_secs(), "deployment still running after timeout");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn undo_create_group(&self, group_id: &str) {
        self.undo(self.scheduler.delete_group(group_id).await, group_id);
    }

    fn undo<T>(&self, result: Result<T, SchedulerError>, id: &str) {
        match result {
            Ok(_) => info!(%id, "scheduler write rolled back"),
            Err(e) => warn!(%id, error = %e, "scheduler rollback failed"),
        }
    }

    fn refresh_policies(&self, appset: &Appset) {
        if let Err(e) = self.policies.refresh_appset(appset) {
            warn!(appset = %appset.name, error = %e, "repair policy refresh failed");
        }
    }

    fn refresh_policy(&self, appset: &Appset, app: &Application) {
        if let Err(e) = self.policies.refresh_app(appset, app) {
            warn!(appset = %appset.name, app = %app.id, error = %e, "repair policy refresh failed");
        }
    }
}

/// Canonicalize a caller-supplied tree so its root is `/<name>`.
fn root_tree(name: &str, mut group: Group) -> ManagerResult<Group> {
    let root = format!("/{name}");
    if group.id.is_empty() {
        group.id = root.clone();
    }
    group.canonicalize("")?;
    if group.id != root {
        return Err(ManagerError::Validation(format!(
            "root group id {} does not match appset {name}",
            group.id
        )));
    }
    Ok(group)
}

/// Absolute id of a component addressed absolutely or relative to the root.
fn component_id(appset: &Appset, id: &str) -> String {
    path::to_absolute(id, &appset.root_id())
}
