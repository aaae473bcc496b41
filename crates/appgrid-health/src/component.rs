//! Component view: one application merged with its live status.

use serde::Serialize;

use appgrid_core::{Application, path};
use appgrid_scheduler::{SchedulerApp, Task};
use appgrid_state::ComponentStatus;

use crate::enrich::Enrichment;

/// Which operations a component accepts in its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub can_start: bool,
    pub can_stop: bool,
    pub can_scale: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub can_restart: bool,
}

impl Capabilities {
    pub fn for_status(status: ComponentStatus) -> Self {
        let none = Self::default();
        match status {
            ComponentStatus::Idle => Self {
                can_start: true,
                can_update: true,
                can_delete: true,
                ..none
            },
            ComponentStatus::Running => Self {
                can_stop: true,
                can_scale: true,
                can_update: true,
                can_restart: true,
                ..none
            },
            ComponentStatus::Failed => Self {
                can_stop: true,
                can_update: true,
                can_delete: true,
                ..none
            },
            ComponentStatus::Suspended => Self {
                can_start: true,
                can_scale: true,
                can_update: true,
                can_delete: true,
                ..none
            },
            // In flight or unclassified: the only safe move is to stop.
            ComponentStatus::Deploying | ComponentStatus::Waiting | ComponentStatus::Unknown => {
                Self {
                    can_stop: true,
                    ..none
                }
            }
        }
    }
}

/// One scheduler task, annotated with its container name when resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub id: String,
    pub host: String,
    pub slave_id: String,
    pub state: String,
    pub started_at: Option<u64>,
    pub container_name: Option<String>,
    /// Why the container name could not be resolved.
    pub error: Option<String>,
}

impl TaskView {
    pub fn from_task(task: &Task, enrichment: &Enrichment) -> Self {
        Self {
            id: task.id.clone(),
            host: task.host.clone(),
            slave_id: task.slave_id.clone(),
            state: task.state.clone(),
            started_at: task.started_at,
            container_name: enrichment.names.get(&task.id).cloned(),
            error: enrichment.errors.get(&task.id).cloned(),
        }
    }
}

/// Read-side projection of an application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub appset: String,
    pub status: ComponentStatus,
    #[serde(flatten)]
    pub capabilities: Capabilities,
    pub instances: u32,
    pub tasks_running: u32,
    pub cpus: f64,
    pub mem: f64,
    pub gpus: f64,
    pub total_cpus: f64,
    pub total_mem: f64,
    pub total_gpus: f64,
    pub service_ports: Vec<u16>,
    pub dependencies: Vec<String>,
    pub tasks: Vec<TaskView>,
}

impl Component {
    pub fn new(
        appset: &str,
        app: &Application,
        status: ComponentStatus,
        observed: Option<&SchedulerApp>,
    ) -> Self {
        let (total_cpus, total_mem, total_gpus) = app.total_resources();
        Self {
            id: app.id.clone(),
            name: path::last_segment(&app.id).to_string(),
            appset: appset.to_string(),
            status,
            capabilities: Capabilities::for_status(status),
            instances: app.instances,
            tasks_running: observed.map_or(0, |o| o.tasks_running),
            cpus: app.cpus,
            mem: app.mem,
            gpus: app.gpus,
            total_cpus,
            total_mem,
            total_gpus,
            service_ports: app.service_ports(),
            dependencies: app.dependencies.clone(),
            tasks: Vec::new(),
        }
    }

    /// Attach task views for `tasks`, using whatever names `enrichment` resolved.
    pub fn with_tasks(mut self, tasks: &[Task], enrichment: &Enrichment) -> Self {
        self.tasks = tasks
            .iter()
            .map(|t| TaskView::from_task(t, enrichment))
            .collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_by_status() {
        let idle = Capabilities::for_status(ComponentStatus::Idle);
        assert!(idle.can_start && idle.can_delete && !idle.can_stop && !idle.can_scale);

        let running = Capabilities::for_status(ComponentStatus::Running);
        assert!(running.can_stop && running.can_scale && running.can_restart);
        assert!(!running.can_start && !running.can_delete);

        let suspended = Capabilities::for_status(ComponentStatus::Suspended);
        assert!(suspended.can_start && suspended.can_scale && !suspended.can_stop);

        for status in [
            ComponentStatus::Deploying,
            ComponentStatus::Waiting,
            ComponentStatus::Unknown,
        ] {
            assert_eq!(
                Capabilities::for_status(status),
                Capabilities {
                    can_stop: true,
                    ..Capabilities::default()
                }
            );
        }
    }

    #[test]
    fn component_totals_and_tasks() {
        let mut app = Application::new("/shop/web", 3);
        app.cpus = 0.5;
        app.mem = 128.0;
        let observed = SchedulerApp {
            id: app.id.clone(),
            instances: 3,
            tasks_running: 2,
            ..SchedulerApp::default()
        };
        let task = Task {
            id: "shop_web.abc".to_string(),
            app_id: app.id.clone(),
            host: "agent-0.sim".to_string(),
            slave_id: "S0".to_string(),
            state: "TASK_RUNNING".to_string(),
            started_at: None,
        };
        let mut enrichment = Enrichment::default();
        enrichment
            .names
            .insert(task.id.clone(), "mesos-S0.abc".to_string());

        let component = Component::new("shop", &app, ComponentStatus::Unknown, Some(&observed))
            .with_tasks(std::slice::from_ref(&task), &enrichment);

        assert_eq!(component.name, "web");
        assert_eq!(component.total_cpus, 1.5);
        assert_eq!(component.total_mem, 384.0);
        assert_eq!(component.tasks_running, 2);
        assert_eq!(component.tasks[0].container_name.as_deref(), Some("mesos-S0.abc"));
        assert!(component.tasks[0].error.is_none());

        let json = serde_json::to_value(&component).unwrap();
        assert_eq!(json["status"], "UNKNOWN");
        assert_eq!(json["can_stop"], true);
    }
}
