//! Scale orchestration for a single alert.
//!
//! Each alert that maps to a step opens a `RepairRecord` in REPAIRING,
//! runs the bounded decision, scales through the scheduler and waits for
//! the rollout. Whatever the outcome, the record is closed with a result
//! code and the same code is sent to the alert source.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use appgrid_scheduler::SchedulerClient;
use appgrid_state::*;

use crate::clamp::{Verdict, check_scale_number};
use crate::error::{RepairError, RepairResult};
use crate::notifier::AlertNotifier;
use crate::policy::analyze_alert;

/// An incoming resource alert.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Alert {
    pub id: String,
    pub name: String,
    #[serde(alias = "app")]
    pub app_container_id: String,
}

/// How one repair attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub repair_id: String,
    pub status: RepairStatus,
    pub from: u32,
    /// Count the app was scaled to, or `from` when nothing was scaled.
    pub to: u32,
}

pub struct RepairOrchestrator {
    state: StateStore,
    scheduler: Arc<dyn SchedulerClient>,
    notifier: Arc<dyn AlertNotifier>,
    deployment_timeout: Duration,
}

impl RepairOrchestrator {
    pub fn new(
        state: StateStore,
        scheduler: Arc<dyn SchedulerClient>,
        notifier: Arc<dyn AlertNotifier>,
        deployment_timeout: Duration,
    ) -> Self {
        Self {
            state,
            scheduler,
            notifier,
            deployment_timeout,
        }
    }

    /// Handle one alert end to end.
    ///
    /// Returns `Ok(None)` when the alert maps to no step. Lookup failures
    /// before a record exists are returned as errors; anything after that
    /// is reported through the record's status instead.
    pub async fn handle_alert(&self, alert: &Alert) -> RepairResult<Option<RepairOutcome>> {
        let policy = self
            .state
            .find_repair_policy(&alert.app_container_id)?
            .ok_or_else(|| RepairError::NoPolicy(alert.app_container_id.clone()))?;
        let Some(step) = analyze_alert(&policy, &alert.name)? else {
            info!(alert = %alert.id, name = %alert.name, app = %alert.app_container_id, "alert maps to no repair step");
            return Ok(None);
        };
        let current = self
            .scheduler
            .application(&alert.app_container_id)
            .await?
            .map(|app| app.instances)
            .ok_or_else(|| RepairError::NotDeployed(alert.app_container_id.clone()))?;

        let mut record = RepairRecord::start(
            &alert.id,
            &alert.name,
            &alert.app_container_id,
            &policy.service_group_id,
        );
        self.state.insert(&record)?;
        info!(repair = %record.repair_id, app = %record.app_container_id, alert = %alert.name, step, current, "repair started");

        let (status, to) = self.repair(&policy, &mut record, current, step).await;
        record.action = if to == current {
            format!("keep {} at {current}", record.app_container_id)
        } else {
            format!("scale {} from {current} to {to}", record.app_container_id)
        };
        self.finish(&mut record, status).await?;
        if to != current && status != RepairStatus::Failure {
            self.follow_through(&policy.service_group_id, &alert.app_container_id, to);
        }

        Ok(Some(RepairOutcome {
            repair_id: record.repair_id,
            status,
            from: current,
            to,
        }))
    }

    async fn repair(
        &self,
        policy: &RepairPolicy,
        record: &mut RepairRecord,
        current: u32,
        step: i64,
    ) -> (RepairStatus, u32) {
        let proposed = (i64::from(current) + step).max(0);
        let check = match check_scale_number(
            &proposed.to_string(),
            &current.to_string(),
            &policy.instance_max_num,
            &policy.instance_min_num,
        ) {
            Ok(check) => check,
            Err(e) => {
                warn!(repair = %record.repair_id, error = %e, "scale decision failed");
                return (RepairStatus::Failure, current);
            }
        };
        match check.verdict {
            Verdict::AtCeiling => return (RepairStatus::DoNothingMax, current),
            Verdict::AtFloor => return (RepairStatus::DoNothingMin, current),
            Verdict::Accepted | Verdict::Partial => {}
        }

        let app_id = record.app_container_id.clone();
        let deployment = match self.scheduler.scale_application(&app_id, check.number).await {
            Ok(deployment) => deployment,
            Err(e) => {
                warn!(repair = %record.repair_id, app = %app_id, error = %e, "repair scale rejected");
                return (RepairStatus::Failure, current);
            }
        };
        record.deployment_id = deployment.clone();
        record.time_update = epoch_secs();
        if let Err(e) = self.state.put(&*record) {
            warn!(repair = %record.repair_id, error = %e, "failed to record repair deployment");
        }

        if let Err(e) = self
            .scheduler
            .wait_on_deployment(&deployment, self.deployment_timeout)
            .await
        {
            warn!(repair = %record.repair_id, %deployment, error = %e, "repair deployment failed");
            return (RepairStatus::Failure, check.number);
        }

        let status = if check.is_partial() {
            RepairStatus::PartialSuccess
        } else if check.number > current {
            RepairStatus::SuccessOut
        } else {
            RepairStatus::SuccessIn
        };
        (status, check.number)
    }

    async fn finish(&self, record: &mut RepairRecord, status: RepairStatus) -> RepairResult<()> {
        record.status = status;
        record.time_update = epoch_secs();
        self.state.put(&*record)?;
        info!(repair = %record.repair_id, %status, action = %record.action, "repair finished");
        if let Err(e) = self.notifier.notify_result(&record.alert_id, status).await {
            warn!(repair = %record.repair_id, alert = %record.alert_id, error = %e, "failed to notify alert source");
        }
        Ok(())
    }

    /// Carry the new count into the appset's desired state. Best effort.
    fn follow_through(&self, appset_name: &str, app_id: &str, instances: u32) {
        let result = (|| -> RepairResult<bool> {
            let Some(mut appset) = self.state.get_appset(appset_name)? else {
                return Ok(false);
            };
            let Ok(app) = appset.group.find_app_mut(app_id) else {
                return Ok(false);
            };
            app.instances = instances;
            self.state.replace_appset(&mut appset)?;
            Ok(true)
        })();
        match result {
            Ok(true) => info!(appset = %appset_name, app = %app_id, instances, "desired instances updated after repair"),
            Ok(false) => warn!(appset = %appset_name, app = %app_id, "repaired app not found in appset"),
            Err(e) => warn!(appset = %appset_name, app = %app_id, error = %e, "failed to update desired instances after repair"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use appgrid_scheduler::{BoxFuture, Faults, InMemoryScheduler};

    use crate::policy::{HIGH_CPU_ALERT, LOW_CPU_ALERT, PolicyManager};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, RepairStatus)>>,
    }

    impl AlertNotifier for RecordingNotifier {
        fn notify_result<'a>(
            &'a self,
            alert_id: &'a str,
            result: RepairStatus,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                self.sent.lock().unwrap().push((alert_id.to_string(), result));
                Ok(())
            })
        }
    }

    struct Fixture {
        state: StateStore,
        scheduler: InMemoryScheduler,
        notifier: Arc<RecordingNotifier>,
        orchestrator: RepairOrchestrator,
    }

    async fn fixture(instances: u32, max: &str, min: &str) -> Fixture {
        let mut web = Application::new("/shop/web", instances);
        web.env.insert("ALERT_ENABLE".to_string(), "true".to_string());
        web.env.insert("INSTANCE_MAX_NUM".to_string(), max.to_string());
        web.env.insert("INSTANCE_MIN_NUM".to_string(), min.to_string());
        let mut group = Group::new("/shop");
        group.apps.push(web);
        let appset = Appset::new("shop", group);

        let state = StateStore::open_in_memory().unwrap();
        state.insert(&appset).unwrap();
        PolicyManager::new(state.clone()).refresh_appset(&appset).unwrap();

        let scheduler = InMemoryScheduler::new();
        scheduler.create_group(&appset.group).await.unwrap();
        scheduler.complete_deployments().await;

        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = RepairOrchestrator::new(
            state.clone(),
            Arc::new(scheduler.clone()),
            notifier.clone(),
            Duration::from_millis(50),
        );
        Fixture {
            state,
            scheduler,
            notifier,
            orchestrator,
        }
    }

    fn alert(id: &str, name: &str) -> Alert {
        Alert {
            id: id.to_string(),
            name: name.to_string(),
            app_container_id: "/shop/web".to_string(),
        }
    }

    #[tokio::test]
    async fn scale_out_within_bounds() {
        let f = fixture(2, "5", "1").await;
        let outcome = f
            .orchestrator
            .handle_alert(&alert("a1", HIGH_CPU_ALERT))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.status, RepairStatus::SuccessOut);
        assert_eq!((outcome.from, outcome.to), (2, 3));
        let web = f.scheduler.application("/shop/web").await.unwrap().unwrap();
        assert_eq!(web.tasks_running, 3);

        let record = f.state.get_repair_record(&outcome.repair_id).unwrap().unwrap();
        assert_eq!(record.status, RepairStatus::SuccessOut);
        assert!(record.repair_id.starts_with("a1-"));
        assert!(!record.deployment_id.is_empty());
        assert_eq!(
            f.notifier.sent.lock().unwrap().as_slice(),
            &[("a1".to_string(), RepairStatus::SuccessOut)]
        );

        // Desired state follows the repair.
        let appset = f.state.get_appset("shop").unwrap().unwrap();
        assert_eq!(appset.group.find_app("/shop/web").unwrap().instances, 3);
    }

    #[tokio::test]
    async fn scale_in() {
        let f = fixture(3, "5", "1").await;
        let outcome = f
            .orchestrator
            .handle_alert(&alert("a2", LOW_CPU_ALERT))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, RepairStatus::SuccessIn);
        assert_eq!(outcome.to, 2);
    }

    #[tokio::test]
    async fn ceiling_does_nothing() {
        let f = fixture(5, "5", "1").await;
        let outcome = f
            .orchestrator
            .handle_alert(&alert("a3", HIGH_CPU_ALERT))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, RepairStatus::DoNothingMax);
        assert_eq!(outcome.to, 5);
        assert_eq!(f.scheduler.pending_deployments().await, 0);
        let record = f.state.get_repair_record(&outcome.repair_id).unwrap().unwrap();
        assert!(record.deployment_id.is_empty());
    }

    #[tokio::test]
    async fn floor_does_nothing() {
        let f = fixture(1, "5", "1").await;
        let outcome = f
            .orchestrator
            .handle_alert(&alert("a4", LOW_CPU_ALERT))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, RepairStatus::DoNothingMin);
    }

    #[tokio::test]
    async fn clamped_scale_is_partial() {
        let f = fixture(4, "5", "1").await;
        f.state
            .update_where::<RepairPolicy>(&Selector::All, |p| {
                for rule in &mut p.policies {
                    for action in &mut rule.actions {
                        for param in &mut action.parameters {
                            if !param.value.starts_with('-') {
                                param.value = "3".to_string();
                            }
                        }
                    }
                }
            })
            .unwrap();

        let outcome = f
            .orchestrator
            .handle_alert(&alert("a5", HIGH_CPU_ALERT))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, RepairStatus::PartialSuccess);
        assert_eq!(outcome.to, 5);
    }

    #[tokio::test]
    async fn scheduler_rejection_is_failure() {
        let f = fixture(2, "5", "1").await;
        f.scheduler
            .set_faults(Faults {
                reject_writes: true,
                ..Faults::default()
            })
            .await;
        let outcome = f
            .orchestrator
            .handle_alert(&alert("a6", HIGH_CPU_ALERT))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, RepairStatus::Failure);
        assert_eq!(outcome.to, 2);
        let appset = f.state.get_appset("shop").unwrap().unwrap();
        assert_eq!(appset.group.find_app("/shop/web").unwrap().instances, 2);
    }

    #[tokio::test]
    async fn deployment_timeout_is_failure() {
        let f = fixture(2, "5", "1").await;
        f.scheduler
            .set_faults(Faults {
                hang_deployments: true,
                ..Faults::default()
            })
            .await;
        let outcome = f
            .orchestrator
            .handle_alert(&alert("a7", HIGH_CPU_ALERT))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, RepairStatus::Failure);
        let record = f.state.get_repair_record(&outcome.repair_id).unwrap().unwrap();
        assert!(!record.deployment_id.is_empty());
        assert_eq!(record.status, RepairStatus::Failure);
    }

    #[tokio::test]
    async fn unbounded_policy_is_failure() {
        let f = fixture(2, "", "").await;
        let outcome = f
            .orchestrator
            .handle_alert(&alert("a8", HIGH_CPU_ALERT))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, RepairStatus::Failure);
    }

    #[tokio::test]
    async fn unknown_alert_and_missing_policy() {
        let f = fixture(2, "5", "1").await;
        assert!(
            f.orchestrator
                .handle_alert(&alert("a9", "DiskAlert"))
                .await
                .unwrap()
                .is_none()
        );

        let mut other = alert("a10", HIGH_CPU_ALERT);
        other.app_container_id = "/blog/api".to_string();
        assert!(matches!(
            f.orchestrator.handle_alert(&other).await,
            Err(RepairError::NoPolicy(_))
        ));
    }

    #[test]
    fn alert_parses_from_json() {
        let alert: Alert = serde_json::from_str(
            r#"{"id": "a1", "name": "HighCpuAlert", "app": "/shop/web"}"#,
        )
        .unwrap();
        assert_eq!(alert.app_container_id, "/shop/web");
    }
}
