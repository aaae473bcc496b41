//! Repair policy derivation and lifecycle.
//!
//! An application opts into repair with `ALERT_ENABLE=true`. Its policy is
//! the same four canned rules for every application; only the step and the
//! instance bounds come from the environment.

use tracing::{debug, info};

use appgrid_core::{
    ENV_INSTANCE_MAX_NUM, ENV_INSTANCE_MIN_NUM, ENV_REPAIR_TEMPLATE_ID, ENV_SCALE_STEP,
};
use appgrid_state::*;

use crate::error::{RepairError, RepairResult};

pub const HIGH_CPU_ALERT: &str = "HighCpuAlert";
pub const LOW_CPU_ALERT: &str = "LowCpuAlert";
pub const HIGH_MEMORY_ALERT: &str = "HighMemoryAlert";
pub const LOW_MEMORY_ALERT: &str = "LowMemoryAlert";

const DEFAULT_SCALE_STEP: &str = "1";

/// Template an application's policy is filed under: its own
/// `REPAIR_TEMPLATE_ID`, else the appset's template, else the appset name.
pub fn repair_template_id(appset: &Appset, app: &Application) -> String {
    let own = app.env_value(ENV_REPAIR_TEMPLATE_ID);
    if !own.is_empty() {
        own.to_string()
    } else if !appset.template_id.is_empty() {
        appset.template_id.clone()
    } else {
        appset.name.clone()
    }
}

/// Build the policy for `app`, or `None` if it has not enabled alerting.
pub fn derive_policy(appset: &Appset, app: &Application) -> Option<RepairPolicy> {
    if !app.alerting_enabled() {
        return None;
    }
    let step = match app.env_value(ENV_SCALE_STEP).trim() {
        "" => DEFAULT_SCALE_STEP,
        step => step,
    };
    let down = negate(step);
    let rules = [
        (HIGH_CPU_ALERT, step),
        (LOW_CPU_ALERT, down.as_str()),
        (HIGH_MEMORY_ALERT, step),
        (LOW_MEMORY_ALERT, down.as_str()),
    ];
    let policies = rules
        .into_iter()
        .map(|(alert, delta)| Policy {
            name: alert.to_string(),
            conditions: vec![Condition {
                name: alert.to_string(),
            }],
            actions: vec![RepairAction {
                kind: ActionKind::Scale,
                app_container_id: app.id.clone(),
                parameters: vec![ActionParameter {
                    name: PARAM_SCALE_STEP.to_string(),
                    value: delta.to_string(),
                }],
            }],
        })
        .collect();

    let now = epoch_secs();
    Some(RepairPolicy {
        id: object_id(),
        repair_template_id: repair_template_id(appset, app),
        service_group_id: appset.name.clone(),
        app_container_id: app.id.clone(),
        instance_max_num: app.env_value(ENV_INSTANCE_MAX_NUM).trim().to_string(),
        instance_min_num: app.env_value(ENV_INSTANCE_MIN_NUM).trim().to_string(),
        policies,
        time_create: now,
        time_update: now,
    })
}

fn negate(step: &str) -> String {
    match step.strip_prefix('-') {
        Some(positive) => positive.to_string(),
        None => format!("-{}", step.trim_start_matches('+')),
    }
}

/// Signed step the policy prescribes for `alert_name`.
///
/// Only the first action of the matching rule is honored. `None` means
/// nothing to do: no rule matches, the rule has no action, or the step is
/// empty.
pub fn analyze_alert(policy: &RepairPolicy, alert_name: &str) -> RepairResult<Option<i64>> {
    let Some(rule) = policy
        .policies
        .iter()
        .find(|p| p.conditions.iter().any(|c| c.name == alert_name))
    else {
        return Ok(None);
    };
    let Some(action) = rule.actions.first() else {
        return Ok(None);
    };
    let step = action.parameter(PARAM_SCALE_STEP).unwrap_or("").trim();
    if step.is_empty() {
        return Ok(None);
    }
    step.parse::<i64>()
        .map(Some)
        .map_err(|_| RepairError::InvalidStep(step.to_string()))
}

/// Keeps stored policies in step with the applications they cover.
#[derive(Clone)]
pub struct PolicyManager {
    state: StateStore,
}

impl PolicyManager {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Replace the policy for one application. Returns whether the
    /// application has a policy afterwards.
    pub fn refresh_app(&self, appset: &Appset, app: &Application) -> RepairResult<bool> {
        let removed = self.remove_app(&app.id)?;
        match derive_policy(appset, app) {
            Some(policy) => {
                self.state.put(&policy)?;
                info!(
                    app = %app.id,
                    template = %policy.repair_template_id,
                    max = %policy.instance_max_num,
                    min = %policy.instance_min_num,
                    "repair policy refreshed"
                );
                Ok(true)
            }
            None => {
                if removed > 0 {
                    info!(app = %app.id, "alerting disabled, repair policy removed");
                }
                Ok(false)
            }
        }
    }

    /// Refresh policies for every application in the appset. Returns the
    /// number of applications with a policy.
    pub fn refresh_appset(&self, appset: &Appset) -> RepairResult<usize> {
        let mut covered = 0;
        appset.group.visit_apps(&mut |app| {
            if self.refresh_app(appset, app)? {
                covered += 1;
            }
            Ok::<(), RepairError>(())
        })?;
        debug!(appset = %appset.name, covered, "repair policies refreshed");
        Ok(covered)
    }

    pub fn remove_app(&self, app_container_id: &str) -> RepairResult<usize> {
        Ok(self
            .state
            .delete_where::<RepairPolicy>(&Selector::eq("app_container_id", app_container_id))?)
    }

    pub fn remove_appset(&self, appset_name: &str) -> RepairResult<usize> {
        let removed = self
            .state
            .delete_where::<RepairPolicy>(&Selector::eq("service_group_id", appset_name))?;
        if removed > 0 {
            info!(appset = %appset_name, removed, "repair policies removed");
        }
        Ok(removed)
    }

    pub fn policy_for(&self, app_container_id: &str) -> RepairResult<Option<RepairPolicy>> {
        Ok(self.state.find_repair_policy(app_container_id)?)
    }
}
