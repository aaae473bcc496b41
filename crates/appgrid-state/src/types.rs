//! Persisted documents: appsets, repair policies, repair records.
//!
//! Field names follow the stored document shape (`_id`, `time_create`,
//! `created_by_json`, ...). Status enums serialize as their
//! SCREAMING_SNAKE codes.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub use appgrid_core::{Application, Group};

/// Name of the only action parameter the repair engine reads.
pub const PARAM_SCALE_STEP: &str = "SCALESTEP";

// ── Statuses ──────────────────────────────────────────────────────

/// Aggregate status of an appset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppsetStatus {
    #[default]
    Idle,
    Deploying,
    Running,
    Failed,
    Incomplete,
    Waiting,
    Unknown,
}

impl AppsetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Deploying => "DEPLOYING",
            Self::Running => "RUNNING",
            Self::Failed => "FAILED",
            Self::Incomplete => "INCOMPLETE",
            Self::Waiting => "WAITING",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// States an in-flight operation leaves behind until it completes.
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Deploying | Self::Waiting)
    }
}

impl fmt::Display for AppsetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live status of a single application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentStatus {
    Idle,
    Deploying,
    Running,
    Failed,
    Waiting,
    Suspended,
    Unknown,
}

impl ComponentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Deploying => "DEPLOYING",
            Self::Running => "RUNNING",
            Self::Failed => "FAILED",
            Self::Waiting => "WAITING",
            Self::Suspended => "SUSPENDED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepairStatus {
    #[serde(rename = "REPAIRING")]
    Repairing,
    #[serde(rename = "REPAIR_ACTION_SUCCESS_IN")]
    SuccessIn,
    #[serde(rename = "REPAIR_ACTION_SUCCESS_OUT")]
    SuccessOut,
    #[serde(rename = "REPAIR_ACTION_PARTIALSUCCESS")]
    PartialSuccess,
    #[serde(rename = "REPAIR_ACTION_FAILURE")]
    Failure,
    #[serde(rename = "REPAIR_ACTION_DONOTHING_MAX")]
    DoNothingMax,
    #[serde(rename = "REPAIR_ACTION_DONOTHING_MIN")]
    DoNothingMin,
}

impl RepairStatus {
    /// Result code reported back to the alert source.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Repairing => "REPAIRING",
            Self::SuccessIn => "REPAIR_ACTION_SUCCESS_IN",
            Self::SuccessOut => "REPAIR_ACTION_SUCCESS_OUT",
            Self::PartialSuccess => "REPAIR_ACTION_PARTIALSUCCESS",
            Self::Failure => "REPAIR_ACTION_FAILURE",
            Self::DoNothingMax => "REPAIR_ACTION_DONOTHING_MAX",
            Self::DoNothingMin => "REPAIR_ACTION_DONOTHING_MIN",
        }
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Appset ────────────────────────────────────────────────────────

/// A named application group and its whole desired-state tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appset {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Cached aggregate; recomputed from the scheduler on read.
    #[serde(default)]
    pub status: AppsetStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub template_id: String,
    /// Whether the tree was supplied wholesale rather than built component by component.
    #[serde(default)]
    pub created_by_json: bool,
    pub group: Group,
    pub time_create: u64,
    pub time_update: u64,
    /// Bumped on every replace; guards against lost updates.
    #[serde(default)]
    pub version: u64,
}

impl Appset {
    /// A fresh, unpersisted appset owning `group`.
    pub fn new(name: impl Into<String>, group: Group) -> Self {
        let now = epoch_secs();
        Self {
            id: object_id(),
            name: name.into(),
            status: AppsetStatus::Idle,
            description: String::new(),
            template_id: String::new(),
            created_by_json: false,
            group,
            time_create: now,
            time_update: now,
            version: 0,
        }
    }

    /// Absolute id of the root group.
    pub fn root_id(&self) -> String {
        format!("/{}", self.name)
    }
}

// ── Repair policy ─────────────────────────────────────────────────

/// Autoscaling rules for one application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepairPolicy {
    #[serde(rename = "_id")]
    pub id: String,
    pub repair_template_id: String,
    pub service_group_id: String,
    pub app_container_id: String,
    /// Upper instance bound; empty means unbounded.
    #[serde(default)]
    pub instance_max_num: String,
    /// Lower instance bound; empty means unbounded.
    #[serde(default)]
    pub instance_min_num: String,
    pub policies: Vec<Policy>,
    pub time_create: u64,
    pub time_update: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub actions: Vec<RepairAction>,
}

/// An alert name that triggers the owning policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepairAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub app_container_id: String,
    pub parameters: Vec<ActionParameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Scale,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionParameter {
    pub name: String,
    pub value: String,
}

impl RepairAction {
    /// Value of the named parameter, if present.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

// ── Repair record ─────────────────────────────────────────────────

/// State of one in-flight or finished repair attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepairRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub repair_id: String,
    pub app_container_id: String,
    pub service_group_id: String,
    pub status: RepairStatus,
    pub alert_id: String,
    pub alert_name: String,
    #[serde(default)]
    pub deployment_id: String,
    /// Human-readable summary of the scale action taken.
    #[serde(default)]
    pub action: String,
    pub time_create: u64,
    pub time_update: u64,
}

impl RepairRecord {
    /// A new record in `REPAIRING` with a fresh `{alert_id}-{object_id}` repair id.
    pub fn start(alert_id: &str, alert_name: &str, app_container_id: &str, service_group_id: &str) -> Self {
        let now = epoch_secs();
        let object_id = object_id();
        Self {
            repair_id: format!("{alert_id}-{object_id}"),
            id: object_id,
            app_container_id: app_container_id.to_string(),
            service_group_id: service_group_id.to_string(),
            status: RepairStatus::Repairing,
            alert_id: alert_id.to_string(),
            alert_name: alert_name.to_string(),
            deployment_id: String::new(),
            action: String::new(),
            time_create: now,
            time_update: now,
        }
    }
}

/// A fresh document id.
pub fn object_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_serialize_as_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&AppsetStatus::Incomplete).unwrap(),
            "\"INCOMPLETE\""
        );
        assert_eq!(
            serde_json::to_string(&ComponentStatus::Suspended).unwrap(),
            "\"SUSPENDED\""
        );
        assert_eq!(
            serde_json::to_string(&RepairStatus::PartialSuccess).unwrap(),
            format!("\"{}\"", RepairStatus::PartialSuccess.as_str())
        );
        let parsed: RepairStatus = serde_json::from_str("\"REPAIR_ACTION_DONOTHING_MIN\"").unwrap();
        assert_eq!(parsed, RepairStatus::DoNothingMin);
    }

    #[test]
    fn repair_id_is_alert_id_plus_object_id() {
        let record = RepairRecord::start("alert-7", "HighCpuAlert", "/shop/web", "shop");
        assert_eq!(record.repair_id, format!("alert-7-{}", record.id));
        assert_eq!(record.status, RepairStatus::Repairing);
    }

    #[test]
    fn appset_document_shape() {
        let appset = Appset::new("shop", Group::new("/shop"));
        let value = serde_json::to_value(&appset).unwrap();
        assert!(value.get("_id").is_some());
        assert_eq!(value["status"], "IDLE");
        assert_eq!(value["created_by_json"], false);
        assert_eq!(appset.root_id(), "/shop");
    }

    #[test]
    fn action_parameter_lookup() {
        let action = RepairAction {
            kind: ActionKind::Scale,
            app_container_id: "/shop/web".to_string(),
            parameters: vec![ActionParameter {
                name: PARAM_SCALE_STEP.to_string(),
                value: "-1".to_string(),
            }],
        };
        assert_eq!(action.parameter(PARAM_SCALE_STEP), Some("-1"));
        assert_eq!(action.parameter("OTHER"), None);
        assert_eq!(serde_json::to_value(&action).unwrap()["type"], "SCALE");
    }
}
