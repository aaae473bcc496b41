//! Desired-state model: groups and applications.
//!
//! These types mirror the scheduler's group/app JSON (camelCase keys) so a
//! whole tree can be submitted to the scheduler as-is and imported from a
//! user-supplied document without translation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Environment key that turns on alert-driven repair for an application.
pub const ENV_ALERT_ENABLE: &str = "ALERT_ENABLE";
/// Environment key holding the instance delta applied per alert.
pub const ENV_SCALE_STEP: &str = "SCALE_STEP";
/// Environment key holding the upper instance bound for repair scaling.
pub const ENV_INSTANCE_MAX_NUM: &str = "INSTANCE_MAX_NUM";
/// Environment key holding the lower instance bound for repair scaling.
pub const ENV_INSTANCE_MIN_NUM: &str = "INSTANCE_MIN_NUM";
/// Environment key overriding which repair template an application's policy belongs to.
pub const ENV_REPAIR_TEMPLATE_ID: &str = "REPAIR_TEMPLATE_ID";

// ── Group ─────────────────────────────────────────────────────────

/// A node of the group tree. The root group of an appset is `/<appset>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub apps: Vec<Application>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Group {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

// ── Application ───────────────────────────────────────────────────

/// A single deployable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default)]
    pub instances: u32,
    #[serde(default)]
    pub cpus: f64,
    /// Memory request in MiB.
    #[serde(default)]
    pub mem: f64,
    #[serde(default)]
    pub gpus: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    /// Ids of applications that must be deployed before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Container {
    #[serde(rename = "type", default = "default_container_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<Docker>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Docker {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default)]
    pub port_mappings: Vec<PortMapping>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub force_pull_image: bool,
}

/// A container port exposed by an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    #[serde(default)]
    pub host_port: u16,
    /// Externally routable port; `0` means none was requested.
    #[serde(default)]
    pub service_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_container_type() -> String {
    "DOCKER".to_string()
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl Application {
    pub fn new(id: impl Into<String>, instances: u32) -> Self {
        Self {
            id: id.into(),
            instances,
            ..Self::default()
        }
    }

    /// Container port mappings, empty when the app has no docker container.
    pub fn port_mappings(&self) -> &[PortMapping] {
        self.container
            .as_ref()
            .and_then(|c| c.docker.as_ref())
            .map(|d| d.port_mappings.as_slice())
            .unwrap_or_default()
    }

    /// Nonzero service ports claimed by this application.
    pub fn service_ports(&self) -> Vec<u16> {
        self.port_mappings()
            .iter()
            .map(|pm| pm.service_port)
            .filter(|port| *port != 0)
            .collect()
    }

    /// Environment value for `key`, or `""` when unset.
    pub fn env_value(&self, key: &str) -> &str {
        self.env.get(key).map(String::as_str).unwrap_or("")
    }

    /// Whether alert-driven repair is enabled for this application.
    pub fn alerting_enabled(&self) -> bool {
        self.env_value(ENV_ALERT_ENABLE).eq_ignore_ascii_case("true")
    }

    /// Total resources requested across all instances: `(cpus, mem, gpus)`.
    pub fn total_resources(&self) -> (f64, f64, f64) {
        let n = f64::from(self.instances);
        (self.cpus * n, self.mem * n, self.gpus * n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_scheduler_json() {
        let json = r#"{
            "id": "/shop",
            "groups": [{ "id": "db", "apps": [{ "id": "mysql", "instances": 1 }] }],
            "apps": [{
                "id": "web",
                "instances": 2,
                "cpus": 0.5,
                "mem": 256,
                "container": {
                    "type": "DOCKER",
                    "docker": {
                        "image": "nginx",
                        "portMappings": [
                            { "containerPort": 80, "servicePort": 10001 },
                            { "containerPort": 443 }
                        ]
                    }
                },
                "env": { "ALERT_ENABLE": "true" }
            }]
        }"#;

        let group: Group = serde_json::from_str(json).unwrap();
        assert_eq!(group.groups[0].apps[0].id, "mysql");
        let web = &group.apps[0];
        assert_eq!(web.instances, 2);
        assert_eq!(web.service_ports(), vec![10001]);
        assert_eq!(web.port_mappings()[1].protocol, "tcp");
        assert!(web.alerting_enabled());
    }

    #[test]
    fn app_without_container_has_no_ports() {
        let app = Application::new("/shop/worker", 1);
        assert!(app.port_mappings().is_empty());
        assert!(app.service_ports().is_empty());
        assert!(!app.alerting_enabled());
        assert_eq!(app.env_value(ENV_SCALE_STEP), "");
    }

    #[test]
    fn total_resources_multiply_by_instances() {
        let mut app = Application::new("/shop/web", 3);
        app.cpus = 0.5;
        app.mem = 128.0;
        assert_eq!(app.total_resources(), (1.5, 384.0, 0.0));
    }
}
