//! Project definition types shared across DockGrid crates.
//!
//! A `ProjectDefinition` is what the compose decoder produces and what the
//! state store ingests. Optional fields use `Option` so that "not specified"
//! (`None`) stays distinct from "specified but empty" (`Some(vec![])`) after
//! a JSON round-trip.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A parsed multi-service definition, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDefinition {
    pub name: String,
    pub services: Vec<ServiceDefinition>,
    /// Fully-qualified runtime volume names.
    pub volumes: Vec<String>,
}

/// Desired configuration of one workload unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Also the container name in the runtime.
    pub name: String,
    /// Empty for build-based services.
    pub image: String,
    pub container_name: Option<String>,
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    /// Variables declared without a value map to `None`.
    pub environment: Option<BTreeMap<String, Option<String>>>,
    pub expose: Option<Vec<String>>,
    pub hostname: Option<String>,
    pub healthcheck: Option<HealthCheckSpec>,
    pub pull_policy: Option<String>,
    pub depends_on: Option<Vec<String>>,
    pub volumes: Option<Vec<VolumeMount>>,
}

impl ServiceDefinition {
    /// Build-based services have no image and are never managed by the controller.
    pub fn is_build_based(&self) -> bool {
        self.image.trim().is_empty()
    }

    /// Resolved pull policy. Unknown values fall back to `Missing`.
    pub fn pull_policy(&self) -> PullPolicy {
        match self.pull_policy.as_deref() {
            Some("always") => PullPolicy::Always,
            Some("never") => PullPolicy::Never,
            _ => PullPolicy::Missing,
        }
    }
}

/// Health check block carried from the compose definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// Full test command, e.g. `["CMD-SHELL", "curl -f http://localhost"]`.
    pub test: Option<Vec<String>>,
    pub timeout: Option<Duration>,
    pub interval: Option<Duration>,
    pub retries: Option<u64>,
    pub start_period: Option<Duration>,
    pub start_interval: Option<Duration>,
    pub disable: bool,
}

/// A `source:target` mount. An empty source is an anonymous volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn is_anonymous(&self) -> bool {
        self.source.is_empty()
    }

    /// Engine bind specification (`source:target[:ro]`).
    pub fn bind_spec(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.source, self.target)
        } else {
            format!("{}:{}", self.source, self.target)
        }
    }
}

/// When the controller should fetch a service's image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPolicy {
    /// Pull only if the image is not available locally.
    Missing,
    /// Pull before every container creation.
    Always,
    /// Never pull; a missing image is an error.
    Never,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_image_is_build_based() {
        let svc = ServiceDefinition {
            name: "app".to_string(),
            image: "  ".to_string(),
            ..Default::default()
        };
        assert!(svc.is_build_based());
    }

    #[test]
    fn bind_spec_formats() {
        let rw = VolumeMount {
            source: "demo_data".to_string(),
            target: "/var/lib/data".to_string(),
            read_only: false,
        };
        assert_eq!(rw.bind_spec(), "demo_data:/var/lib/data");

        let ro = VolumeMount { read_only: true, ..rw };
        assert_eq!(ro.bind_spec(), "demo_data:/var/lib/data:ro");
    }

    #[test]
    fn pull_policy_defaults_to_missing() {
        let mut svc = ServiceDefinition::default();
        assert_eq!(svc.pull_policy(), PullPolicy::Missing);
        svc.pull_policy = Some("always".to_string());
        assert_eq!(svc.pull_policy(), PullPolicy::Always);
        svc.pull_policy = Some("if_not_present".to_string());
        assert_eq!(svc.pull_policy(), PullPolicy::Missing);
    }

    #[test]
    fn absent_and_empty_survive_json_round_trip() {
        let svc = ServiceDefinition {
            name: "web".to_string(),
            image: "nginx:alpine".to_string(),
            command: Some(vec![]),
            entrypoint: None,
            environment: Some(BTreeMap::from([("DEBUG".to_string(), None)])),
            ..Default::default()
        };
        let json = serde_json::to_string(&svc).unwrap();
        let back: ServiceDefinition = serde_json::from_str(&json).unwrap();

        assert_eq!(back.command, Some(vec![]));
        assert_eq!(back.entrypoint, None);
        assert_eq!(back, svc);
    }
}
