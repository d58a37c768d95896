//! Serde model of the compose YAML, before normalization.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ComposeFile {
    pub services: BTreeMap<String, RawService>,
    pub volumes: BTreeMap<String, Option<RawVolume>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawService {
    pub image: Option<String>,
    pub build: Option<Value>,
    pub container_name: Option<String>,
    pub command: Option<StringOrList>,
    pub entrypoint: Option<StringOrList>,
    pub environment: Option<Environment>,
    pub expose: Option<Vec<Value>>,
    pub hostname: Option<String>,
    pub healthcheck: Option<RawHealthcheck>,
    pub pull_policy: Option<String>,
    pub depends_on: Option<DependsOn>,
    pub volumes: Option<Vec<RawMount>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawHealthcheck {
    pub test: Option<StringOrList>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub retries: Option<u64>,
    pub start_period: Option<String>,
    pub start_interval: Option<String>,
    pub disable: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawVolume {
    pub name: Option<String>,
    pub external: Option<External>,
}

/// `external: true`, or the legacy `external: { name: ... }` form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum External {
    Flag(bool),
    Named {
        #[serde(default)]
        name: Option<String>,
    },
}

impl RawVolume {
    pub fn is_external(&self) -> bool {
        match &self.external {
            Some(External::Flag(flag)) => *flag,
            Some(External::Named { .. }) => true,
            None => false,
        }
    }

    /// Engine name of an external volume, falling back to its key.
    pub fn external_name(&self, key: &str) -> String {
        let legacy = match &self.external {
            Some(External::Named { name }) => name.clone(),
            _ => None,
        };
        self.name
            .clone()
            .or(legacy)
            .unwrap_or_else(|| key.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum StringOrList {
    String(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Environment {
    Map(BTreeMap<String, Value>),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DependsOn {
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawMount {
    Short(String),
    Long {
        #[serde(default)]
        source: Option<String>,
        target: String,
        #[serde(default)]
        read_only: Option<bool>,
    },
}

/// Render a YAML scalar the way compose does for env values and ports.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
