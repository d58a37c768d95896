//! Compose decoding and normalization.

use std::collections::{BTreeMap, BTreeSet};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::debug;

use dockgrid_core::{
    HealthCheckSpec, ProjectDefinition, ServiceDefinition, VolumeMount, parse_duration,
};

use crate::error::{ComposeError, ComposeResult};
use crate::raw::{
    ComposeFile, DependsOn, Environment, RawHealthcheck, RawMount, RawService, StringOrList,
    scalar_to_string,
};

/// Decode base64 compose text submitted by a client and parse it.
pub fn decode_project(project_name: &str, encoded: &str) -> ComposeResult<ProjectDefinition> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim().trim_end_matches('='))
        .map_err(|e| ComposeError::Base64(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|_| ComposeError::Utf8)?;
    parse_project(project_name, &text)
}

/// Parse plain compose YAML into a project definition.
pub fn parse_project(project_name: &str, yaml: &str) -> ComposeResult<ProjectDefinition> {
    let project_name = project_name.trim();
    if project_name.is_empty() {
        return Err(ComposeError::MissingProjectName);
    }
    if !is_valid_project_name(project_name) {
        return Err(ComposeError::InvalidProjectName(project_name.to_string()));
    }

    let file: ComposeFile =
        serde_yaml::from_str(yaml).map_err(|e| ComposeError::Yaml(e.to_string()))?;

    // Declared volume key -> runtime volume name. External volumes are
    // mounted by name but never created.
    let mut volume_names = BTreeMap::new();
    let mut managed_volumes = Vec::new();
    for (key, raw) in &file.volumes {
        if let Some(raw) = raw
            && raw.is_external()
        {
            volume_names.insert(key.clone(), raw.external_name(key));
            continue;
        }
        let name = raw
            .as_ref()
            .and_then(|v| v.name.clone())
            .unwrap_or_else(|| format!("{project_name}_{key}"));
        managed_volumes.push(name.clone());
        volume_names.insert(key.clone(), name);
    }

    let declared: BTreeSet<&str> = file.services.keys().map(String::as_str).collect();
    let mut services = Vec::with_capacity(file.services.len());
    for (name, raw) in &file.services {
        let service = convert_service(name, raw, &volume_names)?;
        if let Some(deps) = &service.depends_on
            && let Some(missing) = deps.iter().find(|d| !declared.contains(d.as_str()))
        {
            return Err(ComposeError::UnknownDependency {
                service: name.clone(),
                dependency: missing.clone(),
            });
        }
        services.push(service);
    }

    debug!(
        project = %project_name,
        services = services.len(),
        volumes = managed_volumes.len(),
        external_volumes = volume_names.len() - managed_volumes.len(),
        "compose file parsed"
    );

    Ok(ProjectDefinition {
        name: project_name.to_string(),
        services,
        volumes: managed_volumes,
    })
}

fn convert_service(
    name: &str,
    raw: &RawService,
    volume_names: &BTreeMap<String, String>,
) -> ComposeResult<ServiceDefinition> {
    if !is_valid_container_name(name) {
        return Err(ComposeError::InvalidServiceName(name.to_string()));
    }

    let image = raw.image.clone().unwrap_or_default();
    if image.trim().is_empty() && raw.build.is_none() {
        return Err(ComposeError::MissingImage(name.to_string()));
    }

    let volumes = raw
        .volumes
        .as_ref()
        .map(|mounts| {
            mounts
                .iter()
                .map(|m| convert_mount(name, m, volume_names))
                .collect::<ComposeResult<Vec<_>>>()
        })
        .transpose()?;

    let healthcheck = raw
        .healthcheck
        .as_ref()
        .map(|hc| convert_healthcheck(name, hc))
        .transpose()?;

    Ok(ServiceDefinition {
        name: name.to_string(),
        image,
        container_name: non_empty(&raw.container_name),
        command: split_command(name, "command", &raw.command)?,
        entrypoint: split_command(name, "entrypoint", &raw.entrypoint)?,
        environment: raw.environment.as_ref().map(convert_environment),
        expose: raw
            .expose
            .as_ref()
            .map(|ports| ports.iter().filter_map(scalar_to_string).collect()),
        hostname: non_empty(&raw.hostname),
        healthcheck,
        pull_policy: non_empty(&raw.pull_policy),
        depends_on: raw.depends_on.as_ref().map(|deps| match deps {
            DependsOn::List(names) => names.clone(),
            DependsOn::Map(map) => map.keys().cloned().collect(),
        }),
        volumes,
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// The string form is split with shell quoting rules.
fn split_command(
    service: &str,
    field: &'static str,
    value: &Option<StringOrList>,
) -> ComposeResult<Option<Vec<String>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        StringOrList::String(s) => shell_words::split(s).map(Some).map_err(|e| {
            ComposeError::InvalidCommand {
                service: service.to_string(),
                field,
                reason: e.to_string(),
            }
        }),
        StringOrList::List(items) => Ok(Some(items.clone())),
    }
}

fn convert_environment(env: &Environment) -> BTreeMap<String, Option<String>> {
    match env {
        Environment::Map(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), scalar_to_string(v)))
            .collect(),
        Environment::List(items) => items
            .iter()
            .map(|item| match item.split_once('=') {
                Some((k, v)) => (k.to_string(), Some(v.to_string())),
                None => (item.clone(), None),
            })
            .collect(),
    }
}

fn convert_mount(
    service: &str,
    mount: &RawMount,
    volume_names: &BTreeMap<String, String>,
) -> ComposeResult<VolumeMount> {
    let invalid = |spec: &str| ComposeError::InvalidMount {
        service: service.to_string(),
        spec: spec.to_string(),
    };

    let (source, target, read_only) = match mount {
        RawMount::Short(spec) => {
            let parts: Vec<&str> = spec.split(':').collect();
            match parts.as_slice() {
                [target] => (String::new(), target.to_string(), false),
                [source, target] => (source.to_string(), target.to_string(), false),
                [source, target, mode] => {
                    let read_only = mode.split(',').any(|m| m == "ro");
                    (source.to_string(), target.to_string(), read_only)
                }
                _ => return Err(invalid(spec)),
            }
        }
        RawMount::Long {
            source,
            target,
            read_only,
        } => (
            source.clone().unwrap_or_default(),
            target.clone(),
            read_only.unwrap_or(false),
        ),
    };

    if target.is_empty() {
        return Err(invalid(&format!("{source}:{target}")));
    }

    let source = volume_names.get(&source).cloned().unwrap_or(source);
    Ok(VolumeMount {
        source,
        target,
        read_only,
    })
}

fn convert_healthcheck(service: &str, raw: &RawHealthcheck) -> ComposeResult<HealthCheckSpec> {
    let duration = |field: &'static str, value: &Option<String>| {
        value
            .as_deref()
            .map(|s| {
                parse_duration(s).map_err(|e| ComposeError::InvalidHealthcheck {
                    service: service.to_string(),
                    field,
                    reason: e.to_string(),
                })
            })
            .transpose()
    };

    Ok(HealthCheckSpec {
        test: raw.test.as_ref().map(|test| match test {
            StringOrList::String(cmd) => vec!["CMD-SHELL".to_string(), cmd.clone()],
            StringOrList::List(items) => items.clone(),
        }),
        timeout: duration("timeout", &raw.timeout)?,
        interval: duration("interval", &raw.interval)?,
        retries: raw.retries,
        start_period: duration("start_period", &raw.start_period)?,
        start_interval: duration("start_interval", &raw.start_interval)?,
        disable: raw.disable.unwrap_or(false),
    })
}

/// Project names follow `[a-z0-9][a-z0-9_-]*`.
fn is_valid_project_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
}

/// Container names follow `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
