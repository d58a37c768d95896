//! Docker Engine backend built on bollard.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{
    ContainerInspectResponse, ContainerState, ContainerStateStatusEnum, HealthConfig,
    HealthStatusEnum, HostConfig,
};
use bollard::volume::CreateVolumeOptions;
use futures_util::StreamExt;
use tracing::{debug, info, trace};

use dockgrid_core::{HealthCheckSpec, ServiceDefinition};

use crate::error::{RuntimeError, RuntimeResult};
use crate::image::{finish_pull, is_benign_pull_error, split_image_reference};
use crate::{ObservedContainer, ObservedState, RuntimeClient};

/// Runtime client for a Docker-compatible engine.
///
/// Holds one long-lived connection; bollard's client is safe to share
/// between the controller and the API.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using local defaults (`DOCKER_HOST` or the default socket) and
    /// verify the engine answers.
    pub async fn connect() -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        info!("connected to container engine");
        Ok(Self { docker })
    }

    /// Wrap an already-configured bollard client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn engine(err: BollardError) -> RuntimeError {
    RuntimeError::Engine(err.to_string())
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn find_container(&self, name: &str) -> RuntimeResult<Option<ObservedContainer>> {
        // The engine's name filter is a substring match; pick the exact one.
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(engine)?;

        let declared = format!("/{name}");
        let id = summaries
            .into_iter()
            .find(|c| {
                c.names
                    .as_ref()
                    .is_some_and(|names| names.iter().any(|n| n == &declared || n == name))
            })
            .and_then(|c| c.id);
        let Some(id) = id else {
            return Ok(None);
        };

        match self.docker.inspect_container(&id, None).await {
            Ok(info) => Ok(Some(observed_container(name, id, info))),
            // Removed between list and inspect.
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(engine(e)),
        }
    }

    async fn image_available(&self, image: &str) -> RuntimeResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(engine(e)),
        }
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let (repo, tag) = split_image_reference(image);
        let options = CreateImageOptions {
            from_image: repo,
            tag,
            ..Default::default()
        };

        let mut stream = std::pin::pin!(self.docker.create_image(Some(options), None, None));
        let mut stream_error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        trace!(%image, %status, "pull progress");
                    }
                }
                Err(e) => {
                    stream_error = Some(e.to_string());
                    break;
                }
            }
        }

        let present_after = match &stream_error {
            None => true,
            Some(reason) if is_benign_pull_error(reason) => self.image_available(image).await?,
            Some(_) => false,
        };
        finish_pull(image, stream_error, present_after)?;
        info!(%image, "image pulled");
        Ok(())
    }

    async fn create_and_start(&self, service: &ServiceDefinition) -> RuntimeResult<String> {
        let create_err = |e: BollardError| RuntimeError::Create {
            name: service.name.clone(),
            reason: e.to_string(),
        };

        let options = CreateContainerOptions {
            name: service.name.clone(),
            platform: None,
        };
        let created = self
            .docker
            .create_container(Some(options), container_config(service))
            .await
            .map_err(create_err)?;
        for warning in &created.warnings {
            debug!(service = %service.name, %warning, "engine warning on create");
        }

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(create_err)?;
        Ok(created.id)
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(RuntimeError::Remove {
                id: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn volume_exists(&self, name: &str) -> RuntimeResult<bool> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(RuntimeError::Volume {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn create_volume(&self, name: &str) -> RuntimeResult<()> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            driver: "local".to_string(),
            ..Default::default()
        };
        self.docker
            .create_volume(options)
            .await
            .map_err(|e| RuntimeError::Volume {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

// ── Engine model conversion ────────────────────────────────────────

fn observed_container(name: &str, id: String, info: ContainerInspectResponse) -> ObservedContainer {
    let image = info
        .config
        .as_ref()
        .and_then(|c| c.image.clone())
        .unwrap_or_default();
    ObservedContainer {
        id,
        name: name.to_string(),
        image,
        state: info.state.map(observed_state).unwrap_or_default(),
    }
}

fn observed_state(state: ContainerState) -> ObservedState {
    ObservedState {
        status: state.status.map(status_name).unwrap_or_default().to_string(),
        running: state.running.unwrap_or(false),
        paused: state.paused.unwrap_or(false),
        restarting: state.restarting.unwrap_or(false),
        oom_killed: state.oom_killed.unwrap_or(false),
        dead: state.dead.unwrap_or(false),
        health: state
            .health
            .and_then(|h| h.status)
            .and_then(health_name)
            .map(str::to_string),
    }
}

fn status_name(status: ContainerStateStatusEnum) -> &'static str {
    match status {
        ContainerStateStatusEnum::EMPTY => "",
        ContainerStateStatusEnum::CREATED => "created",
        ContainerStateStatusEnum::RUNNING => "running",
        ContainerStateStatusEnum::PAUSED => "paused",
        ContainerStateStatusEnum::RESTARTING => "restarting",
        ContainerStateStatusEnum::REMOVING => "removing",
        ContainerStateStatusEnum::EXITED => "exited",
        ContainerStateStatusEnum::DEAD => "dead",
    }
}

/// `None` means no health check is configured.
fn health_name(status: HealthStatusEnum) -> Option<&'static str> {
    match status {
        HealthStatusEnum::EMPTY | HealthStatusEnum::NONE => None,
        HealthStatusEnum::STARTING => Some("starting"),
        HealthStatusEnum::HEALTHY => Some("healthy"),
        HealthStatusEnum::UNHEALTHY => Some("unhealthy"),
    }
}

/// Engine container configuration for a service.
fn container_config(service: &ServiceDefinition) -> Config<String> {
    let mut binds = Vec::new();
    let mut anonymous = HashMap::new();
    for mount in service.volumes.iter().flatten() {
        if mount.is_anonymous() {
            anonymous.insert(mount.target.clone(), HashMap::new());
        } else {
            binds.push(mount.bind_spec());
        }
    }

    let env = service.environment.as_ref().map(|vars| {
        vars.iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{key}={value}"),
                None => key.clone(),
            })
            .collect()
    });

    let exposed_ports = service.expose.as_ref().map(|ports| {
        ports
            .iter()
            .map(|port| (port_key(port), HashMap::new()))
            .collect()
    });

    Config {
        image: Some(service.image.clone()),
        cmd: service.command.clone(),
        entrypoint: service.entrypoint.clone(),
        env,
        hostname: service.hostname.clone(),
        exposed_ports,
        healthcheck: service.healthcheck.as_ref().map(health_config),
        volumes: (!anonymous.is_empty()).then_some(anonymous),
        host_config: Some(HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `80` → `80/tcp`; ports with an explicit protocol are kept.
fn port_key(port: &str) -> String {
    if port.contains('/') {
        port.to_string()
    } else {
        format!("{port}/tcp")
    }
}

fn health_config(spec: &HealthCheckSpec) -> HealthConfig {
    if spec.disable {
        return HealthConfig {
            test: Some(vec!["NONE".to_string()]),
            ..Default::default()
        };
    }
    HealthConfig {
        test: spec.test.clone(),
        interval: spec.interval.map(nanos),
        timeout: spec.timeout.map(nanos),
        retries: spec.retries.map(|r| i64::try_from(r).unwrap_or(i64::MAX)),
        start_period: spec.start_period.map(nanos),
        ..Default::default()
    }
}

fn nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}
