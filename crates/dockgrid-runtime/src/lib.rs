//! dockgrid-runtime: container engine abstraction for DockGrid.
//!
//! The [`RuntimeClient`] trait is pure mechanism: look up containers by name,
//! make images available, create/start/remove containers, and manage
//! volumes. Policy lives in the controller.
//!
//! # Implementations
//!
//! - [`DockerRuntime`] talks to a Docker-compatible engine through bollard.
//! - [`fake::FakeRuntime`] keeps everything in memory and records each call,
//!   so controller and API tests can assert exact corrective actions.

pub mod docker;
pub mod error;
pub mod fake;
pub mod image;

use async_trait::async_trait;
use dockgrid_core::ServiceDefinition;

pub use docker::DockerRuntime;
pub use error::{RuntimeError, RuntimeResult};

/// What the runtime reports for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedContainer {
    pub id: String,
    /// Declared name, without the engine's leading `/`.
    pub name: String,
    pub image: String,
    pub state: ObservedState,
}

/// Runtime state flags of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    /// Engine status string (`running`, `exited`, `paused`, ...).
    pub status: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    pub oom_killed: bool,
    pub dead: bool,
    /// Health-check status (`starting`, `healthy`, `unhealthy`); `None` when
    /// the container has no health check configured.
    pub health: Option<String>,
}

impl ObservedState {
    /// A running container without a health check.
    pub fn running() -> Self {
        Self {
            status: "running".to_string(),
            running: true,
            ..Default::default()
        }
    }

    /// A container that has stopped.
    pub fn exited() -> Self {
        Self {
            status: "exited".to_string(),
            ..Default::default()
        }
    }

    /// Same state with a health-check status attached.
    pub fn with_health(mut self, health: &str) -> Self {
        self.health = Some(health.to_string());
        self
    }
}

/// Capability set the controller and API need from a container engine.
///
/// Every call goes to the engine; errors are returned, never swallowed.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Look up the container whose declared name equals `name`.
    /// Returns `Ok(None)` when there is no such container.
    async fn find_container(&self, name: &str) -> RuntimeResult<Option<ObservedContainer>>;

    /// Whether `image` is available locally.
    async fn image_available(&self, image: &str) -> RuntimeResult<bool>;

    /// Fetch `image` from its registry.
    async fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    /// Create and start one container named after the service.
    /// Returns the new container id.
    async fn create_and_start(&self, service: &ServiceDefinition) -> RuntimeResult<String>;

    /// Force-remove a container by id.
    async fn remove_container(&self, id: &str) -> RuntimeResult<()>;

    async fn volume_exists(&self, name: &str) -> RuntimeResult<bool>;

    async fn create_volume(&self, name: &str) -> RuntimeResult<()>;

    /// Status string of the named container, `None` if it does not exist or
    /// the engine reports no status.
    async fn container_status(&self, name: &str) -> RuntimeResult<Option<String>> {
        Ok(self
            .find_container(name)
            .await?
            .map(|c| c.state.status)
            .filter(|status| !status.is_empty()))
    }
}
