//! In-memory runtime used by tests.
//!
//! `FakeRuntime` behaves like a single-host engine: containers are keyed by
//! name, images and volumes are plain sets. Every trait call is appended to a
//! call log, and individual operations can be made to fail.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dockgrid_core::ServiceDefinition;

use crate::error::{RuntimeError, RuntimeResult};
use crate::image::finish_pull;
use crate::{ObservedContainer, ObservedState, RuntimeClient};

/// One recorded trait call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    FindContainer(String),
    ImageAvailable(String),
    PullImage(String),
    CreateAndStart(String),
    RemoveContainer(String),
    VolumeExists(String),
    CreateVolume(String),
}

impl RuntimeCall {
    /// Calls that change engine state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            RuntimeCall::PullImage(_)
                | RuntimeCall::CreateAndStart(_)
                | RuntimeCall::RemoveContainer(_)
                | RuntimeCall::CreateVolume(_)
        )
    }
}

#[derive(Default)]
struct FakeState {
    containers: BTreeMap<String, ObservedContainer>,
    definitions: BTreeMap<String, ServiceDefinition>,
    images: BTreeSet<String>,
    volumes: BTreeSet<String>,
    calls: Vec<RuntimeCall>,
    next_id: u64,
    fail_find: BTreeSet<String>,
    fail_pull: BTreeSet<String>,
    fail_create: BTreeSet<String>,
    fail_volume: BTreeSet<String>,
    tar_artifact: BTreeSet<String>,
}

impl FakeState {
    fn issue_id(&mut self) -> String {
        self.next_id += 1;
        format!("fake-{:04}", self.next_id)
    }
}

/// In-memory [`RuntimeClient`].
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding ────────────────────────────────────────────────────

    /// Make an image locally available.
    pub fn add_image(&self, image: &str) {
        self.lock().images.insert(image.to_string());
    }

    pub fn add_volume(&self, name: &str) {
        self.lock().volumes.insert(name.to_string());
    }

    /// Place a container directly, bypassing the call log. Returns its id.
    pub fn insert_container(&self, name: &str, image: &str, state: ObservedState) -> String {
        let mut inner = self.lock();
        let id = inner.issue_id();
        inner.containers.insert(
            name.to_string(),
            ObservedContainer {
                id: id.clone(),
                name: name.to_string(),
                image: image.to_string(),
                state,
            },
        );
        id
    }

    /// Replace the state of an existing container. Returns false if absent.
    pub fn set_state(&self, name: &str, state: ObservedState) -> bool {
        match self.lock().containers.get_mut(name) {
            Some(container) => {
                container.state = state;
                true
            }
            None => false,
        }
    }

    // ── Failure injection ──────────────────────────────────────────

    /// Lookups of this container name return an engine error.
    pub fn fail_find(&self, name: &str) {
        self.lock().fail_find.insert(name.to_string());
    }

    /// Pulls of this image fail.
    pub fn fail_pull(&self, image: &str) {
        self.lock().fail_pull.insert(image.to_string());
    }

    /// Creation of this container name fails.
    pub fn fail_create(&self, name: &str) {
        self.lock().fail_create.insert(name.to_string());
    }

    /// Undo [`fail_create`](Self::fail_create).
    pub fn recover_create(&self, name: &str) {
        self.lock().fail_create.remove(name);
    }

    /// Creation of this volume fails.
    pub fn fail_volume(&self, name: &str) {
        self.lock().fail_volume.insert(name.to_string());
    }

    /// Pulls of this image succeed but report the benign tar-header artifact.
    pub fn pull_artifact(&self, image: &str) {
        self.lock().tar_artifact.insert(image.to_string());
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Only the calls that changed engine state.
    pub fn mutating_calls(&self) -> Vec<RuntimeCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn container(&self, name: &str) -> Option<ObservedContainer> {
        self.lock().containers.get(name).cloned()
    }

    /// The service definition a container was last created from.
    pub fn created_definition(&self, name: &str) -> Option<ServiceDefinition> {
        self.lock().definitions.get(name).cloned()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.lock().images.contains(image)
    }

    pub fn volumes(&self) -> Vec<String> {
        self.lock().volumes.iter().cloned().collect()
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn find_container(&self, name: &str) -> RuntimeResult<Option<ObservedContainer>> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::FindContainer(name.to_string()));
        if inner.fail_find.contains(name) {
            return Err(RuntimeError::Engine(format!("lookup of {name} failed")));
        }
        Ok(inner.containers.get(name).cloned())
    }

    async fn image_available(&self, image: &str) -> RuntimeResult<bool> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::ImageAvailable(image.to_string()));
        Ok(inner.images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::PullImage(image.to_string()));
        if inner.fail_pull.contains(image) {
            return finish_pull(image, Some("manifest unknown".to_string()), false);
        }
        inner.images.insert(image.to_string());
        let artifact = inner
            .tar_artifact
            .contains(image)
            .then(|| "archive/tar: invalid tar header".to_string());
        finish_pull(image, artifact, true)
    }

    async fn create_and_start(&self, service: &ServiceDefinition) -> RuntimeResult<String> {
        let mut inner = self.lock();
        inner
            .calls
            .push(RuntimeCall::CreateAndStart(service.name.clone()));

        let reason = if inner.fail_create.contains(&service.name) {
            Some("injected failure".to_string())
        } else if inner.containers.contains_key(&service.name) {
            Some("name already in use".to_string())
        } else if !inner.images.contains(&service.image) {
            Some(format!("no such image: {}", service.image))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(RuntimeError::Create {
                name: service.name.clone(),
                reason,
            });
        }

        let has_check = service
            .healthcheck
            .as_ref()
            .is_some_and(|hc| !hc.disable && hc.test.is_some());
        let state = if has_check {
            ObservedState::running().with_health("starting")
        } else {
            ObservedState::running()
        };

        let id = inner.issue_id();
        inner.containers.insert(
            service.name.clone(),
            ObservedContainer {
                id: id.clone(),
                name: service.name.clone(),
                image: service.image.clone(),
                state,
            },
        );
        inner
            .definitions
            .insert(service.name.clone(), service.clone());
        Ok(id)
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::RemoveContainer(id.to_string()));
        let name = inner
            .containers
            .iter()
            .find(|(_, c)| c.id == id)
            .map(|(name, _)| name.clone());
        match name {
            Some(name) => {
                inner.containers.remove(&name);
                Ok(())
            }
            None => Err(RuntimeError::Remove {
                id: id.to_string(),
                reason: "no such container".to_string(),
            }),
        }
    }

    async fn volume_exists(&self, name: &str) -> RuntimeResult<bool> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::VolumeExists(name.to_string()));
        Ok(inner.volumes.contains(name))
    }

    async fn create_volume(&self, name: &str) -> RuntimeResult<()> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::CreateVolume(name.to_string()));
        if inner.fail_volume.contains(name) {
            return Err(RuntimeError::Volume {
                name: name.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        inner.volumes.insert(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web() -> ServiceDefinition {
        ServiceDefinition {
            name: "web".to_string(),
            image: "nginx:alpine".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_requires_image() {
        let rt = FakeRuntime::new();
        let err = rt.create_and_start(&web()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Create { .. }));

        rt.pull_image("nginx:alpine").await.unwrap();
        let id = rt.create_and_start(&web()).await.unwrap();
        let found = rt.find_container("web").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(found.state.running);
        assert_eq!(found.state.health, None);
    }

    #[tokio::test]
    async fn remove_by_id() {
        let rt = FakeRuntime::new();
        let id = rt.insert_container("web", "nginx:alpine", ObservedState::exited());
        rt.remove_container(&id).await.unwrap();
        assert!(rt.find_container("web").await.unwrap().is_none());
        assert!(rt.remove_container(&id).await.is_err());
    }

    #[tokio::test]
    async fn artifact_pull_succeeds_and_image_is_present() {
        let rt = FakeRuntime::new();
        rt.pull_artifact("app:1");
        rt.pull_image("app:1").await.unwrap();
        assert!(rt.image_available("app:1").await.unwrap());
    }

    #[tokio::test]
    async fn injected_failures() {
        let rt = FakeRuntime::new();
        rt.fail_pull("bad:1");
        rt.fail_find("ghost");
        rt.fail_volume("v");

        assert!(rt.pull_image("bad:1").await.is_err());
        assert!(!rt.has_image("bad:1"));
        assert!(rt.find_container("ghost").await.is_err());
        assert!(rt.create_volume("v").await.is_err());
    }

    #[tokio::test]
    async fn call_log_separates_mutations() {
        let rt = FakeRuntime::new();
        rt.volume_exists("a").await.unwrap();
        rt.create_volume("a").await.unwrap();
        rt.find_container("web").await.unwrap();

        assert_eq!(rt.calls().len(), 3);
        assert_eq!(
            rt.mutating_calls(),
            vec![RuntimeCall::CreateVolume("a".to_string())]
        );
        rt.clear_calls();
        assert!(rt.calls().is_empty());
    }

    #[tokio::test]
    async fn container_status_defaults() {
        let rt = FakeRuntime::new();
        assert_eq!(rt.container_status("web").await.unwrap(), None);
        rt.insert_container("web", "nginx", ObservedState::exited());
        assert_eq!(
            rt.container_status("web").await.unwrap().as_deref(),
            Some("exited")
        );
        rt.insert_container("blank", "nginx", ObservedState::default());
        assert_eq!(rt.container_status("blank").await.unwrap(), None);
    }
}
