//! Reconciler: compares desired state with the runtime and corrects drift.
//!
//! The reconciler owns no persisted state. It reads a fresh snapshot of
//! volumes and services at the start of every tick and works through them
//! sequentially; a slow runtime call delays the rest of that tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use dockgrid_core::{PullPolicy, parse_interval};
use dockgrid_health::{HealthTracker, classify, probe};
use dockgrid_runtime::{ObservedContainer, RuntimeClient, RuntimeError};
use dockgrid_state::{Service, StateStore};

use crate::error::{ControllerError, ControllerResult};

/// Reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Pause between the end of one tick and the start of the next.
    pub interval: Duration,
    /// Consecutive failing observations before a present container is
    /// replaced. `None` only logs what it observes.
    pub unhealthy_threshold: Option<u32>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            unhealthy_threshold: None,
        }
    }
}

impl ReconcilerConfig {
    /// Build a config from a duration string such as `"10s"`.
    /// Zero and unparsable intervals are rejected.
    pub fn parse(interval: &str, unhealthy_threshold: Option<u32>) -> ControllerResult<Self> {
        Ok(Self {
            interval: parse_interval(interval)?,
            unhealthy_threshold,
        })
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub volumes_created: usize,
    pub volumes_failed: usize,
    /// Build-based services, which are never managed.
    pub services_skipped: usize,
    pub services_started: usize,
    pub services_observed: usize,
    /// Present containers force-removed after a failing streak.
    pub services_removed: usize,
    pub services_failed: usize,
    /// The tick stopped early on a shutdown signal.
    pub cancelled: bool,
}

/// What happened to one service during a tick.
enum ServiceOutcome {
    Started,
    Observed,
    Removed,
}

/// The reconciliation controller.
pub struct Reconciler {
    store: StateStore,
    runtime: Arc<dyn RuntimeClient>,
    config: ReconcilerConfig,
    /// Failing streaks per service name. Only used with a threshold.
    trackers: HashMap<String, HealthTracker>,
}

impl Reconciler {
    pub fn new(
        store: StateStore,
        runtime: Arc<dyn RuntimeClient>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            runtime,
            config,
            trackers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run ticks until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// A tick that is in progress when the signal arrives stops before the
    /// next volume or service.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            unhealthy_threshold = ?self.config.unhealthy_threshold,
            "reconciler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.reconcile(Some(&shutdown)).await {
                Ok(report) => debug!(?report, "tick complete"),
                Err(e) => error!(error = %e, "tick aborted"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("reconciler shutting down");
    }

    /// Run one full tick without a cancellation signal.
    pub async fn tick(&mut self) -> ControllerResult<TickReport> {
        self.reconcile(None).await
    }

    /// Run one tick, stopping between items once `cancel` is `true`.
    pub async fn tick_until(
        &mut self,
        cancel: &watch::Receiver<bool>,
    ) -> ControllerResult<TickReport> {
        self.reconcile(Some(cancel)).await
    }

    async fn reconcile(
        &mut self,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> ControllerResult<TickReport> {
        let is_cancelled = || cancel.is_some_and(|rx| *rx.borrow());
        let mut report = TickReport::default();

        let volumes = self.store.list_volumes()?;
        let services = self.store.list_services()?;
        debug!(
            volumes = volumes.len(),
            services = services.len(),
            "desired state loaded"
        );

        // ── Volume pass ────────────────────────────────────────────
        for volume in &volumes {
            if is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            match self.ensure_volume(&volume.name).await {
                Ok(true) => report.volumes_created += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(volume = %volume.name, error = %e, "volume skipped");
                    report.volumes_failed += 1;
                }
            }
        }

        // ── Service pass ───────────────────────────────────────────
        for service in &services {
            if is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            if service.is_build_based() {
                debug!(service = %service.name(), "build-based service is not managed");
                report.services_skipped += 1;
                continue;
            }
            match self.reconcile_service(service).await {
                Ok(ServiceOutcome::Started) => report.services_started += 1,
                Ok(ServiceOutcome::Observed) => report.services_observed += 1,
                Ok(ServiceOutcome::Removed) => report.services_removed += 1,
                Err(ControllerError::Runtime(e)) => {
                    warn!(service = %service.name(), error = %e, "service skipped");
                    report.services_failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Returns `true` if the volume had to be created.
    async fn ensure_volume(&self, name: &str) -> ControllerResult<bool> {
        if self.runtime.volume_exists(name).await? {
            debug!(volume = %name, "volume present");
            return Ok(false);
        }
        self.runtime.create_volume(name).await?;
        info!(volume = %name, "volume created");
        Ok(true)
    }

    async fn reconcile_service(&mut self, service: &Service) -> ControllerResult<ServiceOutcome> {
        let observed = self.runtime.find_container(service.name()).await?;

        let Some(container) = observed else {
            self.start_service(service).await?;
            // A fresh container is not expected to pass checks yet.
            self.reset_tracker(service.name());
            return Ok(ServiceOutcome::Started);
        };

        let status = classify(&service.definition, Some(&container));
        info!(
            service = %service.name(),
            alive = status.alive,
            healthy = status.healthy,
            state = %container.state.status,
            "service observed"
        );

        if self.should_replace(service, &container) {
            self.replace(service, &container).await?;
            return Ok(ServiceOutcome::Removed);
        }
        Ok(ServiceOutcome::Observed)
    }

    /// Record the observation and report whether the streak crossed the
    /// threshold.
    fn should_replace(&mut self, service: &Service, container: &ObservedContainer) -> bool {
        let Some(threshold) = self.config.unhealthy_threshold else {
            return false;
        };
        let Some(result) = probe(&service.definition, Some(container)) else {
            return false;
        };
        let tracker = self
            .trackers
            .entry(service.name().to_string())
            .or_insert_with(|| HealthTracker::new(threshold));
        tracker.record(result);
        debug!(
            service = %service.name(),
            status = ?tracker.status(),
            failures = tracker.consecutive_failures(),
            "health recorded"
        );
        tracker.needs_replacement()
    }

    fn reset_tracker(&mut self, service: &str) {
        if let Some(tracker) = self.trackers.get_mut(service) {
            tracker.reset();
        }
    }

    /// Force-remove the container and count the failure. The next tick
    /// recreates it through the not-present path.
    async fn replace(&mut self, service: &Service, container: &ObservedContainer) -> ControllerResult<()> {
        self.runtime.remove_container(&container.id).await?;
        self.reset_tracker(service.name());
        let failures = match self.store.increment_failure_count(service.name()) {
            Ok(failures) => failures,
            Err(e) => {
                // The container is already gone; this failure goes uncounted.
                error!(
                    service = %service.name(),
                    container = %container.id,
                    error = %e,
                    "unhealthy container removed but its failure count was not recorded"
                );
                return Err(e.into());
            }
        };
        warn!(
            service = %service.name(),
            container = %container.id,
            failure_count = failures,
            "unhealthy container removed"
        );
        Ok(())
    }

    /// Make the image available per the service's pull policy, then create
    /// and start its container.
    async fn start_service(&self, service: &Service) -> ControllerResult<()> {
        let image = service.image();
        match service.definition.pull_policy() {
            PullPolicy::Always => self.runtime.pull_image(image).await?,
            PullPolicy::Missing => {
                if !self.runtime.image_available(image).await? {
                    info!(service = %service.name(), %image, "pulling image");
                    self.runtime.pull_image(image).await?;
                }
            }
            PullPolicy::Never => {
                if !self.runtime.image_available(image).await? {
                    return Err(RuntimeError::Pull {
                        image: image.to_string(),
                        reason: "not present locally and pull_policy is never".to_string(),
                    }
                    .into());
                }
            }
        }

        let id = self.runtime.create_and_start(&service.definition).await?;
        info!(service = %service.name(), %image, container = %id, "container started");
        Ok(())
    }
}
