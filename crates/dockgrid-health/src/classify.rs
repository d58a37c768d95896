//! Classification of observed container state.

use serde::Serialize;
use tracing::trace;

use dockgrid_core::ServiceDefinition;
use dockgrid_runtime::ObservedContainer;

/// Three-level runtime status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// A container with the service's name exists.
    pub present: bool,
    /// The container is running (not paused, restarting, OOM-killed or dead).
    pub alive: bool,
    /// The container passes its health check, or has none.
    pub healthy: bool,
}

impl ServiceStatus {
    pub const ABSENT: Self = Self {
        present: false,
        alive: false,
        healthy: false,
    };
}

/// Classify one service against what the runtime reports for it.
pub fn classify(service: &ServiceDefinition, observed: Option<&ObservedContainer>) -> ServiceStatus {
    let Some(container) = observed else {
        return ServiceStatus::ABSENT;
    };
    let state = &container.state;

    let down =
        !state.running || state.paused || state.restarting || state.oom_killed || state.dead;
    if down {
        trace!(service = %service.name, status = %state.status, "container not alive");
        return ServiceStatus {
            present: true,
            alive: false,
            healthy: false,
        };
    }

    // No health check configured means assumed healthy.
    let healthy = match state.health.as_deref() {
        None => true,
        Some(health) => health == "healthy",
    };
    ServiceStatus {
        present: true,
        alive: true,
        healthy,
    }
}

/// Outcome of one observation, as fed to a [`HealthTracker`](crate::HealthTracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// Alive and healthy.
    Healthy,
    /// Alive, and the health check reports a failure.
    Unhealthy,
    /// Present but not alive.
    Down,
    /// Alive, health check has not produced a verdict yet.
    Pending,
}

/// Reduce an observation of a present container to a probe result.
/// Returns `None` when the container is absent.
pub fn probe(service: &ServiceDefinition, observed: Option<&ObservedContainer>) -> Option<ProbeResult> {
    let status = classify(service, observed);
    if !status.present {
        return None;
    }
    let result = if !status.alive {
        ProbeResult::Down
    } else if status.healthy {
        ProbeResult::Healthy
    } else if observed.and_then(|c| c.state.health.as_deref()) == Some("starting") {
        ProbeResult::Pending
    } else {
        ProbeResult::Unhealthy
    };
    Some(result)
}
