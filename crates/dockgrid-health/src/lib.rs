//! dockgrid-health: health evaluation for DockGrid services.
//!
//! [`classify`] maps what the runtime reports for a container (or its
//! absence) to three independent levels: present, alive, healthy. It has no
//! side effects.
//!
//! [`HealthTracker`] keeps the consecutive-failure streak of one service
//! across ticks. The controller uses it to decide when a present but failing
//! container should be replaced.

pub mod classify;
pub mod tracker;

pub use classify::{ProbeResult, ServiceStatus, classify, probe};
pub use tracker::{HealthStatus, HealthTracker};
