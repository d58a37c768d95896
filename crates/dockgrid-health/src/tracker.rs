//! Consecutive-failure tracking for one service.

use tracing::{debug, warn};

use crate::classify::ProbeResult;

/// Tracked health of a service across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Tracks consecutive probe results for a single service.
#[derive(Debug)]
pub struct HealthTracker {
    status: HealthStatus,
    consecutive_failures: u32,
    /// Failures in a row before the service is marked unhealthy.
    unhealthy_threshold: u32,
}

impl HealthTracker {
    /// A threshold of zero is treated as one.
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    /// Record a probe result and return the new health status.
    pub fn record(&mut self, result: ProbeResult) -> HealthStatus {
        match result {
            ProbeResult::Healthy => {
                if self.status == HealthStatus::Unhealthy {
                    debug!(
                        failures = self.consecutive_failures,
                        "service recovered to healthy"
                    );
                }
                self.consecutive_failures = 0;
                self.status = HealthStatus::Healthy;
            }
            ProbeResult::Unhealthy | ProbeResult::Down => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.status != HealthStatus::Unhealthy {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            "service marked unhealthy"
                        );
                    }
                    self.status = HealthStatus::Unhealthy;
                }
            }
            // No verdict yet; keep the streak as it is.
            ProbeResult::Pending => {}
        }

        self.status
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether this service's container should be replaced.
    pub fn needs_replacement(&self) -> bool {
        self.status == HealthStatus::Unhealthy
    }

    /// Forget the streak, e.g. after the container was replaced.
    pub fn reset(&mut self) {
        self.status = HealthStatus::Unknown;
        self.consecutive_failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_starts_unknown() {
        let tracker = HealthTracker::new(3);
        assert_eq!(tracker.status(), HealthStatus::Unknown);
        assert_eq!(tracker.consecutive_failures(), 0);
        assert!(!tracker.needs_replacement());
    }

    #[test]
    fn tracker_becomes_healthy_on_first_success() {
        let mut tracker = HealthTracker::new(3);
        assert_eq!(tracker.record(ProbeResult::Healthy), HealthStatus::Healthy);
    }

    #[test]
    fn tracker_stays_healthy_under_threshold() {
        let mut tracker = HealthTracker::new(3);
        tracker.record(ProbeResult::Healthy);

        tracker.record(ProbeResult::Unhealthy);
        tracker.record(ProbeResult::Down);
        assert_eq!(tracker.status(), HealthStatus::Healthy);
        assert_eq!(tracker.consecutive_failures(), 2);
    }

    #[test]
    fn tracker_becomes_unhealthy_at_threshold() {
        let mut tracker = HealthTracker::new(3);
        tracker.record(ProbeResult::Unhealthy);
        tracker.record(ProbeResult::Unhealthy);
        let status = tracker.record(ProbeResult::Down);
        assert_eq!(status, HealthStatus::Unhealthy);
        assert!(tracker.needs_replacement());
    }

    #[test]
    fn tracker_recovers_on_success() {
        let mut tracker = HealthTracker::new(2);
        tracker.record(ProbeResult::Down);
        tracker.record(ProbeResult::Down);
        assert!(tracker.needs_replacement());

        assert_eq!(tracker.record(ProbeResult::Healthy), HealthStatus::Healthy);
        assert_eq!(tracker.consecutive_failures(), 0);
        assert!(!tracker.needs_replacement());
    }

    #[test]
    fn pending_does_not_move_the_streak() {
        let mut tracker = HealthTracker::new(2);
        tracker.record(ProbeResult::Unhealthy);
        tracker.record(ProbeResult::Pending);
        tracker.record(ProbeResult::Pending);
        assert_eq!(tracker.consecutive_failures(), 1);
        assert!(!tracker.needs_replacement());
    }

    #[test]
    fn zero_threshold_acts_as_one() {
        let mut tracker = HealthTracker::new(0);
        tracker.record(ProbeResult::Down);
        assert!(tracker.needs_replacement());
    }

    #[test]
    fn reset_clears_state() {
        let mut tracker = HealthTracker::new(1);
        tracker.record(ProbeResult::Down);
        tracker.reset();
        assert_eq!(tracker.status(), HealthStatus::Unknown);
        assert_eq!(tracker.consecutive_failures(), 0);
    }
}
