//! Persisted desired-state records.

use serde::{Deserialize, Serialize};

use dockgrid_core::ServiceDefinition;

/// Surrogate identifier issued by the store.
pub type ProjectId = u64;

/// A named desired-state group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    /// Globally unique.
    pub name: String,
    /// Unix timestamp (seconds) when the project was ingested.
    pub created_at: u64,
    pub updated_at: u64,
}

/// One workload unit owned by a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: u64,
    pub project_id: ProjectId,
    pub definition: ServiceDefinition,
    /// Times the controller force-removed an unhealthy instance.
    pub failure_count: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn image(&self) -> &str {
        &self.definition.image
    }

    /// Build-based services are outside the controller's scope.
    pub fn is_build_based(&self) -> bool {
        self.definition.is_build_based()
    }
}

/// A named persisted-storage unit owned by a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Volume {
    pub id: u64,
    pub name: String,
    pub project_id: ProjectId,
    pub created_at: u64,
}

impl Volume {
    /// Build the composite key for the volumes table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.project_id, self.name)
    }
}
