//! redb table definitions for the DockGrid state store.

use redb::TableDefinition;

/// Projects keyed by name.
pub const PROJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("projects");

/// Services keyed by name (also the container name in the runtime).
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Volumes keyed by `{project_id}/{name}`.
pub const VOLUMES: TableDefinition<&str, &[u8]> = TableDefinition::new("volumes");

/// Last issued surrogate id per entity kind.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
