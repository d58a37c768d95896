//! StateStore: redb-backed desired-state persistence for DockGrid.
//!
//! Writers: [`StateStore::ingest_project`] (all-or-nothing) and
//! [`StateStore::increment_failure_count`]. Readers list or look up each kind.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{
    Database, ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use dockgrid_core::ProjectDefinition;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const PROJECT_SEQ: &str = "project";
const SERVICE_SEQ: &str = "service";
const VOLUME_SEQ: &str = "volume";

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PROJECTS).map_err(map_err!(Table))?;
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(VOLUMES).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Writers ────────────────────────────────────────────────────

    /// Persist a project with all of its services and volumes.
    ///
    /// Fails with [`StateError::Conflict`] if the project name is taken and
    /// with [`StateError::Validation`] if a service name is empty, repeated,
    /// or already used by another project. Nothing is written on failure.
    pub fn ingest_project(&self, definition: &ProjectDefinition) -> StateResult<Project> {
        validate_definition(definition)?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        match write_project(&txn, definition, epoch_secs()) {
            Ok(project) => {
                txn.commit().map_err(map_err!(Transaction))?;
                info!(
                    project = %project.name,
                    id = project.id,
                    services = definition.services.len(),
                    volumes = definition.volumes.len(),
                    "project ingested"
                );
                Ok(project)
            }
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    warn!(error = %abort_err, "failed to abort ingest transaction");
                }
                debug!(project = %definition.name, error = %e, "project ingest rolled back");
                Err(e)
            }
        }
    }

    /// Increment a service's failure counter and return the new value.
    pub fn increment_failure_count(&self, service_name: &str) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            let mut service: Service = match table.get(service_name).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("service {service_name}"))),
            };
            service.failure_count += 1;
            service.updated_at = epoch_secs();
            count = service.failure_count;

            let value = serde_json::to_vec(&service).map_err(map_err!(Serialize))?;
            table
                .insert(service_name, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(service = %service_name, failure_count = count, "failure counter bumped");
        Ok(count)
    }

    // ── Readers ────────────────────────────────────────────────────

    /// List all projects.
    pub fn list_projects(&self) -> StateResult<Vec<Project>> {
        self.list_all(PROJECTS)
    }

    /// List all services across every project.
    pub fn list_services(&self) -> StateResult<Vec<Service>> {
        self.list_all(SERVICES)
    }

    /// List all volumes across every project.
    pub fn list_volumes(&self) -> StateResult<Vec<Volume>> {
        self.list_all(VOLUMES)
    }

    /// Get a project by name.
    pub fn get_project(&self, name: &str) -> StateResult<Option<Project>> {
        self.get_one(PROJECTS, name)
    }

    /// Get a service by name.
    pub fn get_service(&self, name: &str) -> StateResult<Option<Service>> {
        self.get_one(SERVICES, name)
    }

    /// List the volumes owned by one project.
    pub fn list_volumes_for_project(&self, project_id: ProjectId) -> StateResult<Vec<Volume>> {
        let prefix = format!("{project_id}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VOLUMES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let volume: Volume =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(volume);
            }
        }
        Ok(results)
    }

    fn list_all<T: DeserializeOwned>(
        &self,
        definition: TableDefinition<'static, &'static str, &'static [u8]>,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(definition).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    fn get_one<T: DeserializeOwned>(
        &self,
        definition: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(definition).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

/// Checks that need no database access.
fn validate_definition(definition: &ProjectDefinition) -> StateResult<()> {
    if definition.name.trim().is_empty() {
        return Err(StateError::Validation("project name is empty".to_string()));
    }
    let mut seen = HashSet::new();
    for svc in &definition.services {
        if svc.name.trim().is_empty() {
            return Err(StateError::Validation("service name is empty".to_string()));
        }
        if !seen.insert(svc.name.as_str()) {
            return Err(StateError::Validation(format!(
                "service '{}' is declared twice",
                svc.name
            )));
        }
    }
    Ok(())
}

/// Write every row of a project inside `txn`. The caller commits or aborts.
fn write_project(
    txn: &WriteTransaction,
    definition: &ProjectDefinition,
    now: u64,
) -> StateResult<Project> {
    let mut projects = txn.open_table(PROJECTS).map_err(map_err!(Table))?;
    let mut services = txn.open_table(SERVICES).map_err(map_err!(Table))?;
    let mut volumes = txn.open_table(VOLUMES).map_err(map_err!(Table))?;
    let mut sequences = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;

    if projects
        .get(definition.name.as_str())
        .map_err(map_err!(Read))?
        .is_some()
    {
        return Err(StateError::Conflict(definition.name.clone()));
    }

    let project = Project {
        id: next_id(&mut sequences, PROJECT_SEQ)?,
        name: definition.name.clone(),
        created_at: now,
        updated_at: now,
    };
    let value = serde_json::to_vec(&project).map_err(map_err!(Serialize))?;
    projects
        .insert(project.name.as_str(), value.as_slice())
        .map_err(map_err!(Write))?;

    for svc in &definition.services {
        if services
            .get(svc.name.as_str())
            .map_err(map_err!(Read))?
            .is_some()
        {
            return Err(StateError::Validation(format!(
                "service '{}' already exists in another project",
                svc.name
            )));
        }
        let service = Service {
            id: next_id(&mut sequences, SERVICE_SEQ)?,
            project_id: project.id,
            definition: svc.clone(),
            failure_count: 0,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_vec(&service).map_err(map_err!(Serialize))?;
        services
            .insert(svc.name.as_str(), value.as_slice())
            .map_err(map_err!(Write))?;
    }

    for name in &definition.volumes {
        let volume = Volume {
            id: next_id(&mut sequences, VOLUME_SEQ)?,
            name: name.clone(),
            project_id: project.id,
            created_at: now,
        };
        let value = serde_json::to_vec(&volume).map_err(map_err!(Serialize))?;
        volumes
            .insert(volume.table_key().as_str(), value.as_slice())
            .map_err(map_err!(Write))?;
    }

    Ok(project)
}

/// Issue the next surrogate id for an entity kind.
fn next_id(sequences: &mut Table<'_, &'static str, u64>, kind: &str) -> StateResult<u64> {
    let current = sequences
        .get(kind)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = current + 1;
    sequences.insert(kind, next).map_err(map_err!(Write))?;
    Ok(next)
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockgrid_core::{HealthCheckSpec, ServiceDefinition};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn svc(name: &str, image: &str) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            image: image.to_string(),
            ..Default::default()
        }
    }

    fn project(name: &str, services: Vec<ServiceDefinition>, volumes: &[&str]) -> ProjectDefinition {
        ProjectDefinition {
            name: name.to_string(),
            services,
            volumes: volumes.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn demo() -> ProjectDefinition {
        project(
            "demo",
            vec![svc("web", "nginx:alpine"), svc("worker", "busybox")],
            &["demo_data"],
        )
    }

    // ── Ingest ─────────────────────────────────────────────────────

    #[test]
    fn ingest_and_list() {
        let store = StateStore::open_in_memory().unwrap();
        let created = store.ingest_project(&demo()).unwrap();

        assert_eq!(created.name, "demo");
        assert_eq!(store.list_projects().unwrap(), vec![created.clone()]);

        let services = store.list_services().unwrap();
        assert_eq!(services.len(), 2);
        assert!(services.iter().all(|s| s.project_id == created.id));
        assert!(services.iter().all(|s| s.failure_count == 0));

        let volumes = store.list_volumes().unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "demo_data");
        assert_eq!(volumes[0].project_id, created.id);
    }

    #[test]
    fn duplicate_project_is_conflict_and_leaves_store_unchanged() {
        let store = StateStore::open_in_memory().unwrap();
        store.ingest_project(&demo()).unwrap();

        let again = project("demo", vec![svc("other", "redis:7")], &["demo_other"]);
        let err = store.ingest_project(&again).unwrap_err();
        assert!(matches!(err, StateError::Conflict(name) if name == "demo"));

        assert_eq!(store.list_projects().unwrap().len(), 1);
        assert_eq!(store.list_services().unwrap().len(), 2);
        assert_eq!(store.list_volumes().unwrap().len(), 1);
        assert!(store.get_service("other").unwrap().is_none());
    }

    #[test]
    fn failed_ingest_leaves_no_rows_behind() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .ingest_project(&project("first", vec![svc("db", "postgres:16")], &[]))
            .unwrap();

        // The third of four services collides with an existing one.
        let second = project(
            "second",
            vec![
                svc("api", "api:1"),
                svc("worker", "worker:1"),
                svc("db", "postgres:16"),
                svc("cache", "redis:7"),
            ],
            &["second_data"],
        );
        let err = store.ingest_project(&second).unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));

        assert!(store.get_project("second").unwrap().is_none());
        let names: Vec<String> = store
            .list_services()
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["db".to_string()]);
        assert!(store.list_volumes().unwrap().is_empty());
    }

    #[test]
    fn rolled_back_ingest_does_not_consume_ids() {
        let store = StateStore::open_in_memory().unwrap();
        let first = store
            .ingest_project(&project("first", vec![svc("db", "postgres:16")], &[]))
            .unwrap();
        let _ = store.ingest_project(&project("broken", vec![svc("db", "x")], &[]));
        let third = store
            .ingest_project(&project("third", vec![svc("web", "nginx")], &[]))
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(third.id, 2);
    }

    #[test]
    fn validation_rejects_empty_and_repeated_names() {
        let store = StateStore::open_in_memory().unwrap();

        let err = store.ingest_project(&project(" ", vec![], &[])).unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));

        let err = store
            .ingest_project(&project("p", vec![svc("", "nginx")], &[]))
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));

        let err = store
            .ingest_project(&project("p", vec![svc("a", "x"), svc("a", "y")], &[]))
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
        assert!(store.list_projects().unwrap().is_empty());
    }

    #[test]
    fn optional_fields_keep_absent_versus_empty() {
        let store = StateStore::open_in_memory().unwrap();
        let mut web = svc("web", "nginx:alpine");
        web.command = Some(vec![]);
        web.environment = Some(BTreeMap::from([("EMPTY".to_string(), Some(String::new()))]));
        web.healthcheck = Some(HealthCheckSpec {
            test: Some(vec!["CMD".to_string(), "true".to_string()]),
            interval: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        store
            .ingest_project(&project("demo", vec![web.clone()], &[]))
            .unwrap();

        let stored = store.get_service("web").unwrap().unwrap();
        assert_eq!(stored.definition, web);
        assert_eq!(stored.definition.command, Some(vec![]));
        assert_eq!(stored.definition.entrypoint, None);
    }

    #[test]
    fn build_based_service_is_stored() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .ingest_project(&project("demo", vec![svc("app", "")], &[]))
            .unwrap();
        assert!(store.get_service("app").unwrap().unwrap().is_build_based());
    }

    // ── Failure counter ────────────────────────────────────────────

    #[test]
    fn failure_count_increments() {
        let store = StateStore::open_in_memory().unwrap();
        store.ingest_project(&demo()).unwrap();

        assert_eq!(store.increment_failure_count("web").unwrap(), 1);
        assert_eq!(store.increment_failure_count("web").unwrap(), 2);

        let web = store.get_service("web").unwrap().unwrap();
        assert_eq!(web.failure_count, 2);
        let worker = store.get_service("worker").unwrap().unwrap();
        assert_eq!(worker.failure_count, 0);
    }

    #[test]
    fn failure_count_for_unknown_service() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.increment_failure_count("ghost").unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let store = StateStore::open_in_memory().unwrap();
        store.ingest_project(&demo()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.increment_failure_count("web").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_service("web").unwrap().unwrap().failure_count, 100);
    }

    // ── Lookups ────────────────────────────────────────────────────

    #[test]
    fn volumes_for_project() {
        let store = StateStore::open_in_memory().unwrap();
        let a = store
            .ingest_project(&project("a", vec![], &["a_one", "a_two"]))
            .unwrap();
        let b = store.ingest_project(&project("b", vec![], &["b_one"])).unwrap();

        assert_eq!(store.list_volumes_for_project(a.id).unwrap().len(), 2);
        assert_eq!(store.list_volumes_for_project(b.id).unwrap().len(), 1);
        assert!(store.list_volumes_for_project(99).unwrap().is_empty());
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.list_projects().unwrap().is_empty());
        assert!(store.list_services().unwrap().is_empty());
        assert!(store.list_volumes().unwrap().is_empty());
        assert!(store.get_project("nope").unwrap().is_none());
        assert!(store.get_service("nope").unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.ingest_project(&demo()).unwrap();
            store.increment_failure_count("web").unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_project("demo").unwrap().is_some());
        assert_eq!(store.get_service("web").unwrap().unwrap().failure_count, 1);

        // The sequence survives too.
        let next = store
            .ingest_project(&project("next", vec![], &[]))
            .unwrap();
        assert_eq!(next.id, 2);
    }
}
