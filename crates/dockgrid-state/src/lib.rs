//! dockgrid-state: desired-state store for DockGrid.
//!
//! Backed by [redb](https://docs.rs/redb), persists the projects, services and
//! volumes ingested from compose definitions.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns:
//!
//! | Table | Key | Value |
//! |---|---|---|
//! | `projects` | project name | [`Project`] |
//! | `services` | service name | [`Service`] |
//! | `volumes` | `{project_id}/{volume}` | [`Volume`] |
//! | `sequences` | entity kind | last issued id |
//!
//! A project and all of its rows are written in one write transaction, so a
//! failed ingest leaves nothing behind. Failure-counter bumps are a
//! read-modify-write inside a single transaction.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared between the controller and the API.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
