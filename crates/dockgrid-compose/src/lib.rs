//! dockgrid-compose: turns a submitted compose file into a `ProjectDefinition`.
//!
//! The submitted text arrives as unpadded URL-safe base64. It is decoded,
//! parsed as YAML against the subset of the compose format DockGrid manages,
//! and normalized:
//!
//! - named volumes become `{project}_{key}` unless the volume sets `name:`
//! - external volumes keep their own name and are never created
//! - service mounts that reference a declared volume key are rewritten to
//!   the full volume name
//! - a service with `build:` but no `image:` keeps an empty image and is
//!   left alone by the controller
//!
//! Every failure is a [`ComposeError`], which front ends report as bad input.

pub mod decode;
pub mod error;
mod raw;

pub use decode::{decode_project, parse_project};
pub use error::{ComposeError, ComposeResult};
