//! dockgrid-controller: the reconciliation loop for DockGrid.
//!
//! Each tick loads the desired state from the store, then:
//!
//! ```text
//! volume pass   for each volume: exists? → create if not
//! service pass  for each service with an image:
//!                 find container → classify
//!                 absent  → ensure image → create + start (done for this tick)
//!                 present → log liveness/health
//!                           (optional) replace after N failing ticks
//! ```
//!
//! Runtime errors skip the affected item; store errors abort the tick. The
//! next tick retries from a fresh read, so the loop itself is the retry
//! mechanism.

pub mod error;
pub mod reconciler;

pub use error::{ControllerError, ControllerResult};
pub use reconciler::{Reconciler, ReconcilerConfig, TickReport};
