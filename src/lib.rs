//! scheduledb-init
//!
//! Provisions the application database used by the scheduling service: an
//! optional administrative login, a `readWrite` application user, and a fixed
//! set of empty collections.

pub mod bootstrap;
pub mod steps;
pub mod verify;

pub use bootstrap::{build_registry, run};
