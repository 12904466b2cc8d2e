//! Shared domain types, configuration, and error kinds for the agent runtime.
//!
//! Every other crate in the workspace (`zerg-storage`, `zerg-runtime`,
//! `zerg-api`, `zerg-cli`) depends on this crate for the vocabulary they
//! speak: entity types (§3), event payloads (§4.1), and the error enum that
//! maps to the HTTP status contracts in §7.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{CoreError, Result};
pub use types::*;
