//! Shared CLI utilities and types for the `zerg` operator command.

pub mod api_client;
pub mod completions;
pub mod interactive;
pub mod oneshot;
pub mod stream;
