//! REST and WebSocket surface for the agent automation platform.
//!
//! Exposes the six HTTP endpoints and one WebSocket hub described in
//! SPEC_FULL.md §6 on top of `zerg-runtime`'s task dispatch, workflow
//! engine, and topic manager. `AppState` is the explicitly constructed
//! bundle of singletons every handler shares; `Server` wires it to an
//! `axum::Router` and serves it.

pub mod authorizer;
pub mod error;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;

pub use authorizer::StoreAuthorizer;
pub use error::ApiError;
pub use server::Server;
pub use state::AppState;
