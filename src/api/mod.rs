//! Serving layer
//!
//! Read-only HTTP surface over the snapshot cache.

pub mod handlers;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
