//! REST API server module.
//!
//! HTTP surface for subscription registration, delivery, statistics and
//! health probes.

pub mod error;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
