//! push-relay library crate.
//!
//! Web Push subscriber registry and broadcast delivery engine, plus the HTTP
//! surface and background tasks around it. Exposed as a library so the
//! binaries and integration tests share one implementation.

pub mod api;
pub mod config;
pub mod database;
pub mod enrichment;
pub mod error;
pub mod logging;
pub mod notification;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
