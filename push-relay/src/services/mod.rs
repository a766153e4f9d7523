//! Service layer module.
//!
//! Wires configuration, persistence and the notification components into a
//! single [`ServiceContext`].

pub mod context;

pub use context::ServiceContext;
