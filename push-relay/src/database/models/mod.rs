//! Database models for push-relay.
//!
//! These models map directly to the database schema.

pub mod subscriber;

pub use subscriber::*;
