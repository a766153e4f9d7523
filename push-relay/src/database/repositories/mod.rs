//! Repository layer for database access.
//!
//! Repositories hide SQL behind traits so services can be tested against
//! in-memory doubles.

pub mod subscriber;

pub use subscriber::*;
