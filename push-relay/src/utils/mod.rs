//! Small helpers shared across modules.

pub mod fs;
pub mod http_client;
pub mod text;
