//! Backend implementations for StreamStore
//!
//! - `sqlite`: SQLite-based backend (default, requires `sqlite` feature)
//! - `memory`: process-local backend for tests and dry runs

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;
