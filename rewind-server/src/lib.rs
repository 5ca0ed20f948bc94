//! # rewind-server
//!
//! HTTP API for rewind: paged history, diffs, and undo/rollback under the
//! maintenance lock.

pub mod api;
pub mod server;

pub use api::{create_router, AppState};
pub use server::RewindServer;
