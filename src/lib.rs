//! # rewind
//!
//! Umbrella crate re-exporting the rewind workspace members.

pub use rewind_core as core;
pub use rewind_sdk as sdk;
pub use rewind_server as server;
