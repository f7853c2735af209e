//! This crate exists to coordinate versions of `tracing` and related crates
//! across the workspace.

pub use tracing;
