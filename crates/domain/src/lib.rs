//! `mb-domain`: types shared by every mcp-bridge crate.
//!
//! Configuration, the shared error type and the structured trace events
//! live here so that the client and bridge crates agree on them without
//! depending on each other.

pub mod config;
pub mod error;
pub mod trace;
