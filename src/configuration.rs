//! Configuration consumed by the recording orchestrator.
//!
//! Loaded from a TOML file, then overridden by environment variables and
//! command-line flags (in that order).

pub mod config;
pub mod types;

pub use config::{Args, Config};
pub use types::RuntimeMode;
