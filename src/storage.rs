//! Storage subsystem
//!
//! The filesystem is the durable record of every recording.
//!
//! Components:
//! - `metadata`: the per-recording metadata file format.
//! - `host_catalog`: scan, lookup, id allocation and deletion over the recording root.

pub mod host_catalog;
pub mod metadata;

pub use host_catalog::HostCatalog;
pub use metadata::RECORDING_ENTITY_FILE;
