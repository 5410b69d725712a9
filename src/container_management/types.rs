//! Core types used by the container management subsystem.

use std::path::PathBuf;

/// One line of the runtime's container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Runtime identifier of the container.
    pub id: String,
    /// Image reference the container was created from (e.g. `name:tag`).
    pub image: String,
    /// Container name.
    pub name: String,
}

/// Everything needed to launch one recording worker container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Container name, unique per worker (e.g. `recording_<id>`).
    pub name: String,
    /// Full image reference.
    pub image: String,
    /// Environment passed to the worker.
    pub env: Vec<(String, String)>,
    /// Host directory → container path bind mounts.
    pub binds: Vec<(PathBuf, String)>,
}

impl WorkerSpec {
    pub fn new(name: &str, image: &str) -> Self {
        WorkerSpec {
            name: name.to_string(),
            image: image.to_string(),
            env: Vec::new(),
            binds: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_bind(mut self, host: PathBuf, container: &str) -> Self {
        self.binds.push((host, container.to_string()));
        self
    }
}
