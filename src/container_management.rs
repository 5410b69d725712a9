//! Container management subsystem.
//!
//! Recording workers run as containers. This module exposes the runtime seam
//! ([`ContainerRuntime`]), a client driving the `docker` CLI ([`DockerCli`]) and
//! the startup-time [`RuntimeImageManager`].
//!
//! Example (non-running):
//! ```ignore
//! use std::sync::Arc;
//! use sessrec::configuration::Config;
//! use sessrec::container_management::{DockerCli, RuntimeImageManager};
//!
//! let config = Config::new("/opt/recordings", "2.9.0");
//! let images = RuntimeImageManager::new(Arc::new(DockerCli::new()), &config);
//! let removed = images.initialize().await?;
//! println!("stray workers removed: {}", removed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod docker_cli;
pub mod image_manager;
pub mod runtime;
#[cfg(test)]
pub mod tests;
pub mod types;

pub use docker_cli::DockerCli;
pub use image_manager::RuntimeImageManager;
pub use runtime::ContainerRuntime;
pub use types::{ContainerSummary, WorkerSpec};
