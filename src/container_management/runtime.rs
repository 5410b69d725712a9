use async_trait::async_trait;

use crate::container_management::types::{ContainerSummary, WorkerSpec};
use crate::error_handling::types::ContainerError;

/// Client of the container runtime that hosts recording workers.
///
/// Implementors must report an unreachable daemon as
/// [`ContainerError::RuntimeNotAvailable`] so callers can tell it apart from a
/// missing image ([`ContainerError::ImageNotFound`]).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Checks that the runtime daemon answers.
    async fn ping(&self) -> Result<(), ContainerError>;

    /// Returns whether `image` (a `name:tag` reference) is present locally.
    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError>;

    /// Pulls `image`, returning once the pull completed or failed.
    async fn pull_image(&self, image: &str) -> Result<(), ContainerError>;

    /// Lists every container, running or not.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, ContainerError>;

    async fn remove_container(&self, container_id: &str, force: bool)
        -> Result<(), ContainerError>;

    /// Starts a detached worker and returns its container id.
    async fn run_container(&self, spec: &WorkerSpec) -> Result<String, ContainerError>;

    /// Stops a worker, waiting for the runtime to confirm.
    async fn stop_container(&self, container_id: &str) -> Result<(), ContainerError>;

    /// Runs `command` inside a running worker and returns its stdout.
    async fn exec_in_container(
        &self,
        container_id: &str,
        command: &[String],
    ) -> Result<String, ContainerError>;
}
