use log::{error, info, warn};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::configuration::{Config, RuntimeMode};
use crate::container_management::runtime::ContainerRuntime;
use crate::error_handling::types::ContainerError;

const PROGRESS_TICK: Duration = Duration::from_secs(1);

/// Makes sure the recording worker image is usable before any recording starts.
///
/// Startup sequence:
/// 1. check whether `image:tag` exists locally, pulling it when absent
///    (a dot per second is printed while the pull runs);
/// 2. if the pull fails, check once more for a local copy before giving up;
/// 3. force-remove every leftover container created from the worker image.
///
/// Every failure is fatal for the caller.
pub struct RuntimeImageManager {
    runtime: Arc<dyn ContainerRuntime>,
    image_name: String,
    image_tag: String,
    mode: RuntimeMode,
    recording_path: String,
}

impl RuntimeImageManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        RuntimeImageManager {
            runtime,
            image_name: config.recording_image.clone(),
            image_tag: config.recording_version.clone(),
            mode: config.runtime_mode,
            recording_path: config.recording_path.display().to_string(),
        }
    }

    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }

    /// Runs the full startup sequence; returns the number of stray containers removed.
    pub async fn initialize(&self) -> Result<usize, ContainerError> {
        self.ensure_image().await?;
        self.remove_stray_containers().await
    }

    pub async fn ensure_image(&self) -> Result<(), ContainerError> {
        let image = self.image_reference();
        info!("Recording module required: checking worker image {}", image);

        self.runtime
            .ping()
            .await
            .map_err(|e| self.with_diagnostic(e))?;
        let exists = self
            .runtime
            .image_exists(&image)
            .await
            .map_err(|e| self.with_diagnostic(e))?;

        if exists {
            info!("Worker image {} already exists locally", image);
            return Ok(());
        }

        info!("Worker image {} not found locally, pulling it", image);
        match self.pull_with_progress(&image).await {
            Ok(()) => {
                info!("Worker image {} available", image);
                Ok(())
            }
            Err(pull_error) => {
                warn!("Pulling {} failed: {}", image, pull_error);
                match self.runtime.image_exists(&image).await {
                    Ok(true) => {
                        info!("Worker image {} exists locally", image);
                        Ok(())
                    }
                    Ok(false) => {
                        error!("Worker image {} is not available: {}", image, pull_error);
                        Err(pull_error)
                    }
                    Err(e) => Err(self.with_diagnostic(e)),
                }
            }
        }
    }

    /// Force-removes containers whose image starts with the worker image name.
    pub async fn remove_stray_containers(&self) -> Result<usize, ContainerError> {
        let containers = self
            .runtime
            .list_containers()
            .await
            .map_err(|e| self.with_diagnostic(e))?;

        let mut removed = 0usize;
        for container in containers
            .iter()
            .filter(|c| c.image.starts_with(&self.image_name))
        {
            self.runtime.remove_container(&container.id, true).await?;
            info!(
                "Stranded {} container {} ({}) removed on startup",
                self.image_name, container.name, container.id
            );
            removed += 1;
        }
        Ok(removed)
    }

    async fn pull_with_progress(&self, image: &str) -> Result<(), ContainerError> {
        let (done_tx, mut done_rx) = oneshot::channel::<()>();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROGRESS_TICK);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = &mut done_rx => break,
                    _ = interval.tick() => {
                        print!(".");
                        let _ = std::io::stdout().flush();
                    }
                }
            }
        });

        let result = self.runtime.pull_image(image).await;

        let _ = done_tx.send(());
        if let Err(e) = ticker.await {
            warn!("Pull progress indicator ended abnormally: {}", e);
        }
        println!();
        result
    }

    /// Adds operator guidance to a daemon connectivity failure.
    fn with_diagnostic(&self, err: ContainerError) -> ContainerError {
        match err {
            ContainerError::RuntimeNotAvailable(cause) => {
                let message = self.connectivity_diagnostic(&cause);
                error!("{}", message);
                ContainerError::RuntimeNotAvailable(message)
            }
            other => other,
        }
    }

    fn connectivity_diagnostic(&self, cause: &str) -> String {
        match self.mode {
            RuntimeMode::Containerized => format!(
                "Exception connecting to the container daemon ({}): make sure the container running \
                 this service is started with\n    \
                 -e SESSREC_RECORDING_PATH={path}\n    \
                 -v /var/run/docker.sock:/var/run/docker.sock\n    \
                 -v {path}:{path}",
                cause,
                path = self.recording_path
            ),
            RuntimeMode::Host => format!(
                "Exception connecting to the container daemon ({}): a running Docker installation \
                 is required on this machine to enable the recording service",
                cause
            ),
        }
    }
}
