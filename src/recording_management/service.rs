use async_trait::async_trait;
use log::warn;
use std::path::Path;
use std::sync::Arc;

use crate::container_management::{ContainerRuntime, WorkerSpec};
use crate::error_handling::types::{ContainerError, RecordingError};
use crate::recording::{OutputMode, Recording};
use crate::session_management::{Participant, SessionHandle};

/// Worker lifecycle of one output mode.
///
/// The orchestrator owns registry and metadata bookkeeping; implementors only
/// drive the workers that produce the media.
#[async_trait]
pub trait RecordingService: Send + Sync {
    /// Launches the worker(s) for a freshly reserved recording and returns it
    /// as the workers will produce it.
    async fn start_recording(
        &self,
        session: &dyn SessionHandle,
        recording: Recording,
    ) -> Result<Recording, RecordingError>;

    /// Tears down every worker of `recording`.
    async fn stop_recording(
        &self,
        session_id: &str,
        recording: Recording,
        reason: &str,
    ) -> Result<Recording, RecordingError>;

    /// A participant started publishing after the recording began.
    async fn start_stream_recording(
        &self,
        session_id: &str,
        recording: &Recording,
        participant: &Participant,
    ) -> Result<(), RecordingError>;

    /// A stream stopped being published while the recording runs.
    async fn stop_stream_recording(
        &self,
        session_id: &str,
        recording: &Recording,
        stream_id: &str,
    ) -> Result<(), RecordingError>;
}

/// The two output-mode services, selected by [`OutputMode`].
#[derive(Clone)]
pub struct RecordingServices {
    pub composed: Arc<dyn RecordingService>,
    pub individual: Arc<dyn RecordingService>,
}

impl RecordingServices {
    pub fn new(composed: Arc<dyn RecordingService>, individual: Arc<dyn RecordingService>) -> Self {
        RecordingServices {
            composed,
            individual,
        }
    }

    pub fn for_mode(&self, mode: OutputMode) -> &Arc<dyn RecordingService> {
        match mode {
            OutputMode::Composed => &self.composed,
            OutputMode::Individual => &self.individual,
        }
    }
}

/// Mount point of the recording root inside every worker.
pub const RECORDINGS_MOUNT: &str = "/recordings";

/// Worker definition shared by both output modes.
pub(crate) fn base_worker_spec(
    name: &str,
    image: &str,
    recording_root: &Path,
    recording: &Recording,
) -> WorkerSpec {
    WorkerSpec::new(name, image)
        .with_env("RECORDING_ID", &recording.id)
        .with_env("RECORDING_NAME", &recording.name)
        .with_env("SESSION_ID", &recording.session_id)
        .with_env("HAS_AUDIO", &recording.has_audio.to_string())
        .with_env("HAS_VIDEO", &recording.has_video.to_string())
        .with_env(
            "OUTPUT_DIR",
            &format!("{}/{}", RECORDINGS_MOUNT, recording.id),
        )
        .with_bind(recording_root.to_path_buf(), RECORDINGS_MOUNT)
}

/// Stops a worker and force-removes its container.
///
/// Removal is attempted even when the stop fails; the stop error wins.
pub(crate) async fn stop_worker(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
) -> Result<(), ContainerError> {
    let stopped = runtime.stop_container(container_id).await;
    if let Err(ref e) = stopped {
        warn!("Failed to stop worker {}: {}", container_id, e);
    }
    if let Err(e) = runtime.remove_container(container_id, true).await {
        warn!("Failed to remove worker {}: {}", container_id, e);
    }
    stopped
}
