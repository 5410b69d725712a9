use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::configuration::Config;
use crate::container_management::ContainerRuntime;
use crate::error_handling::types::RecordingError;
use crate::recording::Recording;
use crate::recording_management::service::{base_worker_spec, stop_worker, RecordingService};
use crate::session_management::{Participant, SessionHandle};

pub const DEFAULT_RESOLUTION: &str = "1280x720";

/// Command run inside an audio-only worker to replace its mix inputs.
const MIX_UPDATE_COMMAND: &str = "update-mix";

pub fn worker_name(recording_id: &str) -> String {
    format!("recording_{}", recording_id)
}

/// One shared worker per recording mixing every stream into a single file.
///
/// With video the worker follows the session on its own, so stream changes do
/// not concern it. Audio-only workers mix an explicit set of streams, tracked
/// here per session and pushed to the worker on every change.
pub struct ComposedRecordingService {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
    recording_root: PathBuf,
    workers: DashMap<String, String>,
    mix_inputs: DashMap<String, BTreeSet<String>>,
}

impl ComposedRecordingService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        ComposedRecordingService {
            runtime,
            image: config.image_reference(),
            recording_root: config.recording_path.clone(),
            workers: DashMap::new(),
            mix_inputs: DashMap::new(),
        }
    }

    pub fn worker_of(&self, recording_id: &str) -> Option<String> {
        self.workers.get(recording_id).map(|c| c.clone())
    }

    /// Streams currently mixed by the audio-only recording of `session_id`.
    pub fn mix_inputs_of(&self, session_id: &str) -> Option<Vec<String>> {
        self.mix_inputs
            .get(session_id)
            .map(|inputs| inputs.iter().cloned().collect())
    }

    async fn push_mix_inputs(
        &self,
        recording: &Recording,
        inputs: Vec<String>,
    ) -> Result<(), RecordingError> {
        let container_id = self.worker_of(&recording.id).ok_or_else(|| {
            RecordingError::NotFound(format!("no worker for recording {}", recording.id))
        })?;
        let command = vec![
            MIX_UPDATE_COMMAND.to_string(),
            "--inputs".to_string(),
            inputs.join(","),
        ];
        self.runtime
            .exec_in_container(&container_id, &command)
            .await
            .map_err(|e| {
                error!("Failed to update mix of recording {}: {}", recording.id, e);
                RecordingError::from(e)
            })?;
        debug!("Recording {} now mixes [{}]", recording.id, inputs.join(","));
        Ok(())
    }
}

fn published_streams(participants: &[Participant]) -> BTreeSet<String> {
    participants
        .iter()
        .filter(|p| !p.is_recorder())
        .filter_map(|p| p.stream_id.clone())
        .collect()
}

#[async_trait]
impl RecordingService for ComposedRecordingService {
    async fn start_recording(
        &self,
        session: &dyn SessionHandle,
        recording: Recording,
    ) -> Result<Recording, RecordingError> {
        let mut recording = recording;
        if recording.has_video && recording.resolution.is_none() {
            recording.resolution = Some(DEFAULT_RESOLUTION.to_string());
        }
        let audio_only = !recording.has_video;

        let mut spec = base_worker_spec(
            &worker_name(&recording.id),
            &self.image,
            &self.recording_root,
            &recording,
        )
        .with_env("FORMAT", recording.extension());
        if let Some(ref resolution) = recording.resolution {
            spec = spec.with_env("RESOLUTION", resolution);
        }
        let inputs = published_streams(&session.participants());
        if audio_only {
            let joined: Vec<String> = inputs.iter().cloned().collect();
            spec = spec.with_env("MIX_INPUTS", &joined.join(","));
        }

        info!(
            "Starting composed worker {} for session {}",
            spec.name,
            session.session_id()
        );
        let container_id = self.runtime.run_container(&spec).await.map_err(|e| {
            error!("Failed to start composed worker {}: {}", spec.name, e);
            RecordingError::from(e)
        })?;

        self.workers.insert(recording.id.clone(), container_id);
        if audio_only {
            self.mix_inputs
                .insert(session.session_id().to_string(), inputs);
        }
        Ok(recording)
    }

    async fn stop_recording(
        &self,
        session_id: &str,
        recording: Recording,
        reason: &str,
    ) -> Result<Recording, RecordingError> {
        self.mix_inputs.remove(session_id);
        let Some((_, container_id)) = self.workers.remove(&recording.id) else {
            warn!("No composed worker tracked for recording {}", recording.id);
            return Ok(recording);
        };

        stop_worker(self.runtime.as_ref(), &container_id).await?;
        info!(
            "Composed worker of recording {} stopped ({})",
            recording.id, reason
        );
        Ok(recording)
    }

    async fn start_stream_recording(
        &self,
        session_id: &str,
        recording: &Recording,
        participant: &Participant,
    ) -> Result<(), RecordingError> {
        if recording.has_video {
            return Ok(());
        }
        let Some(ref stream_id) = participant.stream_id else {
            return Ok(());
        };

        let inputs = {
            let Some(mut inputs) = self.mix_inputs.get_mut(session_id) else {
                return Err(RecordingError::NotFound(format!(
                    "no audio mix for session {}",
                    session_id
                )));
            };
            if !inputs.insert(stream_id.clone()) {
                return Ok(());
            }
            inputs.iter().cloned().collect::<Vec<_>>()
        };
        self.push_mix_inputs(recording, inputs).await
    }

    async fn stop_stream_recording(
        &self,
        session_id: &str,
        recording: &Recording,
        stream_id: &str,
    ) -> Result<(), RecordingError> {
        if recording.has_video {
            return Ok(());
        }

        let inputs = {
            let Some(mut inputs) = self.mix_inputs.get_mut(session_id) else {
                return Err(RecordingError::NotFound(format!(
                    "no audio mix for session {}",
                    session_id
                )));
            };
            if !inputs.remove(stream_id) {
                return Ok(());
            }
            inputs.iter().cloned().collect::<Vec<_>>()
        };
        self.push_mix_inputs(recording, inputs).await
    }
}
