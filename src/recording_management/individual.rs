use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::configuration::Config;
use crate::container_management::ContainerRuntime;
use crate::error_handling::types::RecordingError;
use crate::recording::Recording;
use crate::recording_management::service::{base_worker_spec, stop_worker, RecordingService};
use crate::session_management::{Participant, SessionHandle};

/// Per-stream files are packed by the worker into `<name>.zip` at stop time.
const STREAM_FORMAT: &str = "webm";

pub fn worker_name(recording_id: &str, stream_id: &str) -> String {
    format!("recording_{}_{}", recording_id, stream_id)
}

/// One dedicated worker per published stream.
///
/// `workers` maps a recording id to its stream ids and their container ids.
pub struct IndividualRecordingService {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
    recording_root: PathBuf,
    workers: DashMap<String, HashMap<String, String>>,
}

impl IndividualRecordingService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        IndividualRecordingService {
            runtime,
            image: config.image_reference(),
            recording_root: config.recording_path.clone(),
            workers: DashMap::new(),
        }
    }

    /// Streams being recorded for `recording_id`, sorted.
    pub fn streams_of(&self, recording_id: &str) -> Option<Vec<String>> {
        self.workers.get(recording_id).map(|streams| {
            let mut ids: Vec<String> = streams.keys().cloned().collect();
            ids.sort();
            ids
        })
    }

    async fn launch_stream_worker(
        &self,
        recording: &Recording,
        stream_id: &str,
    ) -> Result<(), RecordingError> {
        let spec = base_worker_spec(
            &worker_name(&recording.id, stream_id),
            &self.image,
            &self.recording_root,
            recording,
        )
        .with_env("STREAM_ID", stream_id)
        .with_env("FORMAT", STREAM_FORMAT);

        let container_id = self.runtime.run_container(&spec).await.map_err(|e| {
            error!("Failed to start stream worker {}: {}", spec.name, e);
            RecordingError::from(e)
        })?;

        let tracked = match self.workers.get_mut(&recording.id) {
            Some(mut streams) => {
                streams.insert(stream_id.to_string(), container_id.clone());
                true
            }
            None => false,
        };
        if !tracked {
            warn!(
                "Recording {} ended while stream {} was starting",
                recording.id, stream_id
            );
            let _ = stop_worker(self.runtime.as_ref(), &container_id).await;
            return Err(RecordingError::NotFound(recording.id.clone()));
        }
        debug!("Stream {} of recording {} is recorded", stream_id, recording.id);
        Ok(())
    }

    /// Stops every worker in `streams`, returning the ones that failed.
    async fn stop_stream_workers(&self, streams: HashMap<String, String>) -> Vec<String> {
        let mut failed = Vec::new();
        for (stream_id, container_id) in streams {
            if stop_worker(self.runtime.as_ref(), &container_id).await.is_err() {
                failed.push(stream_id);
            }
        }
        failed
    }
}

#[async_trait]
impl RecordingService for IndividualRecordingService {
    async fn start_recording(
        &self,
        session: &dyn SessionHandle,
        recording: Recording,
    ) -> Result<Recording, RecordingError> {
        self.workers.insert(recording.id.clone(), HashMap::new());

        let publishers: Vec<String> = session
            .participants()
            .into_iter()
            .filter(|p| !p.is_recorder())
            .filter_map(|p| p.stream_id)
            .collect();
        info!(
            "Starting individual recording {} with {} stream(s)",
            recording.id,
            publishers.len()
        );

        for stream_id in &publishers {
            if let Err(e) = self.launch_stream_worker(&recording, stream_id).await {
                let started = self
                    .workers
                    .remove(&recording.id)
                    .map(|(_, streams)| streams)
                    .unwrap_or_default();
                self.stop_stream_workers(started).await;
                return Err(e);
            }
        }
        Ok(recording)
    }

    async fn stop_recording(
        &self,
        _session_id: &str,
        recording: Recording,
        reason: &str,
    ) -> Result<Recording, RecordingError> {
        let streams = self
            .workers
            .remove(&recording.id)
            .map(|(_, streams)| streams)
            .unwrap_or_default();
        let count = streams.len();

        let failed = self.stop_stream_workers(streams).await;
        if !failed.is_empty() {
            error!(
                "Recording {}: {} of {} stream worker(s) did not stop",
                recording.id,
                failed.len(),
                count
            );
            return Err(RecordingError::StrategyFailure(format!(
                "streams [{}] of recording {} did not stop",
                failed.join(","),
                recording.id
            )));
        }
        info!(
            "Individual recording {} stopped {} stream worker(s) ({})",
            recording.id, count, reason
        );
        Ok(recording)
    }

    async fn start_stream_recording(
        &self,
        _session_id: &str,
        recording: &Recording,
        participant: &Participant,
    ) -> Result<(), RecordingError> {
        let Some(ref stream_id) = participant.stream_id else {
            return Ok(());
        };
        match self
            .workers
            .get(&recording.id)
            .map(|streams| streams.contains_key(stream_id))
        {
            None => Err(RecordingError::NotFound(recording.id.clone())),
            Some(true) => {
                debug!("Stream {} is already recorded", stream_id);
                Ok(())
            }
            Some(false) => self.launch_stream_worker(recording, stream_id).await,
        }
    }

    async fn stop_stream_recording(
        &self,
        _session_id: &str,
        recording: &Recording,
        stream_id: &str,
    ) -> Result<(), RecordingError> {
        let container_id = self
            .workers
            .get_mut(&recording.id)
            .and_then(|mut streams| streams.remove(stream_id));
        let Some(container_id) = container_id else {
            return Err(RecordingError::NotFound(format!(
                "stream {} of recording {}",
                stream_id, recording.id
            )));
        };

        stop_worker(self.runtime.as_ref(), &container_id).await?;
        info!("Stream {} of recording {} stopped", stream_id, recording.id);
        Ok(())
    }
}
