use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::configuration::Config;
use crate::container_management::{ContainerRuntime, RuntimeImageManager};
use crate::error_handling::types::{RecordingError, StorageError};
use crate::recording::{
    final_reason, OutputMode, Recording, RecordingProperties, RecordingStatus, AUTOMATIC_STOP,
};
use crate::recording_management::auto_stop::AutoStopScheduler;
use crate::recording_management::composed::ComposedRecordingService;
use crate::recording_management::individual::IndividualRecordingService;
use crate::recording_management::registry::RecordingRegistry;
use crate::recording_management::service::RecordingServices;
use crate::session_management::{Participant, SessionHandle, SessionLifecycle};
use crate::storage::HostCatalog;

/// Reason stored on recordings a previous process left running.
pub const RECORDING_INTERRUPTED: &str = "recordingInterrupted";
/// Reason stored on recordings whose workers could not be launched.
pub const RECORDING_START_FAILED: &str = "recordingStartFailed";

const MAX_ID_ATTEMPTS: usize = 8;

/// Recording orchestrator: the single entry point of the session and API layers.
///
/// It is the only component that combines the registry, the auto-stop
/// scheduler, the output-mode services and the host catalog, and keeps them
/// consistent on every transition:
///
/// - start: reserve in the registry, persist `starting`, launch workers,
///   persist `started`, arm the auto-stop timer if nobody publishes.
/// - stop: disarm the timer, claim the recording out of the registry, stop
///   workers, persist `stopped` (or `failed`) with size and duration.
///
/// Shared as `Arc<RecordingManager>`; auto-stop timers hold a weak reference.
pub struct RecordingManager {
    config: Config,
    catalog: HostCatalog,
    registry: RecordingRegistry,
    scheduler: AutoStopScheduler,
    services: RecordingServices,
    images: RuntimeImageManager,
    sessions: Arc<dyn SessionLifecycle>,
}

impl RecordingManager {
    pub fn new(
        config: Config,
        runtime: Arc<dyn ContainerRuntime>,
        services: RecordingServices,
        sessions: Arc<dyn SessionLifecycle>,
    ) -> Self {
        RecordingManager {
            catalog: HostCatalog::new(&config),
            registry: RecordingRegistry::new(),
            scheduler: AutoStopScheduler::new(config.autostop_timeout()),
            images: RuntimeImageManager::new(runtime, &config),
            services,
            sessions,
            config,
        }
    }

    /// Builds a manager whose composed and individual services run workers on `runtime`.
    pub fn with_runtime(
        config: Config,
        runtime: Arc<dyn ContainerRuntime>,
        sessions: Arc<dyn SessionLifecycle>,
    ) -> Self {
        let services = RecordingServices::new(
            Arc::new(ComposedRecordingService::new(runtime.clone(), &config)),
            Arc::new(IndividualRecordingService::new(runtime.clone(), &config)),
        );
        Self::new(config, runtime, services, sessions)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Startup sequence; any failure is fatal.
    ///
    /// Prepares the recording root, the worker image and stray workers, then
    /// marks recordings interrupted by a previous run as failed.
    pub async fn initialize(&self) -> Result<(), RecordingError> {
        self.catalog.init_path()?;
        let removed = self.images.initialize().await.map_err(|e| {
            error!("Recording runtime initialization failed: {}", e);
            RecordingError::from(e)
        })?;
        if removed > 0 {
            info!("Removed {} stray recording worker(s)", removed);
        }
        let recovered = self.recover_interrupted()?;
        if recovered > 0 {
            warn!("{} interrupted recording(s) marked as failed", recovered);
        }
        info!(
            "Recording module ready (image {}, path {})",
            self.images.image_reference(),
            self.catalog.root().display()
        );
        Ok(())
    }

    /// Rewrites catalog entries still `starting`/`started` but unknown to the
    /// registry as `failed`; returns how many were rewritten.
    pub fn recover_interrupted(&self) -> Result<usize, RecordingError> {
        let mut recovered = 0;
        for mut recording in self.catalog.list_all()? {
            if !recording.status.is_active() || self.registry.is_active(&recording.id) {
                continue;
            }
            recording.status = RecordingStatus::Failed;
            recording.reason = Some(RECORDING_INTERRUPTED.to_string());
            match self.catalog.write_metadata(&recording) {
                Ok(()) => {
                    debug!("Recording {} marked as interrupted", recording.id);
                    recovered += 1;
                }
                Err(e) => warn!("Could not mark recording {} as interrupted: {}", recording.id, e),
            }
        }
        Ok(recovered)
    }

    pub async fn start_recording(
        self: &Arc<Self>,
        session: Arc<dyn SessionHandle>,
        properties: RecordingProperties,
    ) -> Result<Recording, RecordingError> {
        let session_id = session.session_id().to_string();
        if !properties.has_audio && !properties.has_video {
            return Err(RecordingError::InvalidState(
                "a recording needs audio, video or both".to_string(),
            ));
        }
        if self.registry.is_session_recording(&session_id) {
            return Err(RecordingError::AlreadyRecording(session_id));
        }

        let recording = self.reserve(session.as_ref(), &properties)?;
        if let Err(e) = self.catalog.write_metadata(&recording) {
            error!("Could not persist recording {}: {}", recording.id, e);
            self.registry.rollback(&recording);
            return Err(e.into());
        }

        info!(
            "Starting {:?} recording {} of session {}",
            recording.output_mode, recording.id, session_id
        );
        let service = self.services.for_mode(recording.output_mode).clone();
        let launched = match service
            .start_recording(session.as_ref(), recording.clone())
            .await
        {
            Ok(launched) => launched,
            Err(e) => {
                error!("Recording {} could not start: {}", recording.id, e);
                self.registry.rollback(&recording);
                let mut failed = recording;
                failed.status = RecordingStatus::Failed;
                failed.reason = Some(RECORDING_START_FAILED.to_string());
                self.update_metadata(&failed);
                return Err(e);
            }
        };

        // Armed while still starting: a concurrent stop is refused until
        // `mark_started`, and any stop after it disarms this timer.
        if session.active_publishers() == 0 {
            self.arm_auto_stop(session.clone(), &launched.id);
        }
        let Some(started) = self.registry.mark_started(launched.clone()) else {
            warn!("Recording {} vanished while starting", launched.id);
            self.scheduler.abort(&session_id);
            if let Err(e) = service
                .stop_recording(&session_id, launched.clone(), RECORDING_START_FAILED)
                .await
            {
                warn!("Orphan workers of recording {} not stopped: {}", launched.id, e);
            }
            return Err(RecordingError::NotFound(launched.id));
        };
        self.update_metadata(&started);
        info!("Recording {} started", started.id);
        Ok(started)
    }

    /// Allocates a free id and reserves it for the session.
    fn reserve(
        &self,
        session: &dyn SessionHandle,
        properties: &RecordingProperties,
    ) -> Result<Recording, RecordingError> {
        let session_id = session.session_id();
        let preferred = match session.short_session_id() {
            "" => session_id,
            short => short,
        };
        let mut attempts = 0;
        loop {
            let id = self.catalog.allocate_free_id_excluding(
                session_id,
                preferred,
                &self.registry.active_ids(),
            )?;
            let recording = Recording::starting(&id, session_id, properties);
            match self.registry.reserve(&recording) {
                Ok(()) => return Ok(recording),
                Err(RecordingError::Conflict(msg)) if attempts < MAX_ID_ATTEMPTS => {
                    debug!("Retrying id allocation: {}", msg);
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stops a started recording.
    ///
    /// With a session id the recording is resolved through that session,
    /// otherwise through the started recordings. A recording that is not
    /// (or no longer) started yields `NotFound`, one still starting yields
    /// `InvalidState`.
    pub async fn stop_recording(
        &self,
        session_id: Option<&str>,
        recording_id: &str,
        reason: &str,
    ) -> Result<Recording, RecordingError> {
        let recording = match session_id {
            Some(session_id) => match self.registry.for_session(session_id) {
                Some(r) if r.id == recording_id => r,
                _ => {
                    return Err(RecordingError::NotFound(format!(
                        "session {} is not recording {}",
                        session_id, recording_id
                    )))
                }
            },
            None => match self.registry.started(recording_id) {
                Some(r) => r,
                None if self.registry.starting(recording_id).is_some() => {
                    return Err(RecordingError::InvalidState(format!(
                        "recording {} is still starting",
                        recording_id
                    )))
                }
                None => return Err(RecordingError::NotFound(recording_id.to_string())),
            },
        };
        if recording.status == RecordingStatus::Starting {
            return Err(RecordingError::InvalidState(format!(
                "recording {} is still starting",
                recording_id
            )));
        }

        self.scheduler.abort(&recording.session_id);
        let Some(recording) = self.registry.claim(recording_id) else {
            return Err(RecordingError::NotFound(recording_id.to_string()));
        };

        info!("Stopping recording {} ({})", recording.id, reason);
        let service = self.services.for_mode(recording.output_mode).clone();
        match service
            .stop_recording(&recording.session_id, recording.clone(), reason)
            .await
        {
            Ok(stopped) => {
                let stopped = self.finish(stopped, RecordingStatus::Stopped, reason);
                info!(
                    "Recording {} stopped: {} bytes, {:.1}s",
                    stopped.id, stopped.size, stopped.duration
                );
                Ok(stopped)
            }
            Err(e) => {
                error!("Recording {} did not stop cleanly: {}", recording.id, e);
                self.finish(recording, RecordingStatus::Failed, reason);
                Err(e)
            }
        }
    }

    /// Stops every started recording; returns how many stopped cleanly.
    pub async fn stop_all(&self, reason: &str) -> usize {
        self.scheduler.shutdown();
        let mut stopped = 0;
        for recording_id in self.registry.started_ids() {
            match self.stop_recording(None, &recording_id, reason).await {
                Ok(_) => stopped += 1,
                Err(RecordingError::NotFound(_)) => {}
                Err(e) => warn!("Recording {} not stopped: {}", recording_id, e),
            }
        }
        stopped
    }

    fn finish(&self, mut recording: Recording, status: RecordingStatus, reason: &str) -> Recording {
        recording.status = status;
        recording.reason = Some(final_reason(reason));
        recording.size = self.catalog.recording_size(&recording.id);
        let elapsed_ms = (Utc::now().timestamp_millis() - recording.created_at).max(0);
        recording.duration = elapsed_ms as f64 / 1000.0;
        recording.url = None;
        self.update_metadata(&recording);
        recording
    }

    /// Rewrites the metadata of a recording whose directory still exists.
    fn update_metadata(&self, recording: &Recording) {
        if !self.catalog.exists(&recording.id) {
            warn!(
                "Recording {} was deleted while active, metadata not rewritten",
                recording.id
            );
            return;
        }
        if let Err(e) = self.catalog.write_metadata(recording) {
            error!("Could not update metadata of recording {}: {}", recording.id, e);
        }
    }

    /// Records a stream published after the recording began.
    ///
    /// A publishing participant also disarms the session's auto-stop timer.
    pub async fn start_stream_recording(
        &self,
        session_id: &str,
        participant: &Participant,
    ) -> Result<(), RecordingError> {
        let recording = self.live_recording(session_id)?;
        if participant.is_publishing() {
            self.scheduler.abort(session_id);
        }
        self.services
            .for_mode(recording.output_mode)
            .start_stream_recording(session_id, &recording, participant)
            .await
    }

    /// Stops recording one stream, waiting at most the configured stream-stop timeout.
    pub async fn stop_stream_recording(
        &self,
        session_id: &str,
        stream_id: &str,
    ) -> Result<(), RecordingError> {
        let recording = self.live_recording(session_id)?;
        let service = self.services.for_mode(recording.output_mode).clone();
        let timeout = self.config.stream_stop_timeout();
        match tokio::time::timeout(
            timeout,
            service.stop_stream_recording(session_id, &recording, stream_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Timeout of {}s waiting for stream {} of recording {} to stop",
                    timeout.as_secs(),
                    stream_id,
                    recording.id
                );
                Err(RecordingError::Timeout(format!(
                    "stream {} of recording {}",
                    stream_id, recording.id
                )))
            }
        }
    }

    fn live_recording(&self, session_id: &str) -> Result<Recording, RecordingError> {
        let recording = self.registry.for_session(session_id).ok_or_else(|| {
            RecordingError::NotFound(format!("session {} is not being recorded", session_id))
        })?;
        if recording.status != RecordingStatus::Started {
            return Err(RecordingError::InvalidState(format!(
                "recording {} is still starting",
                recording.id
            )));
        }
        Ok(recording)
    }

    /// Arms the auto-stop timer when the session's recording runs with no publisher.
    ///
    /// Meant to be called when a stream stops being published.
    pub fn arm_auto_stop_if_idle(self: &Arc<Self>, session: Arc<dyn SessionHandle>) -> bool {
        let Some(recording) = self.registry.for_session(session.session_id()) else {
            return false;
        };
        if recording.status != RecordingStatus::Started || session.active_publishers() > 0 {
            return false;
        }
        self.arm_auto_stop(session, &recording.id)
    }

    pub fn disarm_auto_stop(&self, session_id: &str) -> bool {
        self.scheduler.abort(session_id)
    }

    pub fn is_auto_stop_armed(&self, session_id: &str) -> bool {
        self.scheduler.is_armed(session_id)
    }

    fn arm_auto_stop(self: &Arc<Self>, session: Arc<dyn SessionHandle>, recording_id: &str) -> bool {
        let manager = Arc::downgrade(self);
        let session_id = session.session_id().to_string();
        let recording_id = recording_id.to_string();
        self.scheduler.arm(&session_id, move || async move {
            if let Some(manager) = manager.upgrade() {
                manager.automatic_stop(session, &recording_id).await;
            }
        })
    }

    async fn automatic_stop(&self, session: Arc<dyn SessionHandle>, recording_id: &str) {
        let session_id = session.session_id();
        match self
            .stop_recording(Some(session_id), recording_id, AUTOMATIC_STOP)
            .await
        {
            Ok(recording) => info!(
                "Recording {} of session {} stopped automatically",
                recording.id, session_id
            ),
            Err(RecordingError::NotFound(_)) => {
                debug!("Recording {} was already stopped", recording_id)
            }
            Err(e) => error!("Automatic stop of recording {} failed: {}", recording_id, e),
        }

        if session.is_abandoned() {
            info!("Closing session {} left with no participants", session_id);
            self.sessions.close_session(session_id, AUTOMATIC_STOP).await;
        }
    }

    pub fn is_recording(&self, session_id: &str) -> bool {
        self.registry.is_session_recording(session_id)
    }

    pub fn is_recording_composed(&self, session_id: &str) -> bool {
        self.registry
            .is_session_recording_in_mode(session_id, OutputMode::Composed)
    }

    pub fn is_recording_individual(&self, session_id: &str) -> bool {
        self.registry
            .is_session_recording_in_mode(session_id, OutputMode::Individual)
    }

    pub fn is_audio_only(&self, session_id: &str) -> bool {
        self.registry.is_session_audio_only(session_id)
    }

    pub fn get_started_recording(&self, recording_id: &str) -> Option<Recording> {
        self.registry.started(recording_id)
    }

    pub fn get_starting_recording(&self, recording_id: &str) -> Option<Recording> {
        self.registry.starting(recording_id)
    }

    pub fn get_recording(&self, recording_id: &str) -> Result<Recording, RecordingError> {
        self.catalog
            .get(recording_id)?
            .ok_or_else(|| RecordingError::NotFound(recording_id.to_string()))
    }

    pub fn list_recordings(&self) -> Result<Vec<Recording>, RecordingError> {
        Ok(self.catalog.list_all()?)
    }

    pub fn list_finished_recordings(&self) -> Result<Vec<Recording>, RecordingError> {
        Ok(self.catalog.list_finished()?)
    }

    /// Removes a recording from disk.
    ///
    /// A starting or started recording is only deleted with `force`.
    pub fn delete_recording(&self, recording_id: &str, force: bool) -> Result<(), RecordingError> {
        if !force && self.registry.is_active(recording_id) {
            return Err(RecordingError::Conflict(format!(
                "recording {} is still active",
                recording_id
            )));
        }
        self.catalog.delete(recording_id).map_err(|e| match e {
            StorageError::NotFound => RecordingError::NotFound(recording_id.to_string()),
            other => other.into(),
        })
    }
}
