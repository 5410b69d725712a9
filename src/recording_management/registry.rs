use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, warn};

use crate::error_handling::types::RecordingError;
use crate::recording::{OutputMode, Recording, RecordingStatus};

/// In-memory index of the recordings that are currently live.
///
/// Three maps, each atomic on its own, never locked together:
/// - `starting`: recording id to a recording whose worker is being launched
/// - `started`: recording id to a recording whose worker confirmed startup
/// - `by_session`: session id to its single live recording
///
/// `by_session` is inserted first and removed last, so a session that appears
/// in `starting` or `started` is always visible in `by_session` too.
pub struct RecordingRegistry {
    starting: DashMap<String, Recording>,
    started: DashMap<String, Recording>,
    by_session: DashMap<String, Recording>,
}

impl Default for RecordingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingRegistry {
    pub fn new() -> Self {
        RecordingRegistry {
            starting: DashMap::new(),
            started: DashMap::new(),
            by_session: DashMap::new(),
        }
    }

    /// Claims the session for `recording` and indexes it as starting.
    ///
    /// Fails with `AlreadyRecording` when the session already has a live
    /// recording, and with `Conflict` when another session holds the same
    /// recording id. Nothing stays indexed on failure.
    pub fn reserve(&self, recording: &Recording) -> Result<(), RecordingError> {
        match self.by_session.entry(recording.session_id.clone()) {
            Entry::Occupied(existing) => {
                return Err(RecordingError::AlreadyRecording(format!(
                    "session {} is already recorded by {}",
                    recording.session_id,
                    existing.get().id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(recording.clone());
            }
        }

        if self.started.contains_key(&recording.id) {
            self.by_session
                .remove_if(&recording.session_id, |_, r| r.id == recording.id);
            return Err(RecordingError::Conflict(format!(
                "recording id {} is already in use",
                recording.id
            )));
        }
        match self.starting.entry(recording.id.clone()) {
            Entry::Occupied(_) => {
                self.by_session
                    .remove_if(&recording.session_id, |_, r| r.id == recording.id);
                Err(RecordingError::Conflict(format!(
                    "recording id {} is already in use",
                    recording.id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(recording.clone());
                debug!(
                    "Recording {} reserved for session {}",
                    recording.id, recording.session_id
                );
                Ok(())
            }
        }
    }

    /// Undoes a [`reserve`](Self::reserve) whose start failed.
    pub fn rollback(&self, recording: &Recording) {
        self.starting.remove(&recording.id);
        self.by_session
            .remove_if(&recording.session_id, |_, r| r.id == recording.id);
        debug!("Reservation of recording {} rolled back", recording.id);
    }

    /// Moves a starting recording to `started`, replacing its entry with `recording`.
    ///
    /// Returns `None` when the recording is no longer reserved.
    pub fn mark_started(&self, recording: Recording) -> Option<Recording> {
        let (_, _) = self.starting.remove(&recording.id)?;
        let mut recording = recording;
        recording.status = RecordingStatus::Started;

        match self.by_session.get_mut(&recording.session_id) {
            Some(mut entry) if entry.id == recording.id => *entry = recording.clone(),
            _ => {
                warn!(
                    "Recording {} lost its session entry while starting",
                    recording.id
                );
                return None;
            }
        }
        self.started.insert(recording.id.clone(), recording.clone());
        Some(recording)
    }

    /// Removes a started recording from both the by-id and by-session indices.
    ///
    /// Only one concurrent caller can claim a given recording; the others get `None`.
    pub fn claim(&self, recording_id: &str) -> Option<Recording> {
        let (_, recording) = self.started.remove(recording_id)?;
        self.by_session
            .remove_if(&recording.session_id, |_, r| r.id == recording.id);
        debug!("Recording {} removed from the registry", recording_id);
        Some(recording)
    }

    pub fn started(&self, recording_id: &str) -> Option<Recording> {
        self.started.get(recording_id).map(|r| r.clone())
    }

    pub fn starting(&self, recording_id: &str) -> Option<Recording> {
        self.starting.get(recording_id).map(|r| r.clone())
    }

    pub fn for_session(&self, session_id: &str) -> Option<Recording> {
        self.by_session.get(session_id).map(|r| r.clone())
    }

    /// Whether `recording_id` is starting or started.
    pub fn is_active(&self, recording_id: &str) -> bool {
        self.starting.contains_key(recording_id) || self.started.contains_key(recording_id)
    }

    pub fn is_session_recording(&self, session_id: &str) -> bool {
        self.by_session.contains_key(session_id)
    }

    pub fn is_session_recording_in_mode(&self, session_id: &str, mode: OutputMode) -> bool {
        self.by_session
            .get(session_id)
            .map(|r| r.output_mode == mode)
            .unwrap_or(false)
    }

    /// Whether the session's live recording captures audio only.
    pub fn is_session_audio_only(&self, session_id: &str) -> bool {
        self.by_session
            .get(session_id)
            .map(|r| r.has_audio && !r.has_video)
            .unwrap_or(false)
    }

    /// Ids of every starting and started recording.
    pub fn active_ids(&self) -> Vec<String> {
        self.starting
            .iter()
            .map(|r| r.key().clone())
            .chain(self.started.iter().map(|r| r.key().clone()))
            .collect()
    }

    pub fn started_ids(&self) -> Vec<String> {
        self.started.iter().map(|r| r.key().clone()).collect()
    }

    pub fn started_count(&self) -> usize {
        self.started.len()
    }

    pub fn starting_count(&self) -> usize {
        self.starting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingProperties;
    use std::sync::Arc;

    fn recording(id: &str, session_id: &str) -> Recording {
        Recording::starting(id, session_id, &RecordingProperties::default())
    }

    #[test]
    fn second_reservation_for_session_is_rejected() {
        let registry = RecordingRegistry::new();
        registry.reserve(&recording("a", "s1")).unwrap();

        match registry.reserve(&recording("b", "s1")) {
            Err(RecordingError::AlreadyRecording(msg)) => assert!(msg.contains("a")),
            other => panic!("Expected AlreadyRecording, got {:?}", other),
        }
        assert!(registry.starting("b").is_none());
        assert_eq!(registry.for_session("s1").unwrap().id, "a");
    }

    #[test]
    fn duplicate_id_across_sessions_is_a_conflict() {
        let registry = RecordingRegistry::new();
        registry.reserve(&recording("a", "s1")).unwrap();

        assert!(matches!(
            registry.reserve(&recording("a", "s2")),
            Err(RecordingError::Conflict(_))
        ));
        assert!(!registry.is_session_recording("s2"));
        assert_eq!(registry.for_session("s1").unwrap().id, "a");
    }

    #[test]
    fn start_then_claim_clears_both_indices() {
        let registry = RecordingRegistry::new();
        let r = recording("a", "s1");
        registry.reserve(&r).unwrap();

        let started = registry.mark_started(r).unwrap();
        assert_eq!(started.status, RecordingStatus::Started);
        assert!(registry.starting("a").is_none());
        assert!(registry.started("a").is_some());
        assert_eq!(
            registry.for_session("s1").unwrap().status,
            RecordingStatus::Started
        );

        let claimed = registry.claim("a").unwrap();
        assert_eq!(claimed.id, "a");
        assert!(registry.started("a").is_none());
        assert!(!registry.is_session_recording("s1"));
        assert!(registry.claim("a").is_none());
    }

    #[test]
    fn rollback_releases_session() {
        let registry = RecordingRegistry::new();
        let r = recording("a", "s1");
        registry.reserve(&r).unwrap();
        registry.rollback(&r);

        assert!(!registry.is_active("a"));
        assert!(!registry.is_session_recording("s1"));
        registry.reserve(&recording("a-1", "s1")).unwrap();
    }

    #[test]
    fn mark_started_without_reservation_is_none() {
        let registry = RecordingRegistry::new();
        assert!(registry.mark_started(recording("ghost", "s")).is_none());
        assert_eq!(registry.started_count(), 0);
    }

    #[test]
    fn mode_and_audio_queries() {
        let registry = RecordingRegistry::new();
        let mut r = recording("a", "s1");
        r.output_mode = OutputMode::Individual;
        registry.reserve(&r).unwrap();
        let mut audio = recording("b", "s2");
        audio.has_video = false;
        registry.reserve(&audio).unwrap();

        assert!(registry.is_session_recording_in_mode("s1", OutputMode::Individual));
        assert!(!registry.is_session_recording_in_mode("s1", OutputMode::Composed));
        assert!(!registry.is_session_recording_in_mode("nope", OutputMode::Composed));
        assert!(registry.is_session_audio_only("s2"));
        assert!(!registry.is_session_audio_only("s1"));

        let mut ids = registry.active_ids();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn concurrent_reservations_admit_exactly_one() {
        let registry = Arc::new(RecordingRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry
                        .reserve(&recording(&format!("r{}", i), "shared"))
                        .is_ok()
                })
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(registry.starting_count(), 1);
    }
}
